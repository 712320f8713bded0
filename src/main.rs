//! Lineage Console
//!
//! A desktop console for browsing how fine-tuning sessions were derived from
//! one another and continuing training from any of them.

mod api;
mod app;
mod console;
mod lineage;
mod selection;
mod settings;
mod theme;
mod training;
mod viewport;

use eframe::egui;

fn main() -> eframe::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1400.0, 900.0])
            .with_title("Lineage Console"),
        persist_window: true,
        ..Default::default()
    };

    eframe::run_native(
        "Lineage Console",
        options,
        Box::new(|cc| Ok(Box::new(app::LineageApp::new(cc)))),
    )
}
