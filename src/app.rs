//! Main application state and UI.

use crate::api::ApiClient;
use crate::console::{Console, GraphView, Remote, ThreadExecutor};
use crate::lineage::{ChildOrder, ParameterRecord, Projection, SessionRecord};
use crate::selection::SelectionSnapshot;
use crate::settings::Settings;
use crate::theme;
use eframe::egui::{self, Align2, Color32, FontId, Pos2, Rect, Sense, Stroke, Vec2};
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// What a click on the graph area hit
enum GraphClick {
    Node(String),
    Background,
}

/// Main console application
pub struct LineageApp {
    console: Console,

    // API status
    api: ApiClient,
    api_connected: bool,
    api_error: Option<String>,

    // Continue-to-train form
    continue_name: String,
    continue_error: Option<String>,

    // Settings persistence
    settings: Settings,
    settings_dirty: bool,
    last_settings_save: Instant,
}

impl LineageApp {
    pub fn new(_cc: &eframe::CreationContext<'_>) -> Self {
        let settings = Settings::load();
        let api = ApiClient::new(&settings.api_base_url);

        let mut console = Console::new(
            Arc::new(api.clone()),
            Rc::new(ThreadExecutor),
            settings.lineage_config(),
        );
        console.set_default_task(settings.default_task);

        let mut app = Self {
            console,
            api,
            api_connected: false,
            api_error: None,
            continue_name: String::new(),
            continue_error: None,
            settings,
            settings_dirty: false,
            last_settings_save: Instant::now(),
        };

        app.check_api();
        app.console.refresh_model_groups();
        if let Some(group) = app.settings.last_model_group {
            app.console.select_group(group);
        }
        app
    }

    fn check_api(&mut self) {
        match self.api.health() {
            Ok(()) => {
                self.api_connected = true;
                self.api_error = None;
            }
            Err(e) => {
                tracing::warn!(base_url = self.api.base_url(), error = %e, "history service unreachable");
                self.api_connected = false;
                self.api_error = Some(e.to_string());
            }
        }
    }

    /// Mark settings as needing to be saved
    fn mark_settings_dirty(&mut self) {
        self.settings_dirty = true;
    }

    /// Save settings if dirty and enough time has passed (debounce)
    fn maybe_save_settings(&mut self) {
        if self.settings_dirty && self.last_settings_save.elapsed().as_secs() >= 2 {
            self.settings.save();
            self.settings_dirty = false;
            self.last_settings_save = Instant::now();
        }
    }

    fn select_group(&mut self, group: i64) {
        self.console.select_group(group);
        self.continue_name.clear();
        self.continue_error = None;
        self.settings.last_model_group = Some(group);
        self.mark_settings_dirty();
    }

    fn render_sidebar(&mut self, ui: &mut egui::Ui) {
        ui.heading("Training History");
        ui.add_space(4.0);

        ui.horizontal(|ui| {
            let (color, label) = if self.api_connected {
                (theme::text::OK, "Connected")
            } else {
                (theme::text::ERROR, "Offline")
            };
            ui.colored_label(color, "●");
            ui.label(label);
            if ui.small_button("⟳").on_hover_text("Check connection").clicked() {
                self.check_api();
                self.console.refresh_model_groups();
            }
        });
        if let Some(ref err) = self.api_error {
            ui.colored_label(theme::text::MUTED, err);
        }

        ui.separator();
        ui.label(egui::RichText::new("Models").strong());

        let active = self.console.active_group();
        let mut chosen = None;
        match self.console.model_groups() {
            Remote::Idle => {}
            Remote::Loading => {
                ui.spinner();
            }
            Remote::Failed(err) => {
                ui.colored_label(theme::text::ERROR, err);
            }
            Remote::Ready(groups) if groups.is_empty() => {
                ui.colored_label(theme::text::MUTED, "No fine-tuned models yet");
            }
            Remote::Ready(groups) => {
                for group in groups {
                    let label = if group.base_model_name.is_empty() {
                        group.name.clone()
                    } else {
                        format!("{}  ·  {}", group.name, group.base_model_name)
                    };
                    let response = ui.selectable_label(active == Some(group.id), label);
                    let response = if group.description.is_empty() {
                        response
                    } else {
                        response.on_hover_text(&group.description)
                    };
                    if response.clicked() {
                        chosen = Some(group.id);
                    }
                }
            }
        }
        if let Some(group) = chosen {
            self.select_group(group);
        }

        if let Some(sessions) = self.console.sessions().ready() {
            ui.colored_label(theme::text::MUTED, format!("{} training runs", sessions.len()));
        }
        if active.is_some() && ui.button("Reload sessions").clicked() {
            self.console.reload_sessions();
        }

        ui.separator();
        egui::CollapsingHeader::new("Layout")
            .default_open(false)
            .show(ui, |ui| {
                let mut changed = false;
                changed |= ui
                    .add(
                        egui::Slider::new(&mut self.settings.vertical_spacing, 0.05..=0.5)
                            .text("Row spacing"),
                    )
                    .changed();
                changed |= ui
                    .add(
                        egui::Slider::new(&mut self.settings.horizontal_compression, 0.2..=1.0)
                            .text("Width"),
                    )
                    .changed();
                changed |= ui
                    .add(egui::Slider::new(&mut self.settings.node_radius, 6.0..=30.0).text("Node size"))
                    .changed();

                egui::ComboBox::from_label("Sibling order")
                    .selected_text(self.settings.child_order.label())
                    .show_ui(ui, |ui| {
                        for order in ChildOrder::all() {
                            changed |= ui
                                .selectable_value(&mut self.settings.child_order, *order, order.label())
                                .changed();
                        }
                    });

                if changed {
                    self.console.set_config(self.settings.lineage_config());
                    self.settings_dirty = true;
                }
            });
    }

    fn render_graph(&mut self, ui: &mut egui::Ui) {
        let rect = ui.available_rect_before_wrap();
        let response = ui.allocate_rect(rect, Sense::click());
        let painter = ui.painter_at(rect);
        let radius = self.settings.node_radius;

        // Leave room for node circles and the labels drawn under them
        let inner = Rect::from_min_max(
            rect.min + Vec2::new(radius * 2.0, radius * 2.0),
            rect.max - Vec2::new(radius * 2.0, radius * 2.0 + 18.0),
        );
        self.console.on_viewport(inner.size());
        let origin = inner.min.to_vec2();

        let mut click = None;
        match self.console.graph() {
            GraphView::Ready(projection) => {
                let hovered = response
                    .hover_pos()
                    .and_then(|p| projection.node_at(p - origin, radius))
                    .map(|n| n.id.clone());
                draw_projection(&painter, projection, origin, radius, hovered.as_deref());

                if response.clicked() {
                    let hit = response
                        .interact_pointer_pos()
                        .and_then(|p| projection.node_at(p - origin, radius));
                    click = Some(match hit {
                        Some(node) => GraphClick::Node(node.id.clone()),
                        None => GraphClick::Background,
                    });
                }
            }
            other => {
                if let Some((message, color)) = status_message(other) {
                    painter.text(
                        rect.center(),
                        Align2::CENTER_CENTER,
                        message,
                        FontId::proportional(16.0),
                        color,
                    );
                }
                if response.clicked() {
                    click = Some(GraphClick::Background);
                }
            }
        }

        match click {
            Some(GraphClick::Node(id)) => {
                self.continue_error = None;
                self.console.on_node_activated(&id);
            }
            Some(GraphClick::Background) => self.console.on_background_activated(),
            None => {}
        }
    }

    fn render_detail(&mut self, ui: &mut egui::Ui, snapshot: &SelectionSnapshot) {
        let Some(session_id) = snapshot.selected_session_id.as_deref() else {
            return;
        };

        let mut close = false;
        ui.horizontal(|ui| {
            let title = self
                .console
                .selected_session()
                .map(|s| s.label().to_string())
                .unwrap_or_else(|| session_id.to_string());
            ui.heading(title);
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                close = ui.button("✕").clicked();
            });
        });
        if close {
            self.console.on_background_activated();
            return;
        }

        if let Some(record) = self.console.selected_session() {
            session_summary(ui, record);
        }
        ui.separator();

        let mut retry = false;
        if snapshot.is_loading {
            ui.horizontal(|ui| {
                ui.spinner();
                ui.label("Loading parameters…");
            });
        }
        if let Some(ref err) = snapshot.error {
            ui.colored_label(theme::text::ERROR, err);
            retry = ui.button("Retry").clicked();
        }
        if let Some(ref parameters) = snapshot.current_parameters {
            egui::ScrollArea::vertical()
                .max_height(ui.available_height() - 140.0)
                .show(ui, |ui| parameter_grid(ui, parameters));
        }
        if retry {
            self.console.retry_detail();
        }

        ui.separator();
        ui.label(egui::RichText::new("Continue to Train").strong());
        ui.horizontal(|ui| {
            ui.label("New model name");
            ui.text_edit_singleline(&mut self.continue_name);
        });

        let submitting = self.console.continuation().is_loading();
        let can_submit = snapshot.current_parameters.is_some() && !submitting;
        if ui
            .add_enabled(can_submit, egui::Button::new("＋ Continue to Train"))
            .clicked()
        {
            match self.console.continue_training(&self.continue_name) {
                Ok(()) => self.continue_error = None,
                Err(e) => self.continue_error = Some(e.to_string()),
            }
        }

        if let Some(ref err) = self.continue_error {
            ui.colored_label(theme::text::ERROR, err);
        }
        match self.console.continuation() {
            Remote::Loading => {
                ui.horizontal(|ui| {
                    ui.spinner();
                    ui.label("Submitting…");
                });
            }
            Remote::Ready(session) => {
                ui.colored_label(
                    theme::text::OK,
                    format!("Started {} (session {})", session.label(), session.session_id),
                );
            }
            Remote::Failed(err) => {
                ui.colored_label(theme::text::ERROR, err);
            }
            Remote::Idle => {}
        }
    }
}

/// Placeholder text for every graph state that has nothing to draw
fn status_message(view: &GraphView) -> Option<(String, Color32)> {
    let message = match view {
        GraphView::Ready(_) => return None,
        GraphView::NoGroup => ("Please select a model.".to_string(), theme::text::MUTED),
        GraphView::Loading | GraphView::WaitingForViewport => {
            ("Loading training sessions…".to_string(), theme::text::MUTED)
        }
        GraphView::LoadFailed(err) => {
            (format!("Could not load sessions: {}", err), theme::text::ERROR)
        }
        GraphView::Empty => (
            "No training runs yet for this model.".to_string(),
            theme::text::MUTED,
        ),
        GraphView::Invalid(err) => {
            (format!("Lineage cannot be drawn: {}", err), theme::text::ERROR)
        }
    };
    Some(message)
}

fn draw_projection(
    painter: &egui::Painter,
    projection: &Projection,
    origin: Vec2,
    radius: f32,
    hovered: Option<&str>,
) {
    let to_screen = |p: Pos2| p + origin;

    for edge in &projection.edges {
        if let (Some(source), Some(target)) = (
            projection.node(&edge.source_id),
            projection.node(&edge.target_id),
        ) {
            painter.line_segment(
                [to_screen(source.position), to_screen(target.position)],
                Stroke::new(1.5, theme::graph::EDGE),
            );
        }
    }

    for node in &projection.nodes {
        let center = to_screen(node.position);
        let is_hovered = hovered == Some(node.id.as_str());
        let size = if is_hovered || node.selected {
            radius * 1.2
        } else {
            radius
        };

        painter.circle_filled(center, size, theme::depth_color(node.depth));
        if node.selected {
            painter.circle_stroke(center, size + 2.0, Stroke::new(2.5, theme::graph::SELECTED_RING));
        } else if is_hovered {
            painter.circle_stroke(center, size + 1.0, Stroke::new(1.5, theme::graph::HOVER_RING));
        }

        painter.text(
            center + Vec2::new(0.0, size + 4.0),
            Align2::CENTER_TOP,
            truncate(node.payload.label(), 24),
            FontId::proportional(12.0),
            theme::text::PRIMARY,
        );
    }

    // Hover details
    if let Some(node) = hovered.and_then(|id| projection.node(id)) {
        let started = node
            .payload
            .started_at()
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "unknown start".to_string());
        painter.text(
            to_screen(node.position) + Vec2::new(radius * 1.5 + 6.0, 0.0),
            Align2::LEFT_CENTER,
            format!("#{}  ·  {}", node.id, started),
            FontId::proportional(11.0),
            theme::text::MUTED,
        );
    }
}

fn session_summary(ui: &mut egui::Ui, record: &SessionRecord) {
    let time = |t: Option<chrono::DateTime<chrono::Utc>>| {
        t.map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "n/a".to_string())
    };

    egui::Grid::new("session_summary")
        .num_columns(2)
        .spacing([12.0, 4.0])
        .show(ui, |ui| {
            row(ui, "Session", &record.session_id);
            row(ui, "Model", &record.model_group_name);
            row(ui, "Base model", &record.base_model_name);
            row(
                ui,
                "Parent",
                record.parent_session_id.as_deref().unwrap_or("(root)"),
            );
            row(ui, "Started", &time(record.started_at()));
            row(ui, "Ended", &time(record.ended_at()));
            if let Some(duration) = record.duration() {
                row(ui, "Duration", &format_duration(duration));
            }
        });
}

fn parameter_grid(ui: &mut egui::Ui, parameters: &ParameterRecord) {
    let on_off = |flag: bool| if flag { "on" } else { "off" };
    let hp = &parameters.hyperparameters;

    egui::Grid::new("parameters")
        .num_columns(2)
        .striped(true)
        .spacing([12.0, 4.0])
        .show(ui, |ui| {
            row(ui, "Model Name", &parameters.model_name);
            row(ui, "Epochs", &hp.epochs.to_string());
            row(ui, "Save Strategy", &hp.save_strategy);
            row(ui, "Logging Strategy", &hp.logging_strategy);
            row(ui, "Evaluation Strategy", &hp.evaluation_strategy);
            row(ui, "Learning Rate", &hp.learning_rate.to_string());
            row(ui, "Weight Decay", &hp.weight_decay.to_string());
            row(ui, "Batch Size", &hp.batch_size.to_string());
            row(ui, "Eval Steps", &hp.eval_steps.to_string());
            row(ui, "Save Steps", &hp.save_steps.to_string());
            row(ui, "Save Total Limits", &hp.save_total_limits.to_string());
            row(ui, "Run on GPU", on_off(hp.run_on_gpu));
            row(ui, "Load Best At The End", on_off(hp.load_best_at_the_end));
            if let Some(ref dataset) = parameters.dataset {
                row(ui, "Dataset", dataset);
            }
        });
}

fn row(ui: &mut egui::Ui, label: &str, value: &str) {
    ui.label(egui::RichText::new(label).color(theme::text::MUTED));
    ui.label(value);
    ui.end_row();
}

fn format_duration(duration: chrono::Duration) -> String {
    let minutes = duration.num_minutes();
    if minutes < 60 {
        format!("{}m {:02}s", minutes, duration.num_seconds() % 60)
    } else {
        format!("{}h {:02}m", minutes / 60, minutes % 60)
    }
}

impl eframe::App for LineageApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.maybe_save_settings();

        // Apply results from background fetches
        self.console.poll();
        if self.console.has_pending_work() {
            ctx.request_repaint_after(Duration::from_millis(50));
        }

        // Dark theme
        ctx.set_visuals(egui::Visuals::dark());

        // Sidebar
        egui::SidePanel::left("sidebar")
            .min_width(220.0)
            .frame(egui::Frame::side_top_panel(&ctx.style()).fill(theme::bg::PANEL))
            .show(ctx, |ui| {
                egui::ScrollArea::vertical().show(ui, |ui| {
                    self.render_sidebar(ui);
                });
            });

        // Detail panel (only while a node is selected)
        let snapshot = self.console.selection();
        if snapshot.selected_session_id.is_some() {
            egui::SidePanel::right("detail")
                .min_width(280.0)
                .frame(egui::Frame::side_top_panel(&ctx.style()).fill(theme::bg::PANEL))
                .show(ctx, |ui| {
                    self.render_detail(ui, &snapshot);
                });
        }

        // Main graph area
        egui::CentralPanel::default()
            .frame(egui::Frame::none().fill(theme::bg::GRAPH))
            .show(ctx, |ui| {
                self.render_graph(ui);
            });
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        // Force save settings on exit
        if self.settings_dirty {
            self.settings.save();
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        let truncated: String = s.chars().take(max_chars).collect();
        format!("{}...", truncated)
    } else {
        s.to_string()
    }
}
