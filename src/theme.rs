//! Color constants for the console.

use egui::Color32;

/// Background colors for different layers
pub mod bg {
    use super::*;

    /// Graph area background - darkest layer
    pub const GRAPH: Color32 = Color32::from_rgb(14, 17, 23);

    /// Side panel backgrounds
    pub const PANEL: Color32 = Color32::from_rgb(20, 22, 28);
}

pub mod text {
    use super::*;

    pub const PRIMARY: Color32 = Color32::from_rgb(230, 232, 238);
    pub const MUTED: Color32 = Color32::from_rgb(140, 146, 160);
    pub const ERROR: Color32 = Color32::from_rgb(239, 68, 68);
    pub const OK: Color32 = Color32::from_rgb(74, 222, 128);
}

pub mod graph {
    use super::*;

    pub const EDGE: Color32 = Color32::from_rgb(90, 96, 112);
    pub const SELECTED_RING: Color32 = Color32::from_rgb(250, 204, 21);
    pub const HOVER_RING: Color32 = Color32::WHITE;
}

/// Fill color for nodes at `depth`; hues step by the golden angle.
pub fn depth_color(depth: usize) -> Color32 {
    let hue = (depth as f32 * 137.5) % 360.0;
    hsl_to_rgb(hue, 0.6, 0.55)
}

/// Convert HSL to RGB color
pub fn hsl_to_rgb(h: f32, s: f32, l: f32) -> Color32 {
    let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = l - c / 2.0;

    let (r, g, b) = if h < 60.0 {
        (c, x, 0.0)
    } else if h < 120.0 {
        (x, c, 0.0)
    } else if h < 180.0 {
        (0.0, c, x)
    } else if h < 240.0 {
        (0.0, x, c)
    } else if h < 300.0 {
        (x, 0.0, c)
    } else {
        (c, 0.0, x)
    };

    Color32::from_rgb(
        ((r + m) * 255.0) as u8,
        ((g + m) * 255.0) as u8,
        ((b + m) * 255.0) as u8,
    )
}
