//! Size of the graph container, with change detection.

use egui::Vec2;

/// Tracks the last measured container size.
#[derive(Debug, Clone, Default)]
pub struct ViewportObserver {
    size: Option<Vec2>,
}

impl ViewportObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a measurement. Returns `true` when the size changed and the
    /// layout has to be recomputed.
    ///
    /// Collapsed or non-finite measurements are ignored so a hidden panel does
    /// not wipe out the last usable layout.
    pub fn observe(&mut self, size: Vec2) -> bool {
        if !size.x.is_finite() || !size.y.is_finite() || size.x <= 0.0 || size.y <= 0.0 {
            return false;
        }
        if self.size == Some(size) {
            return false;
        }
        tracing::debug!(width = size.x, height = size.y, "viewport resized");
        self.size = Some(size);
        true
    }

    pub fn current(&self) -> Option<Vec2> {
        self.size
    }
}
