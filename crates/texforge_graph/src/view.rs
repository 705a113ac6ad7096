// SPDX-License-Identifier: MIT OR Apache-2.0
//! Pan and zoom of the graph canvas.

use egui::{Pos2, Rect, Vec2};

/// Smallest zoom factor
pub const MIN_ZOOM: f32 = 0.1;
/// Largest zoom factor
pub const MAX_ZOOM: f32 = 4.0;

/// Canvas transform shared by the editor and session files
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewState {
    /// Current pan offset (graph space)
    pub pan: Vec2,
    /// Current zoom level
    pub zoom: f32,
}

impl ViewState {
    /// Unpanned view at 100%
    pub fn new() -> Self {
        Self {
            pan: Vec2::ZERO,
            zoom: 1.0,
        }
    }

    /// Build a view from stored values, clamping the zoom
    pub fn from_parts(pan: [f32; 2], zoom: f32) -> Self {
        let zoom = if zoom.is_finite() {
            zoom.clamp(MIN_ZOOM, MAX_ZOOM)
        } else {
            1.0
        };
        Self {
            pan: Vec2::new(pan[0], pan[1]),
            zoom,
        }
    }

    /// Convert screen position to graph position
    pub fn screen_to_graph(&self, screen_pos: Pos2, rect: Rect) -> Pos2 {
        let center = rect.center();
        Pos2::new(
            (screen_pos.x - center.x) / self.zoom - self.pan.x,
            (screen_pos.y - center.y) / self.zoom - self.pan.y,
        )
    }

    /// Convert graph position to screen position
    pub fn graph_to_screen(&self, graph_pos: Pos2, rect: Rect) -> Pos2 {
        let center = rect.center();
        Pos2::new(
            (graph_pos.x + self.pan.x) * self.zoom + center.x,
            (graph_pos.y + self.pan.y) * self.zoom + center.y,
        )
    }

    /// Pan by a screen-space drag delta
    pub fn pan_by(&mut self, screen_delta: Vec2) {
        self.pan += screen_delta / self.zoom;
    }

    /// Zoom by `factor`, keeping the graph point under `anchor` fixed
    pub fn zoom_at(&mut self, factor: f32, anchor: Pos2, rect: Rect) {
        let fixed = self.screen_to_graph(anchor, rect);
        let zoom = (self.zoom * factor).clamp(MIN_ZOOM, MAX_ZOOM);
        if zoom == self.zoom {
            return;
        }
        self.zoom = zoom;
        let offset = anchor - rect.center();
        self.pan = offset / zoom - fixed.to_vec2();
    }
}

impl Default for ViewState {
    fn default() -> Self {
        Self::new()
    }
}
