use serde::{Serialize, Deserialize};
use kurbo::{Point, Vec2};
use crate::types::{Bounds, ViewMode};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub pan_x: f64,
    pub pan_y: f64,
    pub zoom: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Viewport { pan_x: 0.0, pan_y: 0.0, zoom: 1.0 }
    }
}

impl Viewport {
    pub fn screen_to_canvas(&self, p: Point) -> Point {
        Point::new((p.x - self.pan_x) / self.zoom, (p.y - self.pan_y) / self.zoom)
    }

    pub fn canvas_to_screen(&self, p: Point) -> Point {
        Point::new(p.x * self.zoom + self.pan_x, p.y * self.zoom + self.pan_y)
    }

    /// Canvas units per screen pixel.
    pub fn display_scale(&self) -> f64 {
        1.0 / self.zoom
    }

    pub fn pan_by(&mut self, delta: Vec2) {
        self.pan_x += delta.x;
        self.pan_y += delta.y;
    }

    /// Zoom keeping the canvas point under `anchor` fixed on screen.
    pub fn zoom_about(&mut self, anchor: Point, factor: f64, min_zoom: f64, max_zoom: f64) {
        if !factor.is_finite() || factor <= 0.0 {
            return;
        }
        let before = self.screen_to_canvas(anchor);
        self.zoom = (self.zoom * factor).clamp(min_zoom, max_zoom);
        self.pan_x = anchor.x - before.x * self.zoom;
        self.pan_y = anchor.y - before.y * self.zoom;
    }

    /// Center and fit the canvas inside a screen rect.
    pub fn fit(canvas_w: f64, canvas_h: f64, area: &Bounds, padding: f64) -> Viewport {
        let avail_w = (area.width - padding * 2.0).max(1.0);
        let avail_h = (area.height - padding * 2.0).max(1.0);
        let zoom = (avail_w / canvas_w).min(avail_h / canvas_h);
        Viewport {
            pan_x: area.x + (area.width - canvas_w * zoom) / 2.0,
            pan_y: area.y + (area.height - canvas_h * zoom) / 2.0,
            zoom,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct Layout {
    pub canvas: Bounds,
    pub show_toolbar: bool,
    pub show_layers_panel: bool,
    pub show_gallery: bool,
    pub show_prompt_bar: bool,
}

const TOOLBAR_HEIGHT: f64 = 48.0;
const SIDE_PANEL_WIDTH: f64 = 280.0;
const PROMPT_BAR_HEIGHT: f64 = 96.0;

/// Where the canvas sits, and which panels are shown, for a window size.
pub fn layout(mode: ViewMode, window_w: f64, window_h: f64) -> Layout {
    let w = window_w.max(0.0);
    let h = window_h.max(0.0);
    match mode {
        ViewMode::Fullscreen => Layout {
            canvas: Bounds::new(0.0, 0.0, w, h),
            show_toolbar: false,
            show_layers_panel: false,
            show_gallery: false,
            show_prompt_bar: false,
        },
        ViewMode::Canvas => Layout {
            canvas: Bounds::new(0.0, TOOLBAR_HEIGHT, (w - SIDE_PANEL_WIDTH).max(0.0), (h - TOOLBAR_HEIGHT - PROMPT_BAR_HEIGHT).max(0.0)),
            show_toolbar: true,
            show_layers_panel: true,
            show_gallery: false,
            show_prompt_bar: true,
        },
        ViewMode::Studio => Layout {
            canvas: Bounds::new(0.0, TOOLBAR_HEIGHT, (w * 0.6).floor(), (h - TOOLBAR_HEIGHT).max(0.0)),
            show_toolbar: true,
            show_layers_panel: false,
            show_gallery: true,
            show_prompt_bar: true,
        },
        ViewMode::Hybrid => Layout {
            canvas: Bounds::new(0.0, TOOLBAR_HEIGHT, (w - SIDE_PANEL_WIDTH).max(0.0), ((h - TOOLBAR_HEIGHT) * 0.7).floor().max(0.0)),
            show_toolbar: true,
            show_layers_panel: true,
            show_gallery: true,
            show_prompt_bar: true,
        },
    }
}
