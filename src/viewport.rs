//! Pan/zoom transform between canvas space and screen space.
//!
//! `screen = canvas * scale + pan` and `canvas = (screen - pan) / scale`.
//! Pan is expressed in screen pixels.

use serde::{Deserialize, Serialize};

use crate::geometry::{Point, Rect};

pub const DEFAULT_MIN_ZOOM: f32 = 0.25;
pub const DEFAULT_MAX_ZOOM: f32 = 2.0;

/// Allowed range for the zoom scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomLimits {
    pub min: f32,
    pub max: f32,
}

impl Default for ZoomLimits {
    fn default() -> Self {
        Self {
            min: DEFAULT_MIN_ZOOM,
            max: DEFAULT_MAX_ZOOM,
        }
    }
}

impl ZoomLimits {
    pub fn clamp(&self, scale: f32) -> f32 {
        scale.clamp(self.min, self.max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    pub pan_x: f32,
    pub pan_y: f32,
    pub scale: f32,
    #[serde(skip)]
    pub limits: ZoomLimits,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            pan_x: 0.0,
            pan_y: 0.0,
            scale: 1.0,
            limits: ZoomLimits::default(),
        }
    }
}

impl Viewport {
    pub fn with_limits(limits: ZoomLimits) -> Self {
        Self {
            limits,
            ..Self::default()
        }
    }

    pub fn pan(&self) -> Point {
        Point::new(self.pan_x, self.pan_y)
    }

    pub fn canvas_to_screen(&self, p: Point) -> Point {
        Point::new(p.x * self.scale + self.pan_x, p.y * self.scale + self.pan_y)
    }

    pub fn screen_to_canvas(&self, p: Point) -> Point {
        Point::new((p.x - self.pan_x) / self.scale, (p.y - self.pan_y) / self.scale)
    }

    /// Shift the view by a raw screen delta.
    pub fn pan_by(&mut self, dx: f32, dy: f32) {
        self.pan_x += dx;
        self.pan_y += dy;
    }

    /// Change the scale while keeping the canvas point under `anchor` (screen
    /// space) visually stationary. The requested scale is clamped first.
    pub fn zoom_to(&mut self, anchor: Point, scale: f32) {
        let fixed = self.screen_to_canvas(anchor);
        self.scale = self.limits.clamp(scale);
        self.pan_x = anchor.x - fixed.x * self.scale;
        self.pan_y = anchor.y - fixed.y * self.scale;
    }

    /// Multiply the scale by `factor`, anchored at `anchor`.
    pub fn zoom_by(&mut self, anchor: Point, factor: f32) {
        self.zoom_to(anchor, self.scale * factor);
    }

    /// Toolbar zoom-in, anchored at the canvas center.
    pub fn zoom_in(&mut self, center: Point, step: f32) {
        self.zoom_by(center, step);
    }

    /// Toolbar zoom-out, anchored at the canvas center.
    pub fn zoom_out(&mut self, center: Point, step: f32) {
        self.zoom_by(center, 1.0 / step);
    }

    /// Back to 100 %, anchored at the canvas center.
    pub fn reset_zoom(&mut self, center: Point) {
        self.zoom_to(center, 1.0);
    }

    /// Identity transform.
    pub fn reset(&mut self) {
        self.pan_x = 0.0;
        self.pan_y = 0.0;
        self.scale = 1.0;
    }

    /// Scale and center so that `content` (canvas space) fills a view of
    /// `view_width` x `view_height` pixels with `margin` pixels to spare.
    pub fn fit(&mut self, content: &Rect, view_width: f32, view_height: f32, margin: f32) {
        let w = content.width().max(1.0);
        let h = content.height().max(1.0);
        let sx = (view_width - 2.0 * margin).max(1.0) / w;
        let sy = (view_height - 2.0 * margin).max(1.0) / h;
        self.scale = self.limits.clamp(sx.min(sy));
        let c = content.center();
        self.pan_x = view_width * 0.5 - c.x * self.scale;
        self.pan_y = view_height * 0.5 - c.y * self.scale;
    }

    /// Visible canvas-space region of a view of the given size.
    pub fn visible_canvas(&self, view_width: f32, view_height: f32) -> Rect {
        Rect {
            min: self.screen_to_canvas(Point::ZERO),
            max: self.screen_to_canvas(Point::new(view_width, view_height)),
        }
    }
}
