//! Viewport geometry: the local pan/zoom state and document-space rectangles.
//!
//! Screen coordinates are pixels; document (world) coordinates are what
//! shapes are stored in. The mapping is `screen = world * scale + origin`.
//! The viewport is owned by the local client and never synchronized.

#[cfg(test)]
#[path = "viewport_test.rs"]
mod viewport_test;

use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::shape::ShapeEntity;

/// A point in either screen or world space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle in document space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    #[must_use]
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Axis-aligned bounds of a `width` x `height` box at `(x, y)` rotated by
    /// `rotation_deg` around its center.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn from_rotated(x: f64, y: f64, width: f64, height: f64, rotation_deg: f64) -> Self {
        if rotation_deg % 360.0 == 0.0 {
            return Self::new(x, y, width, height);
        }
        let (sin, cos) = rotation_deg.to_radians().sin_cos();
        let half_w = (width * cos).abs() / 2.0 + (height * sin).abs() / 2.0;
        let half_h = (width * sin).abs() / 2.0 + (height * cos).abs() / 2.0;
        let cx = x + width / 2.0;
        let cy = y + height / 2.0;
        Self::new(cx - half_w, cy - half_h, half_w * 2.0, half_h * 2.0)
    }

    /// Culling bounds of an entity, rotation included.
    #[must_use]
    pub fn of_entity(entity: &ShapeEntity) -> Self {
        Self::from_rotated(entity.x, entity.y, entity.width, entity.height, entity.rotation)
    }

    #[must_use]
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    #[must_use]
    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Overlap test. Touching edges count as intersecting.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.x <= other.right() && other.x <= self.right() && self.y <= other.bottom() && other.y <= self.bottom()
    }

    /// Grow by `margin` on every side.
    #[must_use]
    pub fn expand(&self, margin: f64) -> Self {
        Self::new(self.x - margin, self.y - margin, self.width + margin * 2.0, self.height + margin * 2.0)
    }
}

/// Allowed zoom range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomRange {
    pub min: f64,
    pub max: f64,
}

impl Default for ZoomRange {
    fn default() -> Self {
        Self { min: 0.1, max: 10.0 }
    }
}

impl ZoomRange {
    #[must_use]
    pub fn clamp(&self, scale: f64) -> f64 {
        scale.clamp(self.min, self.max)
    }
}

/// Local pan/zoom state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportState {
    /// Zoom factor (1.0 = one document unit per pixel).
    pub scale: f64,
    /// Screen position of the document origin, in pixels.
    pub origin_x: f64,
    pub origin_y: f64,
    /// Visible extent in pixels.
    pub width: f64,
    pub height: f64,
}

impl Default for ViewportState {
    fn default() -> Self {
        Self { scale: 1.0, origin_x: 0.0, origin_y: 0.0, width: 0.0, height: 0.0 }
    }
}

impl ViewportState {
    #[must_use]
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height, ..Self::default() }
    }

    /// Reject states that cannot be mapped to a document rectangle.
    ///
    /// # Errors
    ///
    /// `InvalidViewport` naming the offending field.
    pub fn validate(&self) -> Result<(), SyncError> {
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(SyncError::InvalidViewport(format!("scale {}", self.scale)));
        }
        if !self.origin_x.is_finite() || !self.origin_y.is_finite() {
            return Err(SyncError::InvalidViewport(format!("origin ({}, {})", self.origin_x, self.origin_y)));
        }
        if !self.width.is_finite() || !self.height.is_finite() || self.width < 0.0 || self.height < 0.0 {
            return Err(SyncError::InvalidViewport(format!("extent {}x{}", self.width, self.height)));
        }
        Ok(())
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    #[must_use]
    pub fn screen_to_world(&self, screen: Point) -> Point {
        Point { x: (screen.x - self.origin_x) / self.scale, y: (screen.y - self.origin_y) / self.scale }
    }

    #[must_use]
    pub fn world_to_screen(&self, world: Point) -> Point {
        Point { x: world.x * self.scale + self.origin_x, y: world.y * self.scale + self.origin_y }
    }

    /// Document-space rectangle currently on screen.
    #[must_use]
    pub fn world_bounds(&self) -> Rect {
        let top_left = self.screen_to_world(Point::new(0.0, 0.0));
        Rect::new(top_left.x, top_left.y, self.width / self.scale, self.height / self.scale)
    }

    /// Pan by a screen-space delta.
    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        self.origin_x += dx;
        self.origin_y += dy;
    }

    /// Multiply the zoom by `factor`, keeping the document point under
    /// `anchor` (screen space) fixed on screen.
    pub fn zoom_at(&mut self, anchor: Point, factor: f64, range: ZoomRange) {
        let world = self.screen_to_world(anchor);
        self.scale = range.clamp(self.scale * factor);
        self.origin_x = anchor.x - world.x * self.scale;
        self.origin_y = anchor.y - world.y * self.scale;
    }

    /// Set the zoom directly, clamped to `range`, around the viewport center.
    pub fn set_scale(&mut self, scale: f64, range: ZoomRange) {
        let center = Point::new(self.width / 2.0, self.height / 2.0);
        self.zoom_at(center, scale / self.scale, range);
    }

    /// Resize the visible pixel extent.
    pub fn resize(&mut self, width: f64, height: f64) {
        self.width = width;
        self.height = height;
    }
}
