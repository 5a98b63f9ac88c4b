//! Document model: shape entities, sparse patches, and creation specs.
//!
//! This module defines what lives on the canvas (`ShapeEntity`, `ShapeKind`),
//! the sparse update type used for local edits and conditional writes
//! (`ShapePatch`), and the creation request a host hands to the core
//! (`NewShape`). Entities arrive from the network as JSON and are validated
//! one by one; local creates go through the same validation.

#[cfg(test)]
#[path = "shape_test.rs"]
mod shape_test;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ErrorCode;

/// Unique identifier for a shape. Generated client-side.
pub type ShapeId = Uuid;

/// Opaque user identifier from the auth layer.
pub type UserId = String;

/// Fill used when a creation request does not specify one.
pub const DEFAULT_FILL: &str = "#D94B4B";

/// Stroke width used when neither the request nor the payload carries one.
pub const DEFAULT_STROKE_WIDTH: f64 = 1.0;

// =============================================================================
// TYPES
// =============================================================================

/// The kind of a shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    Rect,
    Ellipse,
    Diamond,
    Star,
    Line,
    Arrow,
    Text,
    Sticky,
}

impl ShapeKind {
    /// Kinds that carry a text block.
    #[must_use]
    pub fn is_text_bearing(self) -> bool {
        matches!(self, Self::Text | Self::Sticky)
    }
}

/// Text content and typography of a text-bearing shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextContent {
    pub text: String,
    pub font_size: f64,
    pub font_family: String,
    pub color: String,
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
}

impl Default for TextContent {
    fn default() -> Self {
        Self {
            text: String::new(),
            font_size: 16.0,
            font_family: "Inter".into(),
            color: "#1F1A17".into(),
            bold: false,
            italic: false,
        }
    }
}

/// A positioned, styled object on the canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeEntity {
    pub id: ShapeId,
    pub kind: ShapeKind,
    /// Left edge of the bounding box in document coordinates.
    pub x: f64,
    /// Top edge of the bounding box in document coordinates.
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// Clockwise rotation in degrees around the bounding-box center.
    #[serde(default)]
    pub rotation: f64,
    /// Stacking order; lower values are drawn beneath higher values.
    #[serde(default)]
    pub z_index: i64,
    pub fill: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke: Option<String>,
    #[serde(default = "default_stroke_width")]
    pub stroke_width: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<TextContent>,
    pub created_by: UserId,
    pub created_at: i64,
    pub updated_at: i64,
    pub last_edited_by: UserId,
    /// Starts at 1; the store increments it by exactly 1 per accepted write.
    pub version: u64,
}

fn default_stroke_width() -> f64 {
    DEFAULT_STROKE_WIDTH
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ShapeError {
    #[error("non-finite {0}")]
    NonFinite(&'static str),
    #[error("non-positive size {width}x{height}")]
    NonPositiveSize { width: f64, height: f64 },
    #[error("version must be at least 1")]
    ZeroVersion,
}

impl ErrorCode for ShapeError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NonFinite(_) => "E_SHAPE_NON_FINITE",
            Self::NonPositiveSize { .. } => "E_SHAPE_SIZE",
            Self::ZeroVersion => "E_SHAPE_VERSION",
        }
    }
}

impl ShapeEntity {
    /// Check geometry and version invariants.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), ShapeError> {
        for (name, value) in [
            ("x", self.x),
            ("y", self.y),
            ("width", self.width),
            ("height", self.height),
            ("rotation", self.rotation),
            ("stroke_width", self.stroke_width),
        ] {
            if !value.is_finite() {
                return Err(ShapeError::NonFinite(name));
            }
        }
        if self.width <= 0.0 || self.height <= 0.0 {
            return Err(ShapeError::NonPositiveSize { width: self.width, height: self.height });
        }
        if self.version == 0 {
            return Err(ShapeError::ZeroVersion);
        }
        Ok(())
    }

    /// True when every observable field (geometry, style, text, version)
    /// matches. Provenance stamps are ignored: they never change what is drawn.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn same_content(&self, other: &Self) -> bool {
        self.id == other.id
            && self.kind == other.kind
            && self.version == other.version
            && (self.x, self.y, self.width, self.height, self.rotation) == (other.x, other.y, other.width, other.height, other.rotation)
            && self.z_index == other.z_index
            && self.fill == other.fill
            && self.stroke == other.stroke
            && self.stroke_width == other.stroke_width
            && self.text == other.text
    }
}

// =============================================================================
// PATCH
// =============================================================================

/// Sparse update for a shape. Only present fields are applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShapePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z_index: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f64>,
    /// Replaces the whole text block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<TextContent>,
}

impl ShapePatch {
    /// Patch that moves a shape to `(x, y)`.
    #[must_use]
    pub fn position(x: f64, y: f64) -> Self {
        Self { x: Some(x), y: Some(y), ..Self::default() }
    }

    /// Patch that resizes a shape.
    #[must_use]
    pub fn size(width: f64, height: f64) -> Self {
        Self { width: Some(width), height: Some(height), ..Self::default() }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Fold a later patch on top of this one; fields set in `later` win.
    pub fn overlay(&mut self, later: &ShapePatch) {
        self.x = later.x.or(self.x);
        self.y = later.y.or(self.y);
        self.width = later.width.or(self.width);
        self.height = later.height.or(self.height);
        self.rotation = later.rotation.or(self.rotation);
        self.z_index = later.z_index.or(self.z_index);
        if later.fill.is_some() {
            self.fill.clone_from(&later.fill);
        }
        if later.stroke.is_some() {
            self.stroke.clone_from(&later.stroke);
        }
        self.stroke_width = later.stroke_width.or(self.stroke_width);
        if later.text.is_some() {
            self.text.clone_from(&later.text);
        }
    }

    /// Return a copy of `base` with this patch applied. Provenance and version
    /// are left to the caller.
    #[must_use]
    pub fn apply(&self, base: &ShapeEntity) -> ShapeEntity {
        let mut next = base.clone();
        if let Some(x) = self.x {
            next.x = x;
        }
        if let Some(y) = self.y {
            next.y = y;
        }
        if let Some(w) = self.width {
            next.width = w;
        }
        if let Some(h) = self.height {
            next.height = h;
        }
        if let Some(r) = self.rotation {
            next.rotation = r;
        }
        if let Some(z) = self.z_index {
            next.z_index = z;
        }
        if let Some(ref fill) = self.fill {
            next.fill.clone_from(fill);
        }
        if let Some(ref stroke) = self.stroke {
            next.stroke = Some(stroke.clone());
        }
        if let Some(sw) = self.stroke_width {
            next.stroke_width = sw;
        }
        if let Some(ref text) = self.text {
            next.text = Some(text.clone());
        }
        next
    }

    /// Fields that differ between `before` and `after`, expressed as a patch.
    /// An empty result means the edit is a no-op.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn diff(before: &ShapeEntity, after: &ShapeEntity) -> Self {
        Self {
            x: (before.x != after.x).then_some(after.x),
            y: (before.y != after.y).then_some(after.y),
            width: (before.width != after.width).then_some(after.width),
            height: (before.height != after.height).then_some(after.height),
            rotation: (before.rotation != after.rotation).then_some(after.rotation),
            z_index: (before.z_index != after.z_index).then_some(after.z_index),
            fill: (before.fill != after.fill).then(|| after.fill.clone()),
            stroke: if before.stroke == after.stroke { None } else { after.stroke.clone() },
            stroke_width: (before.stroke_width != after.stroke_width).then_some(after.stroke_width),
            text: if before.text == after.text { None } else { after.text.clone() },
        }
    }
}

// =============================================================================
// CREATE
// =============================================================================

/// A host's request to create a shape. The core assigns id, provenance and
/// version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewShape {
    pub kind: ShapeKind,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub rotation: f64,
    #[serde(default)]
    pub z_index: Option<i64>,
    #[serde(default)]
    pub fill: Option<String>,
    #[serde(default)]
    pub stroke: Option<String>,
    #[serde(default)]
    pub stroke_width: Option<f64>,
    #[serde(default)]
    pub text: Option<TextContent>,
}

impl NewShape {
    /// Minimal creation request: kind and bounding box, default style.
    #[must_use]
    pub fn new(kind: ShapeKind, x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            kind,
            x,
            y,
            width,
            height,
            rotation: 0.0,
            z_index: None,
            fill: None,
            stroke: None,
            stroke_width: None,
            text: None,
        }
    }

    #[must_use]
    pub fn with_fill(mut self, fill: impl Into<String>) -> Self {
        self.fill = Some(fill.into());
        self
    }

    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(TextContent { text: text.into(), ..TextContent::default() });
        self
    }

    /// Build the full entity at version 1. Text-bearing kinds always get a
    /// text block. `default_z` is used when the request has no z-index.
    #[must_use]
    pub fn into_entity(self, id: ShapeId, creator: &str, default_z: i64, now_ms: i64) -> ShapeEntity {
        let text = match (self.text, self.kind.is_text_bearing()) {
            (Some(text), _) => Some(text),
            (None, true) => Some(TextContent::default()),
            (None, false) => None,
        };
        ShapeEntity {
            id,
            kind: self.kind,
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
            rotation: self.rotation,
            z_index: self.z_index.unwrap_or(default_z),
            fill: self.fill.unwrap_or_else(|| DEFAULT_FILL.to_owned()),
            stroke: self.stroke,
            stroke_width: self.stroke_width.unwrap_or(DEFAULT_STROKE_WIDTH),
            text,
            created_by: creator.to_owned(),
            created_at: now_ms,
            updated_at: now_ms,
            last_edited_by: creator.to_owned(),
            version: 1,
        }
    }
}
