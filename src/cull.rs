//! ViewportCuller — which entities must be rendered for the current view.
//!
//! The visible document rectangle is padded so shapes just past the edge are
//! already drawn when a pan brings them in. Padding is configured in screen
//! pixels and converted to document units at the current zoom. Selected
//! entities are always returned, whatever their bounds. An unusable viewport
//! degrades to the full set rather than an empty canvas.

#[cfg(test)]
#[path = "cull_test.rs"]
mod cull_test;

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::shape::{ShapeEntity, ShapeId};
use crate::store::{ObjectStore, sort_draw_order};
use crate::viewport::{Rect, ViewportState};

/// Default padding around the viewport, in screen pixels.
pub const DEFAULT_CULL_PADDING_PX: f64 = 200.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportCuller {
    pub padding_px: f64,
}

impl Default for ViewportCuller {
    fn default() -> Self {
        Self { padding_px: DEFAULT_CULL_PADDING_PX }
    }
}

impl ViewportCuller {
    #[must_use]
    pub fn new(padding_px: f64) -> Self {
        Self { padding_px }
    }

    /// Padded document-space rectangle, or `None` for an unusable viewport.
    #[must_use]
    pub fn cull_rect(&self, viewport: &ViewportState) -> Option<Rect> {
        if let Err(e) = viewport.validate() {
            debug!(error = %e, "viewport unusable; skipping culling");
            return None;
        }
        let padding = self.padding_px.max(0.0) / viewport.scale;
        Some(viewport.world_bounds().expand(padding))
    }

    /// Entities intersecting the padded viewport, plus everything in
    /// `always_include` that exists, in draw order.
    #[must_use]
    pub fn visible(
        &self,
        store: &ObjectStore,
        viewport: &ViewportState,
        always_include: &HashSet<ShapeId>,
    ) -> Vec<Arc<ShapeEntity>> {
        let Some(rect) = self.cull_rect(viewport) else {
            return store.all();
        };
        let mut out = store
            .iter()
            .filter(|e| always_include.contains(&e.id) || Rect::of_entity(e).intersects(&rect))
            .cloned()
            .collect::<Vec<_>>();
        sort_draw_order(&mut out);
        out
    }
}
