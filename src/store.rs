//! ObjectStore — the canonical local view of the document.
//!
//! DESIGN
//! ======
//! Entities are held as `Arc<ShapeEntity>`. A host rendering layer can keep
//! the `Arc`s it was handed and compare them with `Arc::ptr_eq`: an entity
//! whose observable fields did not change keeps the same allocation across
//! merges and no-op edits, so unrelated UI never re-renders. Every method is
//! a synchronous transformation of the map; callers never observe a
//! half-updated entity.

#[cfg(test)]
#[path = "store_test.rs"]
mod store_test;

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::SyncError;
use crate::shape::{ShapeEntity, ShapeId, ShapePatch, UserId};

// =============================================================================
// MUTATIONS
// =============================================================================

/// A local change to the store.
#[derive(Debug, Clone)]
pub enum Mutation {
    /// Insert a fully-formed entity (local create or rollback of a delete).
    Create(ShapeEntity),
    /// Committed user edit: bumps the version optimistically and records the editor.
    Update { id: ShapeId, patch: ShapePatch, editor: UserId },
    /// Transient in-gesture edit: geometry/style only, version untouched.
    Preview { id: ShapeId, patch: ShapePatch },
    Delete(ShapeId),
}

/// Before/after values of an applied mutation. Identical `Arc`s mean nothing
/// observable changed.
#[derive(Debug, Clone)]
pub struct Applied {
    pub before: Option<Arc<ShapeEntity>>,
    pub after: Option<Arc<ShapeEntity>>,
}

impl Applied {
    #[must_use]
    pub fn changed(&self) -> bool {
        !same_ref(self.before.as_ref(), self.after.as_ref())
    }
}

/// Pointer identity over optional entries; two `None`s are the same.
#[must_use]
pub fn same_ref(a: Option<&Arc<ShapeEntity>>, b: Option<&Arc<ShapeEntity>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

// =============================================================================
// STORE
// =============================================================================

/// In-memory map of shape entities keyed by id.
#[derive(Debug, Default, Clone)]
pub struct ObjectStore {
    objects: HashMap<ShapeId, Arc<ShapeEntity>>,
}

impl ObjectStore {
    #[must_use]
    pub fn new() -> Self {
        Self { objects: HashMap::new() }
    }

    /// Apply a local mutation, stamping `updated_at` with `now_ms`.
    ///
    /// Updates and previews whose patch changes nothing return the existing
    /// `Arc` on both sides and leave the store untouched.
    ///
    /// # Errors
    ///
    /// `NotFound` for updates/deletes of unknown ids, `InvalidShape` when the
    /// resulting entity violates geometry invariants.
    pub fn apply(&mut self, mutation: Mutation, now_ms: i64) -> Result<Applied, SyncError> {
        match mutation {
            Mutation::Create(mut entity) => {
                entity.updated_at = now_ms;
                entity.validate()?;
                let after = Arc::new(entity);
                let before = self.objects.insert(after.id, Arc::clone(&after));
                Ok(Applied { before, after: Some(after) })
            }
            Mutation::Update { id, patch, editor } => self.patch_entity(id, &patch, Some(editor), now_ms),
            Mutation::Preview { id, patch } => self.patch_entity(id, &patch, None, now_ms),
            Mutation::Delete(id) => {
                let before = self.objects.remove(&id).ok_or(SyncError::NotFound(id))?;
                Ok(Applied { before: Some(before), after: None })
            }
        }
    }

    fn patch_entity(
        &mut self,
        id: ShapeId,
        patch: &ShapePatch,
        editor: Option<UserId>,
        now_ms: i64,
    ) -> Result<Applied, SyncError> {
        let before = self.objects.get(&id).cloned().ok_or(SyncError::NotFound(id))?;
        let mut next = patch.apply(&before);
        if ShapePatch::diff(&before, &next).is_empty() {
            return Ok(Applied { before: Some(Arc::clone(&before)), after: Some(before) });
        }
        next.validate()?;
        next.updated_at = now_ms;
        if let Some(editor) = editor {
            next.version = before.version + 1;
            next.last_edited_by = editor;
        }
        let after = Arc::new(next);
        self.objects.insert(id, Arc::clone(&after));
        Ok(Applied { before: Some(before), after: Some(after) })
    }

    /// Return a shared handle to an entity.
    #[must_use]
    pub fn get(&self, id: &ShapeId) -> Option<Arc<ShapeEntity>> {
        self.objects.get(id).cloned()
    }

    #[must_use]
    pub fn contains(&self, id: &ShapeId) -> bool {
        self.objects.contains_key(id)
    }

    /// All entities in draw order `(z_index, id)`.
    #[must_use]
    pub fn all(&self) -> Vec<Arc<ShapeEntity>> {
        let mut objs: Vec<Arc<ShapeEntity>> = self.objects.values().cloned().collect();
        sort_draw_order(&mut objs);
        objs
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ShapeEntity>> {
        self.objects.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &ShapeId> {
        self.objects.keys()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Z-index for a new shape: one above the current top.
    #[must_use]
    pub fn next_z_index(&self) -> i64 {
        self.objects.values().map(|o| o.z_index).max().map_or(0, |z| z + 1)
    }

    /// Insert or replace an entry with an already-shared value.
    pub(crate) fn put(&mut self, entity: Arc<ShapeEntity>) -> Option<Arc<ShapeEntity>> {
        self.objects.insert(entity.id, entity)
    }

    pub(crate) fn remove(&mut self, id: &ShapeId) -> Option<Arc<ShapeEntity>> {
        self.objects.remove(id)
    }

    /// Swap the entry for `id` to `restore` only if it still holds exactly
    /// `expected` (pointer identity). Returns whether the swap happened.
    pub(crate) fn restore_if_current(
        &mut self,
        id: ShapeId,
        expected: Option<&Arc<ShapeEntity>>,
        restore: Option<Arc<ShapeEntity>>,
    ) -> bool {
        if !same_ref(self.objects.get(&id), expected) {
            return false;
        }
        match restore {
            Some(entity) => {
                self.objects.insert(id, entity);
            }
            None => {
                self.objects.remove(&id);
            }
        }
        true
    }
}

/// Sort entities by `(z_index, id)` for draw order.
pub fn sort_draw_order(objs: &mut [Arc<ShapeEntity>]) {
    objs.sort_by(|a, b| a.z_index.cmp(&b.z_index).then_with(|| a.id.cmp(&b.id)));
}
