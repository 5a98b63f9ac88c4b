//! VersionGuard — the optimistic write protocol.
//!
//! DESIGN
//! ======
//! A write attempt is split around its single suspension point:
//!
//! 1. `begin_*` mutates the `ObjectStore` optimistically and captures the
//!    exact pre-mutation value. It returns a `PendingWrite` carrying the
//!    wire payload `(id, changed fields, expected base version)`.
//! 2. The caller awaits the remote store with the store lock released.
//! 3. `settle_*` interprets the response: accepted writes need no local
//!    action; conflicts and transport failures roll the entity back.
//!
//! Rollback restores the captured value only while the store still holds
//! the optimistic value we wrote (pointer identity). If a snapshot merge
//! already replaced it with newer authoritative state, that state wins.
//! Nothing is retried automatically.
//!
//! While a gesture is open the store shows preview values that were never
//! committed. `OpenGesture` keeps the committed value underneath them, so
//! writes made during the gesture and the gesture's own commit are based
//! on, and roll back to, committed state rather than the gesture start.

#[cfg(test)]
#[path = "guard_test.rs"]
mod guard_test;

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::{SyncError, TransportError};
use crate::remote::{CreateAck, WriteAck};
use crate::shape::{ShapeEntity, ShapeId, ShapePatch, UserId};
use crate::store::{Mutation, ObjectStore};

// =============================================================================
// TYPES
// =============================================================================

/// Which writer flow a pending write belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    Create,
    Update,
    Delete,
}

impl fmt::Display for WriteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        })
    }
}

/// A rejected conditional write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub id: ShapeId,
    /// Base version the write was computed from.
    pub local: u64,
    /// Version stored remotely at commit time.
    pub server: u64,
    pub last_edited_by: Option<UserId>,
    pub last_edited_by_label: Option<String>,
}

impl Conflict {
    /// Best available name for the other editor: display label, else id.
    #[must_use]
    pub fn holder(&self) -> Option<&str> {
        self.last_edited_by_label
            .as_deref()
            .or(self.last_edited_by.as_deref())
    }

    #[must_use]
    pub fn into_error(self) -> SyncError {
        let holder = self.holder().map(str::to_owned);
        SyncError::VersionConflict { id: self.id, local: self.local, server: self.server, holder }
    }
}

/// Lifecycle of one write attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteState {
    Accepted { version: u64 },
    Rejected(Conflict),
    Failed(TransportError),
}

/// Outcome of settling a pending write.
#[derive(Debug, Clone, PartialEq)]
pub struct Settled {
    pub op: WriteOp,
    pub id: ShapeId,
    pub state: WriteState,
    /// Whether the pre-mutation value was put back into the store.
    pub rolled_back: bool,
}

impl Settled {
    /// Committed version, or the error the caller should see. The store has
    /// already been rolled back when this is `Err`.
    ///
    /// # Errors
    ///
    /// `VersionConflict` for rejected writes, `TransportFailure` otherwise.
    pub fn into_result(self) -> Result<u64, SyncError> {
        match self.state {
            WriteState::Accepted { version } => Ok(version),
            WriteState::Rejected(conflict) => Err(conflict.into_error()),
            WriteState::Failed(e) => Err(SyncError::TransportFailure(e)),
        }
    }
}

/// An optimistic write awaiting the remote store's answer.
#[derive(Debug, Clone)]
pub struct PendingWrite {
    op: WriteOp,
    id: ShapeId,
    patch: ShapePatch,
    expected_version: u64,
    before: Option<Arc<ShapeEntity>>,
    optimistic: Option<Arc<ShapeEntity>>,
}

/// Committed value beneath an in-progress gesture, plus the preview fields
/// the gesture shows on top of it.
#[derive(Debug, Clone)]
pub struct OpenGesture {
    base: Arc<ShapeEntity>,
    preview: ShapePatch,
}

impl OpenGesture {
    #[must_use]
    pub fn new(base: Arc<ShapeEntity>) -> Self {
        Self { base, preview: ShapePatch::default() }
    }

    /// Latest committed value known under the preview.
    #[must_use]
    pub fn base(&self) -> &Arc<ShapeEntity> {
        &self.base
    }

    /// Accumulated preview fields.
    #[must_use]
    pub fn preview(&self) -> &ShapePatch {
        &self.preview
    }

    pub fn record_preview(&mut self, patch: &ShapePatch) {
        self.preview.overlay(patch);
    }

    /// Adopt a newer committed value (a merged snapshot). Older values are
    /// ignored.
    pub fn rebase(&mut self, committed: Arc<ShapeEntity>) {
        if committed.version >= self.base.version {
            self.base = committed;
        }
    }

    /// Adopt the result of an accepted write of `wire` on top of the base.
    pub fn rebase_accepted(&mut self, wire: &ShapePatch, version: u64, editor: &str, now_ms: i64) {
        let mut next = wire.apply(&self.base);
        next.version = version;
        editor.clone_into(&mut next.last_edited_by);
        next.updated_at = now_ms;
        self.rebase(Arc::new(next));
    }

    #[must_use]
    pub fn into_base(self) -> Arc<ShapeEntity> {
        self.base
    }
}

// =============================================================================
// BEGIN
// =============================================================================

/// Entry points that stage an optimistic write.
pub struct VersionGuard;

impl VersionGuard {
    /// Apply `patch` to `id` optimistically. Returns `None` when the patch
    /// changes nothing, in which case no network call should be made.
    ///
    /// # Errors
    ///
    /// `NotFound` / `InvalidShape` from the store; nothing is mutated.
    pub fn begin_update(
        store: &mut ObjectStore,
        id: ShapeId,
        patch: &ShapePatch,
        editor: &str,
        now_ms: i64,
    ) -> Result<Option<PendingWrite>, SyncError> {
        let applied = store.apply(Mutation::Update { id, patch: patch.clone(), editor: editor.to_owned() }, now_ms)?;
        if !applied.changed() {
            debug!(%id, "update is a no-op; skipping write");
            return Ok(None);
        }
        let (Some(before), Some(after)) = (applied.before, applied.after) else {
            return Err(SyncError::NotFound(id));
        };
        Ok(Some(PendingWrite {
            op: WriteOp::Update,
            id,
            patch: ShapePatch::diff(&before, &after),
            expected_version: before.version,
            before: Some(before),
            optimistic: Some(after),
        }))
    }

    /// Apply `patch` to an entity under an open gesture. The write is
    /// computed against the committed base; the store shows the result with
    /// the gesture's preview still on top. Returns `None` when the patch
    /// changes nothing committed.
    ///
    /// # Errors
    ///
    /// `NotFound` if the entity is gone, `InvalidShape` for bad geometry.
    pub fn begin_update_under(
        store: &mut ObjectStore,
        gesture: &OpenGesture,
        patch: &ShapePatch,
        editor: &str,
        now_ms: i64,
    ) -> Result<Option<PendingWrite>, SyncError> {
        let base = &gesture.base;
        let id = base.id;
        let current = store.get(&id).ok_or(SyncError::NotFound(id))?;
        let mut committed = patch.apply(base);
        let wire = ShapePatch::diff(base, &committed);
        if wire.is_empty() {
            debug!(%id, "update under gesture is a no-op; skipping write");
            return Ok(None);
        }
        committed.validate()?;
        committed.version = base.version + 1;
        editor.clone_into(&mut committed.last_edited_by);
        committed.updated_at = now_ms;
        let optimistic = Arc::new(gesture.preview.apply(&committed));
        store.put(Arc::clone(&optimistic));
        Ok(Some(PendingWrite {
            op: WriteOp::Update,
            id,
            patch: wire,
            expected_version: base.version,
            before: Some(current),
            optimistic: Some(optimistic),
        }))
    }

    /// Commit a gesture's preview on top of its committed base. Returns
    /// `None` when the preview changes nothing; the base is shown again if
    /// the store still holds a preview of the same version.
    ///
    /// Rollback goes to the committed base, or to the current value when a
    /// newer local write is still in flight, so the version never moves
    /// backwards.
    ///
    /// # Errors
    ///
    /// `NotFound` if the entity disappeared during the gesture.
    pub fn begin_update_from(
        store: &mut ObjectStore,
        gesture: &OpenGesture,
        editor: &str,
        now_ms: i64,
    ) -> Result<Option<PendingWrite>, SyncError> {
        let base = &gesture.base;
        let id = base.id;
        let current = store.get(&id).ok_or(SyncError::NotFound(id))?;
        let target = gesture.preview.apply(base);
        let patch = ShapePatch::diff(base, &target);
        if patch.is_empty() {
            if !Arc::ptr_eq(base, &current) && current.version == base.version {
                store.restore_if_current(id, Some(&current), Some(Arc::clone(base)));
            }
            debug!(%id, "gesture ended unchanged; skipping write");
            return Ok(None);
        }
        let restore = if current.version > base.version { current } else { Arc::clone(base) };
        let mut next = target;
        next.version = base.version + 1;
        editor.clone_into(&mut next.last_edited_by);
        next.updated_at = now_ms;
        let optimistic = Arc::new(next);
        store.put(Arc::clone(&optimistic));
        Ok(Some(PendingWrite {
            op: WriteOp::Update,
            id,
            patch,
            expected_version: base.version,
            before: Some(restore),
            optimistic: Some(optimistic),
        }))
    }

    /// Insert a freshly built entity (version 1) optimistically.
    ///
    /// # Errors
    ///
    /// `InvalidShape` if the entity fails validation.
    pub fn begin_create(store: &mut ObjectStore, entity: ShapeEntity, now_ms: i64) -> Result<PendingWrite, SyncError> {
        let id = entity.id;
        let applied = store.apply(Mutation::Create(entity), now_ms)?;
        Ok(PendingWrite {
            op: WriteOp::Create,
            id,
            patch: ShapePatch::default(),
            expected_version: 0,
            before: applied.before,
            optimistic: applied.after,
        })
    }

    /// Remove an entity optimistically.
    ///
    /// # Errors
    ///
    /// `NotFound` if the id is unknown.
    pub fn begin_delete(store: &mut ObjectStore, id: ShapeId, now_ms: i64) -> Result<PendingWrite, SyncError> {
        let applied = store.apply(Mutation::Delete(id), now_ms)?;
        let expected_version = applied.before.as_ref().map_or(0, |b| b.version);
        Ok(PendingWrite {
            op: WriteOp::Delete,
            id,
            patch: ShapePatch::default(),
            expected_version,
            before: applied.before,
            optimistic: None,
        })
    }
}

// =============================================================================
// SETTLE
// =============================================================================

impl PendingWrite {
    #[must_use]
    pub fn op(&self) -> WriteOp {
        self.op
    }

    #[must_use]
    pub fn id(&self) -> ShapeId {
        self.id
    }

    /// Changed fields to send. Empty for creates and deletes.
    #[must_use]
    pub fn patch(&self) -> &ShapePatch {
        &self.patch
    }

    #[must_use]
    pub fn expected_version(&self) -> u64 {
        self.expected_version
    }

    /// Value as it was before the optimistic mutation.
    #[must_use]
    pub fn before(&self) -> Option<&Arc<ShapeEntity>> {
        self.before.as_ref()
    }

    /// Value written optimistically (`None` for deletes).
    #[must_use]
    pub fn optimistic(&self) -> Option<&Arc<ShapeEntity>> {
        self.optimistic.as_ref()
    }

    /// Resolve a conditional write.
    pub fn settle_update(self, store: &mut ObjectStore, result: Result<WriteAck, TransportError>) -> Settled {
        match result {
            Ok(WriteAck::Accepted { new_version }) => {
                if let Some(ref optimistic) = self.optimistic
                    && optimistic.version != new_version
                {
                    let mut corrected = (**optimistic).clone();
                    corrected.version = new_version;
                    store.restore_if_current(self.id, Some(optimistic), Some(Arc::new(corrected)));
                }
                self.finish(WriteState::Accepted { version: new_version }, false)
            }
            Ok(WriteAck::Conflict { current_version, last_edited_by, last_edited_by_label }) => {
                let conflict = Conflict {
                    id: self.id,
                    local: self.expected_version,
                    server: current_version,
                    last_edited_by,
                    last_edited_by_label,
                };
                let rolled_back = self.rollback(store);
                self.finish(WriteState::Rejected(conflict), rolled_back)
            }
            Err(e) => {
                let rolled_back = self.rollback(store);
                self.finish(WriteState::Failed(e), rolled_back)
            }
        }
    }

    /// Resolve a create. Creates never conflict; only transport can fail.
    pub fn settle_create(self, store: &mut ObjectStore, result: Result<CreateAck, TransportError>) -> Settled {
        match result {
            Ok(ack) => self.finish(WriteState::Accepted { version: ack.version }, false),
            Err(e) => {
                let rolled_back = self.rollback(store);
                self.finish(WriteState::Failed(e), rolled_back)
            }
        }
    }

    /// Resolve a delete.
    pub fn settle_delete(self, store: &mut ObjectStore, result: Result<(), TransportError>) -> Settled {
        match result {
            Ok(()) => {
                let version = self.expected_version;
                self.finish(WriteState::Accepted { version }, false)
            }
            Err(e) => {
                let rolled_back = self.rollback(store);
                self.finish(WriteState::Failed(e), rolled_back)
            }
        }
    }

    fn rollback(&self, store: &mut ObjectStore) -> bool {
        let restored = store.restore_if_current(self.id, self.optimistic.as_ref(), self.before.clone());
        if !restored {
            debug!(id = %self.id, op = %self.op, "entity changed since optimistic write; keeping newer value");
        }
        restored
    }

    fn finish(self, state: WriteState, rolled_back: bool) -> Settled {
        Settled { op: self.op, id: self.id, state, rolled_back }
    }
}
