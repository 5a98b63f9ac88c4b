//! SyncClient — the host-facing facade over the sync core.
//!
//! SYSTEM CONTEXT
//! ==============
//! ```text
//! host UI ──mutate/create/delete──► SyncClient ──conditional write──► RemoteStore
//!    ▲                                  │  ▲                              │
//!    │ visible_entities / notices       │  └──── snapshot batches ◄───────┘
//!    │                                  ▼
//!    └────── get_edit_lock ◄──── EditLockTracker ◄──── PresenceChannel
//! ```
//!
//! DESIGN
//! ======
//! All local state lives in one `SyncCore` behind a `std::sync::Mutex`. The
//! lock is taken for short synchronous sections only and is never held
//! across an `.await`, so a merge can never observe a half-applied mutation
//! and the futures stay `Send`.
//!
//! Writer flows (`mutate`, `create_entity`, `delete_entity`, gesture commit)
//! resolve their own failures: the store is rolled back and a `SyncNotice`
//! is pushed before the error is returned, so a host that ignores the
//! `Result` still sees a consistent document.

#[cfg(test)]
#[path = "client_test.rs"]
mod client_test;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::SyncConfig;
use crate::cull::ViewportCuller;
use crate::error::SyncError;
use crate::guard::{OpenGesture, Settled, VersionGuard, WriteState};
use crate::lock::{EditLock, EditLockTracker};
use crate::merge::{MergeReport, SnapshotBatch, SnapshotMerger};
use crate::notice::{NoticeSender, SyncNotice};
use crate::presence::{CursorBoard, Participant, PresenceUpdate, RemoteCursor};
use crate::remote::{PresenceChannel, RemoteStore};
use crate::shape::{NewShape, ShapeEntity, ShapeId, ShapePatch, UserId};
use crate::store::{Mutation, ObjectStore};
use crate::viewport::ViewportState;

// =============================================================================
// CORE STATE
// =============================================================================

struct SyncCore {
    store: ObjectStore,
    locks: EditLockTracker,
    cursors: CursorBoard,
    /// Locally created ids whose create has not been acknowledged.
    pending_creates: HashSet<ShapeId>,
    /// Gestures in progress, keyed by shape.
    gestures: HashMap<ShapeId, OpenGesture>,
}

struct Inner {
    config: SyncConfig,
    me: Participant,
    remote: Arc<dyn RemoteStore>,
    presence: Arc<dyn PresenceChannel>,
    clock: Arc<dyn Clock>,
    culler: ViewportCuller,
    notices: NoticeSender,
    core: Mutex<SyncCore>,
}

/// What a sweep pruned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired_locks: Vec<ShapeId>,
    pub stale_cursors: Vec<UserId>,
}

/// Cheap-to-clone handle to one client's sync state.
#[derive(Clone)]
pub struct SyncClient {
    inner: Arc<Inner>,
}

impl SyncClient {
    /// Build a client publishing presence as `presence.participant()`.
    /// Returns the receiving end of the notice stream.
    #[must_use]
    pub fn new(
        config: SyncConfig,
        remote: Arc<dyn RemoteStore>,
        presence: Arc<dyn PresenceChannel>,
        clock: Arc<dyn Clock>,
    ) -> (Self, mpsc::Receiver<SyncNotice>) {
        let me = presence.participant().clone();
        let (notices, rx) = NoticeSender::channel(config.notice_capacity);
        let core = SyncCore {
            store: ObjectStore::new(),
            locks: EditLockTracker::new(me.id.clone(), config.lock_ttl_ms),
            cursors: CursorBoard::new(config.cursor_stale_ms),
            pending_creates: HashSet::new(),
            gestures: HashMap::new(),
        };
        let inner = Inner {
            culler: ViewportCuller::new(config.cull_padding_px),
            config,
            me,
            remote,
            presence,
            clock,
            notices,
            core: Mutex::new(core),
        };
        (Self { inner: Arc::new(inner) }, rx)
    }

    fn core(&self) -> MutexGuard<'_, SyncCore> {
        self.inner.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn now(&self) -> i64 {
        self.inner.clock.now_ms()
    }

    #[must_use]
    pub fn participant(&self) -> &Participant {
        &self.inner.me
    }

    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    // =========================================================================
    // WRITERS
    // =========================================================================

    /// Apply `patch` optimistically and commit it with a conditional write.
    ///
    /// Returns `Ok(None)` for a no-op patch (nothing sent), otherwise the
    /// committed version. During a gesture on `id` the write is based on the
    /// committed value, not on the preview.
    ///
    /// # Errors
    ///
    /// `NotFound` / `InvalidShape` before anything is applied;
    /// `VersionConflict` / `TransportFailure` after rollback and notice.
    pub async fn mutate(&self, id: ShapeId, patch: ShapePatch) -> Result<Option<u64>, SyncError> {
        let now = self.now();
        let editor = &self.inner.me.id;
        let pending = {
            let mut guard = self.core();
            let core = &mut *guard;
            match core.gestures.get(&id) {
                Some(gesture) => VersionGuard::begin_update_under(&mut core.store, gesture, &patch, editor, now)?,
                None => VersionGuard::begin_update(&mut core.store, id, &patch, editor, now)?,
            }
        };
        let Some(pending) = pending else {
            return Ok(None);
        };
        let wire = pending.patch().clone();
        let base_version = pending.expected_version();

        let result = self
            .inner
            .remote
            .conditional_write(id, &wire, base_version, &self.inner.me)
            .await;

        let settled = {
            let mut guard = self.core();
            let core = &mut *guard;
            let settled = pending.settle_update(&mut core.store, result);
            if let WriteState::Accepted { version } = &settled.state
                && let Some(gesture) = core.gestures.get_mut(&id)
                && gesture.base().version == base_version
            {
                gesture.rebase_accepted(&wire, *version, editor, self.now());
            }
            settled
        };
        self.finish(settled).map(Some)
    }

    /// Create a shape from `spec` with a fresh id, optimistically.
    ///
    /// # Errors
    ///
    /// `InvalidShape` before anything is applied; `TransportFailure` after
    /// the entity was removed again and a notice sent.
    pub async fn create_entity(&self, spec: NewShape) -> Result<ShapeId, SyncError> {
        let now = self.now();
        let id = Uuid::new_v4();
        let (pending, entity) = {
            let mut core = self.core();
            let z = core.store.next_z_index();
            let entity = spec.into_entity(id, &self.inner.me.id, z, now);
            let pending = VersionGuard::begin_create(&mut core.store, entity, now)?;
            core.pending_creates.insert(id);
            let entity = pending.optimistic().cloned().ok_or(SyncError::NotFound(id))?;
            (pending, entity)
        };

        let result = self.inner.remote.create(&entity).await;

        let settled = {
            let mut core = self.core();
            core.pending_creates.remove(&id);
            pending.settle_create(&mut core.store, result)
        };
        self.finish(settled).map(|_| id)
    }

    /// Delete a shape optimistically.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown ids; `TransportFailure` after the entity was
    /// restored and a notice sent.
    pub async fn delete_entity(&self, id: ShapeId) -> Result<(), SyncError> {
        let now = self.now();
        let pending = VersionGuard::begin_delete(&mut self.core().store, id, now)?;

        let result = self.inner.remote.delete(id, &self.inner.me).await;

        let settled = pending.settle_delete(&mut self.core().store, result);
        self.finish(settled).map(|_| ())
    }

    /// Start a drag/resize/rotate on `id`. The returned guard holds the local
    /// edit lock, which suppresses incoming snapshots for `id` until the
    /// gesture ends.
    ///
    /// # Errors
    ///
    /// `NotFound` if the shape is not in the store.
    pub fn begin_gesture(&self, id: ShapeId) -> Result<GestureGuard, SyncError> {
        let now = self.now();
        let before = {
            let mut core = self.core();
            let before = core.store.get(&id).ok_or(SyncError::NotFound(id))?;
            core.locks.acquire_at(id, &self.inner.me, now);
            core.gestures.entry(id).or_insert_with(|| OpenGesture::new(Arc::clone(&before)));
            before
        };
        self.inner.presence.publish_lock(id, self.inner.config.lock_ttl_ms);
        debug!(%id, "gesture started");
        Ok(GestureGuard { client: self.clone(), id, before, last_published: now, finished: false })
    }

    fn finish(&self, settled: Settled) -> Result<u64, SyncError> {
        match &settled.state {
            WriteState::Accepted { version } => {
                debug!(id = %settled.id, op = %settled.op, version, "write accepted");
            }
            WriteState::Rejected(conflict) => {
                info!(
                    id = %settled.id,
                    local = conflict.local,
                    server = conflict.server,
                    rolled_back = settled.rolled_back,
                    "write lost version race"
                );
                self.inner.notices.send(SyncNotice::conflict(conflict));
            }
            WriteState::Failed(e) => {
                warn!(id = %settled.id, op = %settled.op, error = %e, rolled_back = settled.rolled_back, "write failed");
                self.inner.notices.send(SyncNotice::transport(settled.op, settled.id, e));
            }
        }
        settled.into_result()
    }

    // =========================================================================
    // READERS
    // =========================================================================

    #[must_use]
    pub fn get(&self, id: &ShapeId) -> Option<Arc<ShapeEntity>> {
        self.core().store.get(id)
    }

    /// Every entity in draw order.
    #[must_use]
    pub fn all(&self) -> Vec<Arc<ShapeEntity>> {
        self.core().store.all()
    }

    /// Entities to render for `viewport`: everything near the view, plus the
    /// selection and whatever this client is manipulating.
    #[must_use]
    pub fn visible_entities(&self, viewport: &ViewportState, selection: &HashSet<ShapeId>) -> Vec<Arc<ShapeEntity>> {
        let now = self.now();
        let core = self.core();
        let mut include = selection.clone();
        include.extend(core.locks.held_ids_at(now).copied());
        self.inner.culler.visible(&core.store, viewport, &include)
    }

    /// Live edit lock on `id`, remote holders first.
    #[must_use]
    pub fn get_edit_lock(&self, id: &ShapeId) -> Option<EditLock> {
        let now = self.now();
        self.core().locks.get_at(id, now).cloned()
    }

    #[must_use]
    pub fn remote_cursors(&self) -> Vec<RemoteCursor> {
        self.core().cursors.iter().cloned().collect()
    }

    // =========================================================================
    // INBOUND
    // =========================================================================

    /// Merge a snapshot batch pushed by the remote store.
    pub fn apply_snapshot_batch(&self, batch: &SnapshotBatch) -> MergeReport {
        let now = self.now();
        let mut guard = self.core();
        let core = &mut *guard;
        let report = SnapshotMerger::merge(
            &mut core.store,
            batch,
            |id| core.locks.is_suppressed_at(id, now),
            &core.pending_creates,
        );
        // A merge only reaches a gestured shape once its lock has lapsed.
        for id in report.replaced.iter().chain(&report.inserted) {
            if let Some(gesture) = core.gestures.get_mut(id)
                && let Some(committed) = core.store.get(id)
            {
                gesture.rebase(committed);
            }
        }
        report
    }

    /// Fold one presence message into lock and cursor state.
    pub fn apply_presence(&self, update: PresenceUpdate) {
        if update.sender_id() == self.inner.me.id {
            return;
        }
        let now = self.now();
        let mut core = self.core();
        match update {
            PresenceUpdate::Lock { object_id, holder, ttl_ms } => {
                core.locks.observe_remote_at(object_id, &holder, ttl_ms, now);
            }
            PresenceUpdate::Unlock { object_id, holder_id } => {
                core.locks.release_remote(&object_id, &holder_id);
            }
            PresenceUpdate::Cursor { participant, x, y } => {
                core.cursors.update_at(participant, x, y, now);
            }
            PresenceUpdate::CursorClear { participant_id } => {
                core.cursors.clear(&participant_id);
            }
            PresenceUpdate::Left { participant_id } => {
                let released = core.locks.release_holder(&participant_id);
                core.cursors.clear(&participant_id);
                debug!(participant = %participant_id, locks = released.len(), "participant left");
            }
        }
    }

    /// Broadcast the local cursor position (document coordinates).
    pub fn publish_cursor(&self, x: f64, y: f64) {
        self.inner.presence.publish_cursor(x, y);
    }

    /// Drop expired locks and stale cursors.
    pub fn sweep(&self) -> SweepReport {
        let now = self.now();
        let mut core = self.core();
        let report = SweepReport {
            expired_locks: core.locks.sweep_at(now),
            stale_cursors: core.cursors.cleanup_stale_at(now),
        };
        if !report.expired_locks.is_empty() || !report.stale_cursors.is_empty() {
            debug!(locks = report.expired_locks.len(), cursors = report.stale_cursors.len(), "presence swept");
        }
        report
    }

    // =========================================================================
    // BACKGROUND TASKS
    // =========================================================================

    /// Spawn the snapshot pump, presence pump and periodic sweeper. Must be
    /// called inside a tokio runtime.
    #[must_use]
    pub fn spawn_sync_tasks(&self) -> SyncTasks {
        let mut snapshots = self.inner.remote.subscribe();
        let client = self.clone();
        let snapshot_pump = tokio::spawn(async move {
            while let Some(batch) = snapshots.recv().await {
                client.apply_snapshot_batch(&batch);
            }
            info!("snapshot stream closed");
        });

        let mut presence = self.inner.presence.subscribe_presence();
        let client = self.clone();
        let presence_pump = tokio::spawn(async move {
            while let Some(update) = presence.recv().await {
                client.apply_presence(update);
            }
            info!("presence stream closed");
        });

        let client = self.clone();
        let period = Duration::from_millis(self.inner.config.sweep_interval_ms.max(1));
        let sweeper = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                client.sweep();
            }
        });

        info!(participant = %self.inner.me.id, "sync tasks started");
        SyncTasks { handles: vec![snapshot_pump, presence_pump, sweeper] }
    }
}

/// Handles to the background tasks. Dropping aborts them.
pub struct SyncTasks {
    handles: Vec<JoinHandle<()>>,
}

impl SyncTasks {
    /// Abort every task and wait for it to stop. Subscriptions owned by the
    /// tasks are dropped, which unsubscribes them.
    pub async fn shutdown(mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
            if let Err(e) = handle.await
                && !e.is_cancelled()
            {
                warn!(error = %e, "sync task ended abnormally");
            }
        }
        info!("sync tasks stopped");
    }
}

impl Drop for SyncTasks {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

// =============================================================================
// GESTURE
// =============================================================================

/// An in-progress direct manipulation of one shape.
///
/// Previews move the shape locally without touching its version. `commit`
/// sends the accumulated change as one conditional write on top of the
/// latest committed value. `cancel`, or dropping the guard without
/// committing, drops the preview.
/// Either way the local edit lock is released and the release published.
pub struct GestureGuard {
    client: SyncClient,
    id: ShapeId,
    before: Arc<ShapeEntity>,
    last_published: i64,
    finished: bool,
}

impl GestureGuard {
    #[must_use]
    pub fn id(&self) -> ShapeId {
        self.id
    }

    /// Value at gesture start.
    #[must_use]
    pub fn start_value(&self) -> &Arc<ShapeEntity> {
        &self.before
    }

    /// Show an in-progress edit locally and refresh the lock.
    ///
    /// # Errors
    ///
    /// `NotFound` if the shape vanished, `InvalidShape` for bad geometry.
    pub fn preview(&mut self, patch: ShapePatch) -> Result<(), SyncError> {
        let now = self.client.now();
        {
            let mut core = self.client.core();
            core.store.apply(Mutation::Preview { id: self.id, patch: patch.clone() }, now)?;
            if let Some(gesture) = core.gestures.get_mut(&self.id) {
                gesture.record_preview(&patch);
            }
        }
        self.touch();
        Ok(())
    }

    /// Refresh the local lock; republish it at most every `lock_refresh_ms`.
    pub fn touch(&mut self) {
        let inner = &self.client.inner;
        let now = inner.clock.now_ms();
        self.client.core().locks.acquire_at(self.id, &inner.me, now);
        if now - self.last_published >= inner.config.lock_refresh_ms {
            inner.presence.publish_lock(self.id, inner.config.lock_ttl_ms);
            self.last_published = now;
        }
    }

    /// End the gesture and commit the net change. Returns `Ok(None)` when
    /// the shape ended where it started.
    ///
    /// # Errors
    ///
    /// As [`SyncClient::mutate`].
    pub async fn commit(mut self) -> Result<Option<u64>, SyncError> {
        self.finished = true;
        let client = self.client.clone();
        let now = client.now();
        let pending = {
            let mut core = client.core();
            core.locks.release(&self.id);
            let gesture = self.take_gesture(&mut core);
            VersionGuard::begin_update_from(&mut core.store, &gesture, &client.inner.me.id, now)
        };
        client.inner.presence.publish_unlock(self.id);
        let Some(pending) = pending? else {
            return Ok(None);
        };

        let result = client
            .inner
            .remote
            .conditional_write(self.id, pending.patch(), pending.expected_version(), &client.inner.me)
            .await;

        let settled = pending.settle_update(&mut client.core().store, result);
        client.finish(settled).map(Some)
    }

    /// End the gesture, dropping the preview.
    pub fn cancel(mut self) {
        self.abort();
    }

    fn abort(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        {
            let mut core = self.client.core();
            core.locks.release(&self.id);
            let base = self.take_gesture(&mut core).into_base();
            if let Some(current) = core.store.get(&self.id)
                && current.version == base.version
                && !Arc::ptr_eq(&current, &base)
            {
                core.store.put(base);
            }
        }
        self.client.inner.presence.publish_unlock(self.id);
        debug!(id = %self.id, "gesture aborted; preview reverted");
    }

    /// Remove this gesture's record. A second guard on the same shape may
    /// have finished first; rebuild from the start value in that case.
    fn take_gesture(&self, core: &mut SyncCore) -> OpenGesture {
        if let Some(gesture) = core.gestures.remove(&self.id) {
            return gesture;
        }
        let mut gesture = OpenGesture::new(Arc::clone(&self.before));
        if let Some(current) = core.store.get(&self.id) {
            gesture.record_preview(&ShapePatch::diff(&self.before, &current));
        }
        gesture
    }
}

impl Drop for GestureGuard {
    fn drop(&mut self) {
        self.abort();
    }
}
