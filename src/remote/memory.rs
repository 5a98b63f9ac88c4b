//! In-process collaborators: an authoritative store and a presence hub.
//!
//! DESIGN
//! ======
//! `MemoryRemote` plays the role of the backend: it owns the authoritative
//! entities, commits conditional writes with compare-and-swap on the version
//! counter, stamps `last_edited_by`, and pushes a snapshot batch to every
//! subscriber after each commit. New subscribers first receive a complete
//! snapshot. Failures can be injected to exercise rollback paths.
//!
//! `PresenceHub` fans presence updates out to every joined participant
//! except the sender. Delivery on both is best-effort `try_send`: a full
//! subscriber misses the push, matching the at-least-once, lossy contract
//! the merger is built for.

#[cfg(test)]
#[path = "memory_test.rs"]
mod memory_test;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{CreateAck, PresenceChannel, RemoteStore, Subscription, WriteAck};
use crate::clock::{Clock, SystemClock};
use crate::error::TransportError;
use crate::merge::SnapshotBatch;
use crate::presence::{Participant, PresenceUpdate};
use crate::shape::{ShapeEntity, ShapeId, ShapePatch, UserId};

const SUBSCRIBER_CAPACITY: usize = 256;

// =============================================================================
// MEMORY REMOTE
// =============================================================================

struct Stored {
    entity: ShapeEntity,
    editor_label: Option<String>,
}

#[derive(Default)]
struct RemoteInner {
    objects: HashMap<ShapeId, Stored>,
    subscribers: HashMap<u64, mpsc::Sender<SnapshotBatch>>,
    next_subscriber: u64,
    fail_next: usize,
}

impl RemoteInner {
    fn take_failure(&mut self) -> Result<(), TransportError> {
        if self.fail_next == 0 {
            return Ok(());
        }
        self.fail_next -= 1;
        Err(TransportError::Unavailable("injected failure".into()))
    }

    fn broadcast(&mut self, batch: &SnapshotBatch) {
        self.subscribers.retain(|sub_id, tx| match tx.try_send(batch.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(sub_id, "snapshot subscriber full; dropping push");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    fn broadcast_entities(&mut self, entities: &[ShapeEntity]) {
        match SnapshotBatch::partial(entities) {
            Ok(batch) => self.broadcast(&batch),
            Err(e) => warn!(error = %e, "failed to encode snapshot push"),
        }
    }
}

/// Authoritative in-memory document store.
#[derive(Clone)]
pub struct MemoryRemote {
    inner: Arc<Mutex<RemoteInner>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl MemoryRemote {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { inner: Arc::new(Mutex::new(RemoteInner::default())), clock }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RemoteInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next `n` requests fail with `TransportError::Unavailable`.
    pub fn fail_next(&self, n: usize) {
        self.lock().fail_next = n;
    }

    /// Insert an entity as-is without notifying subscribers.
    pub fn seed(&self, entity: ShapeEntity) {
        self.lock().objects.insert(entity.id, Stored { entity, editor_label: None });
    }

    /// Push an arbitrary batch to every subscriber.
    pub fn push(&self, batch: &SnapshotBatch) {
        self.lock().broadcast(batch);
    }

    /// Authoritative copy of an entity.
    #[must_use]
    pub fn entity(&self, id: &ShapeId) -> Option<ShapeEntity> {
        self.lock().objects.get(id).map(|s| s.entity.clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().objects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().objects.is_empty()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn conditional_write(
        &self,
        id: ShapeId,
        patch: &ShapePatch,
        expected_version: u64,
        editor: &Participant,
    ) -> Result<WriteAck, TransportError> {
        let now = self.clock.now_ms();
        let mut inner = self.lock();
        inner.take_failure()?;
        let stored = inner
            .objects
            .get_mut(&id)
            .ok_or_else(|| TransportError::Rejected(format!("unknown shape {id}")))?;

        if stored.entity.version != expected_version {
            debug!(%id, expected_version, current = stored.entity.version, "conditional write lost");
            return Ok(WriteAck::Conflict {
                current_version: stored.entity.version,
                last_edited_by: Some(stored.entity.last_edited_by.clone()),
                last_edited_by_label: stored.editor_label.clone(),
            });
        }

        let mut next = patch.apply(&stored.entity);
        next.version = stored.entity.version + 1;
        next.last_edited_by.clone_from(&editor.id);
        next.updated_at = now;
        next.validate()
            .map_err(|e| TransportError::Rejected(e.to_string()))?;

        let new_version = next.version;
        stored.entity = next.clone();
        stored.editor_label.clone_from(&editor.label);
        inner.broadcast_entities(&[next]);
        Ok(WriteAck::Accepted { new_version })
    }

    async fn create(&self, entity: &ShapeEntity) -> Result<CreateAck, TransportError> {
        let mut inner = self.lock();
        inner.take_failure()?;
        if inner.objects.contains_key(&entity.id) {
            return Err(TransportError::Rejected(format!("shape {} already exists", entity.id)));
        }
        entity.validate().map_err(|e| TransportError::Rejected(e.to_string()))?;

        let mut stored = entity.clone();
        stored.version = 1;
        let ack = CreateAck { id: stored.id, version: stored.version };
        inner.objects.insert(stored.id, Stored { entity: stored.clone(), editor_label: None });
        inner.broadcast_entities(&[stored]);
        Ok(ack)
    }

    async fn delete(&self, id: ShapeId, editor: &Participant) -> Result<(), TransportError> {
        let mut inner = self.lock();
        inner.take_failure()?;
        if inner.objects.remove(&id).is_some() {
            debug!(%id, editor = %editor.id, "shape deleted");
            inner.broadcast(&SnapshotBatch::removals(vec![id]));
        }
        Ok(())
    }

    fn subscribe(&self) -> Subscription<SnapshotBatch> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        let mut inner = self.lock();
        let entities = inner.objects.values().map(|s| s.entity.clone()).collect::<Vec<_>>();
        match SnapshotBatch::complete(&entities) {
            Ok(initial) => {
                if let Err(e) = tx.try_send(initial) {
                    warn!(error = %e, "failed to deliver initial snapshot");
                }
            }
            Err(e) => warn!(error = %e, "failed to encode initial snapshot"),
        }
        let sub_id = inner.next_subscriber;
        inner.next_subscriber += 1;
        inner.subscribers.insert(sub_id, tx);
        drop(inner);

        let registry = Arc::clone(&self.inner);
        Subscription::new(rx, move || {
            registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .subscribers
                .remove(&sub_id);
        })
    }
}

// =============================================================================
// PRESENCE HUB
// =============================================================================

#[derive(Default)]
struct HubInner {
    subscribers: HashMap<u64, (UserId, mpsc::Sender<PresenceUpdate>)>,
    next_subscriber: u64,
}

/// Fan-out presence channel shared by every participant of a board.
#[derive(Clone, Default)]
pub struct PresenceHub {
    inner: Arc<Mutex<HubInner>>,
}

impl PresenceHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Presence handle publishing as `participant`.
    #[must_use]
    pub fn join(&self, participant: Participant) -> HubPresence {
        HubPresence { hub: self.clone(), participant }
    }

    fn broadcast(&self, update: &PresenceUpdate) {
        let sender = update.sender_id();
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.subscribers.retain(|_, (owner, tx)| {
            if owner == sender {
                return true;
            }
            match tx.try_send(update.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(owner = %owner, "presence subscriber full; dropping update");
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .subscribers
            .len()
    }
}

/// One participant's connection to a [`PresenceHub`]. Dropping it announces
/// departure so peers can drop that participant's locks and cursor.
pub struct HubPresence {
    hub: PresenceHub,
    participant: Participant,
}

impl PresenceChannel for HubPresence {
    fn publish_lock(&self, object_id: ShapeId, ttl_ms: i64) {
        self.hub
            .broadcast(&PresenceUpdate::Lock { object_id, holder: self.participant.clone(), ttl_ms });
    }

    fn publish_unlock(&self, object_id: ShapeId) {
        self.hub
            .broadcast(&PresenceUpdate::Unlock { object_id, holder_id: self.participant.id.clone() });
    }

    fn publish_cursor(&self, x: f64, y: f64) {
        self.hub
            .broadcast(&PresenceUpdate::Cursor { participant: self.participant.clone(), x, y });
    }

    fn subscribe_presence(&self) -> Subscription<PresenceUpdate> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        let mut inner = self.hub.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let sub_id = inner.next_subscriber;
        inner.next_subscriber += 1;
        inner.subscribers.insert(sub_id, (self.participant.id.clone(), tx));
        drop(inner);

        let registry = Arc::clone(&self.hub.inner);
        Subscription::new(rx, move || {
            registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .subscribers
                .remove(&sub_id);
        })
    }

    fn participant(&self) -> &Participant {
        &self.participant
    }
}

impl Drop for HubPresence {
    fn drop(&mut self) {
        self.hub
            .broadcast(&PresenceUpdate::Left { participant_id: self.participant.id.clone() });
    }
}
