//! Remote collaborators — the persistent store and the presence channel.
//!
//! DESIGN
//! ======
//! The core never talks to a backend directly. It consumes two seams:
//!
//! - [`RemoteStore`]: conditional writes, creates, deletes, and a push
//!   subscription delivering snapshot batches (at-least-once, unordered).
//! - [`PresenceChannel`]: fire-and-forget publishing of edit locks and cursor
//!   positions, plus a subscription to everyone else's.
//!
//! Push channels are modeled as a [`Subscription`] handle: a tokio receiver
//! plus a cancellation hook run on `unsubscribe` or drop.
//! [`memory`] provides an in-process implementation of both seams.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::merge::SnapshotBatch;
use crate::presence::{Participant, PresenceUpdate};
use crate::shape::{ShapeEntity, ShapeId, ShapePatch, UserId};

// =============================================================================
// RESPONSES
// =============================================================================

/// Commit decision for a conditional write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WriteAck {
    Accepted {
        new_version: u64,
    },
    /// The stored version did not match the submitted base version.
    Conflict {
        current_version: u64,
        last_edited_by: Option<UserId>,
        last_edited_by_label: Option<String>,
    },
}

/// Acknowledgement of a create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateAck {
    pub id: ShapeId,
    pub version: u64,
}

// =============================================================================
// SUBSCRIPTION
// =============================================================================

/// Handle to a push channel. Dropping it cancels the subscription.
pub struct Subscription<T> {
    rx: mpsc::Receiver<T>,
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl<T> Subscription<T> {
    pub fn new(rx: mpsc::Receiver<T>, cancel: impl FnOnce() + Send + 'static) -> Self {
        Self { rx, cancel: Some(Box::new(cancel)) }
    }

    /// Wait for the next pushed item. `None` once the producer side is gone.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Non-blocking poll, for hosts that drain on their own tick.
    pub fn try_recv(&mut self) -> Option<T> {
        match self.rx.try_recv() {
            Ok(item) => Some(item),
            Err(mpsc::error::TryRecvError::Empty | mpsc::error::TryRecvError::Disconnected) => None,
        }
    }

    /// Cancel explicitly. Equivalent to dropping the handle.
    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
        self.rx.close();
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

// =============================================================================
// SEAMS
// =============================================================================

/// Authoritative document store. Enables mocking in tests.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Commit `patch` only if the stored version equals `expected_version`.
    ///
    /// # Errors
    ///
    /// A `TransportError` when no commit decision could be obtained.
    async fn conditional_write(
        &self,
        id: ShapeId,
        patch: &ShapePatch,
        expected_version: u64,
        editor: &Participant,
    ) -> Result<WriteAck, TransportError>;

    /// Persist a new entity at version 1.
    ///
    /// # Errors
    ///
    /// A `TransportError` when the create could not be delivered.
    async fn create(&self, entity: &ShapeEntity) -> Result<CreateAck, TransportError>;

    /// Remove an entity. Deleting an absent id succeeds.
    ///
    /// # Errors
    ///
    /// A `TransportError` when the delete could not be delivered.
    async fn delete(&self, id: ShapeId, editor: &Participant) -> Result<(), TransportError>;

    /// Open the snapshot push channel.
    fn subscribe(&self) -> Subscription<SnapshotBatch>;
}

/// Ephemeral presence broadcast. Publishing never blocks and never fails
/// loudly; presence is best-effort.
pub trait PresenceChannel: Send + Sync {
    /// Announce (or refresh) that the local participant is editing `object_id`.
    fn publish_lock(&self, object_id: ShapeId, ttl_ms: i64);
    /// Announce that the local participant stopped editing `object_id`.
    fn publish_unlock(&self, object_id: ShapeId);
    fn publish_cursor(&self, x: f64, y: f64);
    /// Receive other participants' presence updates.
    fn subscribe_presence(&self) -> Subscription<PresenceUpdate>;
    /// The participant this channel publishes as.
    fn participant(&self) -> &Participant;
}
