//! EditLockTracker — advisory, TTL-bound "who is editing this" markers.
//!
//! DESIGN
//! ======
//! Locks are not mutually exclusive; nothing at the data level stops two
//! users editing the same shape. They serve two purposes:
//!
//! - The local holder's unexpired lock *is* the merge-suppression marker:
//!   while it is live, incoming snapshots for that shape are discarded so
//!   remote echo cannot fight an in-progress drag.
//! - Remote holders' locks drive the "someone is editing this" indicator.
//!
//! Local and remote locks are kept apart so a remote announcement can never
//! clear our own suppression. Every lock expires after its TTL unless
//! refreshed, which bounds the damage of a client that dies mid-gesture.

#[cfg(test)]
#[path = "lock_test.rs"]
mod lock_test;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::presence::Participant;
use crate::shape::{ShapeId, UserId};

/// Default lock lifetime.
pub const DEFAULT_LOCK_TTL_MS: i64 = 30_000;

/// Presence record for one object being edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditLock {
    pub holder_id: UserId,
    pub holder_label: String,
    pub holder_color: String,
    /// Local-clock expiry (ms since epoch).
    pub expires_at: i64,
}

impl EditLock {
    #[must_use]
    pub fn new(holder: &Participant, expires_at: i64) -> Self {
        Self {
            holder_id: holder.id.clone(),
            holder_label: holder.display_name().to_owned(),
            holder_color: holder.color.clone(),
            expires_at,
        }
    }

    #[must_use]
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at
    }
}

/// Per-object edit locks for the local participant and everyone else.
#[derive(Debug, Clone)]
pub struct EditLockTracker {
    local_id: UserId,
    ttl_ms: i64,
    local: HashMap<ShapeId, EditLock>,
    remote: HashMap<ShapeId, EditLock>,
}

impl EditLockTracker {
    #[must_use]
    pub fn new(local_id: impl Into<UserId>, ttl_ms: i64) -> Self {
        Self { local_id: local_id.into(), ttl_ms, local: HashMap::new(), remote: HashMap::new() }
    }

    #[must_use]
    pub fn ttl_ms(&self) -> i64 {
        self.ttl_ms
    }

    /// Acquire or refresh a lock for `holder`. Locks for the local
    /// participant become merge-suppression markers.
    pub fn acquire_at(&mut self, object_id: ShapeId, holder: &Participant, now_ms: i64) -> EditLock {
        let lock = EditLock::new(holder, now_ms + self.ttl_ms);
        if holder.id == self.local_id {
            self.local.insert(object_id, lock.clone());
        } else {
            self.remote.insert(object_id, lock.clone());
        }
        lock
    }

    /// Record a lock announced on the presence channel. Echoes of our own
    /// announcements are ignored. `ttl_ms` counts from local receipt.
    pub fn observe_remote_at(&mut self, object_id: ShapeId, holder: &Participant, ttl_ms: i64, now_ms: i64) {
        if holder.id == self.local_id {
            return;
        }
        self.remote.insert(object_id, EditLock::new(holder, now_ms + ttl_ms.max(0)));
    }

    /// Release the local participant's lock.
    pub fn release(&mut self, object_id: &ShapeId) -> Option<EditLock> {
        self.local.remove(object_id)
    }

    /// Release a remote lock if `holder_id` still holds it.
    pub fn release_remote(&mut self, object_id: &ShapeId, holder_id: &str) -> bool {
        if self.remote.get(object_id).is_some_and(|l| l.holder_id == holder_id) {
            self.remote.remove(object_id);
            return true;
        }
        false
    }

    /// Drop every remote lock held by a departed participant.
    pub fn release_holder(&mut self, holder_id: &str) -> Vec<ShapeId> {
        let ids = self
            .remote
            .iter()
            .filter_map(|(id, l)| (l.holder_id == holder_id).then_some(*id))
            .collect::<Vec<_>>();
        for id in &ids {
            self.remote.remove(id);
        }
        ids
    }

    /// Live lock for an object. A remote holder takes precedence over our own
    /// lock since that is what the indicator needs to show.
    #[must_use]
    pub fn get_at(&self, object_id: &ShapeId, now_ms: i64) -> Option<&EditLock> {
        self.remote
            .get(object_id)
            .filter(|l| !l.is_expired_at(now_ms))
            .or_else(|| self.local.get(object_id).filter(|l| !l.is_expired_at(now_ms)))
    }

    /// Whether incoming snapshots for `object_id` must be discarded.
    #[must_use]
    pub fn is_suppressed_at(&self, object_id: &ShapeId, now_ms: i64) -> bool {
        self.local
            .get(object_id)
            .is_some_and(|l| !l.is_expired_at(now_ms))
    }

    /// Remove expired locks. Returns the affected object ids.
    pub fn sweep_at(&mut self, now_ms: i64) -> Vec<ShapeId> {
        let mut expired = Vec::new();
        for map in [&mut self.local, &mut self.remote] {
            let ids = map
                .iter()
                .filter_map(|(id, l)| l.is_expired_at(now_ms).then_some(*id))
                .collect::<Vec<_>>();
            for id in ids {
                map.remove(&id);
                expired.push(id);
            }
        }
        expired
    }

    /// Object ids held by remote participants (live or not yet swept).
    pub fn remote_ids(&self) -> impl Iterator<Item = &ShapeId> {
        self.remote.keys()
    }

    /// Object ids the local participant holds a live lock on.
    pub fn held_ids_at(&self, now_ms: i64) -> impl Iterator<Item = &ShapeId> {
        self.local
            .iter()
            .filter_map(move |(id, l)| (!l.is_expired_at(now_ms)).then_some(id))
    }
}
