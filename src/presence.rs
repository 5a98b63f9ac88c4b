//! Presence — who is here, where their cursor is, what they are touching.
//!
//! SYSTEM CONTEXT
//! ==============
//! Presence is purely ephemeral: it rides its own channel, is never part of
//! the durable document, and is forgotten once stale. Edit locks travel on
//! the same channel as cursors; the lock bookkeeping itself lives in
//! [`crate::lock`].

#[cfg(test)]
#[path = "presence_test.rs"]
mod presence_test;

use std::collections::HashMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::shape::{ShapeId, UserId};

/// Subject used in notices when the other editor has no display name.
pub const FALLBACK_EDITOR_LABEL: &str = "another user";

/// Palette for participants without an assigned color.
pub const PRESENCE_COLORS: &[&str] = &[
    "#E5484D", "#30A46C", "#0091FF", "#8E4EC6", "#F76808", "#12A594", "#D6409F", "#FFB224",
];

// =============================================================================
// PARTICIPANT
// =============================================================================

/// A connected user as seen by presence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: UserId,
    /// Display name, if the auth layer provided one.
    #[serde(default)]
    pub label: Option<String>,
    /// Indicator color (hex).
    pub color: String,
}

impl Participant {
    /// New participant with a palette color picked at random.
    pub fn new(id: impl Into<UserId>, label: Option<String>) -> Self {
        let idx = rand::rng().random_range(0..PRESENCE_COLORS.len());
        Self::with_color(id, label, PRESENCE_COLORS[idx])
    }

    pub fn with_color(id: impl Into<UserId>, label: Option<String>, color: impl Into<String>) -> Self {
        Self { id: id.into(), label, color: color.into() }
    }

    /// Display label, or a generic subject when none is known.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or(FALLBACK_EDITOR_LABEL)
    }
}

// =============================================================================
// WIRE
// =============================================================================

/// A message on the presence channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PresenceUpdate {
    /// Holder is editing `object_id`; valid for `ttl_ms` from receipt unless refreshed.
    Lock { object_id: ShapeId, holder: Participant, ttl_ms: i64 },
    Unlock { object_id: ShapeId, holder_id: UserId },
    /// Cursor position in document coordinates.
    Cursor { participant: Participant, x: f64, y: f64 },
    CursorClear { participant_id: UserId },
    /// Participant disconnected; drop everything they held.
    Left { participant_id: UserId },
}

impl PresenceUpdate {
    /// Id of the participant that produced this update.
    #[must_use]
    pub fn sender_id(&self) -> &str {
        match self {
            Self::Lock { holder, .. } => &holder.id,
            Self::Cursor { participant, .. } => &participant.id,
            Self::Unlock { holder_id, .. } => holder_id,
            Self::CursorClear { participant_id } | Self::Left { participant_id } => participant_id,
        }
    }
}

// =============================================================================
// CURSORS
// =============================================================================

/// Last known cursor of a remote participant.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCursor {
    pub participant: Participant,
    pub x: f64,
    pub y: f64,
    /// Local receipt time (ms).
    pub updated_at: i64,
}

/// Remote cursors keyed by participant id, with stale cleanup.
#[derive(Debug, Clone)]
pub struct CursorBoard {
    cursors: HashMap<UserId, RemoteCursor>,
    stale_ms: i64,
}

impl CursorBoard {
    #[must_use]
    pub fn new(stale_ms: i64) -> Self {
        Self { cursors: HashMap::new(), stale_ms }
    }

    pub fn update_at(&mut self, participant: Participant, x: f64, y: f64, now_ms: i64) {
        let id = participant.id.clone();
        self.cursors.insert(id, RemoteCursor { participant, x, y, updated_at: now_ms });
    }

    pub fn clear(&mut self, participant_id: &str) -> Option<RemoteCursor> {
        self.cursors.remove(participant_id)
    }

    /// Drop cursors not updated within the stale window. Returns who was dropped.
    pub fn cleanup_stale_at(&mut self, now_ms: i64) -> Vec<UserId> {
        let stale = self
            .cursors
            .iter()
            .filter_map(|(id, c)| (now_ms - c.updated_at > self.stale_ms).then(|| id.clone()))
            .collect::<Vec<_>>();
        for id in &stale {
            self.cursors.remove(id);
        }
        stale
    }

    #[must_use]
    pub fn get(&self, participant_id: &str) -> Option<&RemoteCursor> {
        self.cursors.get(participant_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RemoteCursor> {
        self.cursors.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }
}
