//! User-facing notices for writes that were rolled back.
//!
//! Writer flows never unwind UI state with an error; they roll back and push
//! a [`SyncNotice`] to the host. The channel is bounded and sending never
//! blocks: when the host stops draining, new notices are dropped with a
//! warning.

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::TransportError;
use crate::guard::{Conflict, WriteOp};
use crate::presence::FALLBACK_EDITOR_LABEL;
use crate::shape::ShapeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    VersionConflict,
    TransportFailure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncNotice {
    pub kind: NoticeKind,
    pub shape_id: ShapeId,
    /// Who caused it, for conflicts; the failed operation otherwise.
    pub subject: String,
    pub message: String,
}

impl SyncNotice {
    #[must_use]
    pub fn conflict(conflict: &Conflict) -> Self {
        let subject = conflict.holder().unwrap_or(FALLBACK_EDITOR_LABEL).to_owned();
        Self {
            kind: NoticeKind::VersionConflict,
            shape_id: conflict.id,
            message: format!("Shape was modified by {subject}. Your change was reverted."),
            subject,
        }
    }

    #[must_use]
    pub fn transport(op: WriteOp, shape_id: ShapeId, error: &TransportError) -> Self {
        Self {
            kind: NoticeKind::TransportFailure,
            shape_id,
            subject: op.to_string(),
            message: format!("Could not save your {op} ({error}). Your change was reverted; try again."),
        }
    }
}

/// Non-blocking producer side of the notice stream.
#[derive(Debug, Clone)]
pub struct NoticeSender {
    tx: mpsc::Sender<SyncNotice>,
}

impl NoticeSender {
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<SyncNotice>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    pub fn send(&self, notice: SyncNotice) {
        match self.tx.try_send(notice) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(n)) => {
                warn!(kind = ?n.kind, shape_id = %n.shape_id, "notice channel full; dropping notice");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}
