//! Client-side synchronization core for a multi-user canvas editor.
//!
//! Every client holds a local replica of the document, applies its own edits
//! optimistically, commits them with version-checked writes, folds in the
//! snapshots other clients produce, and tells the UI who is editing what.
//! Storage, transport and rendering are external; the core talks to them
//! through the traits in [`remote`].
//!
//! ## Module layout
//!
//! | Module | Role |
//! |--------|------|
//! | [`client`] | `SyncClient` facade, gesture guard, background tasks |
//! | [`store`] | `ObjectStore`: canonical local entity map |
//! | [`guard`] | `VersionGuard`: optimistic conditional writes and rollback |
//! | [`merge`] | `SnapshotMerger`: idempotent snapshot reconciliation |
//! | [`cull`] | `ViewportCuller`: render-set computation |
//! | [`lock`] | `EditLockTracker`: TTL-bound edit presence |
//! | [`viewport`] | Pan/zoom state and document-space geometry |
//! | [`presence`] | Participants, presence wire messages, remote cursors |
//! | [`remote`] | Collaborator traits and in-memory implementations |
//! | [`shape`] | Entity, patch and creation types |
//! | [`notice`] | User-facing conflict/failure notices |
//! | [`config`] | Environment-driven settings |
//! | [`clock`] | Time source seam |
//! | [`error`] | Error taxonomy and codes |

pub mod client;
pub mod clock;
pub mod config;
pub mod cull;
pub mod error;
pub mod guard;
pub mod lock;
pub mod merge;
pub mod notice;
pub mod presence;
pub mod remote;
pub mod shape;
pub mod store;
pub mod viewport;

pub use client::{GestureGuard, SweepReport, SyncClient, SyncTasks};
pub use config::SyncConfig;
pub use error::{ErrorCode, SyncError, TransportError};
pub use shape::{NewShape, ShapeEntity, ShapeId, ShapeKind, ShapePatch};
