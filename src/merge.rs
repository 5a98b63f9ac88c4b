//! SnapshotMerger — folds authoritative snapshots into the local store.
//!
//! DESIGN
//! ======
//! Snapshots arrive at-least-once and in no particular order, so merging is
//! idempotent: re-applying a batch changes nothing. Per entity, in order:
//!
//! 1. Suppressed (the local participant holds a live edit lock): discard.
//! 2. Older than the local version: discard as stale.
//! 3. Content-equal to the local value: keep the existing `Arc`.
//! 4. Otherwise replace or insert.
//!
//! A complete batch additionally removes local entities it does not
//! mention, except suppressed ones and creates still awaiting their ack.
//! Entities that fail to parse or validate are skipped individually with a
//! warning; one bad record never poisons the batch.

#[cfg(test)]
#[path = "merge_test.rs"]
mod merge_test;

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::SyncError;
use crate::shape::{ShapeEntity, ShapeId};
use crate::store::ObjectStore;

/// One push from the remote store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotBatch {
    /// True when `entities` is the whole document rather than a delta.
    #[serde(default)]
    pub complete: bool,
    /// Raw entity records; each is parsed and validated on its own.
    pub entities: Vec<serde_json::Value>,
    /// Ids deleted remotely (deltas only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removed: Vec<ShapeId>,
}

impl SnapshotBatch {
    /// Delta batch from typed entities.
    ///
    /// # Errors
    ///
    /// Propagates serialization failures.
    pub fn partial(entities: &[ShapeEntity]) -> Result<Self, serde_json::Error> {
        Ok(Self { complete: false, entities: encode(entities)?, removed: Vec::new() })
    }

    /// Whole-document batch from typed entities.
    ///
    /// # Errors
    ///
    /// Propagates serialization failures.
    pub fn complete(entities: &[ShapeEntity]) -> Result<Self, serde_json::Error> {
        Ok(Self { complete: true, entities: encode(entities)?, removed: Vec::new() })
    }

    /// Delta batch announcing remote deletions only.
    #[must_use]
    pub fn removals(ids: Vec<ShapeId>) -> Self {
        Self { complete: false, entities: Vec::new(), removed: ids }
    }
}

fn encode(entities: &[ShapeEntity]) -> Result<Vec<serde_json::Value>, serde_json::Error> {
    entities.iter().map(serde_json::to_value).collect()
}

/// What a merge did, per category.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub inserted: Vec<ShapeId>,
    pub replaced: Vec<ShapeId>,
    pub removed: Vec<ShapeId>,
    pub unchanged: usize,
    pub suppressed: usize,
    pub stale: usize,
    pub malformed: usize,
}

impl MergeReport {
    /// Whether the store was modified.
    #[must_use]
    pub fn changed(&self) -> bool {
        !(self.inserted.is_empty() && self.replaced.is_empty() && self.removed.is_empty())
    }
}

/// Parse and validate one raw snapshot record.
///
/// # Errors
///
/// `MalformedSnapshot` when the record does not describe a valid entity.
pub fn parse_entity(raw: &serde_json::Value) -> Result<ShapeEntity, SyncError> {
    let entity: ShapeEntity =
        serde_json::from_value(raw.clone()).map_err(|e| SyncError::MalformedSnapshot(e.to_string()))?;
    entity
        .validate()
        .map_err(|e| SyncError::MalformedSnapshot(format!("{}: {e}", entity.id)))?;
    Ok(entity)
}

pub struct SnapshotMerger;

impl SnapshotMerger {
    /// Merge `batch` into `store`.
    ///
    /// `is_suppressed` reports whether the local participant is mid-edit on
    /// an id; `pending_creates` lists locally created ids whose create has
    /// not been acknowledged yet.
    pub fn merge(
        store: &mut ObjectStore,
        batch: &SnapshotBatch,
        is_suppressed: impl Fn(&ShapeId) -> bool,
        pending_creates: &HashSet<ShapeId>,
    ) -> MergeReport {
        let mut report = MergeReport::default();
        let mut seen = HashSet::with_capacity(batch.entities.len());

        for raw in &batch.entities {
            let incoming = match parse_entity(raw) {
                Ok(entity) => entity,
                Err(e) => {
                    warn!(error = %e, "skipping malformed snapshot entity");
                    report.malformed += 1;
                    continue;
                }
            };
            let id = incoming.id;
            seen.insert(id);

            if is_suppressed(&id) {
                debug!(%id, "snapshot suppressed during local edit");
                report.suppressed += 1;
                continue;
            }

            match store.get(&id) {
                Some(local) if incoming.version < local.version => {
                    debug!(%id, incoming = incoming.version, local = local.version, "ignoring stale snapshot");
                    report.stale += 1;
                }
                Some(local) if local.same_content(&incoming) => {
                    report.unchanged += 1;
                }
                Some(_) => {
                    store.put(Arc::new(incoming));
                    report.replaced.push(id);
                }
                None => {
                    store.put(Arc::new(incoming));
                    report.inserted.push(id);
                }
            }
        }

        for id in &batch.removed {
            if is_suppressed(id) {
                report.suppressed += 1;
                continue;
            }
            if store.remove(id).is_some() {
                report.removed.push(*id);
            }
        }

        if batch.complete {
            let absent = store
                .ids()
                .filter(|id| !seen.contains(*id) && !pending_creates.contains(*id) && !is_suppressed(*id))
                .copied()
                .collect::<Vec<_>>();
            for id in absent {
                store.remove(&id);
                report.removed.push(id);
            }
        }

        if report.changed() {
            debug!(
                inserted = report.inserted.len(),
                replaced = report.replaced.len(),
                removed = report.removed.len(),
                "snapshot merged"
            );
        }
        report
    }
}
