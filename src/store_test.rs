#![allow(clippy::float_cmp)]

use uuid::Uuid;

use super::*;
use crate::shape::{NewShape, ShapeKind};

fn make_entity(z: i64) -> ShapeEntity {
    let mut spec = NewShape::new(ShapeKind::Rect, 0.0, 0.0, 100.0, 80.0);
    spec.z_index = Some(z);
    spec.into_entity(Uuid::new_v4(), "alice", 0, 10)
}

fn seeded() -> (ObjectStore, ShapeId) {
    let mut store = ObjectStore::new();
    let e = make_entity(0);
    let id = e.id;
    store.apply(Mutation::Create(e), 10).unwrap();
    (store, id)
}

// =============================================================
// Create / delete
// =============================================================

#[test]
fn create_inserts_and_stamps() {
    let (store, id) = seeded();
    let e = store.get(&id).unwrap();
    assert_eq!(e.version, 1);
    assert_eq!(e.updated_at, 10);
    assert_eq!(store.len(), 1);
}

#[test]
fn create_rejects_invalid_geometry() {
    let mut store = ObjectStore::new();
    let mut e = make_entity(0);
    e.height = -1.0;
    let err = store.apply(Mutation::Create(e), 0).unwrap_err();
    assert!(matches!(err, SyncError::InvalidShape(_)));
    assert!(store.is_empty());
}

#[test]
fn delete_removes_and_returns_before() {
    let (mut store, id) = seeded();
    let applied = store.apply(Mutation::Delete(id), 20).unwrap();
    assert!(applied.before.is_some());
    assert!(applied.after.is_none());
    assert!(applied.changed());
    assert!(!store.contains(&id));
}

#[test]
fn delete_unknown_is_not_found() {
    let mut store = ObjectStore::new();
    let id = Uuid::new_v4();
    assert!(matches!(store.apply(Mutation::Delete(id), 0), Err(SyncError::NotFound(x)) if x == id));
}

// =============================================================
// Update / preview
// =============================================================

#[test]
fn update_bumps_version_and_records_editor() {
    let (mut store, id) = seeded();
    let applied = store
        .apply(Mutation::Update { id, patch: ShapePatch::position(50.0, 0.0), editor: "bob".into() }, 30)
        .unwrap();
    let after = applied.after.unwrap();
    assert_eq!(after.x, 50.0);
    assert_eq!(after.version, 2);
    assert_eq!(after.last_edited_by, "bob");
    assert_eq!(after.updated_at, 30);
}

#[test]
fn noop_update_keeps_reference_and_version() {
    let (mut store, id) = seeded();
    let original = store.get(&id).unwrap();
    let applied = store
        .apply(Mutation::Update { id, patch: ShapePatch::position(0.0, 0.0), editor: "bob".into() }, 30)
        .unwrap();
    assert!(!applied.changed());
    let current = store.get(&id).unwrap();
    assert!(Arc::ptr_eq(&original, &current));
    assert_eq!(current.version, 1);
}

#[test]
fn preview_keeps_version() {
    let (mut store, id) = seeded();
    let applied = store
        .apply(Mutation::Preview { id, patch: ShapePatch::position(5.0, 6.0) }, 40)
        .unwrap();
    let after = applied.after.unwrap();
    assert_eq!(after.version, 1);
    assert_eq!(after.last_edited_by, "alice");
    assert_eq!((after.x, after.y), (5.0, 6.0));
}

#[test]
fn update_to_zero_size_is_rejected_and_store_unchanged() {
    let (mut store, id) = seeded();
    let original = store.get(&id).unwrap();
    let err = store
        .apply(Mutation::Update { id, patch: ShapePatch::size(0.0, 10.0), editor: "bob".into() }, 30)
        .unwrap_err();
    assert!(matches!(err, SyncError::InvalidShape(_)));
    assert!(Arc::ptr_eq(&original, &store.get(&id).unwrap()));
}

#[test]
fn update_unknown_is_not_found() {
    let mut store = ObjectStore::new();
    let res = store.apply(
        Mutation::Update { id: Uuid::new_v4(), patch: ShapePatch::position(1.0, 1.0), editor: "x".into() },
        0,
    );
    assert!(matches!(res, Err(SyncError::NotFound(_))));
}

// =============================================================
// Ordering and helpers
// =============================================================

#[test]
fn all_is_in_draw_order() {
    let mut store = ObjectStore::new();
    for z in [3, 1, 2] {
        store.apply(Mutation::Create(make_entity(z)), 0).unwrap();
    }
    let zs: Vec<i64> = store.all().iter().map(|e| e.z_index).collect();
    assert_eq!(zs, vec![1, 2, 3]);
}

#[test]
fn next_z_index_is_above_top() {
    let mut store = ObjectStore::new();
    assert_eq!(store.next_z_index(), 0);
    store.apply(Mutation::Create(make_entity(7)), 0).unwrap();
    assert_eq!(store.next_z_index(), 8);
}

#[test]
fn restore_if_current_requires_identity() {
    let (mut store, id) = seeded();
    let original = store.get(&id).unwrap();
    let replacement = Arc::new(ShapePatch::position(9.0, 9.0).apply(&original));
    let stale_expectation = Arc::new((*original).clone());

    assert!(!store.restore_if_current(id, Some(&stale_expectation), Some(Arc::clone(&replacement))));
    assert!(Arc::ptr_eq(&store.get(&id).unwrap(), &original));

    assert!(store.restore_if_current(id, Some(&original), Some(Arc::clone(&replacement))));
    assert!(Arc::ptr_eq(&store.get(&id).unwrap(), &replacement));

    assert!(store.restore_if_current(id, Some(&replacement), None));
    assert!(!store.contains(&id));
}
