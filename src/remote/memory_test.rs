#![allow(clippy::float_cmp)]

use uuid::Uuid;

use super::*;
use crate::clock::ManualClock;
use crate::shape::{NewShape, ShapeKind};

fn alice() -> Participant {
    Participant::with_color("u-alice", Some("Alice".into()), "#E5484D")
}

fn bob() -> Participant {
    Participant::with_color("u-bob", Some("Bob".into()), "#0091FF")
}

fn rect() -> ShapeEntity {
    NewShape::new(ShapeKind::Rect, 0.0, 0.0, 100.0, 100.0).into_entity(Uuid::new_v4(), "u-alice", 0, 0)
}

// =============================================================================
// MemoryRemote
// =============================================================================

#[tokio::test]
async fn create_then_conditional_write_bumps_version() {
    let remote = MemoryRemote::new(Arc::new(ManualClock::new(1_000)));
    let entity = rect();
    let ack = remote.create(&entity).await.unwrap();
    assert_eq!(ack, CreateAck { id: entity.id, version: 1 });

    let result = remote
        .conditional_write(entity.id, &ShapePatch::position(50.0, 0.0), 1, &alice())
        .await
        .unwrap();
    assert_eq!(result, WriteAck::Accepted { new_version: 2 });

    let stored = remote.entity(&entity.id).unwrap();
    assert_eq!(stored.version, 2);
    assert_eq!(stored.updated_at, 1_000);
    assert_eq!(stored.last_edited_by, "u-alice");
}

#[tokio::test]
async fn stale_base_version_conflicts_with_last_editor() {
    let remote = MemoryRemote::default();
    let entity = rect();
    remote.create(&entity).await.unwrap();
    remote
        .conditional_write(entity.id, &ShapePatch::position(1.0, 1.0), 1, &alice())
        .await
        .unwrap();

    let result = remote
        .conditional_write(entity.id, &ShapePatch::position(9.0, 9.0), 1, &bob())
        .await
        .unwrap();
    assert_eq!(
        result,
        WriteAck::Conflict {
            current_version: 2,
            last_edited_by: Some("u-alice".into()),
            last_edited_by_label: Some("Alice".into()),
        }
    );
    assert_eq!(remote.entity(&entity.id).unwrap().x, 1.0);
}

#[tokio::test]
async fn write_to_unknown_shape_is_rejected() {
    let remote = MemoryRemote::default();
    let err = remote
        .conditional_write(Uuid::new_v4(), &ShapePatch::position(1.0, 1.0), 1, &alice())
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Rejected(_)));
}

#[tokio::test]
async fn invalid_patch_is_rejected_without_commit() {
    let remote = MemoryRemote::default();
    let entity = rect();
    remote.create(&entity).await.unwrap();
    let err = remote
        .conditional_write(entity.id, &ShapePatch::size(0.0, 10.0), 1, &alice())
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Rejected(_)));
    assert_eq!(remote.entity(&entity.id).unwrap().version, 1);
}

#[tokio::test]
async fn injected_failures_are_consumed() {
    let remote = MemoryRemote::default();
    remote.fail_next(1);
    let entity = rect();
    assert!(matches!(remote.create(&entity).await, Err(TransportError::Unavailable(_))));
    assert!(remote.is_empty());
    remote.create(&entity).await.unwrap();
    assert_eq!(remote.len(), 1);
}

#[tokio::test]
async fn delete_is_idempotent() {
    let remote = MemoryRemote::default();
    let entity = rect();
    remote.create(&entity).await.unwrap();
    remote.delete(entity.id, &alice()).await.unwrap();
    remote.delete(entity.id, &alice()).await.unwrap();
    assert!(remote.entity(&entity.id).is_none());
}

#[tokio::test]
async fn subscriber_gets_initial_snapshot_then_pushes() {
    let remote = MemoryRemote::default();
    let seeded = rect();
    remote.seed(seeded.clone());
    let mut sub = remote.subscribe();

    let initial = sub.recv().await.unwrap();
    assert!(initial.complete);
    assert_eq!(initial.entities.len(), 1);

    let created = rect();
    remote.create(&created).await.unwrap();
    let push = sub.recv().await.unwrap();
    assert!(!push.complete);
    assert_eq!(push.entities[0]["id"], serde_json::json!(created.id));

    remote.delete(seeded.id, &alice()).await.unwrap();
    let removal = sub.recv().await.unwrap();
    assert_eq!(removal.removed, vec![seeded.id]);
}

#[tokio::test]
async fn dropping_subscription_unregisters() {
    let remote = MemoryRemote::default();
    let sub = remote.subscribe();
    assert_eq!(remote.subscriber_count(), 1);
    drop(sub);
    assert_eq!(remote.subscriber_count(), 0);

    let sub = remote.subscribe();
    sub.unsubscribe();
    assert_eq!(remote.subscriber_count(), 0);
}

// =============================================================================
// PresenceHub
// =============================================================================

#[tokio::test]
async fn presence_fans_out_to_others_only() {
    let hub = PresenceHub::new();
    let a = hub.join(alice());
    let b = hub.join(bob());
    let mut a_sub = a.subscribe_presence();
    let mut b_sub = b.subscribe_presence();
    let object_id = Uuid::new_v4();

    a.publish_lock(object_id, 30_000);
    let got = b_sub.recv().await.unwrap();
    assert_eq!(got, PresenceUpdate::Lock { object_id, holder: alice(), ttl_ms: 30_000 });
    assert!(a_sub.try_recv().is_none());

    b.publish_cursor(3.0, 4.0);
    assert_eq!(a_sub.recv().await.unwrap(), PresenceUpdate::Cursor { participant: bob(), x: 3.0, y: 4.0 });
}

#[tokio::test]
async fn dropping_presence_announces_departure() {
    let hub = PresenceHub::new();
    let a = hub.join(alice());
    let b = hub.join(bob());
    let mut b_sub = b.subscribe_presence();
    drop(a);
    assert_eq!(b_sub.recv().await.unwrap(), PresenceUpdate::Left { participant_id: "u-alice".into() });
}
