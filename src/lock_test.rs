use uuid::Uuid;

use super::*;

fn me() -> Participant {
    Participant::with_color("u-me", Some("Me".into()), "#0091FF")
}

fn alice() -> Participant {
    Participant::with_color("u-alice", Some("Alice".into()), "#E5484D")
}

fn tracker() -> EditLockTracker {
    EditLockTracker::new("u-me", DEFAULT_LOCK_TTL_MS)
}

// =============================================================
// Local locks / suppression
// =============================================================

#[test]
fn local_acquire_suppresses_until_ttl() {
    let mut t = tracker();
    let id = Uuid::new_v4();
    let lock = t.acquire_at(id, &me(), 0);
    assert_eq!(lock.expires_at, 30_000);
    assert!(t.is_suppressed_at(&id, 0));
    assert!(t.is_suppressed_at(&id, 29_999));
    assert!(!t.is_suppressed_at(&id, 31_000));
}

#[test]
fn lock_expires_after_ttl_without_refresh() {
    let mut t = tracker();
    let id = Uuid::new_v4();
    t.acquire_at(id, &me(), 0);
    assert!(t.get_at(&id, 10_000).is_some());
    assert!(t.get_at(&id, 31_000).is_none());
}

#[test]
fn refresh_extends_expiry() {
    let mut t = tracker();
    let id = Uuid::new_v4();
    t.acquire_at(id, &me(), 0);
    t.acquire_at(id, &me(), 20_000);
    assert!(t.is_suppressed_at(&id, 31_000));
    assert!(!t.is_suppressed_at(&id, 50_000));
}

#[test]
fn release_clears_suppression() {
    let mut t = tracker();
    let id = Uuid::new_v4();
    t.acquire_at(id, &me(), 0);
    assert!(t.release(&id).is_some());
    assert!(!t.is_suppressed_at(&id, 1));
    assert!(t.get_at(&id, 1).is_none());
}

// =============================================================
// Remote locks
// =============================================================

#[test]
fn remote_lock_does_not_suppress_merges() {
    let mut t = tracker();
    let id = Uuid::new_v4();
    t.observe_remote_at(id, &alice(), 30_000, 0);
    assert!(!t.is_suppressed_at(&id, 0));
    let lock = t.get_at(&id, 0).unwrap();
    assert_eq!(lock.holder_label, "Alice");
    assert_eq!(lock.holder_color, "#E5484D");
}

#[test]
fn own_echo_is_ignored() {
    let mut t = tracker();
    let id = Uuid::new_v4();
    t.observe_remote_at(id, &me(), 30_000, 0);
    assert!(t.get_at(&id, 0).is_none());
}

#[test]
fn remote_lock_does_not_clear_local_suppression() {
    let mut t = tracker();
    let id = Uuid::new_v4();
    t.acquire_at(id, &me(), 0);
    t.observe_remote_at(id, &alice(), 30_000, 5);
    assert!(t.is_suppressed_at(&id, 10));
    assert_eq!(t.get_at(&id, 10).unwrap().holder_id, "u-alice");
}

#[test]
fn remote_release_requires_matching_holder() {
    let mut t = tracker();
    let id = Uuid::new_v4();
    t.observe_remote_at(id, &alice(), 30_000, 0);
    assert!(!t.release_remote(&id, "u-bob"));
    assert!(t.release_remote(&id, "u-alice"));
    assert!(t.get_at(&id, 0).is_none());
}

#[test]
fn departed_holder_loses_all_locks() {
    let mut t = tracker();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    t.observe_remote_at(a, &alice(), 30_000, 0);
    t.observe_remote_at(b, &alice(), 30_000, 0);
    let mut released = t.release_holder("u-alice");
    released.sort();
    let mut expected = vec![a, b];
    expected.sort();
    assert_eq!(released, expected);
    assert_eq!(t.remote_ids().count(), 0);
}

#[test]
fn sweep_removes_only_expired() {
    let mut t = tracker();
    let old = Uuid::new_v4();
    let fresh = Uuid::new_v4();
    t.acquire_at(old, &me(), 0);
    t.observe_remote_at(fresh, &alice(), 30_000, 20_000);
    let expired = t.sweep_at(31_000);
    assert_eq!(expired, vec![old]);
    assert!(t.get_at(&fresh, 31_000).is_some());
}

#[test]
fn unlabeled_holder_gets_generic_label() {
    let mut t = tracker();
    let id = Uuid::new_v4();
    let anon = Participant::with_color("u-anon", None, "#fff");
    t.observe_remote_at(id, &anon, 1_000, 0);
    assert_eq!(t.get_at(&id, 0).unwrap().holder_label, crate::presence::FALLBACK_EDITOR_LABEL);
}

#[test]
fn held_ids_lists_live_local_locks_only() {
    let mut t = tracker();
    let mine = Uuid::new_v4();
    let theirs = Uuid::new_v4();
    t.acquire_at(mine, &me(), 0);
    t.observe_remote_at(theirs, &alice(), 30_000, 0);
    assert_eq!(t.held_ids_at(1).copied().collect::<Vec<_>>(), vec![mine]);
    assert_eq!(t.held_ids_at(30_000).count(), 0);
}
