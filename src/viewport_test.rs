#![allow(clippy::float_cmp)]

use super::*;

const EPSILON: f64 = 1e-9;

fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < EPSILON
}

fn point_approx_eq(a: Point, b: Point) -> bool {
    approx_eq(a.x, b.x) && approx_eq(a.y, b.y)
}

// --- Rect ---

#[test]
fn touching_edges_intersect() {
    let a = Rect::new(0.0, 0.0, 10.0, 10.0);
    let b = Rect::new(10.0, 10.0, 5.0, 5.0);
    assert!(a.intersects(&b));
    assert!(b.intersects(&a));
}

#[test]
fn disjoint_rects_do_not_intersect() {
    let a = Rect::new(0.0, 0.0, 10.0, 10.0);
    let b = Rect::new(10.5, 0.0, 5.0, 5.0);
    assert!(!a.intersects(&b));
}

#[test]
fn expand_grows_every_side() {
    let r = Rect::new(0.0, 0.0, 10.0, 20.0).expand(5.0);
    assert_eq!(r, Rect::new(-5.0, -5.0, 20.0, 30.0));
}

#[test]
fn unrotated_bounds_are_unchanged() {
    assert_eq!(Rect::from_rotated(1.0, 2.0, 3.0, 4.0, 0.0), Rect::new(1.0, 2.0, 3.0, 4.0));
    assert_eq!(Rect::from_rotated(1.0, 2.0, 3.0, 4.0, 360.0), Rect::new(1.0, 2.0, 3.0, 4.0));
}

#[test]
fn quarter_turn_swaps_extent_about_center() {
    let r = Rect::from_rotated(0.0, 0.0, 100.0, 20.0, 90.0);
    assert!(approx_eq(r.width, 20.0));
    assert!(approx_eq(r.height, 100.0));
    assert!(approx_eq(r.x, 40.0));
    assert!(approx_eq(r.y, -40.0));
}

#[test]
fn diagonal_rotation_grows_bounds() {
    let r = Rect::from_rotated(0.0, 0.0, 10.0, 10.0, 45.0);
    let diag = 10.0 * std::f64::consts::SQRT_2;
    assert!(approx_eq(r.width, diag));
    assert!(approx_eq(r.height, diag));
}

// --- ViewportState ---

#[test]
fn world_screen_round_trip() {
    let vp = ViewportState { scale: 2.0, origin_x: 30.0, origin_y: -10.0, width: 800.0, height: 600.0 };
    let world = Point::new(12.5, -4.0);
    assert!(point_approx_eq(vp.screen_to_world(vp.world_to_screen(world)), world));
    assert!(point_approx_eq(vp.world_to_screen(world), Point::new(55.0, -18.0)));
}

#[test]
fn world_bounds_account_for_pan_and_zoom() {
    let vp = ViewportState { scale: 2.0, origin_x: -100.0, origin_y: 0.0, width: 800.0, height: 600.0 };
    let b = vp.world_bounds();
    assert_eq!(b, Rect::new(50.0, 0.0, 400.0, 300.0));
}

#[test]
fn resize_changes_extent_only() {
    let mut vp = ViewportState::new(800.0, 600.0);
    vp.pan_by(-100.0, -50.0);
    vp.resize(1600.0, 900.0);
    assert_eq!((vp.origin_x, vp.origin_y, vp.scale), (-100.0, -50.0, 1.0));
    assert_eq!(vp.world_bounds(), Rect::new(100.0, 50.0, 1600.0, 900.0));

    vp.resize(-1.0, 900.0);
    assert!(!vp.is_valid());
}

#[test]
fn pan_moves_origin() {
    let mut vp = ViewportState::new(800.0, 600.0);
    vp.pan_by(15.0, -5.0);
    assert_eq!((vp.origin_x, vp.origin_y), (15.0, -5.0));
}

#[test]
fn zoom_at_keeps_anchor_fixed() {
    let mut vp = ViewportState::new(800.0, 600.0);
    vp.pan_by(40.0, 25.0);
    let anchor = Point::new(300.0, 200.0);
    let before = vp.screen_to_world(anchor);
    vp.zoom_at(anchor, 2.5, ZoomRange::default());
    assert!(approx_eq(vp.scale, 2.5));
    assert!(point_approx_eq(vp.screen_to_world(anchor), before));
}

#[test]
fn zoom_is_clamped_to_range() {
    let mut vp = ViewportState::new(800.0, 600.0);
    vp.zoom_at(Point::new(0.0, 0.0), 100.0, ZoomRange::default());
    assert_eq!(vp.scale, 10.0);
    vp.set_scale(0.001, ZoomRange { min: 0.25, max: 4.0 });
    assert!(approx_eq(vp.scale, 0.25));
}

#[test]
fn invalid_states_are_reported() {
    let ok = ViewportState::new(800.0, 600.0);
    assert!(ok.is_valid());
    for bad in [
        ViewportState { scale: 0.0, ..ok },
        ViewportState { scale: -1.0, ..ok },
        ViewportState { scale: f64::NAN, ..ok },
        ViewportState { origin_x: f64::INFINITY, ..ok },
        ViewportState { height: f64::NAN, ..ok },
    ] {
        assert!(matches!(bad.validate(), Err(SyncError::InvalidViewport(_))), "{bad:?}");
    }
}
