//! Property tests for the physics layer.

use proptest::prelude::*;
use ridetwin::physics::{gradient, headwind};
use ridetwin::{PhysicsEngine, Wind};

fn headings(len: usize) -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(0.0..360.0, len)
}

#[test]
fn no_wind_means_no_headwind() {
    proptest!(|(h in headings(32))| {
        let missing = headwind(&h, None).unwrap();
        prop_assert!(missing.iter().all(|v| *v == 0.0));

        let calm = vec![Wind::new(0.0, 123.0); h.len()];
        let still = headwind(&h, Some(calm.as_slice())).unwrap();
        prop_assert!(still.iter().all(|v| v.abs() < 1e-12));
    });
}

#[test]
fn headwind_bounded_by_wind_speed() {
    proptest!(|(heading in 0.0..360.0f64, speed in 0.0..20.0f64, bearing in 0.0..360.0f64)| {
        let wind = Wind::new(speed, bearing);
        prop_assert!(wind.headwind_component(heading).abs() <= speed + 1e-9);
    });
}

#[test]
fn virtual_power_is_non_negative() {
    let engine = PhysicsEngine::default();
    proptest!(|(g in -0.25..0.25f64, h in -15.0..15.0f64, v in -5.0..20.0f64)| {
        prop_assert!(engine.power_at(g, h, v) >= 0.0);
    });
}

#[test]
fn virtual_power_monotone_in_headwind() {
    let engine = PhysicsEngine::default();
    proptest!(|(g in -0.1..0.1f64, h in -10.0..10.0f64, dh in 0.0..5.0f64, v in 0.5..15.0f64)| {
        prop_assert!(engine.power_at(g, h + dh, v) >= engine.power_at(g, h, v));
    });
}

#[test]
fn virtual_power_monotone_in_gradient() {
    let engine = PhysicsEngine::default();
    proptest!(|(g in -0.2..0.2f64, dg in 0.0..0.05f64, h in -5.0..5.0f64, v in 0.5..15.0f64)| {
        prop_assert!(engine.power_at(g + dg, h, v) >= engine.power_at(g, h, v));
    });
}

#[test]
fn constant_grade_is_recovered() {
    proptest!(|(grade in -0.2..0.2f64, step in 1.0..10.0f64, window in 1usize..20)| {
        let distance: Vec<f64> = (0..50).map(|i| i as f64 * step).collect();
        let altitude: Vec<f64> = distance.iter().map(|d| 200.0 + grade * d).collect();
        let g = gradient(&altitude, &distance, window).unwrap();
        for value in g {
            prop_assert!((value - grade).abs() < 1e-9);
        }
    });
}

#[test]
fn mismatched_lengths_are_rejected() {
    assert!(gradient(&[1.0, 2.0], &[0.0], 10).is_err());
    let wind = vec![Wind::new(3.0, 0.0); 2];
    assert!(headwind(&[0.0, 0.0, 0.0], Some(wind.as_slice())).is_err());
    assert!(PhysicsEngine::default()
        .virtual_power_series(&[0.0], &[0.0, 0.0], &[5.0])
        .is_err());
}
