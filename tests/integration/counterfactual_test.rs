//! Counterfactual search against a fitted twin.

use std::sync::Arc;

use super::fixtures::{flat_session, gradient_only_config, linear_history};
use ridetwin::explain::{
    CounterfactualAnalyzer, CounterfactualConfig, PerturbableDimension, PerturbationBounds,
};
use ridetwin::search::{CancellationToken, Termination};
use ridetwin::synthetic::SyntheticRideBuilder;
use ridetwin::twin::DigitalTwinModel;
use ridetwin::{PhysicsEngine, Session, TwinModel};

fn fitted() -> (Arc<TwinModel>, Session) {
    let config = gradient_only_config();
    let engine = PhysicsEngine::default();
    let mut builder = SyntheticRideBuilder::new(11);
    let history: Vec<Session> = linear_history(&mut builder)
        .into_iter()
        .map(|(a, w)| Session::prepare(&engine, a, w).unwrap())
        .collect();
    let mut twin = DigitalTwinModel::new(config.twin);
    let model = twin.fit(&history).unwrap();

    let (activity, weather) = flat_session(&mut builder, 150.0);
    let session = Session::prepare(&engine, activity, weather).unwrap();
    (model, session)
}

fn analyzer(model: &Arc<TwinModel>) -> CounterfactualAnalyzer {
    CounterfactualAnalyzer::new(
        Arc::clone(model),
        PhysicsEngine::default(),
        gradient_only_config().counterfactual,
    )
}

fn residual_with_gradient(model: &TwinModel, session: &Session, offset: f64) -> f64 {
    let engine = PhysicsEngine::default();
    let physics = engine
        .perturbed(&session.physics, &session.activity.speeds(), 0.0, offset)
        .unwrap();
    let frame = model.frame_with_physics(session, &physics).unwrap();
    model.predict_frame(&frame).mean_residual()
}

#[test]
fn test_same_seed_same_result() {
    let (model, session) = fitted();
    let drift = model.drift(&session).unwrap();
    let first = analyzer(&model).analyze_default(&session, &drift).unwrap();
    let second = analyzer(&model).analyze_default(&session, &drift).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_close_to_grid_minimum() {
    let (model, session) = fitted();
    let drift = model.drift(&session).unwrap();
    let bounds = PerturbationBounds {
        headwind_mps: 0.0,
        gradient: 0.05,
    };
    let result = analyzer(&model)
        .analyze(&session, &drift, &bounds, 2.0)
        .unwrap();
    assert!(result.feasible);

    let grid_min = (-500..=500)
        .map(|i| i as f64 * 1e-4)
        .filter(|g| residual_with_gradient(&model, &session, *g).abs() < 2.0)
        .map(f64::abs)
        .fold(f64::INFINITY, f64::min);
    assert!(grid_min.is_finite());

    let found = result.offset(PerturbableDimension::Gradient).abs();
    assert!(found >= grid_min - 1e-4);
    assert!(found <= grid_min + 2e-3, "found {found}, grid {grid_min}");
}

#[test]
fn test_already_below_threshold() {
    let (model, session) = fitted();
    let drift = model.drift(&session).unwrap();
    let result = analyzer(&model)
        .analyze(&session, &drift, &PerturbationBounds::default(), 25.0)
        .unwrap();
    assert!(result.feasible);
    assert_eq!(result.generations, 0);
    assert!(result.perturbation.iter().all(|p| p.offset == 0.0));
}

#[test]
fn test_no_active_dimension_is_infeasible() {
    let (model, session) = fitted();
    let drift = model.drift(&session).unwrap();
    let bounds = PerturbationBounds {
        headwind_mps: 0.0,
        gradient: 0.0,
    };
    let result = analyzer(&model)
        .analyze(&session, &drift, &bounds, 2.0)
        .unwrap();
    assert!(!result.feasible);
    assert!(result.perturbation.is_empty());
    assert_eq!(result.residual, result.baseline_residual);
}

#[test]
fn test_cancelled_search_stops_immediately() {
    let (model, session) = fitted();
    let drift = model.drift(&session).unwrap();
    let token = CancellationToken::new();
    token.cancel();
    let result = analyzer(&model)
        .with_cancellation(token)
        .analyze_default(&session, &drift)
        .unwrap();
    assert_eq!(result.termination, Termination::Cancelled);
    assert_eq!(result.generations, 0);
}

#[test]
fn test_headwind_only_search() {
    let (model, session) = fitted();
    let drift = model.drift(&session).unwrap();
    let config = CounterfactualConfig {
        bounds: PerturbationBounds {
            headwind_mps: 8.0,
            gradient: 0.0,
        },
        ..gradient_only_config().counterfactual
    };
    let result = CounterfactualAnalyzer::new(Arc::clone(&model), PhysicsEngine::default(), config)
        .analyze_default(&session, &drift)
        .unwrap();
    assert_eq!(result.perturbation.len(), 1);
    assert_eq!(
        result.perturbation[0].dimension,
        PerturbableDimension::Headwind
    );
    if result.feasible {
        assert!(result.offset(PerturbableDimension::Headwind) > 0.0);
    }
}

#[test]
fn test_mismatched_drift_is_rejected() {
    let (model, session) = fitted();
    let mut drift = model.drift(&session).unwrap();
    drift.residual.pop();
    drift.expected.pop();
    drift.observed.pop();
    assert!(analyzer(&model).analyze_default(&session, &drift).is_err());
}

#[test]
fn test_long_search_stays_feasible() {
    let (model, session) = fitted();
    let drift = model.drift(&session).unwrap();
    for seed in 0..20 {
        let config = CounterfactualConfig {
            stall_generations: None,
            max_generations: 200,
            seed: Some(seed),
            ..gradient_only_config().counterfactual
        };
        let result =
            CounterfactualAnalyzer::new(Arc::clone(&model), PhysicsEngine::default(), config)
                .analyze_default(&session, &drift)
                .unwrap();
        assert!(result.feasible, "seed {seed}: residual {}", result.residual);
        assert!(result.residual.abs() < 2.0, "seed {seed}: residual {}", result.residual);
        assert_eq!(result.termination, Termination::Exhausted);
    }
}

#[test]
fn test_zero_time_limit_times_out() {
    let (model, session) = fitted();
    let drift = model.drift(&session).unwrap();
    let config = CounterfactualConfig {
        time_limit_ms: Some(0),
        ..gradient_only_config().counterfactual
    };
    let result = CounterfactualAnalyzer::new(Arc::clone(&model), PhysicsEngine::default(), config)
        .analyze_default(&session, &drift)
        .unwrap();
    assert_eq!(result.termination, Termination::TimedOut);
    assert_eq!(result.generations, 0);
    assert_eq!(result.evaluations, 30);
}
