//! End-to-end: fit, explain and mine through the context trainer.

use super::fixtures::{
    flat_session, gradient_only_config, heat_history, linear_history, ride_at, BPM_PER_DEGREE,
};
use ridetwin::explain::{
    AtmosphereVerdict, AttributionSource, Direction, DriftDirection, PerturbableDimension,
    TerrainVerdict, WindVerdict,
};
use ridetwin::synthetic::SyntheticRideBuilder;
use ridetwin::twin::TwinFeature;
use ridetwin::{ContextConfig, ContextError, ContextTrainer};

/// A flat, calm session the twin expects at 130 bpm, observed at 150.
#[test]
fn test_elevated_session_is_explained_by_gradient() {
    let mut builder = SyntheticRideBuilder::new(1);
    let mut trainer = ContextTrainer::new(gradient_only_config());
    let model = trainer.fit(linear_history(&mut builder)).unwrap();
    assert!(model.r_squared() > 0.999);

    let (activity, weather) = flat_session(&mut builder, 150.0);
    let explanation = trainer.explain_session(&activity, &weather).unwrap();

    let drift = &explanation.drift;
    assert_eq!(drift.summary.valid_samples, 10);
    assert!((drift.summary.mean_residual - 20.0).abs() < 0.05);
    for expected in &drift.expected {
        assert!((expected - 130.0).abs() < 0.05);
    }
    assert!(explanation.physics.weather_degraded);

    let cf = &explanation.counterfactual;
    assert!(cf.feasible);
    assert!(cf.residual.abs() < 2.0);
    assert!(cf.offset(PerturbableDimension::Gradient) > 0.0);

    let rationale = &explanation.rationale;
    assert_eq!(rationale.summary.dominant, Some(TwinFeature::Gradient));
    assert_eq!(rationale.summary.drift_direction, DriftDirection::Elevated);
    assert_eq!(rationale.summary.source, AttributionSource::Counterfactual);
    assert!(rationale.summary.explained);
    assert!(rationale.summary.explained_fraction > 0.9);
    let top = &rationale.attributions[0];
    assert_eq!(top.feature, TwinFeature::Gradient);
    assert_eq!(top.direction, Direction::Elevating);
    assert!(top.contribution_bpm > 18.0);

    assert_eq!(explanation.context.wind, WindVerdict::Neutral);
    assert_eq!(explanation.context.terrain, TerrainVerdict::Neutral);
    assert_eq!(explanation.context.environmental_penalty_bpm, 0.0);
}

#[test]
fn test_tight_bounds_fall_back_to_training_deviation() {
    let mut config = gradient_only_config();
    config.counterfactual.bounds.gradient = 0.001;
    let mut builder = SyntheticRideBuilder::new(2);
    let mut trainer = ContextTrainer::new(config);
    trainer.fit(linear_history(&mut builder)).unwrap();

    let (activity, weather) = flat_session(&mut builder, 150.0);
    let explanation = trainer.explain_session(&activity, &weather).unwrap();

    let cf = &explanation.counterfactual;
    assert!(!cf.feasible);
    assert!(cf.residual.abs() <= cf.baseline_residual.abs());
    assert!(cf.offset(PerturbableDimension::Gradient).abs() <= 0.001);

    let rationale = &explanation.rationale;
    assert!(!rationale.summary.explained);
    assert_eq!(rationale.summary.source, AttributionSource::TrainingDeviation);
    assert_eq!(rationale.attributions.len(), 1);
    assert_eq!(rationale.attributions[0].feature, TwinFeature::VirtualPower);
}

#[test]
fn test_nominal_session_needs_no_counterfactual() {
    let mut builder = SyntheticRideBuilder::new(3);
    let mut trainer = ContextTrainer::new(gradient_only_config());
    trainer.fit(linear_history(&mut builder)).unwrap();

    let (activity, weather) = flat_session(&mut builder, 130.0);
    let explanation = trainer.explain_session(&activity, &weather).unwrap();

    assert!(explanation.counterfactual.feasible);
    assert_eq!(explanation.counterfactual.generations, 0);
    assert_eq!(explanation.counterfactual.magnitude, 0.0);
    assert!(explanation.rationale.attributions.is_empty());
    assert_eq!(
        explanation.rationale.summary.drift_direction,
        DriftDirection::Nominal
    );
}

#[test]
fn test_insufficient_history_keeps_previous_state() {
    let mut builder = SyntheticRideBuilder::new(4);
    let mut trainer = ContextTrainer::new(gradient_only_config());
    trainer.fit(linear_history(&mut builder)).unwrap();

    let short = vec![flat_session(&mut builder, 140.0)];
    match trainer.fit(short) {
        Err(ContextError::InsufficientHistory {
            required,
            available,
        }) => {
            assert_eq!(required, 50);
            assert_eq!(available, 10);
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(trainer.is_fitted());
}

#[test]
fn test_mining_over_fitted_history() {
    let mut builder = SyntheticRideBuilder::new(5);
    let mut trainer = ContextTrainer::new(ContextConfig::default());
    trainer.fit(builder.history(16, 400)).unwrap();
    assert_eq!(trainer.summaries().unwrap().len(), 16);

    let config = trainer.config().mining.clone();
    let first = trainer.mine_global_patterns(&config).unwrap();
    let second = trainer.mine_global_patterns(&config).unwrap();
    assert_eq!(first, second);
    for rule in &first {
        assert!(rule.support >= config.min_support);
        assert!(rule.confidence >= config.min_confidence);
        assert!(!rule.antecedent.is_empty());
    }
    for pair in first.windows(2) {
        assert!(pair[0].interestingness >= pair[1].interestingness);
    }
}

#[test]
fn test_refit_is_deterministic() {
    let history = linear_history(&mut SyntheticRideBuilder::new(6));
    let (activity, weather) = flat_session(&mut SyntheticRideBuilder::new(7), 150.0);

    let mut a = ContextTrainer::new(gradient_only_config());
    let mut b = ContextTrainer::new(gradient_only_config());
    a.fit(history.clone()).unwrap();
    b.fit(history).unwrap();

    let ea = a.explain_session(&activity, &weather).unwrap();
    let eb = b.explain_session(&activity, &weather).unwrap();
    assert_eq!(ea.drift.expected, eb.drift.expected);
    assert_eq!(ea.counterfactual, eb.counterfactual);
    assert_eq!(ea.rationale, eb.rationale);
}

#[test]
fn test_hot_ride_flags_heat_stress() {
    let mut builder = SyntheticRideBuilder::new(8);
    let mut trainer = ContextTrainer::new(ContextConfig::default());
    trainer.fit(heat_history(&mut builder)).unwrap();

    let (activity, weather) = ride_at(&mut builder, 30.0);
    let explanation = trainer.explain_session(&activity, &weather).unwrap();
    let context = &explanation.context;

    // Standard conditions sit at 20 °C
    let expected_penalty = BPM_PER_DEGREE * 10.0;
    assert!(
        (context.environmental_penalty_bpm - expected_penalty).abs() < 0.5,
        "penalty {}",
        context.environmental_penalty_bpm
    );
    assert_eq!(context.atmosphere, AtmosphereVerdict::HeatStress);
    assert_eq!(context.avg_temperature_c, Some(30.0));
    assert!(explanation.drift.summary.mean_residual.abs() < 1.0);
}

#[test]
fn test_cold_ride_flags_cooling() {
    let mut builder = SyntheticRideBuilder::new(9);
    let mut trainer = ContextTrainer::new(ContextConfig::default());
    let model = trainer.fit(heat_history(&mut builder)).unwrap();

    let (activity, weather) = ride_at(&mut builder, 10.0);
    let explanation = trainer.explain_session(&activity, &weather).unwrap();
    assert!(explanation.context.environmental_penalty_bpm < -3.0);
    assert_eq!(explanation.context.atmosphere, AtmosphereVerdict::Cooling);

    let session = ridetwin::Session::prepare(trainer.engine(), activity, weather).unwrap();
    let influence = model
        .environmental_influence(&session, &trainer.config().context.standard)
        .unwrap();
    assert_eq!(influence.len(), 120);
    assert!(influence.iter().all(|v| (v + BPM_PER_DEGREE * 10.0).abs() < 0.5));
}
