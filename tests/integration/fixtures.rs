//! Shared ride fixtures for integration tests.

use ridetwin::explain::PerturbationBounds;
use ridetwin::synthetic::{RideProfile, SyntheticRideBuilder};
use ridetwin::twin::{FeatureSchema, TwinFeature};
use ridetwin::{Activity, ContextConfig, PhysicsEngine, WeatherContext};

/// Heart rate at zero power.
pub const BASE_HR: f64 = 120.0;

/// bpm per watt chosen so a flat, calm ride at 5 m/s expects 130 bpm.
pub fn bpm_per_watt() -> f64 {
    10.0 / PhysicsEngine::default().power_at(0.0, 0.0, 5.0)
}

/// Calm rides at 5 m/s over a range of grades, heart rate exactly linear in virtual power.
pub fn linear_history(builder: &mut SyntheticRideBuilder) -> Vec<(Activity, WeatherContext)> {
    (0..10)
        .map(|i| {
            builder.ride(&RideProfile {
                samples: 60,
                speed_mps: 5.0,
                gradient: -0.01 + 0.004 * i as f64,
                base_heart_rate: BASE_HR,
                bpm_per_watt: bpm_per_watt(),
                ..Default::default()
            })
        })
        .collect()
}

/// Ten flat calm samples at 5 m/s with heart rate `hr`.
pub fn flat_session(builder: &mut SyntheticRideBuilder, hr: f64) -> (Activity, WeatherContext) {
    builder.ride(&RideProfile {
        samples: 10,
        speed_mps: 5.0,
        base_heart_rate: hr,
        bpm_per_watt: 0.0,
        ..Default::default()
    })
}

/// Virtual-power-only linear twin with gradient as the single perturbable dimension.
pub fn gradient_only_config() -> ContextConfig {
    let mut config = ContextConfig::default();
    config.twin.schema = FeatureSchema::new(vec![TwinFeature::VirtualPower]).unwrap();
    config.twin.min_training_samples = 50;
    config.counterfactual.bounds = PerturbationBounds {
        headwind_mps: 0.0,
        gradient: 0.05,
    };
    config.counterfactual.threshold_bpm = 2.0;
    config
}

/// Heart-rate rise per °C above 20 °C in [`heat_history`].
pub const BPM_PER_DEGREE: f64 = 0.5;

/// Flat calm rides at varied speed and temperature, heart rate linear in power and heat.
pub fn heat_history(builder: &mut SyntheticRideBuilder) -> Vec<(Activity, WeatherContext)> {
    (0..12)
        .map(|i| {
            builder.ride(&RideProfile {
                samples: 120,
                speed_mps: 6.0 + (i % 4) as f64,
                temperature_c: Some(10.0 + 2.0 * i as f64),
                bpm_per_degree: BPM_PER_DEGREE,
                ..Default::default()
            })
        })
        .collect()
}

/// A flat calm ride at `temperature_c` that follows the same heart-rate model.
pub fn ride_at(builder: &mut SyntheticRideBuilder, temperature_c: f64) -> (Activity, WeatherContext) {
    builder.ride(&RideProfile {
        samples: 120,
        speed_mps: 7.0,
        temperature_c: Some(temperature_c),
        bpm_per_degree: BPM_PER_DEGREE,
        ..Default::default()
    })
}
