//! Mechanical load model for outdoor rides.
//!
//! Derives per-sample headwind, gradient and virtual power from kinematics and weather.
//! Everything here is a pure function of its inputs.

pub mod engine;

use serde::{Deserialize, Serialize};

pub use engine::{gradient, headwind, virtual_power, PhysicsConfig, PhysicsEngine};

/// Per-sample physics features of one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhysicsFeatures {
    /// Direction of travel in degrees
    pub heading: Vec<f64>,
    /// Wind component opposing travel in m/s (negative = tailwind)
    pub headwind: Vec<f64>,
    /// Smoothed rise over run
    pub gradient: Vec<f64>,
    /// Estimated mechanical power in watts
    pub virtual_power: Vec<f64>,
    /// True when no wind data was available and calm air was assumed
    pub weather_degraded: bool,
}

impl PhysicsFeatures {
    /// Number of samples.
    pub fn len(&self) -> usize {
        self.virtual_power.len()
    }

    /// Whether there are no samples.
    pub fn is_empty(&self) -> bool {
        self.virtual_power.is_empty()
    }

    /// Mean of a series, ignoring non-finite values. Returns 0 for an empty series.
    pub(crate) fn mean_of(series: &[f64]) -> f64 {
        let (sum, count) = series
            .iter()
            .filter(|v| v.is_finite())
            .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
        if count == 0 {
            0.0
        } else {
            sum / count as f64
        }
    }

    /// Session mean headwind.
    pub fn mean_headwind(&self) -> f64 {
        Self::mean_of(&self.headwind)
    }

    /// Session mean gradient.
    pub fn mean_gradient(&self) -> f64 {
        Self::mean_of(&self.gradient)
    }

    /// Session mean virtual power.
    pub fn mean_virtual_power(&self) -> f64 {
        Self::mean_of(&self.virtual_power)
    }
}
