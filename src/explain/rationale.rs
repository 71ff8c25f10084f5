//! Structured rationales: which factors account for a session's drift, and how much.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::counterfactual::{residual_after, CounterfactualResult, PerturbableDimension};
use crate::error::{ContextError, ContextResult};
use crate::physics::PhysicsEngine;
use crate::twin::{mean_finite, DriftRecord, Session, TwinFeature, TwinModel};

/// Residual spread below this is treated as this (bpm).
const MIN_SCALE_BPM: f64 = 1.0;

/// Offsets smaller than this count as "not perturbed".
const MIN_OFFSET: f64 = 1e-9;

/// Size of an attribution relative to the twin's residual spread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MagnitudeBucket {
    /// Below `moderate_z` residual spreads
    Negligible,
    /// Between `moderate_z` and `severe_z`
    Moderate,
    /// At or above `severe_z`
    Severe,
}

/// Which way a factor moved heart rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// The factor pushed heart rate up
    Elevating,
    /// The factor held heart rate down
    Suppressing,
    /// No measurable effect
    Neutral,
}

impl Direction {
    fn of(effect_bpm: f64) -> Self {
        if effect_bpm > 0.0 {
            Direction::Elevating
        } else if effect_bpm < 0.0 {
            Direction::Suppressing
        } else {
            Direction::Neutral
        }
    }
}

/// Overall verdict on the session's heart rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftDirection {
    /// Observed above expected by more than the drift band
    Elevated,
    /// Within the drift band
    Nominal,
    /// Observed below expected by more than the drift band
    Suppressed,
}

/// How attributions were derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributionSource {
    /// One-at-a-time replay of a feasible counterfactual
    Counterfactual,
    /// Effect of the session's deviation from the training distribution
    TrainingDeviation,
}

/// One factor's share of the explanation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribution {
    /// Twin input the factor acts through
    pub feature: TwinFeature,
    /// Whether the factor raised or lowered heart rate
    pub direction: Direction,
    /// Contribution bucketed against the residual spread
    pub magnitude: MagnitudeBucket,
    /// Heart-rate effect in bpm (always ≥ 0; sign lives in `direction`)
    pub contribution_bpm: f64,
    /// Counterfactual offset, or the session's mean deviation from training
    pub offset: f64,
}

/// Headline numbers of a rationale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RationaleSummary {
    /// Highest-ranked factor, if any
    pub dominant: Option<TwinFeature>,
    /// Mean observed minus expected heart rate (bpm)
    pub mean_residual: f64,
    /// Mean residual in units of the twin's training residual spread
    pub residual_z: f64,
    /// Verdict from the mean residual
    pub drift_direction: DriftDirection,
    /// Whether a feasible counterfactual accounts for the drift
    pub explained: bool,
    /// Share of |mean residual| removed by the counterfactual, in [0, 1]
    pub explained_fraction: f64,
    /// How the attributions were derived
    pub source: AttributionSource,
}

/// Ranked attributions plus summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rationale {
    /// Sorted by contribution, largest first
    pub attributions: Vec<Attribution>,
    /// Headline numbers
    pub summary: RationaleSummary,
}

/// Bucketing thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RationaleConfig {
    /// Contributions at or above this many residual standard deviations are Moderate
    pub moderate_z: f64,
    /// ... and at or above this many are Severe
    pub severe_z: f64,
    /// |mean residual| above this (bpm) is Elevated or Suppressed
    pub drift_band_bpm: f64,
}

impl Default for RationaleConfig {
    fn default() -> Self {
        Self {
            moderate_z: 0.5,
            severe_z: 1.5,
            drift_band_bpm: 5.0,
        }
    }
}

/// Turns drift and counterfactual results into a [`Rationale`].
#[derive(Debug, Clone)]
pub struct RationaleGenerator {
    model: Arc<TwinModel>,
    engine: PhysicsEngine,
    config: RationaleConfig,
}

impl RationaleGenerator {
    /// Create a generator over a fitted twin.
    pub fn new(model: Arc<TwinModel>, engine: PhysicsEngine, config: RationaleConfig) -> Self {
        Self {
            model,
            engine,
            config,
        }
    }

    fn scale(&self) -> f64 {
        let std = self.model.residual_stats().std;
        if std.is_finite() {
            std.max(MIN_SCALE_BPM)
        } else {
            MIN_SCALE_BPM
        }
    }

    fn bucket(&self, contribution_bpm: f64) -> MagnitudeBucket {
        let z = contribution_bpm / self.scale();
        if z >= self.config.severe_z {
            MagnitudeBucket::Severe
        } else if z >= self.config.moderate_z {
            MagnitudeBucket::Moderate
        } else {
            MagnitudeBucket::Negligible
        }
    }

    fn drift_direction(&self, mean_residual: f64) -> DriftDirection {
        if mean_residual > self.config.drift_band_bpm {
            DriftDirection::Elevated
        } else if mean_residual < -self.config.drift_band_bpm {
            DriftDirection::Suppressed
        } else {
            DriftDirection::Nominal
        }
    }

    /// Build a rationale for one session.
    ///
    /// With a feasible counterfactual, each perturbed dimension is replayed on its own
    /// and credited with the expected-heart-rate change it causes. Otherwise every model
    /// feature is reset to its training mean and credited with the shift that causes.
    pub fn generate(
        &self,
        session: &Session,
        drift: &DriftRecord,
        counterfactual: &CounterfactualResult,
    ) -> ContextResult<Rationale> {
        if drift.len() != session.len() {
            return Err(ContextError::InvalidInput(format!(
                "drift has {} samples, session has {}",
                drift.len(),
                session.len()
            )));
        }

        let mean_residual = drift.summary.mean_residual;
        let (mut attributions, source) = if counterfactual.feasible {
            (
                self.counterfactual_attributions(session, mean_residual, counterfactual)?,
                AttributionSource::Counterfactual,
            )
        } else {
            (
                self.deviation_attributions(session)?,
                AttributionSource::TrainingDeviation,
            )
        };

        attributions.sort_by(|a, b| {
            b.contribution_bpm
                .total_cmp(&a.contribution_bpm)
                .then(a.feature.cmp(&b.feature))
        });

        let explained_fraction = if mean_residual.is_finite() && mean_residual.abs() > 0.0 {
            ((mean_residual.abs() - counterfactual.residual.abs()) / mean_residual.abs())
                .clamp(0.0, 1.0)
        } else {
            0.0
        };
        let stats = self.model.residual_stats();
        let residual_z = (mean_residual - stats.mean) / self.scale();

        debug!(
            activity = %session.activity.id,
            attributions = attributions.len(),
            "Rationale generated"
        );

        Ok(Rationale {
            summary: RationaleSummary {
                dominant: attributions.first().map(|a| a.feature),
                mean_residual,
                residual_z,
                drift_direction: self.drift_direction(mean_residual),
                explained: counterfactual.feasible,
                explained_fraction: if explained_fraction.is_nan() {
                    0.0
                } else {
                    explained_fraction
                },
                source,
            },
            attributions,
        })
    }

    fn counterfactual_attributions(
        &self,
        session: &Session,
        baseline: f64,
        counterfactual: &CounterfactualResult,
    ) -> ContextResult<Vec<Attribution>> {
        let speeds = session.activity.speeds();
        let mut attributions = Vec::new();
        for perturbation in &counterfactual.perturbation {
            if perturbation.offset.abs() < MIN_OFFSET {
                continue;
            }
            let (headwind, gradient) = match perturbation.dimension {
                PerturbableDimension::Headwind => (perturbation.offset, 0.0),
                PerturbableDimension::Gradient => (0.0, perturbation.offset),
            };
            let (_, residual) =
                residual_after(&self.model, &self.engine, session, &speeds, headwind, gradient)?;
            // Residual falls by exactly the rise in expected heart rate
            let effect = baseline - residual;
            let effect = if effect.is_finite() { effect } else { 0.0 };
            attributions.push(Attribution {
                feature: perturbation.dimension.feature(),
                direction: Direction::of(effect),
                magnitude: self.bucket(effect.abs()),
                contribution_bpm: effect.abs(),
                offset: perturbation.offset,
            });
        }
        Ok(attributions)
    }

    fn deviation_attributions(&self, session: &Session) -> ContextResult<Vec<Attribution>> {
        let frame = self.model.frame(session)?;
        let actual = self.model.expected_for(&frame);
        let valid = frame.valid();

        let mut attributions = Vec::new();
        for &feature in self.model.schema().features() {
            let Some(stats) = self.model.feature_stats(feature) else {
                continue;
            };
            let Some(column) = frame.column(feature) else {
                continue;
            };
            let reference = self.model.expected_for(&frame.with_constant(feature, stats.mean));
            let shifts: Vec<f64> = actual
                .iter()
                .zip(&reference)
                .zip(valid)
                .map(|((a, r), ok)| if *ok { a - r } else { f64::NAN })
                .collect();
            let effect = mean_finite(&shifts);
            let effect = if effect.is_finite() { effect } else { 0.0 };
            let deviation = mean_finite(column) - stats.mean;
            attributions.push(Attribution {
                feature,
                direction: Direction::of(effect),
                magnitude: self.bucket(effect.abs()),
                contribution_bpm: effect.abs(),
                offset: if deviation.is_finite() { deviation } else { 0.0 },
            });
        }
        Ok(attributions)
    }
}
