//! Descriptive context of a session: what the rider was up against.

use serde::{Deserialize, Serialize};

use crate::error::ContextResult;
use crate::twin::{mean_finite, Session, StandardConditions, TwinModel};

const MPS_TO_KMH: f64 = 3.6;

/// Thresholds behind the categorical verdicts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextThresholds {
    /// Headwind above this (m/s) counts as riding into the wind
    pub strong_headwind_mps: f64,
    /// Share of ride time in strong headwind that makes the wind a burden
    pub headwind_share: f64,
    /// Share below which (together with a tailwind on average) the wind assisted
    pub assisted_share: f64,
    /// Mean headwind below this (m/s) counts as a tailwind
    pub assisted_mean_mps: f64,
    /// Gradient above this counts as climbing
    pub climbing_gradient: f64,
    /// Climbing longer than this (minutes) makes the terrain a burden
    pub climbing_minutes: f64,
    /// Mean environmental penalty beyond ± this (bpm) flags the atmosphere
    pub thermal_penalty_bpm: f64,
    /// Reference environment for the penalty
    pub standard: StandardConditions,
}

impl Default for ContextThresholds {
    fn default() -> Self {
        Self {
            strong_headwind_mps: 3.0,
            headwind_share: 0.25,
            assisted_share: 0.05,
            assisted_mean_mps: -1.0,
            climbing_gradient: 0.03,
            climbing_minutes: 20.0,
            thermal_penalty_bpm: 3.0,
            standard: StandardConditions::default(),
        }
    }
}

/// Net effect of wind over the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindVerdict {
    /// Strong headwind for a large share of the ride
    Headwind,
    /// Mostly tailwind
    Assisted,
    /// Neither
    Neutral,
}

/// Whether the terrain made the ride harder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerrainVerdict {
    /// Long time spent climbing
    HighResistance,
    /// Not much climbing
    Neutral,
}

/// Thermal load relative to standard conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AtmosphereVerdict {
    /// Environment raised expected heart rate past the thermal threshold
    HeatStress,
    /// Environment lowered it past the threshold
    Cooling,
    /// Within the threshold
    Neutral,
}

/// Session averages and verdicts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    /// Mean speed (km/h)
    pub avg_speed_kmh: f64,
    /// Mean virtual power (W)
    pub avg_virtual_power: f64,
    /// NaN when no sample carries a valid heart rate
    pub avg_heart_rate: f64,
    /// Only set when weather was observed
    pub avg_temperature_c: Option<f64>,
    /// Mean headwind component (m/s, negative is tailwind)
    pub mean_headwind_mps: f64,
    /// Minutes above the strong-headwind threshold
    pub headwind_minutes: f64,
    /// Share of ride time above the strong-headwind threshold
    pub headwind_share: f64,
    /// Minutes above the climbing gradient
    pub climbing_minutes: f64,
    /// Mean bpm the environment added versus standard conditions
    pub environmental_penalty_bpm: f64,
    /// Wind verdict
    pub wind: WindVerdict,
    /// Terrain verdict
    pub terrain: TerrainVerdict,
    /// Thermal verdict
    pub atmosphere: AtmosphereVerdict,
}

/// Time each sample stands for (s). The last sample inherits the previous interval.
fn sample_durations(elapsed: &[f64]) -> Vec<f64> {
    let mut durations: Vec<f64> = elapsed.windows(2).map(|w| (w[1] - w[0]).max(0.0)).collect();
    if let Some(&last) = durations.last() {
        durations.push(last);
    } else if !elapsed.is_empty() {
        durations.push(0.0);
    }
    durations
}

/// Seconds spent on samples whose value satisfies `pred`.
fn time_where(series: &[f64], durations: &[f64], pred: impl Fn(f64) -> bool) -> f64 {
    series
        .iter()
        .zip(durations)
        .filter(|(v, _)| pred(**v))
        .map(|(_, d)| d)
        .sum()
}

impl SessionContext {
    /// Summarise a session against a fitted twin.
    pub fn describe(
        model: &TwinModel,
        session: &Session,
        thresholds: &ContextThresholds,
    ) -> ContextResult<Self> {
        let physics = &session.physics;
        let durations = sample_durations(&session.activity.elapsed_secs());
        let total_secs: f64 = durations.iter().sum();

        let headwind_secs = time_where(&physics.headwind, &durations, |h| {
            h > thresholds.strong_headwind_mps
        });
        let climbing_secs = time_where(&physics.gradient, &durations, |g| {
            g > thresholds.climbing_gradient
        });
        let headwind_share = if total_secs > 0.0 {
            headwind_secs / total_secs
        } else {
            0.0
        };

        let mean_headwind = physics.mean_headwind();
        let wind = if headwind_share > thresholds.headwind_share {
            WindVerdict::Headwind
        } else if headwind_share < thresholds.assisted_share
            && mean_headwind < thresholds.assisted_mean_mps
        {
            WindVerdict::Assisted
        } else {
            WindVerdict::Neutral
        };

        let climbing_minutes = climbing_secs / 60.0;
        let terrain = if climbing_minutes > thresholds.climbing_minutes {
            TerrainVerdict::HighResistance
        } else {
            TerrainVerdict::Neutral
        };

        let penalty = mean_finite(&model.environmental_influence(session, &thresholds.standard)?);
        let penalty = if penalty.is_finite() { penalty } else { 0.0 };
        let atmosphere = if penalty > thresholds.thermal_penalty_bpm {
            AtmosphereVerdict::HeatStress
        } else if penalty < -thresholds.thermal_penalty_bpm {
            AtmosphereVerdict::Cooling
        } else {
            AtmosphereVerdict::Neutral
        };

        let len = session.len();
        let temperatures = session.weather.observations(len)?;
        let avg_temperature_c = temperatures
            .iter()
            .any(|o| o.temperature_c.is_some())
            .then(|| {
                mean_finite(
                    &temperatures
                        .iter()
                        .map(|o| o.temperature_c.unwrap_or(f64::NAN))
                        .collect::<Vec<_>>(),
                )
            });

        Ok(Self {
            avg_speed_kmh: mean_finite(&session.activity.speeds()) * MPS_TO_KMH,
            avg_virtual_power: physics.mean_virtual_power(),
            avg_heart_rate: mean_finite(&session.activity.heart_rates()),
            avg_temperature_c,
            mean_headwind_mps: mean_headwind,
            headwind_minutes: headwind_secs / 60.0,
            headwind_share,
            climbing_minutes,
            environmental_penalty_bpm: penalty,
            wind,
            terrain,
            atmosphere,
        })
    }
}
