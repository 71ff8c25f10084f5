//! Per-session aggregates that rule mining works on.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::twin::{mean_finite, DriftRecord, Session};

const MPS_TO_KMH: f64 = 3.6;

/// A numeric attribute of a session summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryFeature {
    /// Mean headwind (m/s)
    Headwind,
    /// Mean gradient (rise/run)
    Gradient,
    /// Mean virtual power (W)
    VirtualPower,
    /// Mean speed (km/h)
    Speed,
    /// Mean air temperature (°C)
    Temperature,
    /// Mean relative humidity (%)
    Humidity,
    /// Session duration (min)
    Duration,
}

impl SummaryFeature {
    /// Every feature, in ranking order.
    pub const ALL: [SummaryFeature; 7] = [
        SummaryFeature::Headwind,
        SummaryFeature::Gradient,
        SummaryFeature::VirtualPower,
        SummaryFeature::Speed,
        SummaryFeature::Temperature,
        SummaryFeature::Humidity,
        SummaryFeature::Duration,
    ];

    /// Stable snake_case name.
    pub fn name(&self) -> &'static str {
        match self {
            SummaryFeature::Headwind => "headwind",
            SummaryFeature::Gradient => "gradient",
            SummaryFeature::VirtualPower => "virtual_power",
            SummaryFeature::Speed => "speed",
            SummaryFeature::Temperature => "temperature",
            SummaryFeature::Humidity => "humidity",
            SummaryFeature::Duration => "duration",
        }
    }
}

impl fmt::Display for SummaryFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Aggregated view of one session. Unknown values are NaN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Source activity
    pub activity_id: Uuid,
    /// Mean headwind component (m/s)
    pub mean_headwind: f64,
    /// Mean gradient (rise/run)
    pub mean_gradient: f64,
    /// Mean virtual power (W)
    pub mean_virtual_power: f64,
    /// Mean speed (km/h)
    pub mean_speed_kmh: f64,
    /// Mean air temperature (°C)
    pub mean_temperature_c: f64,
    /// Mean relative humidity (%)
    pub mean_humidity_pct: f64,
    /// Session length (min)
    pub duration_min: f64,
    /// Mean residual of the session (bpm)
    pub mean_drift: f64,
}

impl SessionSummary {
    /// Summarise a session and its drift.
    pub fn from_session(session: &Session, drift: &DriftRecord) -> Self {
        let observations = session
            .weather
            .observations(session.len())
            .unwrap_or_default();
        let temperature: Vec<f64> = observations
            .iter()
            .map(|o| o.temperature_c.unwrap_or(f64::NAN))
            .collect();
        let humidity: Vec<f64> = observations
            .iter()
            .map(|o| o.humidity_pct.unwrap_or(f64::NAN))
            .collect();
        let duration_min = session
            .activity
            .elapsed_secs()
            .last()
            .map_or(0.0, |secs| secs / 60.0);

        Self {
            activity_id: session.activity.id,
            mean_headwind: session.physics.mean_headwind(),
            mean_gradient: session.physics.mean_gradient(),
            mean_virtual_power: session.physics.mean_virtual_power(),
            mean_speed_kmh: mean_finite(&session.activity.speeds()) * MPS_TO_KMH,
            mean_temperature_c: mean_finite(&temperature),
            mean_humidity_pct: mean_finite(&humidity),
            duration_min,
            mean_drift: drift.summary.mean_residual,
        }
    }

    /// Value of a feature.
    pub fn value(&self, feature: SummaryFeature) -> f64 {
        match feature {
            SummaryFeature::Headwind => self.mean_headwind,
            SummaryFeature::Gradient => self.mean_gradient,
            SummaryFeature::VirtualPower => self.mean_virtual_power,
            SummaryFeature::Speed => self.mean_speed_kmh,
            SummaryFeature::Temperature => self.mean_temperature_c,
            SummaryFeature::Humidity => self.mean_humidity_pct,
            SummaryFeature::Duration => self.duration_min,
        }
    }
}
