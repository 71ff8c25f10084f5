//! Model inputs: the feature schema and per-session feature frames.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::activity::{Activity, WeatherContext};
use crate::error::{ContextError, ContextResult};
use crate::physics::{PhysicsEngine, PhysicsFeatures};

/// A named model input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TwinFeature {
    /// Estimated mechanical power (W)
    VirtualPower,
    /// Ground speed (m/s)
    Speed,
    /// Headwind component (m/s)
    Headwind,
    /// Smoothed rise over run
    Gradient,
    /// Altitude (m)
    Altitude,
    /// Air temperature (°C)
    Temperature,
    /// Relative humidity (%)
    Humidity,
    /// Trailing mean virtual power (W)
    FatigueProxy,
}

impl TwinFeature {
    /// Stable identifier.
    pub fn name(&self) -> &'static str {
        match self {
            TwinFeature::VirtualPower => "virtual_power",
            TwinFeature::Speed => "speed",
            TwinFeature::Headwind => "headwind",
            TwinFeature::Gradient => "gradient",
            TwinFeature::Altitude => "altitude",
            TwinFeature::Temperature => "temperature",
            TwinFeature::Humidity => "humidity",
            TwinFeature::FatigueProxy => "fatigue_proxy",
        }
    }

    /// Whether the column is derived from physics features (and must be refreshed when
    /// physics changes).
    pub fn is_physics_derived(&self) -> bool {
        matches!(
            self,
            TwinFeature::VirtualPower
                | TwinFeature::Headwind
                | TwinFeature::Gradient
                | TwinFeature::FatigueProxy
        )
    }
}

impl fmt::Display for TwinFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Ordered list of model inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureSchema(Vec<TwinFeature>);

impl Default for FeatureSchema {
    fn default() -> Self {
        Self(vec![
            TwinFeature::VirtualPower,
            TwinFeature::Speed,
            TwinFeature::Altitude,
            TwinFeature::Temperature,
            TwinFeature::Humidity,
            TwinFeature::FatigueProxy,
        ])
    }
}

impl FeatureSchema {
    /// Create a schema, rejecting empty or duplicated feature lists.
    pub fn new(features: Vec<TwinFeature>) -> ContextResult<Self> {
        let schema = Self(features);
        schema.validate()?;
        Ok(schema)
    }

    /// Check the schema is usable.
    pub fn validate(&self) -> ContextResult<()> {
        if self.0.is_empty() {
            return Err(ContextError::InvalidInput(
                "feature schema is empty".to_string(),
            ));
        }
        for (i, feature) in self.0.iter().enumerate() {
            if self.0[..i].contains(feature) {
                return Err(ContextError::InvalidInput(format!(
                    "feature {} appears twice in the schema",
                    feature
                )));
            }
        }
        Ok(())
    }

    /// Features in order.
    pub fn features(&self) -> &[TwinFeature] {
        &self.0
    }

    /// Column index of a feature.
    pub fn position(&self, feature: TwinFeature) -> Option<usize> {
        self.0.iter().position(|f| *f == feature)
    }

    /// Number of features.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the schema has no features.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Trailing mean of virtual power over `window` samples (the current sample included).
///
/// A pure function of the session's own series, so prediction stays reentrant.
pub fn fatigue_proxy(virtual_power: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    let mut prefix = Vec::with_capacity(virtual_power.len() + 1);
    prefix.push(0.0);
    for p in virtual_power {
        let value = if p.is_finite() { *p } else { 0.0 };
        prefix.push(prefix[prefix.len() - 1] + value);
    }
    (0..virtual_power.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            (prefix[i + 1] - prefix[start]) / (i + 1 - start) as f64
        })
        .collect()
}

/// One training or evaluation session: the recording, its weather and its physics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Aligned recording
    pub activity: Activity,
    /// Weather context
    pub weather: WeatherContext,
    /// Physics features derived from the two above
    pub physics: PhysicsFeatures,
}

impl Session {
    /// Bundle an activity with precomputed physics, checking lengths agree.
    pub fn new(
        activity: Activity,
        weather: WeatherContext,
        physics: PhysicsFeatures,
    ) -> ContextResult<Self> {
        if physics.len() != activity.len() {
            return Err(ContextError::InvalidInput(format!(
                "physics has {} samples, activity has {}",
                physics.len(),
                activity.len()
            )));
        }
        Ok(Self {
            activity,
            weather,
            physics,
        })
    }

    /// Run the physics engine and bundle the result.
    pub fn prepare(
        engine: &PhysicsEngine,
        activity: Activity,
        weather: WeatherContext,
    ) -> ContextResult<Self> {
        let physics = engine.compute(&activity, &weather)?;
        Self::new(activity, weather, physics)
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.activity.len()
    }

    /// Whether the session has no samples.
    pub fn is_empty(&self) -> bool {
        self.activity.is_empty()
    }
}

/// Settings for turning a session into model columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameSettings {
    /// Trailing window (samples) of the fatigue proxy
    pub fatigue_window: usize,
    /// Temperature assumed when weather is missing (°C)
    pub neutral_temperature_c: f64,
    /// Humidity assumed when weather is missing (%)
    pub neutral_humidity_pct: f64,
}

impl Default for FrameSettings {
    fn default() -> Self {
        Self {
            fatigue_window: 600,
            neutral_temperature_c: 20.0,
            neutral_humidity_pct: 50.0,
        }
    }
}

/// Column-major model inputs for one session, in schema order.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionFrame {
    schema: FeatureSchema,
    columns: Vec<Vec<f64>>,
    observed: Vec<f64>,
    valid: Vec<bool>,
}

impl SessionFrame {
    /// Build the frame for `session`, using `physics` in place of the session's own
    /// physics features.
    pub fn build(
        schema: &FeatureSchema,
        settings: &FrameSettings,
        session: &Session,
        physics: &PhysicsFeatures,
    ) -> ContextResult<Self> {
        let n = session.len();
        if physics.len() != n {
            return Err(ContextError::InvalidInput(format!(
                "physics has {} samples, activity has {}",
                physics.len(),
                n
            )));
        }

        let mut columns = Vec::with_capacity(schema.len());
        for feature in schema.features() {
            let column = match feature {
                TwinFeature::VirtualPower => physics.virtual_power.clone(),
                TwinFeature::Speed => session.activity.speeds(),
                TwinFeature::Headwind => physics.headwind.clone(),
                TwinFeature::Gradient => physics.gradient.clone(),
                TwinFeature::Altitude => session.activity.altitudes(),
                TwinFeature::Temperature => session
                    .weather
                    .temperatures(n, settings.neutral_temperature_c)?,
                TwinFeature::Humidity => session
                    .weather
                    .humidities(n, settings.neutral_humidity_pct)?,
                TwinFeature::FatigueProxy => {
                    fatigue_proxy(&physics.virtual_power, settings.fatigue_window)
                }
            };
            columns.push(column);
        }

        let observed = session.activity.heart_rates();
        let mask = session.activity.valid_mask();
        let valid = (0..n)
            .map(|i| mask[i] && columns.iter().all(|c| c[i].is_finite()))
            .collect();

        Ok(Self {
            schema: schema.clone(),
            columns,
            observed,
            valid,
        })
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.observed.len()
    }

    /// Whether the frame has no samples.
    pub fn is_empty(&self) -> bool {
        self.observed.is_empty()
    }

    /// Observed heart rate (NaN where invalid).
    pub fn observed(&self) -> &[f64] {
        &self.observed
    }

    /// Validity mask.
    pub fn valid(&self) -> &[bool] {
        &self.valid
    }

    /// Column of a feature, if in the schema.
    pub fn column(&self, feature: TwinFeature) -> Option<&[f64]> {
        self.schema
            .position(feature)
            .map(|idx| self.columns[idx].as_slice())
    }

    /// Copy of this frame with one feature held at a constant value.
    pub fn with_constant(&self, feature: TwinFeature, value: f64) -> Self {
        let mut frame = self.clone();
        if let Some(idx) = self.schema.position(feature) {
            frame.columns[idx] = vec![value; self.len()];
        }
        frame
    }

    /// Row-major view of every sample.
    pub fn rows(&self) -> Vec<Vec<f64>> {
        (0..self.len()).map(|i| self.row(i)).collect()
    }

    /// Row-major view of the valid samples only, with their observed heart rate.
    pub fn valid_rows(&self) -> (Vec<Vec<f64>>, Vec<f64>) {
        (0..self.len())
            .filter(|i| self.valid[*i])
            .map(|i| (self.row(i), self.observed[i]))
            .unzip()
    }

    fn row(&self, i: usize) -> Vec<f64> {
        self.columns.iter().map(|c| c[i]).collect()
    }
}
