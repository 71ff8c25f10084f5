//! Digital twin of the athlete's heart-rate response.
//!
//! The twin learns which heart rate a given mechanical and environmental load produced
//! across the training history, then scores new sessions against that expectation.
//! Fitting yields an immutable [`TwinModel`] that is safe to share between threads.

pub mod drift;
pub mod features;
pub mod forest;
pub mod regressor;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ContextError, ContextResult};
use crate::physics::PhysicsFeatures;

pub use drift::{DriftRecord, DriftSummary};
pub use features::{fatigue_proxy, FeatureSchema, FrameSettings, Session, SessionFrame, TwinFeature};
pub use forest::{ForestConfig, ForestRegressor};
pub use regressor::{LinearRegressor, Regressor, RegressorConfig};

/// Twin training configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TwinConfig {
    /// Ordered model inputs
    pub schema: FeatureSchema,
    /// Regression technique
    pub regressor: RegressorConfig,
    /// Fitting is refused below this many valid training samples
    pub min_training_samples: usize,
    /// Use every n-th valid sample for training (1 = all)
    pub sample_stride: usize,
    /// Column construction settings
    pub frame: FrameSettings,
}

impl Default for TwinConfig {
    fn default() -> Self {
        Self {
            schema: FeatureSchema::default(),
            regressor: RegressorConfig::default(),
            min_training_samples: 300,
            sample_stride: 1,
            frame: FrameSettings::default(),
        }
    }
}

/// Mean and standard deviation of a series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesStats {
    /// Mean
    pub mean: f64,
    /// Population standard deviation
    pub std: f64,
}

impl SeriesStats {
    fn of(values: impl Iterator<Item = f64>) -> Self {
        let values: Vec<f64> = values.filter(|v| v.is_finite()).collect();
        if values.is_empty() {
            return Self {
                mean: 0.0,
                std: 0.0,
            };
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let std = (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
        Self { mean, std }
    }
}

/// Reference conditions for the environmental influence estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StandardConditions {
    /// Temperature (°C)
    pub temperature_c: f64,
    /// Relative humidity (%)
    pub humidity_pct: f64,
    /// Altitude (m)
    pub altitude_m: f64,
}

impl Default for StandardConditions {
    fn default() -> Self {
        Self {
            temperature_c: 20.0,
            humidity_pct: 40.0,
            altitude_m: 100.0,
        }
    }
}

/// Twin output for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Expected heart rate per sample
    pub expected: Vec<f64>,
    /// observed − expected per sample (NaN where observed is invalid)
    pub residual: Vec<f64>,
}

impl Prediction {
    /// Mean residual over samples where it is defined (NaN if none).
    pub fn mean_residual(&self) -> f64 {
        mean_finite(&self.residual)
    }
}

pub(crate) fn mean_finite(values: &[f64]) -> f64 {
    let (sum, count) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

/// A fitted, read-only twin.
#[derive(Debug)]
pub struct TwinModel {
    schema: FeatureSchema,
    frame_settings: FrameSettings,
    regressor: Box<dyn Regressor>,
    residual_stats: SeriesStats,
    feature_stats: Vec<SeriesStats>,
    training_samples: usize,
    r_squared: f64,
}

impl TwinModel {
    /// Ordered model inputs.
    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Training residual mean/std (bpm).
    pub fn residual_stats(&self) -> SeriesStats {
        self.residual_stats
    }

    /// Training distribution of a schema feature.
    pub fn feature_stats(&self, feature: TwinFeature) -> Option<SeriesStats> {
        self.schema
            .position(feature)
            .map(|idx| self.feature_stats[idx])
    }

    /// Number of samples the regressor was trained on.
    pub fn training_samples(&self) -> usize {
        self.training_samples
    }

    /// Coefficient of determination on the training samples.
    pub fn r_squared(&self) -> f64 {
        self.r_squared
    }

    /// Name of the underlying regressor.
    pub fn regressor_name(&self) -> &'static str {
        self.regressor.name()
    }

    /// Model columns for a session using its own physics.
    pub fn frame(&self, session: &Session) -> ContextResult<SessionFrame> {
        self.frame_with_physics(session, &session.physics)
    }

    /// Model columns for a session with substituted physics.
    pub fn frame_with_physics(
        &self,
        session: &Session,
        physics: &PhysicsFeatures,
    ) -> ContextResult<SessionFrame> {
        SessionFrame::build(&self.schema, &self.frame_settings, session, physics)
    }

    /// Expected heart rate for every sample of a frame.
    pub fn expected_for(&self, frame: &SessionFrame) -> Vec<f64> {
        self.regressor.predict(&frame.rows())
    }

    /// Expected heart rate and residual for every sample of a frame.
    pub fn predict_frame(&self, frame: &SessionFrame) -> Prediction {
        let expected = self.expected_for(frame);
        let residual = expected
            .iter()
            .zip(frame.observed())
            .zip(frame.valid())
            .map(|((e, o), valid)| if *valid { o - e } else { f64::NAN })
            .collect();
        Prediction { expected, residual }
    }

    /// Expected heart rate and residual for a session.
    pub fn predict(&self, session: &Session) -> ContextResult<Prediction> {
        Ok(self.predict_frame(&self.frame(session)?))
    }

    /// Drift record for a session.
    pub fn drift(&self, session: &Session) -> ContextResult<DriftRecord> {
        let frame = self.frame(session)?;
        let prediction = self.predict_frame(&frame);
        let observed = frame
            .observed()
            .iter()
            .zip(frame.valid())
            .map(|(o, valid)| if *valid { *o } else { f64::NAN })
            .collect();
        Ok(DriftRecord::new(
            prediction.expected,
            observed,
            &session.activity.elapsed_secs(),
        ))
    }

    /// Heart-rate penalty (bpm) of the actual environment versus standard conditions.
    ///
    /// Positive values mean the conditions raised the expected heart rate. Features not
    /// in the schema contribute nothing.
    pub fn environmental_influence(
        &self,
        session: &Session,
        standard: &StandardConditions,
    ) -> ContextResult<Vec<f64>> {
        let actual = self.frame(session)?;
        let reference = actual
            .with_constant(TwinFeature::Temperature, standard.temperature_c)
            .with_constant(TwinFeature::Humidity, standard.humidity_pct)
            .with_constant(TwinFeature::Altitude, standard.altitude_m);

        Ok(self
            .expected_for(&actual)
            .into_iter()
            .zip(self.expected_for(&reference))
            .map(|(a, r)| a - r)
            .collect())
    }
}

/// Trainer and holder of the athlete's digital twin.
#[derive(Debug, Default)]
pub struct DigitalTwinModel {
    config: TwinConfig,
    model: Option<Arc<TwinModel>>,
}

impl DigitalTwinModel {
    /// Create an unfitted twin.
    pub fn new(config: TwinConfig) -> Self {
        Self {
            config,
            model: None,
        }
    }

    /// Training configuration.
    pub fn config(&self) -> &TwinConfig {
        &self.config
    }

    /// Whether `fit` has succeeded.
    pub fn is_fitted(&self) -> bool {
        self.model.is_some()
    }

    /// The fitted model.
    pub fn model(&self) -> ContextResult<Arc<TwinModel>> {
        self.model.clone().ok_or(ContextError::NotFitted)
    }

    /// Train on a history of sessions, replacing any previous model.
    ///
    /// Only samples with valid heart rate and speed are used. Fails when fewer than
    /// `min_training_samples` remain after striding.
    pub fn fit(&mut self, history: &[Session]) -> ContextResult<Arc<TwinModel>> {
        let config = &self.config;
        config.schema.validate()?;

        let mut x = Vec::new();
        let mut y = Vec::new();
        let stride = config.sample_stride.max(1);
        let mut seen = 0usize;
        for session in history {
            let frame = SessionFrame::build(&config.schema, &config.frame, session, &session.physics)?;
            let (rows, targets) = frame.valid_rows();
            for (row, target) in rows.into_iter().zip(targets) {
                if seen % stride == 0 {
                    x.push(row);
                    y.push(target);
                }
                seen += 1;
            }
        }

        if x.len() < config.min_training_samples || x.is_empty() {
            return Err(ContextError::InsufficientHistory {
                required: config.min_training_samples.max(1),
                available: x.len(),
            });
        }

        let mut regressor = config.regressor.build();
        debug!(
            regressor = regressor.name(),
            samples = x.len(),
            features = config.schema.len(),
            "Fitting digital twin"
        );
        regressor.fit(&x, &y)?;

        let fitted = regressor.predict(&x);
        let residuals: Vec<f64> = y.iter().zip(&fitted).map(|(o, e)| o - e).collect();
        let residual_stats = SeriesStats::of(residuals.iter().copied());
        let target_stats = SeriesStats::of(y.iter().copied());
        let ss_res: f64 = residuals.iter().map(|r| r * r).sum();
        let ss_tot = target_stats.std.powi(2) * y.len() as f64;
        let r_squared = if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 0.0 };

        let feature_stats = (0..config.schema.len())
            .map(|j| SeriesStats::of(x.iter().map(|row| row[j])))
            .collect();

        let model = Arc::new(TwinModel {
            schema: config.schema.clone(),
            frame_settings: config.frame.clone(),
            regressor,
            residual_stats,
            feature_stats,
            training_samples: x.len(),
            r_squared,
        });
        info!(
            sessions = history.len(),
            samples = model.training_samples,
            r_squared = model.r_squared,
            "Digital twin trained"
        );

        self.model = Some(Arc::clone(&model));
        Ok(model)
    }

    /// Expected heart rate and residual for a session.
    pub fn predict(&self, session: &Session) -> ContextResult<Prediction> {
        self.model()?.predict(session)
    }

    /// Drift record for a session.
    pub fn drift(&self, session: &Session) -> ContextResult<DriftRecord> {
        self.model()?.drift(session)
    }
}
