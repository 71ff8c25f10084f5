//! Weather context attached to a ride.
//!
//! Weather may be absent, constant for the whole session, or resolved per sample.

use serde::{Deserialize, Serialize};

use crate::error::{ContextError, ContextResult};

/// Wind vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Wind {
    /// Wind speed in m/s
    pub speed_mps: f64,
    /// Direction the wind blows from, in degrees (meteorological convention)
    pub bearing_deg: f64,
}

impl Wind {
    /// Create a wind vector.
    pub fn new(speed_mps: f64, bearing_deg: f64) -> Self {
        Self {
            speed_mps,
            bearing_deg,
        }
    }

    /// Component of this wind opposing travel along `heading_deg`.
    ///
    /// Positive values are headwind, negative values tailwind.
    pub fn headwind_component(&self, heading_deg: f64) -> f64 {
        self.speed_mps * (self.bearing_deg - heading_deg).to_radians().cos()
    }
}

/// A single weather observation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WeatherObservation {
    /// Wind, if known
    pub wind: Option<Wind>,
    /// Air temperature in °C
    pub temperature_c: Option<f64>,
    /// Relative humidity (0-100)
    pub humidity_pct: Option<f64>,
}

impl WeatherObservation {
    /// Observation with wind only.
    pub fn with_wind(wind: Wind) -> Self {
        Self {
            wind: Some(wind),
            ..Default::default()
        }
    }
}

/// Weather for a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum WeatherContext {
    /// No weather data (neutral defaults are substituted)
    #[default]
    Unavailable,
    /// One observation for the whole session
    Session(WeatherObservation),
    /// One observation per activity sample
    PerSample(Vec<WeatherObservation>),
}

impl WeatherContext {
    /// Expand to one observation per sample.
    ///
    /// Fails when a per-sample series does not match the activity length.
    pub fn observations(&self, len: usize) -> ContextResult<Vec<WeatherObservation>> {
        match self {
            WeatherContext::Unavailable => Ok(vec![WeatherObservation::default(); len]),
            WeatherContext::Session(obs) => Ok(vec![*obs; len]),
            WeatherContext::PerSample(series) => {
                if series.len() != len {
                    return Err(ContextError::InvalidInput(format!(
                        "weather has {} samples, activity has {}",
                        series.len(),
                        len
                    )));
                }
                Ok(series.clone())
            }
        }
    }

    /// Per-sample wind, or `None` when no sample carries wind data.
    ///
    /// Samples without wind inside an otherwise windy series read as calm.
    pub fn wind_series(&self, len: usize) -> ContextResult<Option<Vec<Wind>>> {
        let observations = self.observations(len)?;
        if observations.iter().all(|o| o.wind.is_none()) {
            return Ok(None);
        }
        Ok(Some(
            observations
                .iter()
                .map(|o| o.wind.unwrap_or(Wind::new(0.0, 0.0)))
                .collect(),
        ))
    }

    /// Per-sample temperature, substituting `neutral` where unknown.
    pub fn temperatures(&self, len: usize, neutral: f64) -> ContextResult<Vec<f64>> {
        Ok(self
            .observations(len)?
            .iter()
            .map(|o| o.temperature_c.filter(|t| t.is_finite()).unwrap_or(neutral))
            .collect())
    }

    /// Per-sample humidity, substituting `neutral` where unknown.
    pub fn humidities(&self, len: usize, neutral: f64) -> ContextResult<Vec<f64>> {
        Ok(self
            .observations(len)?
            .iter()
            .map(|o| o.humidity_pct.filter(|h| h.is_finite()).unwrap_or(neutral))
            .collect())
    }
}
