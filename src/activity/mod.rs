//! Ride recordings as delivered by the parsing and alignment collaborators.
//!
//! Samples arrive time-ordered and aligned. A sample without a usable heart rate or
//! speed is still kept (physics does not need heart rate) but is excluded from modeling.

pub mod weather;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use weather::{WeatherContext, WeatherObservation, Wind};

/// Mean Earth radius in meters.
const EARTH_RADIUS: f64 = 6_371_000.0;

/// A single aligned data point of a ride.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivitySample {
    /// Sample time
    pub timestamp: DateTime<Utc>,
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
    /// Altitude in meters
    pub altitude: f64,
    /// Cumulative distance in meters, if the device recorded it
    pub distance: Option<f64>,
    /// Ground speed in m/s
    pub speed: Option<f64>,
    /// Heart rate in BPM
    pub heart_rate: Option<f64>,
    /// Cadence in RPM
    pub cadence: Option<f64>,
    /// Measured power in watts
    pub power: Option<f64>,
}

impl ActivitySample {
    /// Create a sample at a position with everything else unset.
    pub fn new(timestamp: DateTime<Utc>, latitude: f64, longitude: f64, altitude: f64) -> Self {
        Self {
            timestamp,
            latitude,
            longitude,
            altitude,
            distance: None,
            speed: None,
            heart_rate: None,
            cadence: None,
            power: None,
        }
    }

    /// Set ground speed (m/s).
    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }

    /// Set heart rate (BPM).
    pub fn with_heart_rate(mut self, heart_rate: f64) -> Self {
        self.heart_rate = Some(heart_rate);
        self
    }

    /// Set cumulative distance (m).
    pub fn with_distance(mut self, distance: f64) -> Self {
        self.distance = Some(distance);
        self
    }

    /// Whether this sample can be used to train or score the twin.
    pub fn is_valid(&self) -> bool {
        let hr_ok = self.heart_rate.is_some_and(|hr| hr.is_finite() && hr > 0.0);
        let speed_ok = self.speed.is_some_and(f64::is_finite);
        hr_ok && speed_ok
    }
}

/// A complete, aligned ride recording.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    /// Activity identifier
    pub id: Uuid,
    /// Time-ordered samples
    pub samples: Vec<ActivitySample>,
}

impl Activity {
    /// Wrap aligned samples into an activity with a fresh id.
    pub fn new(samples: Vec<ActivitySample>) -> Self {
        Self {
            id: Uuid::new_v4(),
            samples,
        }
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the activity has no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Ground speed per sample; missing or non-finite speed reads as standstill.
    pub fn speeds(&self) -> Vec<f64> {
        self.samples
            .iter()
            .map(|s| s.speed.filter(|v| v.is_finite()).unwrap_or(0.0))
            .collect()
    }

    /// Observed heart rate per sample, NaN where the sample is invalid for modeling.
    pub fn heart_rates(&self) -> Vec<f64> {
        self.samples
            .iter()
            .map(|s| {
                if s.is_valid() {
                    s.heart_rate.unwrap_or(f64::NAN)
                } else {
                    f64::NAN
                }
            })
            .collect()
    }

    /// Altitude per sample.
    pub fn altitudes(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.altitude).collect()
    }

    /// Validity mask for modeling.
    pub fn valid_mask(&self) -> Vec<bool> {
        self.samples.iter().map(ActivitySample::is_valid).collect()
    }

    /// Number of samples usable for modeling.
    pub fn valid_count(&self) -> usize {
        self.samples.iter().filter(|s| s.is_valid()).count()
    }

    /// Seconds elapsed since the first sample.
    pub fn elapsed_secs(&self) -> Vec<f64> {
        let Some(first) = self.samples.first() else {
            return Vec::new();
        };
        self.samples
            .iter()
            .map(|s| (s.timestamp - first.timestamp).num_milliseconds() as f64 / 1000.0)
            .collect()
    }

    /// Whether timestamps never go backwards.
    pub fn is_time_ordered(&self) -> bool {
        self.samples
            .windows(2)
            .all(|w| w[1].timestamp >= w[0].timestamp)
    }

    /// Cumulative distance in meters.
    ///
    /// Uses the recorded distance where present and falls back to accumulating the
    /// great-circle distance between consecutive positions.
    pub fn distances(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.samples.len());
        let mut total = 0.0;
        for (i, sample) in self.samples.iter().enumerate() {
            if let Some(d) = sample.distance.filter(|d| d.is_finite()) {
                total = d;
            } else if i > 0 {
                let prev = &self.samples[i - 1];
                total += haversine_distance(
                    prev.latitude,
                    prev.longitude,
                    sample.latitude,
                    sample.longitude,
                );
            }
            out.push(total);
        }
        out
    }

    /// Direction of travel per sample in degrees (0 = north, clockwise).
    ///
    /// The first sample takes the heading of the first movement; samples where the
    /// position does not change keep the previous heading.
    pub fn headings(&self) -> Vec<f64> {
        let n = self.samples.len();
        let mut headings = vec![f64::NAN; n];
        for i in 1..n {
            let a = &self.samples[i - 1];
            let b = &self.samples[i];
            if a.latitude != b.latitude || a.longitude != b.longitude {
                headings[i] = initial_bearing(a.latitude, a.longitude, b.latitude, b.longitude);
            }
        }

        let first_known = headings.iter().copied().find(|h| !h.is_nan()).unwrap_or(0.0);
        let mut last = first_known;
        for h in headings.iter_mut() {
            if h.is_nan() {
                *h = last;
            } else {
                last = *h;
            }
        }
        headings
    }
}

/// Great-circle distance between two GPS points (Haversine formula), in meters.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS * c
}

/// Initial bearing from the first point to the second, in degrees [0, 360).
pub fn initial_bearing(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1, lat2) = (lat1.to_radians(), lat2.to_radians());
    let d_lon = (lon2 - lon1).to_radians();

    let x = d_lon.sin() * lat2.cos();
    let y = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * d_lon.cos();

    (x.atan2(y).to_degrees() + 360.0) % 360.0
}
