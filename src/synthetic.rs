//! Deterministic synthetic rides for demos and tests.
//!
//! A ride follows a straight line at constant speed and grade. Heart rate is a linear
//! function of the virtual power the physics engine assigns to that load, plus an optional
//! heat response and uniform noise.

use chrono::{DateTime, Duration, Utc};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use uuid::Uuid;

use crate::activity::{Activity, ActivitySample, WeatherContext, WeatherObservation, Wind};
use crate::physics::PhysicsEngine;

/// Meters per degree of latitude.
const METERS_PER_DEGREE: f64 = 111_320.0;

/// Shape of one synthetic ride.
#[derive(Debug, Clone, PartialEq)]
pub struct RideProfile {
    /// Number of 1 Hz samples
    pub samples: usize,
    /// Ground speed (m/s)
    pub speed_mps: f64,
    /// Constant grade (rise/run)
    pub gradient: f64,
    /// Direction of travel (degrees from north)
    pub heading_deg: f64,
    /// Wind, if observed
    pub wind: Option<Wind>,
    /// Air temperature, if observed
    pub temperature_c: Option<f64>,
    /// Heart rate at zero power
    pub base_heart_rate: f64,
    /// Heart-rate rise per watt
    pub bpm_per_watt: f64,
    /// Heart-rate rise per °C above 20 °C
    pub bpm_per_degree: f64,
    /// Constant offset added on top of the model (bpm)
    pub extra_bpm: f64,
    /// Half-width of uniform heart-rate noise (bpm)
    pub noise_bpm: f64,
}

impl Default for RideProfile {
    fn default() -> Self {
        Self {
            samples: 600,
            speed_mps: 8.0,
            gradient: 0.0,
            heading_deg: 0.0,
            wind: None,
            temperature_c: None,
            base_heart_rate: 100.0,
            bpm_per_watt: 0.2,
            bpm_per_degree: 0.0,
            extra_bpm: 0.0,
            noise_bpm: 0.0,
        }
    }
}

/// Seeded generator of rides.
#[derive(Debug, Clone)]
pub struct SyntheticRideBuilder {
    rng: ChaCha8Rng,
    engine: PhysicsEngine,
    start: DateTime<Utc>,
}

impl SyntheticRideBuilder {
    /// Create a generator with a deterministic seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            engine: PhysicsEngine::default(),
            start: DateTime::<Utc>::default() + Duration::days(19_700),
        }
    }

    /// Use a specific physics engine for the heart-rate model.
    pub fn with_engine(mut self, engine: PhysicsEngine) -> Self {
        self.engine = engine;
        self
    }

    /// Build one ride.
    pub fn ride(&mut self, profile: &RideProfile) -> (Activity, WeatherContext) {
        let heading = profile.heading_deg.to_radians();
        let headwind = profile
            .wind
            .map_or(0.0, |w| w.headwind_component(profile.heading_deg));
        let power = self
            .engine
            .power_at(profile.gradient, headwind, profile.speed_mps);
        let heat = profile
            .temperature_c
            .map_or(0.0, |t| profile.bpm_per_degree * (t - 20.0));

        let (lat0, lon0, alt0): (f64, f64, f64) = (46.05, 14.5, 300.0);
        let samples = (0..profile.samples)
            .map(|i| {
                let d = profile.speed_mps * i as f64;
                let lat = lat0 + d * heading.cos() / METERS_PER_DEGREE;
                let lon = lon0 + d * heading.sin() / (METERS_PER_DEGREE * lat0.to_radians().cos());
                let noise = if profile.noise_bpm > 0.0 {
                    self.rng.gen_range(-profile.noise_bpm..=profile.noise_bpm)
                } else {
                    0.0
                };
                let hr = profile.base_heart_rate
                    + profile.bpm_per_watt * power
                    + heat
                    + profile.extra_bpm
                    + noise;
                ActivitySample::new(
                    self.start + Duration::seconds(i as i64),
                    lat,
                    lon,
                    alt0 + profile.gradient * d,
                )
                .with_distance(d)
                .with_speed(profile.speed_mps)
                .with_heart_rate(hr)
            })
            .collect();
        self.start += Duration::days(1);

        let weather = if profile.wind.is_none() && profile.temperature_c.is_none() {
            WeatherContext::Unavailable
        } else {
            WeatherContext::Session(WeatherObservation {
                wind: profile.wind,
                temperature_c: profile.temperature_c,
                humidity_pct: None,
            })
        };
        let mut activity = Activity::new(samples);
        activity.id = Uuid::from_u128(self.rng.gen());
        (activity, weather)
    }

    /// A randomised profile: varied speed, grade, wind and temperature.
    ///
    /// Rides into a strong headwind carry an extra `struggle_bpm` the physics does not
    /// account for.
    pub fn random_profile(&mut self, samples: usize, struggle_bpm: f64) -> RideProfile {
        let wind = Wind::new(self.rng.gen_range(0.0..6.0), self.rng.gen_range(0.0..360.0));
        let heading_deg = self.rng.gen_range(0.0..360.0);
        let headwind = wind.headwind_component(heading_deg);
        RideProfile {
            samples,
            speed_mps: self.rng.gen_range(6.0..10.0),
            gradient: self.rng.gen_range(-0.02..0.04),
            heading_deg,
            wind: Some(wind),
            temperature_c: Some(self.rng.gen_range(10.0..30.0)),
            bpm_per_degree: 0.3,
            extra_bpm: if headwind > 3.0 { struggle_bpm } else { 0.0 },
            noise_bpm: 2.0,
            ..Default::default()
        }
    }

    /// A history of randomised rides.
    pub fn history(&mut self, sessions: usize, samples: usize) -> Vec<(Activity, WeatherContext)> {
        (0..sessions)
            .map(|_| {
                let profile = self.random_profile(samples, 8.0);
                self.ride(&profile)
            })
            .collect()
    }
}
