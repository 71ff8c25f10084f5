//! Physics engine for estimating rider power from speed, terrain and wind.
//!
//! Implements the usual road-cycling resistance model: rolling resistance, gravity
//! along the slope, and aerodynamic drag against the effective air speed.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::PhysicsFeatures;
use crate::activity::{Activity, WeatherContext, Wind};
use crate::error::{ContextError, ContextResult};

/// Physics constants
const GRAVITY: f64 = 9.81; // m/s²
const AIR_DENSITY: f64 = 1.225; // kg/m³ at sea level
const DEFAULT_CDA: f64 = 0.32; // m² (hoods position)
const DEFAULT_CRR: f64 = 0.005; // Rolling resistance for mixed road surfaces
const BIKE_MASS: f64 = 10.0; // kg
const MIN_RUN_METERS: f64 = 0.1;

/// Physical constants of the rider/bike system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Rider mass in kilograms
    pub rider_mass_kg: f64,
    /// Bike mass in kilograms
    pub bike_mass_kg: f64,
    /// Rolling resistance coefficient
    pub crr: f64,
    /// Air density in kg/m³
    pub air_density: f64,
    /// Drag coefficient times frontal area (CdA) in m²
    pub cda: f64,
    /// Rolling window (samples) for altitude smoothing and rise/run
    pub gradient_window: usize,
    /// Gradients are clipped to ± this rise/run
    pub max_gradient: f64,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            rider_mass_kg: 75.0,
            bike_mass_kg: BIKE_MASS,
            crr: DEFAULT_CRR,
            air_density: AIR_DENSITY,
            cda: DEFAULT_CDA,
            gradient_window: 10,
            max_gradient: 0.25,
        }
    }
}

impl PhysicsConfig {
    /// Total system mass (rider + bike).
    pub fn total_mass(&self) -> f64 {
        self.rider_mass_kg + self.bike_mass_kg
    }
}

fn check_len(name: &str, got: usize, expected: usize) -> ContextResult<()> {
    if got != expected {
        return Err(ContextError::InvalidInput(format!(
            "{} has {} samples, expected {}",
            name, got, expected
        )));
    }
    Ok(())
}

/// Wind component along the direction of travel for every sample.
///
/// Positive values oppose motion. Without wind data every sample is 0.
pub fn headwind(headings: &[f64], wind: Option<&[Wind]>) -> ContextResult<Vec<f64>> {
    match wind {
        None => Ok(vec![0.0; headings.len()]),
        Some(wind) => {
            check_len("wind", wind.len(), headings.len())?;
            Ok(headings
                .iter()
                .zip(wind)
                .map(|(heading, w)| w.headwind_component(*heading))
                .collect())
        }
    }
}

/// Smoothed rise over run.
///
/// Altitude and distance are averaged over a centred window and the slope is taken
/// between the window edges. Windows shrink to one side at the sequence boundaries.
/// When the smoothed run vanishes the raw rise/run across the window is used, and a
/// zero run yields a flat gradient.
pub fn gradient(altitude: &[f64], distance: &[f64], window: usize) -> ContextResult<Vec<f64>> {
    check_len("distance", distance.len(), altitude.len())?;
    let n = altitude.len();
    let half = (window / 2).max(1);
    let bounds = |i: usize| (i.saturating_sub(half), (i + half).min(n.saturating_sub(1)));
    let smooth = |series: &[f64]| -> Vec<f64> {
        (0..n)
            .map(|i| {
                let (lo, hi) = bounds(i);
                let slice = &series[lo..=hi];
                slice.iter().sum::<f64>() / slice.len() as f64
            })
            .collect()
    };

    let alt_smooth = smooth(altitude);
    let dist_smooth = smooth(distance);

    Ok((0..n)
        .map(|i| {
            let (lo, hi) = bounds(i);
            let smooth_run = dist_smooth[hi] - dist_smooth[lo];
            let raw_run = distance[hi] - distance[lo];
            let grade = if smooth_run.is_finite() && smooth_run >= MIN_RUN_METERS {
                (alt_smooth[hi] - alt_smooth[lo]) / smooth_run
            } else if raw_run.is_finite() && raw_run >= MIN_RUN_METERS {
                (altitude[hi] - altitude[lo]) / raw_run
            } else {
                0.0
            };
            if grade.is_finite() {
                grade
            } else {
                0.0
            }
        })
        .collect())
}

/// Virtual power for a single sample in watts.
///
/// Sum of rolling resistance, gravity along the slope and aerodynamic drag. Drag acts on
/// the effective air speed `speed + headwind` and keeps its sign, so a strong tailwind
/// pushes. A rider at a standstill produces 0 W and the total never goes negative.
pub fn virtual_power(
    mass: f64,
    gradient: f64,
    headwind: f64,
    speed: f64,
    rolling_resistance_coeff: f64,
    air_density: f64,
    drag_area: f64,
) -> f64 {
    if !speed.is_finite() || speed <= 0.0 {
        return 0.0;
    }

    // For small angles: sin(atan(x)) ≈ x, but keep the exact form for steep ramps
    let angle = gradient.atan();
    let p_roll = rolling_resistance_coeff * mass * GRAVITY * angle.cos() * speed;
    let p_grav = mass * GRAVITY * angle.sin() * speed;

    let airspeed = speed + headwind;
    let p_aero = 0.5 * air_density * drag_area * airspeed * airspeed.abs() * speed;

    let total = p_roll + p_grav + p_aero;
    if total.is_finite() {
        total.max(0.0)
    } else {
        0.0
    }
}

/// Physics engine for calculating load features of a ride.
#[derive(Debug, Clone, Default)]
pub struct PhysicsEngine {
    config: PhysicsConfig,
}

impl PhysicsEngine {
    /// Create a physics engine with the given constants.
    pub fn new(config: PhysicsConfig) -> Self {
        Self { config }
    }

    /// Create a physics engine with default constants and the given rider mass.
    pub fn with_rider_mass(rider_mass_kg: f64) -> Self {
        Self::new(PhysicsConfig {
            rider_mass_kg,
            ..Default::default()
        })
    }

    /// Active constants.
    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    /// Virtual power for a single sample with this engine's constants.
    pub fn power_at(&self, gradient: f64, headwind: f64, speed: f64) -> f64 {
        virtual_power(
            self.config.total_mass(),
            gradient,
            headwind,
            speed,
            self.config.crr,
            self.config.air_density,
            self.config.cda,
        )
    }

    /// Virtual power series.
    pub fn virtual_power_series(
        &self,
        gradient: &[f64],
        headwind: &[f64],
        speed: &[f64],
    ) -> ContextResult<Vec<f64>> {
        check_len("gradient", gradient.len(), speed.len())?;
        check_len("headwind", headwind.len(), speed.len())?;
        Ok(speed
            .iter()
            .zip(gradient)
            .zip(headwind)
            .map(|((v, g), h)| self.power_at(*g, *h, *v))
            .collect())
    }

    /// Compute all physics features of a session.
    pub fn compute(
        &self,
        activity: &Activity,
        weather: &WeatherContext,
    ) -> ContextResult<PhysicsFeatures> {
        if !activity.is_time_ordered() {
            return Err(ContextError::InvalidInput(
                "activity samples are not time-ordered".to_string(),
            ));
        }

        let n = activity.len();
        let heading = activity.headings();
        let wind = weather.wind_series(n)?;
        let weather_degraded = wind.is_none();
        if weather_degraded && n > 0 {
            warn!(activity = %activity.id, "No wind data, assuming calm air");
        }

        let headwind = headwind(&heading, wind.as_deref())?;
        let gradient = gradient(
            &activity.altitudes(),
            &activity.distances(),
            self.config.gradient_window,
        )?
        .into_iter()
        .map(|g| g.clamp(-self.config.max_gradient, self.config.max_gradient))
        .collect::<Vec<_>>();
        let virtual_power = self.virtual_power_series(&gradient, &headwind, &activity.speeds())?;

        Ok(PhysicsFeatures {
            heading,
            headwind,
            gradient,
            virtual_power,
            weather_degraded,
        })
    }

    /// Re-derive features after shifting headwind and gradient by constant offsets.
    ///
    /// Offsets are applied to every sample; virtual power is recomputed from `speed`.
    pub fn perturbed(
        &self,
        features: &PhysicsFeatures,
        speed: &[f64],
        headwind_offset: f64,
        gradient_offset: f64,
    ) -> ContextResult<PhysicsFeatures> {
        let headwind: Vec<f64> = features.headwind.iter().map(|h| h + headwind_offset).collect();
        let gradient: Vec<f64> = features.gradient.iter().map(|g| g + gradient_offset).collect();
        let virtual_power = self.virtual_power_series(&gradient, &headwind, speed)?;
        Ok(PhysicsFeatures {
            heading: features.heading.clone(),
            headwind,
            gradient,
            virtual_power,
            weather_degraded: features.weather_degraded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_power(gradient: f64, headwind: f64, speed: f64) -> f64 {
        PhysicsEngine::default().power_at(gradient, headwind, speed)
    }

    #[test]
    fn test_zero_speed_gives_zero_power() {
        assert_eq!(default_power(0.1, 5.0, 0.0), 0.0);
        assert_eq!(default_power(0.0, 0.0, -2.0), 0.0);
    }

    #[test]
    fn test_flat_road_power() {
        // 5 m/s on flat ground in still air: roughly 20 W rolling + 25 W drag
        let power = default_power(0.0, 0.0, 5.0);
        assert!((power - 45.35).abs() < 0.1, "power was {}", power);
    }

    #[test]
    fn test_uphill_needs_more_power() {
        assert!(default_power(0.05, 0.0, 5.0) > default_power(0.0, 0.0, 5.0));
    }

    #[test]
    fn test_steep_descent_clamps_to_zero() {
        assert_eq!(default_power(-0.2, 0.0, 10.0), 0.0);
    }

    #[test]
    fn test_headwind_increases_power() {
        let calm = default_power(0.0, 0.0, 8.0);
        let head = default_power(0.0, 4.0, 8.0);
        let tail = default_power(0.0, -4.0, 8.0);
        assert!(head > calm);
        assert!(tail < calm);
    }

    #[test]
    fn test_headwind_without_wind_is_zero() {
        let out = headwind(&[0.0, 45.0, 270.0], None).unwrap();
        assert_eq!(out, vec![0.0; 3]);
    }

    #[test]
    fn test_headwind_length_mismatch() {
        let wind = [Wind::new(3.0, 0.0)];
        assert!(matches!(
            headwind(&[0.0, 0.0], Some(wind.as_slice())),
            Err(ContextError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_gradient_constant_slope() {
        let distance: Vec<f64> = (0..30).map(|i| i as f64 * 10.0).collect();
        let altitude: Vec<f64> = distance.iter().map(|d| 100.0 + d * 0.04).collect();
        let grad = gradient(&altitude, &distance, 10).unwrap();
        assert_eq!(grad.len(), 30);
        for g in &grad {
            assert!((g - 0.04).abs() < 1e-9, "gradient was {}", g);
        }
    }

    #[test]
    fn test_gradient_boundaries_defined() {
        let distance = vec![0.0, 5.0, 10.0];
        let altitude = vec![100.0, 100.5, 101.0];
        let grad = gradient(&altitude, &distance, 10).unwrap();
        assert!(grad.iter().all(|g| g.is_finite()));
    }

    #[test]
    fn test_gradient_zero_run_is_flat() {
        let grad = gradient(&[100.0, 105.0, 110.0], &[0.0, 0.0, 0.0], 4).unwrap();
        assert_eq!(grad, vec![0.0; 3]);
    }

    #[test]
    fn test_gradient_length_mismatch() {
        assert!(gradient(&[1.0, 2.0], &[0.0], 4).is_err());
    }

    #[test]
    fn test_perturbed_recomputes_power() {
        let engine = PhysicsEngine::default();
        let speed = vec![5.0; 4];
        let base = PhysicsFeatures {
            heading: vec![0.0; 4],
            headwind: vec![0.0; 4],
            gradient: vec![0.0; 4],
            virtual_power: engine
                .virtual_power_series(&[0.0; 4], &[0.0; 4], &speed)
                .unwrap(),
            weather_degraded: true,
        };
        let shifted = engine.perturbed(&base, &speed, 0.0, 0.02).unwrap();
        assert!(shifted.virtual_power[0] > base.virtual_power[0]);
        assert!((shifted.gradient[2] - 0.02).abs() < 1e-12);
    }
}
