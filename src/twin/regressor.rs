//! Pluggable regression behind a narrow fit/predict capability.

use std::fmt::Debug;

use serde::{Deserialize, Serialize};

use super::forest::{ForestConfig, ForestRegressor};
use crate::error::{ContextError, ContextResult};

/// Smallest pivot accepted by the linear solver.
const PIVOT_EPSILON: f64 = 1e-12;

/// Anything that can learn `y ≈ f(x)` from rows of features.
///
/// Implementations must be deterministic for identical training data and configuration.
pub trait Regressor: Send + Sync + Debug {
    /// Train on `x` (one row per sample) and targets `y`.
    fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> ContextResult<()>;

    /// Predict one value per row.
    fn predict(&self, x: &[Vec<f64>]) -> Vec<f64>;

    /// Short identifier for logs.
    fn name(&self) -> &'static str;
}

/// Regressor selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RegressorConfig {
    /// Standardised ridge least squares
    Linear {
        /// L2 penalty on standardised weights
        ridge: f64,
    },
    /// Bagged regression trees
    Forest(ForestConfig),
}

impl Default for RegressorConfig {
    fn default() -> Self {
        RegressorConfig::Linear { ridge: 1e-3 }
    }
}

impl RegressorConfig {
    /// Create an untrained regressor.
    pub fn build(&self) -> Box<dyn Regressor> {
        match self {
            RegressorConfig::Linear { ridge } => Box::new(LinearRegressor::new(*ridge)),
            RegressorConfig::Forest(config) => Box::new(ForestRegressor::new(config.clone())),
        }
    }
}

pub(crate) fn check_training_shape(x: &[Vec<f64>], y: &[f64]) -> ContextResult<usize> {
    if x.len() != y.len() {
        return Err(ContextError::InvalidInput(format!(
            "{} feature rows but {} targets",
            x.len(),
            y.len()
        )));
    }
    let Some(first) = x.first() else {
        return Err(ContextError::InvalidInput(
            "no training rows".to_string(),
        ));
    };
    let width = first.len();
    if x.iter().any(|row| row.len() != width) {
        return Err(ContextError::InvalidInput(
            "training rows have differing widths".to_string(),
        ));
    }
    Ok(width)
}

/// Ridge regression on standardised features.
///
/// Features are centred and scaled before solving `(ZᵀZ + λI)w = Zᵀ(y − ȳ)`, so the
/// penalty treats every feature alike and constant columns simply get zero weight.
#[derive(Debug, Clone, Default)]
pub struct LinearRegressor {
    ridge: f64,
    means: Vec<f64>,
    scales: Vec<f64>,
    weights: Vec<f64>,
    intercept: f64,
}

impl LinearRegressor {
    /// Create an untrained regressor with the given penalty.
    pub fn new(ridge: f64) -> Self {
        Self {
            ridge: ridge.max(0.0),
            ..Default::default()
        }
    }

    /// Weights in original feature units.
    pub fn coefficients(&self) -> Vec<f64> {
        self.weights
            .iter()
            .zip(&self.scales)
            .map(|(w, s)| w / s)
            .collect()
    }

    /// Prediction at the all-zero feature row.
    pub fn intercept(&self) -> f64 {
        self.intercept
            - self
                .coefficients()
                .iter()
                .zip(&self.means)
                .map(|(c, m)| c * m)
                .sum::<f64>()
    }
}

impl Regressor for LinearRegressor {
    fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> ContextResult<()> {
        let d = check_training_shape(x, y)?;
        let n = x.len() as f64;

        let means: Vec<f64> = (0..d)
            .map(|j| x.iter().map(|row| row[j]).sum::<f64>() / n)
            .collect();
        let scales: Vec<f64> = (0..d)
            .map(|j| {
                let var = x.iter().map(|row| (row[j] - means[j]).powi(2)).sum::<f64>() / n;
                let std = var.sqrt();
                if std > PIVOT_EPSILON {
                    std
                } else {
                    1.0
                }
            })
            .collect();
        let y_mean = y.iter().sum::<f64>() / n;

        let mut a = vec![vec![0.0; d]; d];
        let mut b = vec![0.0; d];
        for (row, target) in x.iter().zip(y) {
            let z: Vec<f64> = (0..d).map(|j| (row[j] - means[j]) / scales[j]).collect();
            let centred = target - y_mean;
            for j in 0..d {
                b[j] += z[j] * centred;
                for k in j..d {
                    a[j][k] += z[j] * z[k];
                }
            }
        }
        for j in 0..d {
            for k in 0..j {
                a[j][k] = a[k][j];
            }
            a[j][j] += self.ridge;
        }

        self.weights = solve(a, b)?;
        self.means = means;
        self.scales = scales;
        self.intercept = y_mean;
        Ok(())
    }

    fn predict(&self, x: &[Vec<f64>]) -> Vec<f64> {
        x.iter()
            .map(|row| {
                self.intercept
                    + row
                        .iter()
                        .zip(&self.means)
                        .zip(&self.scales)
                        .zip(&self.weights)
                        .map(|(((v, m), s), w)| w * (v - m) / s)
                        .sum::<f64>()
            })
            .collect()
    }

    fn name(&self) -> &'static str {
        "linear"
    }
}

/// Solve `a · w = b` by Gaussian elimination with partial pivoting.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> ContextResult<Vec<f64>> {
    let d = b.len();
    for col in 0..d {
        let pivot = (col..d)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        if a[pivot][col].abs() < PIVOT_EPSILON {
            return Err(ContextError::Regression(
                "singular normal equations (collinear features without ridge penalty)"
                    .to_string(),
            ));
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in (col + 1)..d {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..d {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut w = vec![0.0; d];
    for row in (0..d).rev() {
        let tail: f64 = ((row + 1)..d).map(|k| a[row][k] * w[k]).sum();
        w[row] = (b[row] - tail) / a[row][row];
    }
    Ok(w)
}
