//! Physiological drift: observed minus expected heart rate.
//!
//! Positive drift means the heart is working harder than the load explains (heat,
//! fatigue, illness); negative drift means it is working less (freshness, cold).

use serde::{Deserialize, Serialize};

/// Session-level drift summary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriftSummary {
    /// Mean residual over valid samples (bpm)
    pub mean_residual: f64,
    /// Standard deviation of the residual over valid samples (bpm)
    pub residual_std: f64,
    /// Linear trend of the residual (bpm per minute)
    pub trend_slope: f64,
    /// Index of the largest absolute residual
    pub peak_index: Option<usize>,
    /// Residual at `peak_index`
    pub peak_residual: f64,
    /// Samples with a defined residual
    pub valid_samples: usize,
}

/// Per-sample expected/observed heart rate and their difference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftRecord {
    /// Heart rate the twin expects (bpm)
    pub expected: Vec<f64>,
    /// Observed heart rate (bpm, NaN where invalid)
    pub observed: Vec<f64>,
    /// observed − expected (NaN where invalid)
    pub residual: Vec<f64>,
    /// Session summary
    pub summary: DriftSummary,
}

impl DriftRecord {
    /// Assemble a record; `elapsed_secs` positions each sample in time for the trend.
    pub fn new(expected: Vec<f64>, observed: Vec<f64>, elapsed_secs: &[f64]) -> Self {
        let residual: Vec<f64> = expected
            .iter()
            .zip(&observed)
            .map(|(e, o)| if o.is_finite() { o - e } else { f64::NAN })
            .collect();
        let summary = summarize(&residual, elapsed_secs);
        Self {
            expected,
            observed,
            residual,
            summary,
        }
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.residual.len()
    }

    /// Whether the record has no samples.
    pub fn is_empty(&self) -> bool {
        self.residual.is_empty()
    }
}

fn summarize(residual: &[f64], elapsed_secs: &[f64]) -> DriftSummary {
    let valid: Vec<(usize, f64)> = residual
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, r)| r.is_finite())
        .collect();

    if valid.is_empty() {
        return DriftSummary {
            mean_residual: f64::NAN,
            residual_std: f64::NAN,
            trend_slope: 0.0,
            peak_index: None,
            peak_residual: f64::NAN,
            valid_samples: 0,
        };
    }

    let n = valid.len() as f64;
    let mean = valid.iter().map(|(_, r)| r).sum::<f64>() / n;
    let std = (valid.iter().map(|(_, r)| (r - mean).powi(2)).sum::<f64>() / n).sqrt();

    let (peak_index, peak_residual) = valid
        .iter()
        .copied()
        .fold((valid[0].0, valid[0].1), |best, cur| {
            if cur.1.abs() > best.1.abs() {
                cur
            } else {
                best
            }
        });

    let points: Vec<(f64, f64)> = valid
        .iter()
        .map(|(i, r)| {
            let minutes = elapsed_secs.get(*i).copied().unwrap_or(*i as f64) / 60.0;
            (minutes, *r)
        })
        .collect();

    DriftSummary {
        mean_residual: mean,
        residual_std: std,
        trend_slope: slope(&points),
        peak_index: Some(peak_index),
        peak_residual,
        valid_samples: valid.len(),
    }
}

/// Least-squares slope of (x, y) pairs; 0 when x has no spread.
fn slope(points: &[(f64, f64)]) -> f64 {
    let n = points.len() as f64;
    if points.len() < 2 {
        return 0.0;
    }

    let sum_x: f64 = points.iter().map(|(x, _)| x).sum();
    let sum_y: f64 = points.iter().map(|(_, y)| y).sum();
    let sum_xy: f64 = points.iter().map(|(x, y)| x * y).sum();
    let sum_xx: f64 = points.iter().map(|(x, _)| x * x).sum();

    let denom = n * sum_xx - sum_x * sum_x;
    if denom.abs() < 1e-10 {
        return 0.0;
    }
    (n * sum_xy - sum_x * sum_y) / denom
}
