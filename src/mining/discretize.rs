//! Binning of continuous summary values into categorical items.

use serde::{Deserialize, Serialize};

use super::summary::SummaryFeature;

/// How bin edges are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinningStrategy {
    /// Equal-width bins between the observed min and max
    EqualWidth,
    /// Bins holding roughly equal numbers of sessions
    #[default]
    Quantile,
    /// Configured cut points; features without any fall back to equal width
    Fixed,
}

/// Cut points for one feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureEdges {
    /// Feature the cut points apply to
    pub feature: SummaryFeature,
    /// Interior cut points, ascending
    pub edges: Vec<f64>,
}

/// Tailwind / neutral / headwind at ±1 m/s and flat / climb at 2 %.
pub fn default_fixed_edges() -> Vec<FeatureEdges> {
    vec![
        FeatureEdges {
            feature: SummaryFeature::Headwind,
            edges: vec![-1.0, 1.0],
        },
        FeatureEdges {
            feature: SummaryFeature::Gradient,
            edges: vec![0.02],
        },
    ]
}

/// Interior cut points of one feature. Value `v` lands in the bin counting the edges `<= v`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bins {
    /// Binned feature
    pub feature: SummaryFeature,
    /// Interior cut points, ascending
    pub edges: Vec<f64>,
}

impl Bins {
    /// Number of bins.
    pub fn count(&self) -> usize {
        self.edges.len() + 1
    }

    /// Bin of a value; `None` for non-finite values.
    pub fn bin_of(&self, value: f64) -> Option<usize> {
        if !value.is_finite() {
            return None;
        }
        Some(self.edges.partition_point(|edge| *edge <= value))
    }

    /// Value range of a bin; open ends are `None`.
    pub fn range(&self, bin: usize) -> (Option<f64>, Option<f64>) {
        let lower = bin.checked_sub(1).and_then(|i| self.edges.get(i)).copied();
        let upper = self.edges.get(bin).copied();
        (lower, upper)
    }
}

fn finite_sorted(values: &[f64]) -> Vec<f64> {
    let mut finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    finite.sort_by(f64::total_cmp);
    finite
}

/// Equal-width interior edges. Empty when no value is finite.
pub fn equal_width_edges(values: &[f64], bins: usize) -> Vec<f64> {
    let sorted = finite_sorted(values);
    let (Some(&min), Some(&max)) = (sorted.first(), sorted.last()) else {
        return Vec::new();
    };
    let width = (max - min) / bins.max(1) as f64;
    (1..bins.max(1)).map(|k| min + width * k as f64).collect()
}

/// Quantile interior edges (linear interpolation). Empty when no value is finite.
pub fn quantile_edges(values: &[f64], bins: usize) -> Vec<f64> {
    let sorted = finite_sorted(values);
    if sorted.is_empty() {
        return Vec::new();
    }
    let last = (sorted.len() - 1) as f64;
    (1..bins.max(1))
        .map(|k| {
            let pos = last * k as f64 / bins as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            let frac = pos - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        })
        .collect()
}

/// Build bins for `feature` from the observed `values`.
pub fn bins_for(
    feature: SummaryFeature,
    values: &[f64],
    strategy: BinningStrategy,
    bins: usize,
    fixed: &[FeatureEdges],
) -> Bins {
    let edges = match strategy {
        BinningStrategy::EqualWidth => equal_width_edges(values, bins),
        BinningStrategy::Quantile => quantile_edges(values, bins),
        BinningStrategy::Fixed => match fixed.iter().find(|f| f.feature == feature) {
            Some(configured) => {
                let mut edges = configured.edges.clone();
                edges.sort_by(f64::total_cmp);
                edges
            }
            None => equal_width_edges(values, bins),
        },
    };
    Bins { feature, edges }
}
