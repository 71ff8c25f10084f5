//! Random forest regressor: bootstrap-aggregated CART trees.
//!
//! Each tree draws its bootstrap sample from its own generator seeded with
//! `seed + tree index`, so trees can be grown in parallel and the forest is still
//! reproducible.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::regressor::{check_training_shape, Regressor};
use crate::error::ContextResult;

/// Forest hyper-parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestConfig {
    /// Number of trees
    pub n_trees: usize,
    /// Maximum depth of each tree
    pub max_depth: usize,
    /// Minimum samples on each side of a split
    pub min_samples_leaf: usize,
    /// Seed for bootstrap sampling
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 15,
            min_samples_leaf: 1,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf(f64),
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn predict(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf(value) => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }
}

struct TreeBuilder<'a> {
    x: &'a [Vec<f64>],
    y: &'a [f64],
    max_depth: usize,
    min_leaf: usize,
    nodes: Vec<Node>,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    cost: f64,
}

impl<'a> TreeBuilder<'a> {
    fn build(mut self, indices: Vec<usize>) -> Tree {
        self.grow(indices, 0);
        Tree { nodes: self.nodes }
    }

    fn grow(&mut self, indices: Vec<usize>, depth: usize) -> usize {
        let slot = self.nodes.len();
        let mean = indices.iter().map(|&i| self.y[i]).sum::<f64>() / indices.len() as f64;
        self.nodes.push(Node::Leaf(mean));

        if depth >= self.max_depth || indices.len() < 2 * self.min_leaf {
            return slot;
        }
        let Some(split) = self.best_split(&indices) else {
            return slot;
        };

        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| self.x[i][split.feature] <= split.threshold);
        let left = self.grow(left, depth + 1);
        let right = self.grow(right, depth + 1);
        self.nodes[slot] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        slot
    }

    /// Split minimising the summed squared error of both children.
    fn best_split(&self, indices: &[usize]) -> Option<BestSplit> {
        let n = indices.len();
        let total: f64 = indices.iter().map(|&i| self.y[i]).sum();
        let total_sq: f64 = indices.iter().map(|&i| self.y[i] * self.y[i]).sum();
        let parent_cost = total_sq - total * total / n as f64;
        if parent_cost <= 1e-12 {
            return None;
        }

        let width = self.x[indices[0]].len();
        let mut best: Option<BestSplit> = None;
        let mut order = indices.to_vec();

        for feature in 0..width {
            order.sort_by(|&a, &b| self.x[a][feature].total_cmp(&self.x[b][feature]));

            let (mut sum_l, mut sq_l) = (0.0, 0.0);
            for k in 1..n {
                let prev = order[k - 1];
                sum_l += self.y[prev];
                sq_l += self.y[prev] * self.y[prev];

                if k < self.min_leaf || n - k < self.min_leaf {
                    continue;
                }
                let (lo, hi) = (self.x[prev][feature], self.x[order[k]][feature]);
                if lo >= hi {
                    continue;
                }

                let (n_l, n_r) = (k as f64, (n - k) as f64);
                let (sum_r, sq_r) = (total - sum_l, total_sq - sq_l);
                let cost = (sq_l - sum_l * sum_l / n_l) + (sq_r - sum_r * sum_r / n_r);
                if best.as_ref().map_or(true, |b| cost < b.cost) {
                    best = Some(BestSplit {
                        feature,
                        threshold: lo + (hi - lo) / 2.0,
                        cost,
                    });
                }
            }
        }

        best.filter(|b| b.cost < parent_cost)
    }
}

/// Bagged regression trees.
#[derive(Debug, Clone)]
pub struct ForestRegressor {
    config: ForestConfig,
    trees: Vec<Tree>,
}

impl ForestRegressor {
    /// Create an untrained forest.
    pub fn new(config: ForestConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
        }
    }

    /// Number of trained trees.
    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }
}

impl Regressor for ForestRegressor {
    fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> ContextResult<()> {
        check_training_shape(x, y)?;
        let n = x.len();
        let config = &self.config;

        self.trees = (0..config.n_trees.max(1))
            .into_par_iter()
            .map(|t| {
                let mut rng = ChaCha8Rng::seed_from_u64(config.seed.wrapping_add(t as u64));
                let sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                TreeBuilder {
                    x,
                    y,
                    max_depth: config.max_depth,
                    min_leaf: config.min_samples_leaf.max(1),
                    nodes: Vec::new(),
                }
                .build(sample)
            })
            .collect();
        Ok(())
    }

    fn predict(&self, x: &[Vec<f64>]) -> Vec<f64> {
        if self.trees.is_empty() {
            return vec![f64::NAN; x.len()];
        }
        x.par_iter()
            .map(|row| {
                self.trees.iter().map(|t| t.predict(row)).sum::<f64>() / self.trees.len() as f64
            })
            .collect()
    }

    fn name(&self) -> &'static str {
        "forest"
    }
}
