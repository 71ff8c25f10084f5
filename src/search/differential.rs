//! Differential evolution (DE/rand/1/bin).

use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::{PopulationOptimizer, Scored, SearchSpace};

/// Differential evolution parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DifferentialEvolutionConfig {
    /// Number of population members
    pub population_size: usize,
    /// Scale factor applied to the difference vector (F)
    pub differential_weight: f64,
    /// Probability of taking each gene from the mutant (CR)
    pub crossover_probability: f64,
}

impl Default for DifferentialEvolutionConfig {
    fn default() -> Self {
        Self {
            population_size: 50,
            differential_weight: 0.5,
            crossover_probability: 0.9,
        }
    }
}

/// Seeded differential evolution optimizer.
#[derive(Debug, Clone)]
pub struct DifferentialEvolution {
    config: DifferentialEvolutionConfig,
    rng: ChaCha8Rng,
}

impl DifferentialEvolution {
    /// Create an optimizer. Without a seed the generator draws OS entropy and runs are
    /// not reproducible.
    pub fn new(config: DifferentialEvolutionConfig, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Self { config, rng }
    }

    fn sample_in(&mut self, space: &SearchSpace, dim: usize) -> f64 {
        let (lo, hi) = (space.lower(dim), space.upper(dim));
        if hi > lo {
            self.rng.gen_range(lo..=hi)
        } else {
            lo
        }
    }
}

impl PopulationOptimizer for DifferentialEvolution {
    fn population_size(&self) -> usize {
        self.config.population_size.max(1)
    }

    fn initialize(&mut self, space: &SearchSpace) -> Vec<Vec<f64>> {
        (0..self.population_size())
            .map(|_| {
                (0..space.dimensions())
                    .map(|dim| self.sample_in(space, dim))
                    .collect()
            })
            .collect()
    }

    fn evolve(&mut self, population: &[Scored], space: &SearchSpace) -> Vec<Vec<f64>> {
        let n = population.len();
        let dims = space.dimensions();
        let f = self.config.differential_weight;
        let cr = self.config.crossover_probability;

        (0..n)
            .map(|i| {
                // Too few members for three distinct donors: fall back to random restarts
                if n < 4 || dims == 0 {
                    return (0..dims).map(|dim| self.sample_in(space, dim)).collect();
                }

                let donors: Vec<usize> = index::sample(&mut self.rng, n - 1, 3)
                    .into_iter()
                    .map(|d| if d >= i { d + 1 } else { d })
                    .collect();
                let (a, b, c) = (
                    &population[donors[0]].position,
                    &population[donors[1]].position,
                    &population[donors[2]].position,
                );
                let target = &population[i].position;
                let forced = self.rng.gen_range(0..dims);

                let mut trial: Vec<f64> = (0..dims)
                    .map(|dim| {
                        if dim == forced || self.rng.gen::<f64>() < cr {
                            a[dim] + f * (b[dim] - c[dim])
                        } else {
                            target[dim]
                        }
                    })
                    .collect();
                space.clamp(&mut trial);
                trial
            })
            .collect()
    }
}
