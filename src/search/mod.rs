//! Generation-based black-box search.
//!
//! A [`PopulationOptimizer`] proposes candidates, a [`Fitness`] scores them, and
//! [`run_search`] drives the generations: candidates within one generation are scored
//! in parallel, generations run strictly one after another. Lower fitness is better.

pub mod differential;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ContextError, ContextResult};

pub use differential::{DifferentialEvolution, DifferentialEvolutionConfig};

/// Box-bounded continuous search space.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchSpace {
    lower: Vec<f64>,
    upper: Vec<f64>,
}

impl SearchSpace {
    /// Create a space from `(lower, upper)` pairs.
    pub fn new(bounds: &[(f64, f64)]) -> ContextResult<Self> {
        for (i, (lo, hi)) in bounds.iter().enumerate() {
            if !lo.is_finite() || !hi.is_finite() || lo > hi {
                return Err(ContextError::InvalidInput(format!(
                    "search bound {} is invalid: [{}, {}]",
                    i, lo, hi
                )));
            }
        }
        Ok(Self {
            lower: bounds.iter().map(|b| b.0).collect(),
            upper: bounds.iter().map(|b| b.1).collect(),
        })
    }

    /// Unit hypercube of the given dimension.
    pub fn unit(dimensions: usize) -> Self {
        Self {
            lower: vec![0.0; dimensions],
            upper: vec![1.0; dimensions],
        }
    }

    /// Number of dimensions.
    pub fn dimensions(&self) -> usize {
        self.lower.len()
    }

    /// Lower bound of a dimension.
    pub fn lower(&self, dim: usize) -> f64 {
        self.lower[dim]
    }

    /// Upper bound of a dimension.
    pub fn upper(&self, dim: usize) -> f64 {
        self.upper[dim]
    }

    /// Clamp a candidate into the box in place.
    pub fn clamp(&self, candidate: &mut [f64]) {
        for (i, value) in candidate.iter_mut().enumerate() {
            *value = value.clamp(self.lower[i], self.upper[i]);
        }
    }
}

/// Score of one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Objective value (lower is better)
    pub fitness: f64,
    /// Size of the candidate, used to break fitness ties (smaller wins)
    pub magnitude: f64,
    /// Whether the candidate satisfies the caller's goal
    pub acceptable: bool,
}

/// Objective evaluated for every candidate.
///
/// Implementations must be pure: the same candidate always yields the same evaluation.
pub trait Fitness: Sync {
    /// Score one candidate.
    fn evaluate(&self, candidate: &[f64]) -> Evaluation;
}

/// A candidate together with its score.
#[derive(Debug, Clone, PartialEq)]
pub struct Scored {
    /// Position in the search space
    pub position: Vec<f64>,
    /// Score
    pub evaluation: Evaluation,
    /// Evaluation sequence number (0 = first candidate scored)
    pub found_at: usize,
}

impl Scored {
    /// Strictly better: acceptable beats unacceptable, then lower fitness, then smaller
    /// magnitude. Full ties keep the incumbent.
    pub fn better_than(&self, other: &Scored) -> bool {
        let (a, b) = (&self.evaluation, &other.evaluation);
        if a.acceptable != b.acceptable {
            return a.acceptable;
        }
        if a.fitness < b.fitness {
            return true;
        }
        a.fitness == b.fitness && a.magnitude < b.magnitude
    }
}

/// Capability of a population-based optimizer.
///
/// `evolve` must return exactly one trial per population member; the driver pits trial
/// `i` against member `i` and keeps the better one.
pub trait PopulationOptimizer: Send {
    /// Number of population members.
    fn population_size(&self) -> usize;

    /// Initial population within `space`.
    fn initialize(&mut self, space: &SearchSpace) -> Vec<Vec<f64>>;

    /// Trial candidates for the next generation.
    fn evolve(&mut self, population: &[Scored], space: &SearchSpace) -> Vec<Vec<f64>>;
}

/// Shared flag that lets a caller stop a running search.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Create an untriggered token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Limits on a single search run.
#[derive(Debug, Clone, Default)]
pub struct SearchBudget {
    /// Maximum number of generations after initialization
    pub max_generations: usize,
    /// Wall-clock limit for the whole run
    pub time_limit: Option<Duration>,
    /// Stop once the best candidate is acceptable and has not improved for this many generations
    pub stall_generations: Option<usize>,
    /// External stop signal
    pub cancellation: Option<CancellationToken>,
}

/// Why a search stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Acceptable best candidate stopped improving
    Converged,
    /// Generation budget used up
    Exhausted,
    /// Time limit reached
    TimedOut,
    /// Cancelled by the caller
    Cancelled,
}

/// Result of a search run.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    /// Best candidate seen
    pub best: Scored,
    /// Generations completed after initialization
    pub generations: usize,
    /// Total candidates scored
    pub evaluations: usize,
    /// Stop reason
    pub termination: Termination,
}

fn score_all<F: Fitness + ?Sized>(
    fitness: &F,
    candidates: Vec<Vec<f64>>,
    first_index: usize,
) -> Vec<Scored> {
    let evaluations: Vec<Evaluation> = candidates
        .par_iter()
        .map(|candidate| fitness.evaluate(candidate))
        .collect();
    candidates
        .into_iter()
        .zip(evaluations)
        .enumerate()
        .map(|(i, (position, evaluation))| Scored {
            position,
            evaluation,
            found_at: first_index + i,
        })
        .collect()
}

/// Drive `optimizer` against `fitness` until the budget runs out.
///
/// `seeds` replace the first members of the initial population (clamped into `space`).
/// `observer` sees every scored candidate in a deterministic order.
pub fn run_search<O, F>(
    optimizer: &mut O,
    fitness: &F,
    space: &SearchSpace,
    seeds: &[Vec<f64>],
    budget: &SearchBudget,
    mut observer: impl FnMut(&Scored),
) -> SearchOutcome
where
    O: PopulationOptimizer + ?Sized,
    F: Fitness + ?Sized,
{
    let started = Instant::now();

    let mut initial = optimizer.initialize(space);
    if initial.is_empty() {
        initial.push(vec![0.0; space.dimensions()]);
    }
    for (slot, seed) in initial.iter_mut().zip(seeds) {
        let mut seed = seed.clone();
        seed.resize(space.dimensions(), 0.0);
        space.clamp(&mut seed);
        *slot = seed;
    }

    let mut population = score_all(fitness, initial, 0);
    let mut evaluations = population.len();
    population.iter().for_each(&mut observer);

    let mut best = population[0].clone();
    for member in &population[1..] {
        if member.better_than(&best) {
            best = member.clone();
        }
    }

    let mut generations = 0;
    let mut stalled = 0;
    let termination = loop {
        if budget
            .cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
        {
            break Termination::Cancelled;
        }
        if budget.time_limit.is_some_and(|limit| started.elapsed() >= limit) {
            break Termination::TimedOut;
        }
        if let Some(stall) = budget.stall_generations {
            if best.evaluation.acceptable && stalled >= stall {
                break Termination::Converged;
            }
        }
        if generations >= budget.max_generations {
            break Termination::Exhausted;
        }

        let trials = optimizer.evolve(&population, space);
        let scored = score_all(fitness, trials, evaluations);
        evaluations += scored.len();

        let mut improved = false;
        for (i, trial) in scored.into_iter().enumerate() {
            observer(&trial);
            if trial.better_than(&best) {
                best = trial.clone();
                improved = true;
            }
            if let Some(member) = population.get_mut(i) {
                if !member.better_than(&trial) {
                    *member = trial;
                }
            }
        }

        generations += 1;
        stalled = if improved { 0 } else { stalled + 1 };
        debug!(
            generation = generations,
            best_fitness = best.evaluation.fitness,
            "Search generation complete"
        );
    };

    SearchOutcome {
        best,
        generations,
        evaluations,
        termination,
    }
}
