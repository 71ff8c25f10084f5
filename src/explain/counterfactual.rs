//! Counterfactual search: which change in conditions would have erased the drift?
//!
//! The twin is treated as a black box. Candidate perturbations shift headwind and
//! gradient by a constant offset across the whole session, virtual power is re-derived
//! with the physics engine, and the twin is re-applied. Differential evolution looks for
//! the smallest such change that brings the mean residual under the threshold.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ContextError, ContextResult};
use crate::physics::{PhysicsEngine, PhysicsFeatures};
use crate::search::{
    run_search, CancellationToken, DifferentialEvolution, DifferentialEvolutionConfig,
    Evaluation, Fitness, Scored, SearchBudget, SearchSpace, Termination,
};
use crate::twin::{DriftRecord, Session, TwinFeature, TwinModel};

/// A physics dimension the search may shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerturbableDimension {
    /// Headwind offset (m/s)
    Headwind,
    /// Gradient offset (rise/run)
    Gradient,
}

impl PerturbableDimension {
    /// Feature this dimension acts on.
    pub fn feature(&self) -> TwinFeature {
        match self {
            PerturbableDimension::Headwind => TwinFeature::Headwind,
            PerturbableDimension::Gradient => TwinFeature::Gradient,
        }
    }
}

/// Half-widths of the search box. A zero bound disables the dimension.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerturbationBounds {
    /// Headwind tolerance (± m/s)
    pub headwind_mps: f64,
    /// Gradient tolerance (± rise/run)
    pub gradient: f64,
}

impl Default for PerturbationBounds {
    fn default() -> Self {
        Self {
            headwind_mps: 3.0,
            gradient: 0.05,
        }
    }
}

impl PerturbationBounds {
    /// Dimensions with a positive bound, in a fixed order.
    pub fn active(&self) -> Vec<(PerturbableDimension, f64)> {
        [
            (PerturbableDimension::Headwind, self.headwind_mps),
            (PerturbableDimension::Gradient, self.gradient),
        ]
        .into_iter()
        .filter(|(_, bound)| bound.is_finite() && *bound > 0.0)
        .collect()
    }
}

/// Counterfactual search settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CounterfactualConfig {
    /// Search box
    pub bounds: PerturbationBounds,
    /// Target |mean residual| (bpm)
    pub threshold_bpm: f64,
    /// Fitness cost per unit of bound-normalised perturbation
    pub magnitude_penalty: f64,
    /// Generation budget
    pub max_generations: usize,
    /// Stop once a feasible best has not improved for this many generations
    pub stall_generations: Option<usize>,
    /// Wall-clock budget per session in milliseconds
    pub time_limit_ms: Option<u64>,
    /// Random seed (`None` draws entropy and makes runs non-reproducible)
    pub seed: Option<u64>,
    /// Optimizer parameters
    pub optimizer: DifferentialEvolutionConfig,
}

impl Default for CounterfactualConfig {
    fn default() -> Self {
        Self {
            bounds: PerturbationBounds::default(),
            threshold_bpm: 2.0,
            magnitude_penalty: 0.01,
            max_generations: 60,
            stall_generations: Some(15),
            time_limit_ms: None,
            seed: Some(42),
            optimizer: DifferentialEvolutionConfig {
                population_size: 30,
                ..Default::default()
            },
        }
    }
}

/// Offset applied to one dimension.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Perturbation {
    /// Dimension shifted
    pub dimension: PerturbableDimension,
    /// Offset added to every sample
    pub offset: f64,
}

/// Outcome of a counterfactual search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterfactualResult {
    /// Offsets per searched dimension
    pub perturbation: Vec<Perturbation>,
    /// Mean residual before perturbation (bpm)
    pub baseline_residual: f64,
    /// Mean residual predicted after perturbation (bpm)
    pub residual: f64,
    /// Bound-normalised L2 norm of the perturbation
    pub magnitude: f64,
    /// Whether |residual| fell under the threshold
    pub feasible: bool,
    /// Generations run
    pub generations: usize,
    /// Candidates scored
    pub evaluations: usize,
    /// Why the search stopped
    pub termination: Termination,
}

impl CounterfactualResult {
    fn unsearched(baseline: f64, dims: &[(PerturbableDimension, f64)], feasible: bool) -> Self {
        Self {
            perturbation: dims
                .iter()
                .map(|(dimension, _)| Perturbation {
                    dimension: *dimension,
                    offset: 0.0,
                })
                .collect(),
            baseline_residual: baseline,
            residual: baseline,
            magnitude: 0.0,
            feasible,
            generations: 0,
            evaluations: 0,
            termination: if feasible {
                Termination::Converged
            } else {
                Termination::Exhausted
            },
        }
    }

    /// Offset of a dimension (0 when not searched).
    pub fn offset(&self, dimension: PerturbableDimension) -> f64 {
        self.perturbation
            .iter()
            .find(|p| p.dimension == dimension)
            .map_or(0.0, |p| p.offset)
    }
}

/// Re-derive physics for a set of offsets and return the twin's mean residual.
pub(crate) fn residual_after(
    model: &TwinModel,
    engine: &PhysicsEngine,
    session: &Session,
    speeds: &[f64],
    headwind_offset: f64,
    gradient_offset: f64,
) -> ContextResult<(PhysicsFeatures, f64)> {
    let physics = engine.perturbed(&session.physics, speeds, headwind_offset, gradient_offset)?;
    let frame = model.frame_with_physics(session, &physics)?;
    let residual = model.predict_frame(&frame).mean_residual();
    Ok((physics, residual))
}

struct CounterfactualFitness<'a> {
    model: &'a TwinModel,
    engine: &'a PhysicsEngine,
    session: &'a Session,
    speeds: Vec<f64>,
    dims: Vec<(PerturbableDimension, f64)>,
    threshold: f64,
    penalty: f64,
}

impl CounterfactualFitness<'_> {
    fn offsets(&self, candidate: &[f64]) -> (f64, f64) {
        let mut headwind = 0.0;
        let mut gradient = 0.0;
        for ((dimension, _), value) in self.dims.iter().zip(candidate) {
            match dimension {
                PerturbableDimension::Headwind => headwind = *value,
                PerturbableDimension::Gradient => gradient = *value,
            }
        }
        (headwind, gradient)
    }

    fn magnitude(&self, candidate: &[f64]) -> f64 {
        self.dims
            .iter()
            .zip(candidate)
            .map(|((_, bound), value)| (value / bound).powi(2))
            .sum::<f64>()
            .sqrt()
    }

    fn residual(&self, candidate: &[f64]) -> f64 {
        let (headwind, gradient) = self.offsets(candidate);
        residual_after(
            self.model,
            self.engine,
            self.session,
            &self.speeds,
            headwind,
            gradient,
        )
        .map_or(f64::NAN, |(_, r)| r)
    }
}

impl Fitness for CounterfactualFitness<'_> {
    fn evaluate(&self, candidate: &[f64]) -> Evaluation {
        let magnitude = self.magnitude(candidate);
        let residual = self.residual(candidate);
        if !residual.is_finite() {
            return Evaluation {
                fitness: f64::INFINITY,
                magnitude,
                acceptable: false,
            };
        }
        // Excess and acceptance share one boundary; acceptable candidates always rank first
        let acceptable = residual.abs() < self.threshold;
        let excess = if acceptable {
            0.0
        } else {
            residual.abs() - self.threshold
        };
        Evaluation {
            fitness: excess + self.penalty * magnitude,
            magnitude,
            acceptable,
        }
    }
}

/// Searches for minimal counterfactual conditions against a fitted twin.
#[derive(Debug, Clone)]
pub struct CounterfactualAnalyzer {
    model: Arc<TwinModel>,
    engine: PhysicsEngine,
    config: CounterfactualConfig,
    cancellation: Option<CancellationToken>,
}

impl CounterfactualAnalyzer {
    /// Create an analyzer for a fitted twin.
    pub fn new(model: Arc<TwinModel>, engine: PhysicsEngine, config: CounterfactualConfig) -> Self {
        Self {
            model,
            engine,
            config,
            cancellation: None,
        }
    }

    /// Attach a token that lets the caller abort long searches.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &CounterfactualConfig {
        &self.config
    }

    /// Search with the configured bounds and threshold.
    pub fn analyze_default(
        &self,
        session: &Session,
        drift: &DriftRecord,
    ) -> ContextResult<CounterfactualResult> {
        self.analyze(session, drift, &self.config.bounds, self.config.threshold_bpm)
    }

    /// Search for the smallest perturbation within `bounds` that brings the session's
    /// mean residual under `threshold` (bpm).
    ///
    /// Never fails for lack of a solution: an unreachable threshold yields
    /// `feasible = false` together with the closest candidate found.
    pub fn analyze(
        &self,
        session: &Session,
        drift: &DriftRecord,
        bounds: &PerturbationBounds,
        threshold: f64,
    ) -> ContextResult<CounterfactualResult> {
        if drift.len() != session.len() {
            return Err(ContextError::InvalidInput(format!(
                "drift has {} samples, session has {}",
                drift.len(),
                session.len()
            )));
        }

        let dims = bounds.active();
        let baseline = drift.summary.mean_residual;
        if !baseline.is_finite() {
            warn!(activity = %session.activity.id, "No valid samples, skipping counterfactual search");
            return Ok(CounterfactualResult::unsearched(baseline, &dims, false));
        }
        if baseline.abs() < threshold {
            return Ok(CounterfactualResult::unsearched(baseline, &dims, true));
        }
        if dims.is_empty() {
            return Ok(CounterfactualResult::unsearched(baseline, &dims, false));
        }

        let fitness = CounterfactualFitness {
            model: &self.model,
            engine: &self.engine,
            session,
            speeds: session.activity.speeds(),
            dims: dims.clone(),
            threshold,
            penalty: self.config.magnitude_penalty,
        };
        let space = SearchSpace::new(
            &dims
                .iter()
                .map(|(_, bound)| (-bound, *bound))
                .collect::<Vec<_>>(),
        )?;
        let budget = SearchBudget {
            max_generations: self.config.max_generations,
            time_limit: self.config.time_limit_ms.map(Duration::from_millis),
            stall_generations: self.config.stall_generations,
            cancellation: self.cancellation.clone(),
        };

        // Closest candidate by residual, for partial explanations when nothing is feasible
        let penalty = self.config.magnitude_penalty;
        let mut closest: Option<Scored> = None;
        let mut optimizer =
            DifferentialEvolution::new(self.config.optimizer.clone(), self.config.seed);
        let outcome = run_search(
            &mut optimizer,
            &fitness,
            &space,
            &[vec![0.0; dims.len()]],
            &budget,
            |scored| {
                let excess = |s: &Scored| s.evaluation.fitness - penalty * s.evaluation.magnitude;
                let better = match &closest {
                    None => true,
                    Some(c) => {
                        excess(scored) < excess(c)
                            || (excess(scored) == excess(c)
                                && scored.evaluation.magnitude < c.evaluation.magnitude)
                    }
                };
                if better {
                    closest = Some(scored.clone());
                }
            },
        );

        let feasible = outcome.best.evaluation.acceptable;
        let chosen = if feasible {
            outcome.best.clone()
        } else {
            closest.unwrap_or_else(|| outcome.best.clone())
        };
        let residual = fitness.residual(&chosen.position);

        if feasible {
            debug!(
                activity = %session.activity.id,
                magnitude = chosen.evaluation.magnitude,
                generations = outcome.generations,
                "Counterfactual found"
            );
        } else {
            warn!(
                activity = %session.activity.id,
                baseline,
                best_residual = residual,
                "No counterfactual within bounds"
            );
        }

        Ok(CounterfactualResult {
            perturbation: dims
                .iter()
                .zip(&chosen.position)
                .map(|((dimension, _), offset)| Perturbation {
                    dimension: *dimension,
                    offset: *offset,
                })
                .collect(),
            baseline_residual: baseline,
            residual,
            magnitude: chosen.evaluation.magnitude,
            feasible,
            generations: outcome.generations,
            evaluations: outcome.evaluations,
            termination: outcome.termination,
        })
    }
}
