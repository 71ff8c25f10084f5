//! Cross-session association rule mining.
//!
//! Session summaries are discretised into items and differential evolution searches a
//! numerical rule encoding: for every feature one inclusion gene and one bin gene, plus
//! a consequent gene selecting the drift outcome. Every candidate the search scores is
//! decoded, and those meeting the support and confidence floors are archived.

pub mod discretize;
pub mod summary;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ContextError, ContextResult};
use crate::search::{
    run_search, CancellationToken, DifferentialEvolution, DifferentialEvolutionConfig,
    Evaluation, Fitness, SearchBudget, SearchSpace,
};

pub use discretize::{bins_for, default_fixed_edges, BinningStrategy, Bins, FeatureEdges};
pub use summary::{SessionSummary, SummaryFeature};

/// Bucket of a session's mean drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftOutcome {
    /// Heart rate lower than expected
    Suppressed,
    /// Within the outcome band
    Nominal,
    /// Heart rate higher than expected
    Elevated,
}

impl DriftOutcome {
    const ALL: [DriftOutcome; 3] = [
        DriftOutcome::Suppressed,
        DriftOutcome::Nominal,
        DriftOutcome::Elevated,
    ];

    /// Bucket a mean residual; `None` for non-finite drift.
    pub fn classify(mean_drift: f64, band_bpm: f64) -> Option<Self> {
        if !mean_drift.is_finite() {
            None
        } else if mean_drift > band_bpm {
            Some(DriftOutcome::Elevated)
        } else if mean_drift < -band_bpm {
            Some(DriftOutcome::Suppressed)
        } else {
            Some(DriftOutcome::Nominal)
        }
    }
}

/// One antecedent item: `feature` falls in `bin`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Summary feature tested
    pub feature: SummaryFeature,
    /// Bin index, lowest first
    pub bin: usize,
    /// Inclusive lower edge of the bin, `None` when open
    pub lower: Option<f64>,
    /// Exclusive upper edge of the bin, `None` when open
    pub upper: Option<f64>,
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.lower, self.upper) {
            (Some(lo), Some(hi)) => write!(f, "{lo:.3} <= {} < {hi:.3}", self.feature),
            (Some(lo), None) => write!(f, "{} >= {lo:.3}", self.feature),
            (None, Some(hi)) => write!(f, "{} < {hi:.3}", self.feature),
            (None, None) => write!(f, "{} (any)", self.feature),
        }
    }
}

/// An association rule `antecedent => consequent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Conditions in feature order
    pub antecedent: Vec<Condition>,
    /// Drift outcome the conditions predict
    pub consequent: DriftOutcome,
    /// Share of sessions matching antecedent and consequent
    pub support: f64,
    /// Share of antecedent matches that also match the consequent
    pub confidence: f64,
    /// Mean of support, confidence and comprehensibility
    pub interestingness: f64,
}

impl Rule {
    fn key(&self) -> (Vec<(SummaryFeature, usize)>, DriftOutcome) {
        (
            self.antecedent.iter().map(|c| (c.feature, c.bin)).collect(),
            self.consequent,
        )
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let conditions: Vec<String> = self.antecedent.iter().map(ToString::to_string).collect();
        write!(
            f,
            "IF {} THEN {:?} (support {:.2}, confidence {:.2})",
            conditions.join(" AND "),
            self.consequent,
            self.support,
            self.confidence
        )
    }
}

/// Mining settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MiningConfig {
    /// Bins per feature for equal-width and quantile binning
    pub bins: usize,
    /// How bin edges are chosen
    pub strategy: BinningStrategy,
    /// Cut points used by [`BinningStrategy::Fixed`]
    pub fixed_edges: Vec<FeatureEdges>,
    /// Features rules may mention
    pub features: Vec<SummaryFeature>,
    /// Rules below this support are discarded
    pub min_support: f64,
    /// Rules below this confidence are discarded
    pub min_confidence: f64,
    /// |mean drift| above this (bpm) is Elevated or Suppressed
    pub outcome_band_bpm: f64,
    /// Only mine rules with this consequent
    pub target_outcome: Option<DriftOutcome>,
    /// Fewer usable sessions than this is an error
    pub min_sessions: usize,
    /// Differential evolution generations
    pub max_generations: usize,
    /// Cap on returned rules
    pub max_rules: usize,
    /// Random seed (`None` draws entropy and makes runs non-reproducible)
    pub seed: Option<u64>,
    /// Search hyper-parameters
    pub optimizer: DifferentialEvolutionConfig,
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            bins: 3,
            strategy: BinningStrategy::default(),
            fixed_edges: default_fixed_edges(),
            features: SummaryFeature::ALL.to_vec(),
            min_support: 0.1,
            min_confidence: 0.5,
            outcome_band_bpm: 5.0,
            target_outcome: None,
            min_sessions: 5,
            max_generations: 50,
            max_rules: 20,
            seed: Some(42),
            optimizer: DifferentialEvolutionConfig::default(),
        }
    }
}

/// Discretised sessions: per session one bin per feature (None when unknown) and an outcome.
struct Transactions {
    bins: Vec<Bins>,
    items: Vec<Vec<Option<usize>>>,
    outcomes: Vec<DriftOutcome>,
}

impl Transactions {
    fn build(summaries: &[SessionSummary], config: &MiningConfig) -> Self {
        let usable: Vec<(&SessionSummary, DriftOutcome)> = summaries
            .iter()
            .filter_map(|s| {
                DriftOutcome::classify(s.mean_drift, config.outcome_band_bpm).map(|o| (s, o))
            })
            .collect();

        let mut features = config.features.clone();
        features.sort();
        features.dedup();

        let bins: Vec<Bins> = features
            .iter()
            .map(|&feature| {
                let values: Vec<f64> = usable.iter().map(|(s, _)| s.value(feature)).collect();
                bins_for(
                    feature,
                    &values,
                    config.strategy,
                    config.bins,
                    &config.fixed_edges,
                )
            })
            .collect();

        let items: Vec<Vec<Option<usize>>> = usable
            .iter()
            .map(|(s, _)| bins.iter().map(|b| b.bin_of(s.value(b.feature))).collect())
            .collect();
        let outcomes: Vec<DriftOutcome> = usable.iter().map(|(_, o)| *o).collect();

        Self {
            bins,
            items,
            outcomes,
        }
    }

    fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Decode a candidate into `(feature index, bin)` pairs and a consequent.
    fn decode(
        &self,
        candidate: &[f64],
        target: Option<DriftOutcome>,
    ) -> (Vec<(usize, usize)>, DriftOutcome) {
        let gene_bucket = |gene: f64, n: usize| ((gene.clamp(0.0, 1.0) * n as f64) as usize).min(n - 1);

        let antecedent = self
            .bins
            .iter()
            .enumerate()
            .filter(|(i, _)| candidate.get(2 * i).is_some_and(|g| *g > 0.5))
            .map(|(i, bins)| {
                let gene = candidate.get(2 * i + 1).copied().unwrap_or(0.0);
                (i, gene_bucket(gene, bins.count()))
            })
            .collect();
        let consequent = target.unwrap_or_else(|| {
            let gene = candidate.get(2 * self.bins.len()).copied().unwrap_or(0.0);
            DriftOutcome::ALL[gene_bucket(gene, DriftOutcome::ALL.len())]
        });
        (antecedent, consequent)
    }

    /// (support, confidence) of a decoded rule.
    fn measure(&self, antecedent: &[(usize, usize)], consequent: DriftOutcome) -> (f64, f64) {
        let mut matched = 0usize;
        let mut both = 0usize;
        for (items, outcome) in self.items.iter().zip(&self.outcomes) {
            if antecedent.iter().all(|(i, bin)| items[*i] == Some(*bin)) {
                matched += 1;
                if *outcome == consequent {
                    both += 1;
                }
            }
        }
        let support = both as f64 / self.len().max(1) as f64;
        let confidence = if matched == 0 {
            0.0
        } else {
            both as f64 / matched as f64
        };
        (support, confidence)
    }

    fn rule(&self, candidate: &[f64], target: Option<DriftOutcome>) -> Option<Rule> {
        let (antecedent, consequent) = self.decode(candidate, target);
        if antecedent.is_empty() {
            return None;
        }
        let (support, confidence) = self.measure(&antecedent, consequent);
        let comprehensibility = 2f64.ln() / (2.0 + antecedent.len() as f64).ln();
        Some(Rule {
            antecedent: antecedent
                .iter()
                .map(|&(i, bin)| {
                    let (lower, upper) = self.bins[i].range(bin);
                    Condition {
                        feature: self.bins[i].feature,
                        bin,
                        lower,
                        upper,
                    }
                })
                .collect(),
            consequent,
            support,
            confidence,
            interestingness: (support + confidence + comprehensibility) / 3.0,
        })
    }
}

struct RuleFitness<'a> {
    transactions: &'a Transactions,
    config: &'a MiningConfig,
}

impl RuleFitness<'_> {
    fn admissible(&self, rule: &Rule) -> bool {
        rule.support >= self.config.min_support && rule.confidence >= self.config.min_confidence
    }
}

impl Fitness for RuleFitness<'_> {
    fn evaluate(&self, candidate: &[f64]) -> Evaluation {
        match self.transactions.rule(candidate, self.config.target_outcome) {
            Some(rule) => Evaluation {
                fitness: 1.0 - rule.interestingness,
                magnitude: rule.antecedent.len() as f64,
                acceptable: self.admissible(&rule),
            },
            None => Evaluation {
                fitness: f64::INFINITY,
                magnitude: 0.0,
                acceptable: false,
            },
        }
    }
}

/// Mines association rules between session conditions and drift outcomes.
#[derive(Debug, Clone, Default)]
pub struct PatternMiner {
    cancellation: Option<CancellationToken>,
}

impl PatternMiner {
    /// Create a miner without cancellation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a token that lets the caller abort mining.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Mine rules over `summaries`, best first.
    ///
    /// Sessions with unknown drift are ignored. Rules are ranked by interestingness,
    /// then shorter antecedent, then support, then feature/bin order.
    pub fn mine(
        &self,
        summaries: &[SessionSummary],
        config: &MiningConfig,
    ) -> ContextResult<Vec<Rule>> {
        let transactions = Transactions::build(summaries, config);
        if transactions.len() < config.min_sessions {
            return Err(ContextError::InsufficientData {
                required: config.min_sessions,
                available: transactions.len(),
            });
        }
        if transactions.bins.is_empty() {
            return Err(ContextError::InvalidInput(
                "no summary features to mine".to_string(),
            ));
        }

        let fitness = RuleFitness {
            transactions: &transactions,
            config,
        };
        let space = SearchSpace::unit(2 * transactions.bins.len() + 1);
        let budget = SearchBudget {
            max_generations: config.max_generations,
            time_limit: None,
            stall_generations: None,
            cancellation: self.cancellation.clone(),
        };

        let mut archive: BTreeMap<(Vec<(SummaryFeature, usize)>, DriftOutcome), Rule> =
            BTreeMap::new();
        let mut optimizer = DifferentialEvolution::new(config.optimizer.clone(), config.seed);
        let outcome = run_search(&mut optimizer, &fitness, &space, &[], &budget, |scored| {
            if !scored.evaluation.acceptable {
                return;
            }
            if let Some(rule) = transactions.rule(&scored.position, config.target_outcome) {
                archive.entry(rule.key()).or_insert(rule);
            }
        });
        debug!(
            generations = outcome.generations,
            evaluations = outcome.evaluations,
            "Rule search finished"
        );

        let mut rules: Vec<Rule> = archive.into_values().collect();
        rules.sort_by(|a, b| {
            b.interestingness
                .total_cmp(&a.interestingness)
                .then(a.antecedent.len().cmp(&b.antecedent.len()))
                .then(b.support.total_cmp(&a.support))
                .then_with(|| a.key().cmp(&b.key()))
        });
        rules.truncate(config.max_rules);

        info!(
            sessions = transactions.len(),
            rules = rules.len(),
            "Pattern mining complete"
        );
        Ok(rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn summary(headwind: f64, drift: f64) -> SessionSummary {
        SessionSummary {
            activity_id: Uuid::nil(),
            mean_headwind: headwind,
            mean_gradient: 0.0,
            mean_virtual_power: 150.0,
            mean_speed_kmh: 28.0,
            mean_temperature_c: f64::NAN,
            mean_humidity_pct: f64::NAN,
            duration_min: 60.0,
            mean_drift: drift,
        }
    }

    fn windy_history() -> Vec<SessionSummary> {
        let mut history = Vec::new();
        for i in 0..6 {
            history.push(summary(4.0 + i as f64 * 0.1, 9.0));
            history.push(summary(-0.2 + i as f64 * 0.05, 0.0));
        }
        history
    }

    fn config() -> MiningConfig {
        MiningConfig {
            strategy: BinningStrategy::Fixed,
            features: vec![SummaryFeature::Headwind],
            ..Default::default()
        }
    }

    #[test]
    fn test_outcome_classification() {
        assert_eq!(DriftOutcome::classify(6.0, 5.0), Some(DriftOutcome::Elevated));
        assert_eq!(DriftOutcome::classify(-6.0, 5.0), Some(DriftOutcome::Suppressed));
        assert_eq!(DriftOutcome::classify(5.0, 5.0), Some(DriftOutcome::Nominal));
        assert_eq!(DriftOutcome::classify(f64::NAN, 5.0), None);
    }

    #[test]
    fn test_insufficient_sessions() {
        let err = PatternMiner::new()
            .mine(&windy_history()[..4], &config())
            .unwrap_err();
        assert!(matches!(
            err,
            ContextError::InsufficientData {
                required: 5,
                available: 4
            }
        ));
    }

    #[test]
    fn test_unknown_drift_is_not_counted() {
        let mut history = windy_history()[..5].to_vec();
        history[0].mean_drift = f64::NAN;
        assert!(PatternMiner::new().mine(&history, &config()).is_err());
    }

    #[test]
    fn test_finds_headwind_rule() {
        let rules = PatternMiner::new().mine(&windy_history(), &config()).unwrap();
        let headwind = rules
            .iter()
            .find(|r| r.consequent == DriftOutcome::Elevated)
            .unwrap();
        assert_eq!(headwind.antecedent.len(), 1);
        assert_eq!(headwind.antecedent[0].bin, 2);
        assert!((headwind.confidence - 1.0).abs() < 1e-12);
        assert!((headwind.support - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_rules_meet_thresholds() {
        let config = MiningConfig {
            min_support: 0.3,
            min_confidence: 0.9,
            ..config()
        };
        let rules = PatternMiner::new().mine(&windy_history(), &config).unwrap();
        assert!(!rules.is_empty());
        for rule in &rules {
            assert!(rule.support >= 0.3);
            assert!(rule.confidence >= 0.9);
        }
    }

    #[test]
    fn test_target_outcome_filter() {
        let config = MiningConfig {
            target_outcome: Some(DriftOutcome::Elevated),
            ..config()
        };
        let rules = PatternMiner::new().mine(&windy_history(), &config).unwrap();
        assert!(rules.iter().all(|r| r.consequent == DriftOutcome::Elevated));
    }

    #[test]
    fn test_comprehensibility_prefers_short_rules() {
        let short = 2f64.ln() / 3f64.ln();
        let long = 2f64.ln() / 4f64.ln();
        assert!(short > long);
    }
}
