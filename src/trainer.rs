//! The context trainer: fits the twin over a ride history, then explains sessions and
//! mines cross-session patterns against it.

use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::activity::{Activity, WeatherContext};
use crate::config::ContextConfig;
use crate::error::{ContextError, ContextResult};
use crate::explain::{
    CounterfactualAnalyzer, CounterfactualResult, Rationale, RationaleGenerator, SessionContext,
};
use crate::mining::{MiningConfig, PatternMiner, Rule, SessionSummary};
use crate::physics::{PhysicsEngine, PhysicsFeatures};
use crate::search::CancellationToken;
use crate::twin::{DigitalTwinModel, DriftRecord, Session, TwinModel};

/// Everything known about one explained session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionExplanation {
    /// Derived wind, gradient and virtual power
    pub physics: PhysicsFeatures,
    /// Expected versus observed heart rate
    pub drift: DriftRecord,
    /// Minimal environment change that removes the drift
    pub counterfactual: CounterfactualResult,
    /// Ranked factors behind the drift
    pub rationale: Rationale,
    /// Session averages and verdicts
    pub context: SessionContext,
}

/// Result of a fit, replaced wholesale on re-fit.
#[derive(Debug)]
struct TrainedState {
    model: Arc<TwinModel>,
    summaries: Vec<SessionSummary>,
}

/// Orchestrates fitting, explanation and mining.
#[derive(Debug)]
pub struct ContextTrainer {
    config: ContextConfig,
    engine: PhysicsEngine,
    state: Option<Arc<TrainedState>>,
    cancellation: Option<CancellationToken>,
}

impl ContextTrainer {
    /// Create an unfitted trainer.
    pub fn new(config: ContextConfig) -> Self {
        Self {
            engine: PhysicsEngine::new(config.physics.clone()),
            config,
            state: None,
            cancellation: None,
        }
    }

    /// Attach a token that aborts counterfactual searches and mining early.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Physics engine built from the configuration.
    pub fn engine(&self) -> &PhysicsEngine {
        &self.engine
    }

    /// Whether [`ContextTrainer::fit`] has succeeded.
    pub fn is_fitted(&self) -> bool {
        self.state.is_some()
    }

    fn state(&self) -> ContextResult<&TrainedState> {
        self.state.as_deref().ok_or(ContextError::NotFitted)
    }

    /// The fitted twin.
    pub fn model(&self) -> ContextResult<Arc<TwinModel>> {
        self.state().map(|state| Arc::clone(&state.model))
    }

    /// Per-session summaries over the fitted history.
    pub fn summaries(&self) -> ContextResult<&[SessionSummary]> {
        self.state().map(|state| state.summaries.as_slice())
    }

    /// Fit the twin on a history of rides.
    ///
    /// Physics and summaries are computed per session in parallel. On error the previous
    /// state is kept.
    pub fn fit(&mut self, history: Vec<(Activity, WeatherContext)>) -> ContextResult<Arc<TwinModel>> {
        let engine = &self.engine;
        let sessions = history
            .into_par_iter()
            .map(|(activity, weather)| Session::prepare(engine, activity, weather))
            .collect::<ContextResult<Vec<_>>>()?;

        let mut twin = DigitalTwinModel::new(self.config.twin.clone());
        let model = twin.fit(&sessions)?;

        let summaries = sessions
            .par_iter()
            .map(|session| {
                model
                    .drift(session)
                    .map(|drift| SessionSummary::from_session(session, &drift))
            })
            .collect::<ContextResult<Vec<_>>>()?;

        info!(
            sessions = sessions.len(),
            degraded = sessions.iter().filter(|s| s.physics.weather_degraded).count(),
            "Context trainer fitted"
        );

        self.state = Some(Arc::new(TrainedState {
            model: Arc::clone(&model),
            summaries,
        }));
        Ok(model)
    }

    /// Explain one ride against the fitted twin.
    pub fn explain_session(
        &self,
        activity: &Activity,
        weather: &WeatherContext,
    ) -> ContextResult<SessionExplanation> {
        let model = Arc::clone(&self.state()?.model);
        let session = Session::prepare(&self.engine, activity.clone(), weather.clone())?;
        let drift = model.drift(&session)?;

        let mut analyzer = CounterfactualAnalyzer::new(
            Arc::clone(&model),
            self.engine.clone(),
            self.config.counterfactual.clone(),
        );
        if let Some(token) = &self.cancellation {
            analyzer = analyzer.with_cancellation(token.clone());
        }
        let counterfactual = analyzer.analyze_default(&session, &drift)?;

        let rationale = RationaleGenerator::new(
            Arc::clone(&model),
            self.engine.clone(),
            self.config.rationale.clone(),
        )
        .generate(&session, &drift, &counterfactual)?;
        let context = SessionContext::describe(&model, &session, &self.config.context)?;

        Ok(SessionExplanation {
            physics: session.physics,
            drift,
            counterfactual,
            rationale,
            context,
        })
    }

    /// Mine association rules over the fitted history.
    pub fn mine_global_patterns(&self, config: &MiningConfig) -> ContextResult<Vec<Rule>> {
        let state = self.state()?;
        let mut miner = PatternMiner::new();
        if let Some(token) = &self.cancellation {
            miner = miner.with_cancellation(token.clone());
        }
        miner.mine(&state.summaries, config)
    }
}
