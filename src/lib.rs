//! RideTwin - physiological drift explanation for endurance rides
//!
//! Turns an aligned ride recording into an explanation of its heart-rate response:
//! quantifies mechanical load (wind, gradient, virtual power), predicts the heart rate a
//! digital twin of the athlete expects under that load, and explains the gap with
//! counterfactual search, structured rationales and cross-session rule mining.

pub mod activity;
pub mod config;
pub mod error;
pub mod explain;
pub mod mining;
pub mod physics;
pub mod search;
pub mod synthetic;
pub mod trainer;
pub mod twin;

// Re-export commonly used types
pub use activity::{Activity, ActivitySample, WeatherContext, WeatherObservation, Wind};
pub use config::ContextConfig;
pub use error::{ContextError, ContextResult};
pub use explain::{CounterfactualAnalyzer, CounterfactualResult, Rationale, RationaleGenerator};
pub use mining::{PatternMiner, Rule, SessionSummary};
pub use physics::{PhysicsEngine, PhysicsFeatures};
pub use trainer::{ContextTrainer, SessionExplanation};
pub use twin::{DigitalTwinModel, DriftRecord, Session, TwinModel};
