//! Explanations for a session's drift.
//!
//! [`CounterfactualAnalyzer`] searches for the smallest change in wind and terrain that
//! would have removed the drift; [`RationaleGenerator`] turns that into ranked factor
//! attributions; [`SessionContext`] adds a descriptive summary of the ride's conditions.

pub mod context;
pub mod counterfactual;
pub mod rationale;

pub use context::{AtmosphereVerdict, ContextThresholds, SessionContext, TerrainVerdict, WindVerdict};
pub use counterfactual::{
    CounterfactualAnalyzer, CounterfactualConfig, CounterfactualResult, PerturbableDimension,
    Perturbation, PerturbationBounds,
};
pub use rationale::{
    Attribution, AttributionSource, Direction, DriftDirection, MagnitudeBucket, Rationale,
    RationaleConfig, RationaleGenerator, RationaleSummary,
};
