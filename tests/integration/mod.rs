//! Integration test modules.

mod counterfactual_test;
mod fixtures;
mod pipeline_test;
