//! Unit test modules.

mod discretize_test;
mod physics_props_test;
mod search_test;
