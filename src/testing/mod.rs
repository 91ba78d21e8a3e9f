//! E2E Test Runner
//!
//! Reads YAML test scenarios and runs them through the harness, asserting
//! on the structured aggregate result rather than on log output.

mod config;
mod runner;

pub use config::*;
pub use runner::{run_parsed, run_scenario, TestResult};
