//! Test scenario configuration types
//!
//! Defines the data structures for deserializing YAML test scenarios.

use serde::Deserialize;

use crate::common::{Error, Result};
use crate::harness::ScenarioKind;
use crate::remote::Bounds;

/// A complete test scenario loaded from a YAML file
#[derive(Deserialize, Debug)]
pub struct TestScenario {
    /// Name of the test scenario
    pub name: String,
    /// Optional description of what the test verifies
    pub description: Option<String>,
    /// Identity to connect with (defaults to the configured identity)
    pub session: Option<String>,
    /// Which scenario to run
    pub scenario: ScenarioName,
    /// Iteration count (defaults to the scenario's default)
    pub repeat: Option<usize>,
    /// Ready event name (defaults to the configured event)
    pub ready_event: Option<String>,
    /// Bound on waiting for the ready event, in seconds
    pub timeout_secs: Option<u64>,
    /// Geometry for the `fixed` scenario
    pub bounds: Option<Bounds>,
    /// Expected verdict
    #[serde(default)]
    pub expect: VerdictExpectation,
}

/// Scenario names accepted in YAML files
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioName {
    Restart,
    DefaultPosition,
    Random,
    Fixed,
}

/// Expectations for the aggregate verdict
#[derive(Deserialize, Debug)]
pub struct VerdictExpectation {
    /// Whether every iteration should pass (default: true)
    #[serde(default = "default_true")]
    pub passed: bool,
    /// Exact number of failed iterations
    pub failures: Option<usize>,
    /// Substring expected in at least one failure reason
    pub failure_contains: Option<String>,
}

impl Default for VerdictExpectation {
    fn default() -> Self {
        Self {
            passed: true,
            failures: None,
            failure_contains: None,
        }
    }
}

fn default_true() -> bool {
    true
}

impl TestScenario {
    /// Parse a scenario from YAML text
    pub fn parse(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse test scenario: {}", e)))
    }

    /// Resolve the harness scenario this file describes
    pub fn kind(&self) -> Result<ScenarioKind> {
        Ok(match self.scenario {
            ScenarioName::Restart => ScenarioKind::Restart,
            ScenarioName::DefaultPosition => ScenarioKind::DefaultPosition,
            ScenarioName::Random => ScenarioKind::Random,
            ScenarioName::Fixed => ScenarioKind::Fixed(self.bounds.ok_or_else(|| {
                Error::Config(format!("Scenario '{}' is fixed but has no bounds", self.name))
            })?),
        })
    }
}
