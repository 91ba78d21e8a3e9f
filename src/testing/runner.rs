//! Test runner implementation
//!
//! Executes YAML scenarios against a runtime and checks the aggregate
//! verdict against the scenario's expectations.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;

use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::harness::{scenario, AggregateResult, ScenarioContext};
use crate::remote::RemoteRuntime;

use super::config::{TestScenario, VerdictExpectation};

/// Result of a test run
#[derive(Debug)]
pub struct TestResult {
    pub name: String,
    pub passed: bool,
    pub iterations_run: usize,
    pub failures: Vec<String>,
    pub error: Option<String>,
}

/// Run a test scenario from a YAML file
pub async fn run_scenario(
    path: &Path,
    runtime: Arc<dyn RemoteRuntime>,
    config: &Config,
    verbose: bool,
) -> Result<TestResult> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "Failed to read test scenario '{}': {}",
            path.display(),
            e
        ))
    })?;
    let scenario = TestScenario::parse(&content)?;
    run_parsed(scenario, runtime, config, verbose).await
}

/// Run an already parsed scenario
pub async fn run_parsed(
    scenario: TestScenario,
    runtime: Arc<dyn RemoteRuntime>,
    config: &Config,
    verbose: bool,
) -> Result<TestResult> {
    println!(
        "\n{} {}",
        "Running Test:".blue().bold(),
        scenario.name.white().bold()
    );
    if let Some(desc) = &scenario.description {
        println!("  {}", desc.dimmed());
    }

    let kind = scenario.kind()?;
    let iterations = scenario.repeat.unwrap_or_else(|| kind.default_repeat(config));

    let mut ctx = ScenarioContext::from_config(config);
    if let Some(identity) = &scenario.session {
        ctx.session_identity = identity.clone();
    }
    if let Some(event) = &scenario.ready_event {
        ctx.wait.event = event.clone();
    }
    if let Some(secs) = scenario.timeout_secs {
        ctx.wait.timeout = Duration::from_secs(secs);
    }

    if verbose {
        println!(
            "  {} {:?}, {} iteration(s), waiting up to {:?} for '{}'",
            "Scenario:".cyan(),
            kind,
            iterations,
            ctx.wait.timeout,
            ctx.wait.event
        );
    }

    let aggregate = match scenario::run(kind, runtime, &ctx, iterations).await {
        Ok(aggregate) => aggregate,
        Err(e) => {
            println!("  {} {}", "✗".red(), e);
            return Ok(TestResult {
                name: scenario.name,
                passed: false,
                iterations_run: 0,
                failures: Vec::new(),
                error: Some(e.to_string()),
            });
        }
    };

    print_iterations(&aggregate, verbose);

    let error = check_expectation(&scenario.expect, &aggregate).err();
    match &error {
        None => println!(
            "\n{} {}\n",
            "✓".green().bold(),
            "Test Passed".green().bold()
        ),
        Some(e) => println!("\n{} {}\n", "✗".red().bold(), e.to_string().red()),
    }

    Ok(TestResult {
        name: scenario.name,
        passed: error.is_none(),
        iterations_run: aggregate.len(),
        failures: aggregate.failure_reasons(),
        error: error.map(|e| e.to_string()),
    })
}

fn print_iterations(aggregate: &AggregateResult, verbose: bool) {
    println!("\n{}", "Iterations:".cyan());
    for outcome in &aggregate.outcomes {
        let n = outcome.index + 1;
        match &outcome.failure {
            None => {
                if verbose {
                    println!(
                        "  {} Iteration {}: {} ({})",
                        "✓".green(),
                        n,
                        outcome.identity.dimmed(),
                        outcome.expected.to_string().dimmed()
                    );
                }
            }
            Some(e) => println!("  {} Iteration {}: {}", "✗".red(), n, e),
        }
    }
    println!(
        "  {} of {} iteration(s) passed",
        aggregate.len() - aggregate.failure_count(),
        aggregate.len()
    );
}

/// Compare the aggregate verdict with what the scenario expects
fn check_expectation(expect: &VerdictExpectation, aggregate: &AggregateResult) -> Result<()> {
    if expect.passed != aggregate.passed() {
        return Err(match aggregate.verdict() {
            Err(e) => e,
            Ok(()) => Error::TestAssertion(format!(
                "Expected failures, but all {} iteration(s) passed",
                aggregate.len()
            )),
        });
    }

    if let Some(expected) = expect.failures {
        let actual = aggregate.failure_count();
        if expected != actual {
            return Err(Error::TestAssertion(format!(
                "Expected {} failed iteration(s), got {}",
                expected, actual
            )));
        }
    }

    if let Some(needle) = &expect.failure_contains {
        if !aggregate.failure_reasons().iter().any(|r| r.contains(needle)) {
            return Err(Error::TestAssertion(format!(
                "No failure reason contains '{}'",
                needle
            )));
        }
    }

    Ok(())
}
