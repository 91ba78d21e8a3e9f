//! CLI command handling
//!
//! Builds the runtime from configuration, runs the selected scenario and
//! prints the verdict.

use std::path::PathBuf;
use std::sync::Arc;

use colored::Colorize;

use crate::commands::{Commands, RuntimeArg};
use crate::common::config::{self, Config, RuntimeKind};
use crate::common::{Error, Result};
use crate::harness::{scenario, AggregateResult, ScenarioContext, ScenarioKind};
use crate::remote::{Bounds, ProcessRuntime, RemoteRuntime, SimulatedRuntime};
use crate::testing;

/// Options shared by every command
#[derive(Debug, Default)]
pub struct GlobalOptions {
    pub config: Option<PathBuf>,
    pub runtime: Option<RuntimeArg>,
    pub verbose: bool,
}

/// Dispatch a CLI command
pub async fn dispatch(command: Commands, options: GlobalOptions) -> Result<()> {
    let mut config = match &options.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(kind) = options.runtime {
        config.runtime.kind = kind.into();
    }
    // Read once here and threaded down explicitly
    let env_repeat = std::env::var(config::REPEAT_ENV).ok();

    let runtime = connect_runtime(&config).await?;

    match command {
        Commands::Restart { repeat } => {
            run_kind(ScenarioKind::Restart, repeat, env_repeat.as_deref(), runtime, &config).await
        }
        Commands::DefaultPosition { repeat } => {
            run_kind(ScenarioKind::DefaultPosition, repeat, env_repeat.as_deref(), runtime, &config)
                .await
        }
        Commands::Random { repeat } => {
            run_kind(ScenarioKind::Random, repeat, env_repeat.as_deref(), runtime, &config).await
        }
        Commands::Fixed {
            top,
            left,
            width,
            height,
            repeat,
        } => {
            let kind = ScenarioKind::Fixed(Bounds::new(top, left, width, height));
            run_kind(kind, repeat, env_repeat.as_deref(), runtime, &config).await
        }
        Commands::Scenario { paths } => run_tests(&paths, runtime, &config, options.verbose).await,
    }
}

/// Build the runtime selected by configuration
pub async fn connect_runtime(config: &Config) -> Result<Arc<dyn RemoteRuntime>> {
    match config.runtime.kind {
        RuntimeKind::Simulated => {
            tracing::debug!("Using simulated runtime");
            Ok(Arc::new(SimulatedRuntime::default()))
        }
        RuntimeKind::Process => {
            let program = config.runtime.resolve_command()?;
            let runtime =
                ProcessRuntime::spawn(&program, &config.runtime.args, config.timeouts.request())
                    .await?;
            Ok(Arc::new(runtime))
        }
    }
}

async fn run_kind(
    kind: ScenarioKind,
    repeat: Option<usize>,
    env_repeat: Option<&str>,
    runtime: Arc<dyn RemoteRuntime>,
    config: &Config,
) -> Result<()> {
    let iterations = config::resolve_repeat(repeat, env_repeat, kind.default_repeat(config))?;
    tracing::debug!("Running test {} times", iterations);

    let ctx = ScenarioContext::from_config(config);
    let aggregate = scenario::run(kind, runtime, &ctx, iterations).await?;
    print_summary(&aggregate);
    aggregate.verdict()
}

fn print_summary(aggregate: &AggregateResult) {
    for outcome in aggregate.outcomes.iter().filter(|o| !o.passed()) {
        if let Some(e) = &outcome.failure {
            println!("{} Iteration {}: {}", "✗".red(), outcome.index + 1, e);
        }
    }
    let passed = aggregate.len() - aggregate.failure_count();
    if aggregate.passed() {
        println!(
            "{} {} of {} iteration(s) passed",
            "✓".green().bold(),
            passed,
            aggregate.len()
        );
    } else {
        println!(
            "{} {} of {} iteration(s) passed",
            "✗".red().bold(),
            passed,
            aggregate.len()
        );
    }
}

async fn run_tests(
    paths: &[PathBuf],
    runtime: Arc<dyn RemoteRuntime>,
    config: &Config,
    verbose: bool,
) -> Result<()> {
    let mut failed = Vec::new();
    for path in paths {
        let result = testing::run_scenario(path, runtime.clone(), config, verbose).await?;
        if !result.passed {
            failed.push(result.name);
        }
    }

    if failed.is_empty() {
        Ok(())
    } else {
        Err(Error::TestAssertion(format!(
            "{} of {} scenario(s) failed: {}",
            failed.len(),
            paths.len(),
            failed.join(", ")
        )))
    }
}
