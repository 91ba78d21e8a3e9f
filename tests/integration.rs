//! End-to-end integration tests for the bounds harness
//!
//! These tests exercise the complete flow by:
//! 1. Running scenarios against the in-process simulated runtime
//! 2. Driving the mock runtime binary over its stdio wire protocol
//! 3. Running the CLI binary with a test configuration

use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use bounds_harness::common::config::{Config, GeometryConfig};
use bounds_harness::harness::{
    await_event, launch, run_repeated, scenario, EventWaitResult, IterationPlan, RepeatSettings,
    ScenarioContext, ScenarioKind, Session, SessionPolicy, WaitOptions, DEFAULT_POSITION,
};
use bounds_harness::remote::sim::BoundsField;
use bounds_harness::remote::{ProcessRuntime, RemoteRuntime, SimOptions, SimulatedRuntime};
use bounds_harness::{Bounds, Error, LaunchSpec};

fn context(timeout: Duration) -> ScenarioContext {
    ScenarioContext {
        session_identity: "integration".to_string(),
        wait: WaitOptions::new("shown", timeout),
        geometry: GeometryConfig::default(),
    }
}

fn mock_runtime_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_mock-runtime"))
}

async fn spawn_mock(args: &[&str]) -> ProcessRuntime {
    let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
    ProcessRuntime::spawn(&mock_runtime_bin(), &args, Duration::from_secs(10))
        .await
        .expect("Failed to spawn mock runtime")
}

// ============== Simulated runtime ==============

#[tokio::test]
async fn test_fixed_bounds_are_displayed_exactly() {
    let sim = SimulatedRuntime::default();
    let bounds = Bounds::new(120, 80, 640, 480);

    let aggregate = scenario::run(
        ScenarioKind::Fixed(bounds),
        Arc::new(sim.clone()),
        &context(Duration::from_secs(5)),
        1,
    )
    .await
    .unwrap();

    assert!(aggregate.passed(), "{:?}", aggregate.verdict());
    assert_eq!(aggregate.outcomes[0].observed, Some(bounds));
    assert!(sim.open_entities().is_empty());
    assert_eq!(sim.open_connections(), 0);
}

#[tokio::test]
async fn test_moved_bounds_survive_reconnect() {
    let sim = SimulatedRuntime::default();
    let runtime: Arc<dyn RemoteRuntime> = Arc::new(sim.clone());
    let spec = LaunchSpec::new("persisted-app", Bounds::new(10, 10, 500, 500));
    let moved = Bounds::new(200, 150, 300, 200);

    let mut session = Session::open(runtime.clone(), "integration").await.unwrap();
    let mut entity = launch(&session, &spec).await.unwrap();
    let shown = await_event(runtime.clone(), entity.id(), "shown", Duration::from_secs(5)).await;
    assert_eq!(shown, EventWaitResult::Observed);

    sim.move_entity(entity.id(), moved).unwrap();
    entity.close().await.unwrap();
    session.reopen().await.unwrap();

    let mut relaunched = launch(&session, &spec).await.unwrap();
    let shown = await_event(runtime, relaunched.id(), "shown", Duration::from_secs(5)).await;
    assert!(shown.is_observed());
    assert_eq!(relaunched.read_bounds().await.unwrap(), moved);

    relaunched.close().await.unwrap();
    session.close().await.unwrap();
}

/// Relaunch an application whose window the runtime closed on disconnect;
/// the first window's ready event must not release the second wait
async fn assert_relaunch_waits_for_new_window(runtime: Arc<dyn RemoteRuntime>) {
    let spec = LaunchSpec::new("reopened-app", Bounds::new(10, 10, 500, 500));
    let mut session = Session::open(runtime.clone(), "integration").await.unwrap();

    // Left open on purpose, so the runtime closes it during reopen
    let first = runtime.launch(session.connection().unwrap(), &spec).await.unwrap();
    let shown = await_event(runtime.clone(), &first, "shown", Duration::from_secs(5)).await;
    assert_eq!(shown, EventWaitResult::Observed);

    session.reopen().await.unwrap();
    let second = runtime.launch(session.connection().unwrap(), &spec).await.unwrap();
    assert_eq!(second, first);

    let early = await_event(runtime.clone(), &second, "shown", Duration::from_millis(200)).await;
    assert_eq!(early, EventWaitResult::TimedOut);
    let shown = await_event(runtime.clone(), &second, "shown", Duration::from_secs(5)).await;
    assert_eq!(shown, EventWaitResult::Observed);

    runtime.close(&second).await.unwrap();
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_relaunch_after_reconnect_waits_for_ready() {
    let sim = SimulatedRuntime::new(SimOptions {
        ready_delay: Duration::from_millis(500),
        ..SimOptions::default()
    });
    assert_relaunch_waits_for_new_window(Arc::new(sim)).await;
}

#[tokio::test]
async fn test_restart_scenario_passes() {
    let sim = SimulatedRuntime::default();
    let aggregate = scenario::run(
        ScenarioKind::Restart,
        Arc::new(sim.clone()),
        &context(Duration::from_secs(5)),
        3,
    )
    .await
    .unwrap();

    assert_eq!(aggregate.len(), 3);
    assert!(aggregate.passed(), "{:?}", aggregate.verdict());
    // Same application every iteration
    let identity = &aggregate.outcomes[0].identity;
    assert!(aggregate.outcomes.iter().all(|o| &o.identity == identity));
    assert_eq!(sim.launch_count(), 3);
}

#[tokio::test]
async fn test_default_position_uses_fresh_identities() {
    let sim = SimulatedRuntime::default();
    let aggregate = scenario::run(
        ScenarioKind::DefaultPosition,
        Arc::new(sim.clone()),
        &context(Duration::from_secs(5)),
        5,
    )
    .await
    .unwrap();

    assert_eq!(aggregate.len(), 5);
    assert!(aggregate.passed(), "{:?}", aggregate.verdict());

    let mut identities: Vec<&str> = aggregate.outcomes.iter().map(|o| o.identity.as_str()).collect();
    identities.sort();
    identities.dedup();
    assert_eq!(identities.len(), 5);
    assert!(aggregate
        .outcomes
        .iter()
        .all(|o| o.observed == Some(DEFAULT_POSITION)));
}

#[tokio::test]
async fn test_random_scenario_passes_on_faithful_runtime() {
    let aggregate = scenario::run(
        ScenarioKind::Random,
        Arc::new(SimulatedRuntime::default()),
        &context(Duration::from_secs(5)),
        20,
    )
    .await
    .unwrap();
    assert!(aggregate.passed(), "{:?}", aggregate.verdict());
}

#[tokio::test]
async fn test_missing_ready_event_times_out_and_cleans_up() {
    let sim = SimulatedRuntime::new(SimOptions {
        suppress_ready: true,
        ..SimOptions::default()
    });

    let aggregate = scenario::run(
        ScenarioKind::DefaultPosition,
        Arc::new(sim.clone()),
        &context(Duration::from_millis(100)),
        2,
    )
    .await
    .unwrap();

    assert_eq!(aggregate.len(), 2);
    assert_eq!(aggregate.failure_count(), 2);
    for outcome in &aggregate.outcomes {
        assert!(matches!(outcome.failure, Some(Error::EventTimeout { .. })));
        assert_eq!(outcome.observed, None);
    }
    assert!(sim.open_entities().is_empty());
    assert_eq!(sim.open_connections(), 0);
    assert_eq!(sim.listener_count(), 0);
}

#[tokio::test]
async fn test_skewed_runtime_fails_every_iteration() {
    let sim = SimulatedRuntime::new(SimOptions {
        skew: Some((BoundsField::Left, 2)),
        ..SimOptions::default()
    });

    let aggregate = scenario::run(
        ScenarioKind::DefaultPosition,
        Arc::new(sim),
        &context(Duration::from_secs(5)),
        4,
    )
    .await
    .unwrap();

    assert_eq!(aggregate.len(), 4);
    assert_eq!(aggregate.failure_count(), 4);
    let err = aggregate.verdict().unwrap_err().to_string();
    assert!(err.contains("4 of 4 iterations failed"));
    assert!(err.contains("differs in left"));
    assert!(err.contains("expected top=10 left=10 width=500 height=500"));
    assert!(err.contains("observed top=10 left=12 width=500 height=500"));
}

#[tokio::test]
async fn test_unreachable_runtime_aborts_run() {
    let sim = SimulatedRuntime::new(SimOptions {
        unreachable: true,
        ..SimOptions::default()
    });

    let err = scenario::run(
        ScenarioKind::DefaultPosition,
        Arc::new(sim),
        &context(Duration::from_secs(5)),
        3,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::ConnectionFailed { .. }));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_other_entities_events_do_not_release_gate() {
    let sim = SimulatedRuntime::new(SimOptions {
        suppress_ready: true,
        ..SimOptions::default()
    });
    let runtime: Arc<dyn RemoteRuntime> = Arc::new(sim.clone());
    let settings = RepeatSettings {
        iterations: 1,
        session_identity: "integration".to_string(),
        policy: SessionPolicy::Reuse,
        wait: WaitOptions::new("shown", Duration::from_millis(200)),
    };

    // The splash decoy still announces "shown" under a different entity
    let aggregate = run_repeated(runtime, &settings, |_, _| {
        IterationPlan::exact(LaunchSpec::new("decoyed", DEFAULT_POSITION))
    })
    .await
    .unwrap();

    assert!(matches!(
        aggregate.outcomes[0].failure,
        Some(Error::EventTimeout { .. })
    ));
}

#[tokio::test]
async fn test_zero_iterations_pass_vacuously() {
    let sim = SimulatedRuntime::default();
    let aggregate = scenario::run(
        ScenarioKind::DefaultPosition,
        Arc::new(sim.clone()),
        &context(Duration::from_secs(5)),
        0,
    )
    .await
    .unwrap();
    assert!(aggregate.is_empty());
    assert!(aggregate.verdict().is_ok());
    assert_eq!(sim.launch_count(), 0);
}

// ============== Mock runtime process ==============

#[tokio::test]
async fn test_process_runtime_default_position() {
    let runtime = spawn_mock(&[]).await;
    assert!(runtime.is_running());

    let aggregate = scenario::run(
        ScenarioKind::DefaultPosition,
        Arc::new(runtime),
        &context(Duration::from_secs(10)),
        3,
    )
    .await
    .unwrap();
    assert!(aggregate.passed(), "{:?}", aggregate.verdict());
}

#[tokio::test]
async fn test_process_runtime_restart_persists_bounds() {
    let runtime = spawn_mock(&[]).await;
    let aggregate = scenario::run(
        ScenarioKind::Restart,
        Arc::new(runtime),
        &context(Duration::from_secs(10)),
        3,
    )
    .await
    .unwrap();
    assert_eq!(aggregate.len(), 3);
    assert!(aggregate.passed(), "{:?}", aggregate.verdict());
}

#[tokio::test]
async fn test_process_runtime_maps_wire_errors() {
    let runtime: Arc<dyn RemoteRuntime> = Arc::new(spawn_mock(&[]).await);

    let conn = runtime.connect("integration").await.unwrap();
    let err = runtime.connect("integration").await.unwrap_err();
    assert!(matches!(err, Error::IdentityInUse(_)));

    let err = runtime
        .launch(&conn, &LaunchSpec::new("flat", Bounds::new(0, 0, 500, 0)))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Launch { .. }));

    let missing = LaunchSpec::new("missing", DEFAULT_POSITION).entity_id();
    let err = runtime.read_bounds(&missing).await.unwrap_err();
    assert!(matches!(err, Error::EntityNotFound(_)));

    runtime.disconnect(&conn).await.unwrap();
}

#[tokio::test]
async fn test_process_runtime_suppressed_ready_times_out() {
    let runtime = spawn_mock(&["--suppress-ready"]).await;
    let aggregate = scenario::run(
        ScenarioKind::Fixed(DEFAULT_POSITION),
        Arc::new(runtime),
        &context(Duration::from_millis(300)),
        1,
    )
    .await
    .unwrap();
    assert!(matches!(
        aggregate.outcomes[0].failure,
        Some(Error::EventTimeout { .. })
    ));
}

#[tokio::test]
async fn test_process_runtime_shutdown() {
    let runtime = spawn_mock(&[]).await;
    runtime.shutdown().unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), runtime.connect("integration"))
        .await
        .expect("connect should fail quickly after shutdown");
    assert!(matches!(result, Err(Error::RuntimeCrashed)));
}

#[tokio::test]
async fn test_process_runtime_exit_fails_requests_fast() {
    // Rejected by the argument parser, so the process exits right away
    let runtime = ProcessRuntime::spawn(
        &mock_runtime_bin(),
        &["--no-such-flag".to_string()],
        Duration::from_secs(30),
    )
    .await
    .unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while runtime.is_running() {
        assert!(tokio::time::Instant::now() < deadline, "runtime did not exit");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let result = tokio::time::timeout(Duration::from_secs(3), runtime.connect("integration"))
        .await
        .expect("connect should not wait for the request timeout");
    assert!(matches!(result, Err(Error::RuntimeCrashed)));
}

#[tokio::test]
async fn test_process_runtime_relaunch_after_reconnect() {
    let runtime = spawn_mock(&["--ready-delay-ms", "1000"]).await;
    assert_relaunch_waits_for_new_window(Arc::new(runtime)).await;
}

// ============== CLI ==============

/// Test context with a private configuration file
struct CliContext {
    dir: tempfile::TempDir,
    config: PathBuf,
}

impl CliContext {
    fn new(config: &str) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, config).expect("Failed to write config");
        Self { dir, config: path }
    }

    fn run(&self, args: &[&str], env: &[(&str, &str)]) -> CliOutput {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_bounds-harness"));
        cmd.arg("--config")
            .arg(&self.config)
            .args(args)
            .env("XDG_DATA_HOME", self.dir.path())
            .env_remove("BOUNDS_HARNESS_REPEAT")
            .env_remove("RUST_LOG");
        for (key, value) in env {
            cmd.env(key, value);
        }
        let output = cmd.output().expect("Failed to run bounds-harness");

        CliOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            code: output.status.code(),
        }
    }
}

/// Output from a harness command
#[derive(Debug)]
struct CliOutput {
    stdout: String,
    stderr: String,
    code: Option<i32>,
}

const FAST_CONFIG: &str = "[timeouts]\nready_secs = 5\n";

#[test]
fn test_cli_fixed_passes() {
    let ctx = CliContext::new(FAST_CONFIG);
    let output = ctx.run(
        &["fixed", "--top", "10", "--left", "20", "--width", "300", "--height", "200"],
        &[],
    );
    assert_eq!(output.code, Some(0), "{:?}", output);
    assert!(output.stdout.contains("1 of 1 iteration(s) passed"));
}

#[test]
fn test_cli_repeat_env_override() {
    let ctx = CliContext::new(FAST_CONFIG);
    let output = ctx.run(&["default-position"], &[("BOUNDS_HARNESS_REPEAT", "4")]);
    assert_eq!(output.code, Some(0), "{:?}", output);
    assert!(output.stdout.contains("4 of 4 iteration(s) passed"));

    // Flag wins over the environment
    let output = ctx.run(
        &["default-position", "--repeat", "2"],
        &[("BOUNDS_HARNESS_REPEAT", "4")],
    );
    assert_eq!(output.code, Some(0), "{:?}", output);
    assert!(output.stdout.contains("2 of 2 iteration(s) passed"));
}

#[test]
fn test_cli_rejects_invalid_repeat_env() {
    let ctx = CliContext::new(FAST_CONFIG);
    let output = ctx.run(&["restart"], &[("BOUNDS_HARNESS_REPEAT", "many")]);
    assert_eq!(output.code, Some(1));
    assert!(output.stderr.contains("BOUNDS_HARNESS_REPEAT"), "{}", output.stderr);
}

#[test]
fn test_cli_process_runtime_timeout_exits_nonzero() {
    let config = format!(
        "[runtime]\nkind = \"process\"\ncommand = {:?}\nargs = [\"--suppress-ready\"]\n\n[timeouts]\nready_secs = 0\n",
        mock_runtime_bin().display().to_string()
    );
    let ctx = CliContext::new(&config);
    let output = ctx.run(&["default-position", "--repeat", "2"], &[]);
    assert_eq!(output.code, Some(1), "{:?}", output);
    assert!(output.stderr.contains("2 of 2 iterations failed"), "{}", output.stderr);
    assert!(output.stderr.contains("'shown'"), "{}", output.stderr);
}

#[test]
fn test_cli_runs_scenario_files() {
    let ctx = CliContext::new(FAST_CONFIG);
    let passing = ctx.dir.path().join("fixed.yaml");
    std::fs::write(
        &passing,
        "name: fixed window\nscenario: fixed\nbounds: { top: 5, left: 5, width: 400, height: 300 }\n",
    )
    .unwrap();
    let failing = ctx.dir.path().join("expects-failure.yaml");
    std::fs::write(
        &failing,
        "name: wrong expectation\nscenario: default_position\nrepeat: 1\nexpect:\n  passed: false\n",
    )
    .unwrap();

    let output = ctx.run(&["scenario", passing.to_str().unwrap()], &[]);
    assert_eq!(output.code, Some(0), "{:?}", output);
    assert!(output.stdout.contains("Test Passed"));

    let output = ctx.run(
        &["scenario", passing.to_str().unwrap(), failing.to_str().unwrap()],
        &[],
    );
    assert_eq!(output.code, Some(1), "{:?}", output);
    assert!(output.stderr.contains("wrong expectation"), "{}", output.stderr);
}

#[test]
fn test_config_file_is_used() {
    let config = Config::parse(FAST_CONFIG).unwrap();
    assert_eq!(config.timeouts.ready(), Duration::from_secs(5));
}

#[tokio::test]
async fn test_bundled_scenarios_pass() {
    let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("scenarios");
    let config = Config::parse(FAST_CONFIG).unwrap();

    let mut paths: Vec<PathBuf> = std::fs::read_dir(&dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "yaml"))
        .collect();
    paths.sort();
    assert!(!paths.is_empty());

    for path in paths {
        let result = bounds_harness::testing::run_scenario(
            &path,
            Arc::new(SimulatedRuntime::default()),
            &config,
            false,
        )
        .await
        .unwrap();
        assert!(result.passed, "{}: {:?}", path.display(), result.error);
    }
}
