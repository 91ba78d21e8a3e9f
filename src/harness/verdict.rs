//! Assertion and repeat driver
//!
//! One iteration is: arm gate → launch → wait for the ready event → read
//! bounds → compare exactly → close the entity. Iteration failures are
//! recorded and never stop the remaining iterations; only infrastructure
//! errors abort a run.

use std::sync::Arc;
use std::time::Duration;

use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::remote::{Bounds, LaunchSpec, RemoteRuntime};

use super::driver::{self, RemoteEntity};
use super::gate::{EventGate, EventWaitResult};
use super::session::Session;

/// Which event to wait for and for how long
#[derive(Debug, Clone)]
pub struct WaitOptions {
    pub event: String,
    pub timeout: Duration,
}

impl WaitOptions {
    pub fn new(event: impl Into<String>, timeout: Duration) -> Self {
        Self {
            event: event.into(),
            timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.events.ready.clone(), config.timeouts.ready())
    }
}

/// What one iteration launches and what it expects to observe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationPlan {
    pub spec: LaunchSpec,
    pub expected: Bounds,
}

impl IterationPlan {
    /// Expect exactly the requested geometry
    pub fn exact(spec: LaunchSpec) -> Self {
        let expected = spec.bounds;
        Self { spec, expected }
    }

    /// Expect geometry other than the requested one, e.g. restored bounds
    pub fn expecting(spec: LaunchSpec, expected: Bounds) -> Self {
        Self { spec, expected }
    }
}

/// Record of a single iteration
#[derive(Debug)]
pub struct IterationOutcome {
    pub index: usize,
    pub identity: String,
    pub requested: Bounds,
    pub expected: Bounds,
    pub observed: Option<Bounds>,
    pub failure: Option<Error>,
}

impl IterationOutcome {
    fn new(plan: &IterationPlan) -> Self {
        Self {
            index: 0,
            identity: plan.spec.identity.clone(),
            requested: plan.spec.bounds,
            expected: plan.expected,
            observed: None,
            failure: None,
        }
    }

    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }

    /// Record a failure, keeping the first one
    fn fail(&mut self, error: Error) {
        if self.failure.is_none() {
            self.failure = Some(error);
        } else {
            tracing::warn!(identity = %self.identity, error = %error, "Additional iteration failure");
        }
    }
}

/// Run one iteration against an open session
///
/// Returns `Err` only for errors that make further iterations pointless.
pub async fn run_iteration(
    session: &Session,
    plan: &IterationPlan,
    wait: &WaitOptions,
) -> Result<IterationOutcome> {
    let mut outcome = IterationOutcome::new(plan);

    // Subscribe before launching so the ready event cannot be missed
    let gate = EventGate::arm(session.runtime().clone(), &plan.spec.entity_id(), &wait.event);

    let mut entity = match driver::launch(session, &plan.spec).await {
        Ok(entity) => entity,
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => {
            tracing::info!(identity = %plan.spec.identity, error = %e, "Launch rejected");
            outcome.fail(e);
            return Ok(outcome);
        }
    };

    let checked = check_entity(&entity, gate, plan, wait, &mut outcome).await;
    let closed = entity.close().await;

    for result in [checked, closed] {
        match result {
            Ok(()) => {}
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => outcome.fail(e),
        }
    }
    Ok(outcome)
}

async fn check_entity(
    entity: &RemoteEntity,
    gate: EventGate,
    plan: &IterationPlan,
    wait: &WaitOptions,
    outcome: &mut IterationOutcome,
) -> Result<()> {
    if gate.wait(wait.timeout).await == EventWaitResult::TimedOut {
        return Err(Error::EventTimeout {
            identity: entity.id().to_string(),
            event: wait.event.clone(),
            timeout: wait.timeout,
        });
    }

    let observed = entity.read_bounds().await?;
    outcome.observed = Some(observed);
    tracing::debug!(identity = %plan.spec.identity, requested = %plan.spec.bounds, "Default bounds");
    tracing::debug!(identity = %plan.spec.identity, observed = %observed, "Shown bounds");

    if observed != plan.expected {
        tracing::info!(
            identity = %plan.spec.identity,
            expected = %plan.expected,
            observed = %observed,
            "Window bounds do not match"
        );
        return Err(Error::BoundsMismatch {
            identity: plan.spec.identity.clone(),
            expected: plan.expected,
            observed,
        });
    }
    Ok(())
}

/// Whether a run keeps one session or reconnects between iterations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPolicy {
    Reuse,
    /// Close and reopen the session before every iteration after the first
    Restart,
}

/// Settings of a repeated run
#[derive(Debug, Clone)]
pub struct RepeatSettings {
    pub iterations: usize,
    pub session_identity: String,
    pub policy: SessionPolicy,
    pub wait: WaitOptions,
}

/// Outcomes of every iteration of a run, in order
#[derive(Debug, Default)]
pub struct AggregateResult {
    pub outcomes: Vec<IterationOutcome>,
}

impl AggregateResult {
    pub fn passed(&self) -> bool {
        self.outcomes.iter().all(IterationOutcome::passed)
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn failure_count(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.passed()).count()
    }

    /// One line per failed iteration
    pub fn failure_reasons(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter_map(|o| {
                o.failure
                    .as_ref()
                    .map(|e| format!("iteration {} ({}): {}", o.index + 1, o.identity, e))
            })
            .collect()
    }

    /// Overall verdict listing every failed iteration
    pub fn verdict(&self) -> Result<()> {
        if self.passed() {
            return Ok(());
        }
        Err(Error::TestAssertion(format!(
            "{} of {} iterations failed:\n  - {}",
            self.failure_count(),
            self.len(),
            self.failure_reasons().join("\n  - ")
        )))
    }
}

/// Run `settings.iterations` iterations sequentially
///
/// `plan_for` builds each iteration's plan and sees the outcomes so far.
/// The session is closed before returning, whatever the result.
pub async fn run_repeated<F>(
    runtime: Arc<dyn RemoteRuntime>,
    settings: &RepeatSettings,
    mut plan_for: F,
) -> Result<AggregateResult>
where
    F: FnMut(usize, &[IterationOutcome]) -> IterationPlan,
{
    tracing::debug!(iterations = settings.iterations, policy = ?settings.policy, "Starting run");
    let mut session = Session::open(runtime, &settings.session_identity).await?;

    let result = run_all(&mut session, settings, &mut plan_for).await;
    let closed = session.close().await;

    let aggregate = result?;
    closed?;
    tracing::info!(
        iterations = aggregate.len(),
        failures = aggregate.failure_count(),
        "Run finished"
    );
    Ok(aggregate)
}

async fn run_all<F>(
    session: &mut Session,
    settings: &RepeatSettings,
    plan_for: &mut F,
) -> Result<AggregateResult>
where
    F: FnMut(usize, &[IterationOutcome]) -> IterationPlan,
{
    let mut aggregate = AggregateResult {
        outcomes: Vec::with_capacity(settings.iterations),
    };

    for index in 0..settings.iterations {
        if index > 0 && settings.policy == SessionPolicy::Restart {
            session.reopen().await?;
        }

        let plan = plan_for(index, &aggregate.outcomes);
        let mut outcome = run_iteration(session, &plan, &settings.wait).await?;
        outcome.index = index;

        match &outcome.failure {
            None => tracing::debug!(iteration = index + 1, identity = %outcome.identity, "Iteration passed"),
            Some(e) => tracing::info!(iteration = index + 1, identity = %outcome.identity, error = %e, "Iteration failed"),
        }
        aggregate.outcomes.push(outcome);
    }
    Ok(aggregate)
}
