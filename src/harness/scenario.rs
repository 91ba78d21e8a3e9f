//! Window position scenarios
//!
//! - restart: one application with random default bounds is launched once
//!   per session; the session is reopened between launches and every launch
//!   after the first must come back with the bounds observed the first time.
//! - default position: fresh applications placed at a fixed position.
//! - random: fresh applications with random geometry, compared exactly.
//! - fixed: fresh applications with caller supplied geometry.

use std::sync::Arc;

use rand::Rng;
use uuid::Uuid;

use crate::common::config::{Config, GeometryConfig};
use crate::common::Result;
use crate::remote::{Bounds, LaunchSpec, RemoteRuntime};

use super::verdict::{
    run_repeated, AggregateResult, IterationPlan, RepeatSettings, SessionPolicy, WaitOptions,
};

/// Geometry used by the default-position scenario
pub const DEFAULT_POSITION: Bounds = Bounds::new(10, 10, 500, 500);

/// Scenario selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioKind {
    Restart,
    DefaultPosition,
    Random,
    Fixed(Bounds),
}

impl ScenarioKind {
    /// Iteration count when nothing overrides it
    pub fn default_repeat(&self, config: &Config) -> usize {
        match self {
            ScenarioKind::Restart => config.repeat.restart,
            ScenarioKind::DefaultPosition | ScenarioKind::Random => config.repeat.default_position,
            ScenarioKind::Fixed(_) => 1,
        }
    }

    pub fn policy(&self) -> SessionPolicy {
        match self {
            ScenarioKind::Restart => SessionPolicy::Restart,
            _ => SessionPolicy::Reuse,
        }
    }
}

/// Settings shared by every scenario
#[derive(Debug, Clone)]
pub struct ScenarioContext {
    pub session_identity: String,
    pub wait: WaitOptions,
    pub geometry: GeometryConfig,
}

impl ScenarioContext {
    pub fn from_config(config: &Config) -> Self {
        Self {
            session_identity: config.session.identity.clone(),
            wait: WaitOptions::from_config(config),
            geometry: config.geometry,
        }
    }
}

/// Fresh application identity
pub fn new_identity() -> String {
    Uuid::new_v4().to_string()
}

/// Random bounds that plausibly fit inside a display
///
/// Width and height are offset by the configured minimums so the runtime
/// never has to grow the window.
pub fn random_bounds<R: Rng + ?Sized>(rng: &mut R, geometry: &GeometryConfig) -> Bounds {
    let max = geometry.random_max.max(0);
    let top = rng.gen_range(0..=max);
    let left = rng.gen_range(0..=max);
    let height = rng.gen_range(0..=max) + geometry.min_height;
    let width = rng.gen_range(0..=max) + geometry.min_width;
    Bounds::new(top, left, width, height)
}

/// Run a scenario for `iterations` iterations
pub async fn run(
    kind: ScenarioKind,
    runtime: Arc<dyn RemoteRuntime>,
    ctx: &ScenarioContext,
    iterations: usize,
) -> Result<AggregateResult> {
    let settings = RepeatSettings {
        iterations,
        session_identity: ctx.session_identity.clone(),
        policy: kind.policy(),
        wait: ctx.wait.clone(),
    };
    tracing::info!(scenario = ?kind, iterations, "Running scenario");

    match kind {
        ScenarioKind::Restart => {
            let spec = LaunchSpec::new(
                new_identity(),
                random_bounds(&mut rand::thread_rng(), &ctx.geometry),
            );
            run_repeated(runtime, &settings, move |_, previous| {
                let expected = previous
                    .first()
                    .and_then(|first| first.observed)
                    .unwrap_or(spec.bounds);
                IterationPlan::expecting(spec.clone(), expected)
            })
            .await
        }
        ScenarioKind::DefaultPosition => {
            run_repeated(runtime, &settings, |_, _| {
                IterationPlan::exact(LaunchSpec::new(new_identity(), DEFAULT_POSITION))
            })
            .await
        }
        ScenarioKind::Random => {
            let geometry = ctx.geometry;
            run_repeated(runtime, &settings, move |_, _| {
                let bounds = random_bounds(&mut rand::thread_rng(), &geometry);
                IterationPlan::exact(LaunchSpec::new(new_identity(), bounds))
            })
            .await
        }
        ScenarioKind::Fixed(bounds) => {
            run_repeated(runtime, &settings, move |_, _| {
                IterationPlan::exact(LaunchSpec::new(new_identity(), bounds))
            })
            .await
        }
    }
}
