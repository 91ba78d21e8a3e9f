//! Event-driven integration harness
//!
//! Control flow of a run: session → launch → wait for the ready event →
//! assert bounds → close entity → (repeat) → close session.

pub mod driver;
pub mod gate;
pub mod scenario;
pub mod session;
pub mod verdict;

pub use driver::{launch, RemoteEntity};
pub use gate::{await_event, EventGate, EventWaitResult, Latch, Subscription};
pub use scenario::{ScenarioContext, ScenarioKind, DEFAULT_POSITION};
pub use session::Session;
pub use verdict::{
    run_iteration, run_repeated, AggregateResult, IterationOutcome, IterationPlan,
    RepeatSettings, SessionPolicy, WaitOptions,
};
