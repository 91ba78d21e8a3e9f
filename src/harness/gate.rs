//! Event wait gate
//!
//! Turns the runtime's asynchronous event stream into a bounded,
//! single-resolution wait. A gate is armed before the action that triggers
//! the event so an event delivered before the caller starts waiting is not
//! lost; runtimes that buffer their last event also cover gates armed late.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use crate::remote::{EntityId, EventListener, RemoteRuntime, RuntimeEvent, SubscriptionId};

/// Outcome of waiting for an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventWaitResult {
    Observed,
    TimedOut,
}

impl EventWaitResult {
    pub fn is_observed(self) -> bool {
        self == EventWaitResult::Observed
    }
}

/// Single-permit signal released at most once
#[derive(Debug, Default)]
pub struct Latch {
    fired: AtomicBool,
    notify: Notify,
}

impl Latch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Release the latch; returns false if it was already released
    ///
    /// Never blocks, so it is safe to call from an event delivery path.
    pub fn release(&self) -> bool {
        if self.fired.swap(true, Ordering::AcqRel) {
            return false;
        }
        // Stores a permit when nobody is waiting yet
        self.notify.notify_one();
        true
    }

    pub fn is_released(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Wait until released or until `timeout` elapses
    pub async fn wait(&self, timeout: Duration) -> EventWaitResult {
        if self.is_released() {
            return EventWaitResult::Observed;
        }
        match tokio::time::timeout(timeout, self.notify.notified()).await {
            Ok(()) => EventWaitResult::Observed,
            Err(_) => EventWaitResult::TimedOut,
        }
    }
}

/// Subscription that is removed when dropped
pub struct Subscription {
    runtime: Arc<dyn RemoteRuntime>,
    id: Option<SubscriptionId>,
}

impl Subscription {
    pub fn new(
        runtime: Arc<dyn RemoteRuntime>,
        entity: &EntityId,
        event: &str,
        listener: EventListener,
    ) -> Self {
        let id = runtime.subscribe(entity, event, listener);
        Self {
            runtime,
            id: Some(id),
        }
    }

    /// Unsubscribe now instead of at drop
    pub fn cancel(&mut self) {
        if let Some(id) = self.id.take() {
            self.runtime.unsubscribe(id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// One-shot wait for `event` from `entity`
pub struct EventGate {
    entity: EntityId,
    event: String,
    latch: Arc<Latch>,
    subscription: Subscription,
}

impl EventGate {
    /// Subscribe and start buffering the first matching event
    pub fn arm(runtime: Arc<dyn RemoteRuntime>, entity: &EntityId, event: &str) -> Self {
        let latch = Arc::new(Latch::new());

        let listener: EventListener = {
            let latch = latch.clone();
            let entity = entity.clone();
            let event = event.to_string();
            Arc::new(move |incoming: &RuntimeEvent| {
                if incoming.matches(&entity, &event) && latch.release() {
                    tracing::trace!(entity = %entity, event = %event, "Gate released");
                }
            })
        };
        let subscription = Subscription::new(runtime.clone(), entity, event, listener);

        // Cover an event delivered before the subscription existed
        if runtime.last_event(entity, event).is_some() {
            tracing::debug!(entity = %entity, event, "Event already delivered before subscribing");
            latch.release();
        }

        Self {
            entity: entity.clone(),
            event: event.to_string(),
            latch,
            subscription,
        }
    }

    pub fn entity(&self) -> &EntityId {
        &self.entity
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    /// Wait for the event, then unsubscribe
    pub async fn wait(mut self, timeout: Duration) -> EventWaitResult {
        let result = self.latch.wait(timeout).await;
        self.subscription.cancel();
        tracing::debug!(
            entity = %self.entity,
            event = %self.event,
            ?result,
            "Finished waiting for event"
        );
        result
    }
}

/// Wait up to `timeout` for `event` from `entity`
///
/// Subscribes at call time; events already delivered are only seen if the
/// runtime buffers its last event.
pub async fn await_event(
    runtime: Arc<dyn RemoteRuntime>,
    entity: &EntityId,
    event: &str,
    timeout: Duration,
) -> EventWaitResult {
    EventGate::arm(runtime, entity, event).wait(timeout).await
}
