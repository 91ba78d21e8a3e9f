//! Remote-control contract of the runtime under test
//!
//! The harness only needs six operations from a runtime plus an
//! asynchronous event stream. Runtimes deliver every event on a single
//! shared stream, so listeners see events of other entities and must filter
//! on both the entity and the event name.

pub mod client;
pub mod codec;
pub mod sim;
pub mod types;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::common::Result;

pub use client::ProcessRuntime;
pub use sim::{SimOptions, SimulatedRuntime};
pub use types::*;

/// Callback invoked on the runtime's event delivery task
///
/// Listeners must return quickly and never block: they run on the path
/// that delivers every other event, possibly with runtime state locked, so
/// they must not call back into the runtime either.
pub type EventListener = Arc<dyn Fn(&RuntimeEvent) + Send + Sync>;

/// Event a runtime publishes when an entity goes away
pub const CLOSED_EVENT: &str = "closed";

/// Operations a runtime exposes to the harness
#[async_trait]
pub trait RemoteRuntime: Send + Sync {
    /// Open a connection bound to `identity`
    async fn connect(&self, identity: &str) -> Result<ConnectionId>;

    /// Release a connection
    async fn disconnect(&self, connection: &ConnectionId) -> Result<()>;

    /// Launch an application; completion is signalled on the event stream
    async fn launch(&self, connection: &ConnectionId, spec: &LaunchSpec) -> Result<EntityId>;

    /// Register a listener for `event` of `entity`
    fn subscribe(&self, entity: &EntityId, event: &str, listener: EventListener) -> SubscriptionId;

    /// Remove a listener; unknown ids are ignored
    fn unsubscribe(&self, id: SubscriptionId);

    /// Current geometry of a launched entity
    async fn read_bounds(&self, entity: &EntityId) -> Result<Bounds>;

    /// Close a launched entity
    async fn close(&self, entity: &EntityId) -> Result<()>;

    /// Last event delivered for `(entity, event)`, if the runtime buffers them
    fn last_event(&self, _entity: &EntityId, _event: &str) -> Option<RuntimeEvent> {
        None
    }
}

/// Listener table with an optional buffer of the last event per key
pub struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: Mutex<HashMap<SubscriptionId, EventListener>>,
    last: Option<Mutex<HashMap<(EntityId, String), RuntimeEvent>>>,
}

impl ListenerRegistry {
    /// Registry that remembers the last event per `(entity, event)`
    pub fn buffered() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            listeners: Mutex::new(HashMap::new()),
            last: Some(Mutex::new(HashMap::new())),
        }
    }

    /// Registry without replay; late subscribers miss earlier events
    pub fn unbuffered() -> Self {
        Self {
            last: None,
            ..Self::buffered()
        }
    }

    pub fn register(&self, listener: EventListener) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().insert(id, listener);
        id
    }

    pub fn remove(&self, id: SubscriptionId) {
        self.listeners.lock().remove(&id);
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver an event to every registered listener
    pub fn dispatch(&self, event: &RuntimeEvent) {
        if let Some(last) = &self.last {
            last.lock()
                .insert((event.entity.clone(), event.name.clone()), event.clone());
        }

        // Listeners run outside the lock so they may (un)subscribe freely
        let listeners: Vec<EventListener> = self.listeners.lock().values().cloned().collect();
        for listener in listeners {
            listener(event);
        }
    }

    pub fn last_event(&self, entity: &EntityId, event: &str) -> Option<RuntimeEvent> {
        self.last
            .as_ref()?
            .lock()
            .get(&(entity.clone(), event.to_string()))
            .cloned()
    }

    /// Drop buffered events of an entity
    pub fn forget(&self, entity: &EntityId) {
        if let Some(last) = &self.last {
            last.lock().retain(|(e, _), _| e != entity);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_listener(counter: &Arc<AtomicUsize>) -> EventListener {
        let counter = counter.clone();
        Arc::new(move |_event: &RuntimeEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_dispatch_reaches_every_listener_until_removed() {
        let registry = ListenerRegistry::buffered();
        let hits = Arc::new(AtomicUsize::new(0));
        let a = registry.register(counting_listener(&hits));
        registry.register(counting_listener(&hits));

        let event = RuntimeEvent::new(EntityId::new("app"), "shown");
        registry.dispatch(&event);
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        registry.remove(a);
        registry.dispatch(&event);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_buffered_registry_replays_last_event() {
        let registry = ListenerRegistry::buffered();
        let entity = EntityId::new("app");
        registry.dispatch(&RuntimeEvent::new(entity.clone(), "shown"));

        assert!(registry.last_event(&entity, "shown").is_some());
        assert!(registry.last_event(&entity, "closed").is_none());

        registry.forget(&entity);
        assert!(registry.last_event(&entity, "shown").is_none());
    }

    #[test]
    fn test_unbuffered_registry_has_no_replay() {
        let registry = ListenerRegistry::unbuffered();
        let entity = EntityId::new("app");
        registry.dispatch(&RuntimeEvent::new(entity.clone(), "shown"));
        assert!(registry.last_event(&entity, "shown").is_none());
    }
}
