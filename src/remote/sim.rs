//! Simulated desktop runtime
//!
//! An in-process runtime that behaves like the real one where the harness
//! can observe it: windows are clamped to a minimum size and fitted into the
//! display, the ready event is delivered asynchronously from a separate
//! task, and bounds are persisted per application identity when a window
//! closes so that the next launch restores them.
//!
//! Faults (dropped ready events, skewed bounds, refused connections) can be
//! injected through [`SimOptions`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::common::{Error, Result};

use super::{
    Bounds, ConnectionId, EntityId, EventListener, LaunchSpec, ListenerRegistry, RemoteRuntime,
    RuntimeEvent, SubscriptionId, CLOSED_EVENT,
};

/// A single geometry field, used for fault injection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundsField {
    Top,
    Left,
    Width,
    Height,
}

/// Behaviour knobs of the simulated runtime
#[derive(Debug, Clone)]
pub struct SimOptions {
    /// Minimum window width enforced by the runtime
    pub min_width: i32,
    /// Minimum window height enforced by the runtime
    pub min_height: i32,
    /// Display windows are fitted into
    pub display: Bounds,
    /// Name of the event sent once a window is displayed
    pub ready_event: String,
    /// Delay between a launch and its ready event
    pub ready_delay: Duration,
    /// Remember the last event per entity for late subscribers
    pub buffer_events: bool,
    /// Restore saved bounds on relaunch of the same identity
    pub persist_bounds: bool,
    /// Never send the ready event
    pub suppress_ready: bool,
    /// Offset one field of every window after placement
    pub skew: Option<(BoundsField, i32)>,
    /// Refuse every connection
    pub unreachable: bool,
    /// Also announce a splash window sharing the application's prefix
    pub decoy_events: bool,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            min_width: 140,
            min_height: 38,
            display: Bounds::new(0, 0, 1920, 1080),
            ready_event: "shown".to_string(),
            ready_delay: Duration::from_millis(10),
            buffer_events: true,
            persist_bounds: true,
            suppress_ready: false,
            skew: None,
            unreachable: false,
            decoy_events: true,
        }
    }
}

#[derive(Debug)]
struct SimEntity {
    identity: String,
    connection: ConnectionId,
    bounds: Bounds,
    /// Launch number; tells a relaunch under the same id apart
    generation: usize,
}

#[derive(Debug, Default)]
struct SimState {
    /// Open connections and the identity each one is bound to
    connections: HashMap<ConnectionId, String>,
    bound_identities: HashSet<String>,
    entities: HashMap<EntityId, SimEntity>,
    /// Persisted bounds by application identity
    saved: HashMap<String, Bounds>,
    next_connection: u64,
    launches: usize,
}

struct SimInner {
    options: SimOptions,
    state: Mutex<SimState>,
    registry: ListenerRegistry,
}

/// In-process runtime used by tests and by the mock runtime process
#[derive(Clone)]
pub struct SimulatedRuntime {
    inner: Arc<SimInner>,
}

impl Default for SimulatedRuntime {
    fn default() -> Self {
        Self::new(SimOptions::default())
    }
}

impl SimulatedRuntime {
    pub fn new(options: SimOptions) -> Self {
        let registry = if options.buffer_events {
            ListenerRegistry::buffered()
        } else {
            ListenerRegistry::unbuffered()
        };
        Self {
            inner: Arc::new(SimInner {
                options,
                state: Mutex::new(SimState::default()),
                registry,
            }),
        }
    }

    pub fn options(&self) -> &SimOptions {
        &self.inner.options
    }

    /// Listen to the whole event stream
    pub fn watch_all(&self, listener: EventListener) -> SubscriptionId {
        self.inner.registry.register(listener)
    }

    /// Publish an arbitrary event, as the runtime would
    pub fn emit(&self, event: RuntimeEvent) {
        self.inner.registry.dispatch(&event);
    }

    /// Move or resize a window, as a user would
    pub fn move_entity(&self, entity: &EntityId, bounds: Bounds) -> Result<()> {
        let mut state = self.inner.state.lock();
        let entry = state
            .entities
            .get_mut(entity)
            .ok_or_else(|| Error::EntityNotFound(entity.to_string()))?;
        entry.bounds = bounds;
        Ok(())
    }

    /// Bounds persisted for an application identity
    pub fn saved_bounds(&self, identity: &str) -> Option<Bounds> {
        self.inner.state.lock().saved.get(identity).copied()
    }

    /// Entities currently open
    pub fn open_entities(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self.inner.state.lock().entities.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of open connections
    pub fn open_connections(&self) -> usize {
        self.inner.state.lock().connections.len()
    }

    /// Number of launches accepted so far
    pub fn launch_count(&self) -> usize {
        self.inner.state.lock().launches
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Place a window the way the runtime does
    fn place(&self, requested: Bounds) -> Bounds {
        let opts = &self.inner.options;
        let display = opts.display;

        let width = requested.width.max(opts.min_width).min(display.width);
        let height = requested.height.max(opts.min_height).min(display.height);
        let left = requested
            .left
            .clamp(display.left, display.left + display.width - width);
        let top = requested
            .top
            .clamp(display.top, display.top + display.height - height);

        let mut placed = Bounds::new(top, left, width, height);
        if let Some((field, delta)) = opts.skew {
            match field {
                BoundsField::Top => placed.top += delta,
                BoundsField::Left => placed.left += delta,
                BoundsField::Width => placed.width += delta,
                BoundsField::Height => placed.height += delta,
            }
        }
        placed
    }

    fn close_locked(&self, state: &mut SimState, entity: &EntityId) -> Option<SimEntity> {
        let removed = state.entities.remove(entity)?;
        if self.inner.options.persist_bounds {
            state.saved.insert(removed.identity.clone(), removed.bounds);
        }
        Some(removed)
    }

    fn announce_closed(&self, entity: &EntityId) {
        self.inner.registry.forget(entity);
        self.inner
            .registry
            .dispatch(&RuntimeEvent::new(entity.clone(), CLOSED_EVENT));
    }

    fn schedule_ready(&self, entity: EntityId, generation: usize) {
        let runtime = self.clone();
        tokio::spawn(async move {
            let opts = &runtime.inner.options;
            tokio::time::sleep(opts.ready_delay).await;

            // Held while dispatching so a concurrent close either sees the
            // events buffered and forgets them, or wins and suppresses them
            let state = runtime.inner.state.lock();
            let current = state.entities.get(&entity).map(|e| e.generation);
            if current != Some(generation) {
                tracing::trace!(entity = %entity, "Entity closed before it was shown");
                return;
            }

            let registry = &runtime.inner.registry;
            registry.dispatch(&RuntimeEvent::new(entity.clone(), "initialized"));
            if opts.decoy_events {
                let splash = EntityId::new(format!("{}/splash", entity));
                registry.dispatch(&RuntimeEvent::new(splash, opts.ready_event.clone()));
            }
            if opts.suppress_ready {
                tracing::debug!(entity = %entity, "Suppressing ready event");
                return;
            }
            tracing::trace!(entity = %entity, event = %opts.ready_event, "Delivering ready event");
            registry.dispatch(&RuntimeEvent::new(entity, opts.ready_event.clone()));
            drop(state);
        });
    }
}

#[async_trait]
impl RemoteRuntime for SimulatedRuntime {
    async fn connect(&self, identity: &str) -> Result<ConnectionId> {
        if self.inner.options.unreachable {
            return Err(Error::connection_failed(identity, "runtime is not reachable"));
        }

        let mut state = self.inner.state.lock();
        if !state.bound_identities.insert(identity.to_string()) {
            return Err(Error::IdentityInUse(identity.to_string()));
        }
        state.next_connection += 1;
        let connection = ConnectionId::new(format!("conn-{}", state.next_connection));
        state
            .connections
            .insert(connection.clone(), identity.to_string());

        tracing::debug!(identity, connection = %connection, "Connection opened");
        Ok(connection)
    }

    async fn disconnect(&self, connection: &ConnectionId) -> Result<()> {
        let orphans: Vec<EntityId> = {
            let mut state = self.inner.state.lock();
            let Some(identity) = state.connections.remove(connection) else {
                return Ok(());
            };
            state.bound_identities.remove(&identity);

            let orphans: Vec<EntityId> = state
                .entities
                .iter()
                .filter(|(_, e)| e.connection == *connection)
                .map(|(id, _)| id.clone())
                .collect();
            for id in &orphans {
                self.close_locked(&mut state, id);
            }
            orphans
        };

        for id in &orphans {
            tracing::debug!(entity = %id, "Closing entity left open by disconnect");
            self.announce_closed(id);
        }
        tracing::debug!(connection = %connection, "Connection closed");
        Ok(())
    }

    async fn launch(&self, connection: &ConnectionId, spec: &LaunchSpec) -> Result<EntityId> {
        if spec.identity.is_empty() {
            return Err(Error::launch(&spec.identity, "identity must not be empty"));
        }

        let entity = spec.entity_id();
        let (placed, generation) = {
            let mut state = self.inner.state.lock();
            if !state.connections.contains_key(connection) {
                return Err(Error::SessionClosed(connection.to_string()));
            }
            if state.entities.contains_key(&entity) {
                return Err(Error::launch(&spec.identity, "application is already running"));
            }

            let requested = if self.inner.options.persist_bounds {
                state.saved.get(&spec.identity).copied().unwrap_or(spec.bounds)
            } else {
                spec.bounds
            };
            if requested.width <= 0 || requested.height <= 0 {
                return Err(Error::launch(
                    &spec.identity,
                    format!("invalid geometry {}", requested),
                ));
            }

            let placed = self.place(requested);
            if placed.width <= 0 || placed.height <= 0 {
                return Err(Error::launch(
                    &spec.identity,
                    format!("geometry {} is invalid after clamping", placed),
                ));
            }
            let generation = state.launches;
            state.entities.insert(
                entity.clone(),
                SimEntity {
                    identity: spec.identity.clone(),
                    connection: connection.clone(),
                    bounds: placed,
                    generation,
                },
            );
            state.launches += 1;
            (placed, state.launches - 1)
        };

        tracing::debug!(entity = %entity, bounds = %placed, "Application launched");
        self.schedule_ready(entity.clone(), generation);
        Ok(entity)
    }

    fn subscribe(&self, _entity: &EntityId, _event: &str, listener: EventListener) -> SubscriptionId {
        self.inner.registry.register(listener)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.inner.registry.remove(id);
    }

    async fn read_bounds(&self, entity: &EntityId) -> Result<Bounds> {
        self.inner
            .state
            .lock()
            .entities
            .get(entity)
            .map(|e| e.bounds)
            .ok_or_else(|| Error::EntityNotFound(entity.to_string()))
    }

    async fn close(&self, entity: &EntityId) -> Result<()> {
        let removed = {
            let mut state = self.inner.state.lock();
            self.close_locked(&mut state, entity)
        };
        match removed {
            Some(_) => {
                self.announce_closed(entity);
                Ok(())
            }
            None => Err(Error::EntityNotFound(entity.to_string())),
        }
    }

    fn last_event(&self, entity: &EntityId, event: &str) -> Option<RuntimeEvent> {
        self.inner.registry.last_event(entity, event)
    }
}
