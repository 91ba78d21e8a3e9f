//! Client for an out-of-process runtime
//!
//! Spawns the runtime executable and talks to it over stdio using
//! Content-Length framed JSON. A background task reads every message the
//! runtime sends: responses are routed to the pending request by sequence
//! number, events are fanned out to the registered listeners.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::common::error::WireError;
use crate::common::{Error, Result};

use super::codec;
use super::types::*;
use super::{EventListener, ListenerRegistry, RemoteRuntime, CLOSED_EVENT};

type PendingMap = Arc<Mutex<HashMap<i64, oneshot::Sender<ResponseMessage>>>>;

/// Runtime driven through a child process
pub struct ProcessRuntime {
    /// Runtime subprocess
    child: Mutex<Child>,
    /// Buffered writer for runtime stdin
    writer: tokio::sync::Mutex<BufWriter<ChildStdin>>,
    /// Sequence number for requests
    seq: AtomicI64,
    /// Requests waiting for their response
    pending: PendingMap,
    /// Listeners for events read from the runtime
    registry: Arc<ListenerRegistry>,
    /// Background reader
    reader_task: JoinHandle<()>,
    /// Bound on a single request round trip
    request_timeout: Duration,
    /// Set on shutdown or once the runtime's output closed
    stopped: Arc<AtomicBool>,
}

impl ProcessRuntime {
    /// Spawn the runtime and start reading its output
    pub async fn spawn(program: &Path, args: &[String], request_timeout: Duration) -> Result<Self> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            Error::connection_failed(
                &program.display().to_string(),
                format!("failed to start runtime: {}", e),
            )
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Internal("Failed to get runtime stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Internal("Failed to get runtime stdout".to_string()))?;

        tracing::info!(program = %program.display(), "Runtime process started");
        Ok(Self::from_parts(child, stdin, stdout, request_timeout))
    }

    fn from_parts(
        child: Child,
        stdin: ChildStdin,
        stdout: ChildStdout,
        request_timeout: Duration,
    ) -> Self {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let registry = Arc::new(ListenerRegistry::buffered());
        let stopped = Arc::new(AtomicBool::new(false));
        let reader_task = tokio::spawn(read_loop(
            BufReader::new(stdout),
            pending.clone(),
            registry.clone(),
            stopped.clone(),
        ));

        Self {
            child: Mutex::new(child),
            writer: tokio::sync::Mutex::new(BufWriter::new(stdin)),
            seq: AtomicI64::new(1),
            pending,
            registry,
            reader_task,
            request_timeout,
            stopped,
        }
    }

    /// Get the next sequence number
    fn next_seq(&self) -> i64 {
        self.seq.fetch_add(1, Ordering::SeqCst)
    }

    /// Send a request and wait for its response
    ///
    /// `subject` names what the request is about and ends up in mapped
    /// errors.
    async fn request<A: Serialize, T: DeserializeOwned>(
        &self,
        command: &str,
        arguments: &A,
        subject: &str,
    ) -> Result<T> {
        let seq = self.next_seq();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(seq, tx);
        // The reader sets the flag before failing pending requests, so a
        // request registered after that point must fail here
        if self.stopped.load(Ordering::SeqCst) {
            self.pending.lock().remove(&seq);
            return Err(Error::RuntimeCrashed);
        }

        let message = WireMessage::Request(RequestMessage {
            seq,
            command: command.to_string(),
            arguments: Some(serde_json::to_value(arguments)?),
        });

        {
            let mut writer = self.writer.lock().await;
            if let Err(e) = codec::write_message(&mut *writer, &message).await {
                self.pending.lock().remove(&seq);
                return Err(e);
            }
        }

        let response = match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => response,
            // Sender dropped: the reader stopped
            Ok(Err(_)) => return Err(Error::RuntimeCrashed),
            Err(_) => {
                self.pending.lock().remove(&seq);
                return Err(Error::RequestTimeout {
                    command: command.to_string(),
                    timeout: self.request_timeout,
                });
            }
        };

        if !response.success {
            let error = response.error.unwrap_or_else(|| WireError {
                code: "INTERNAL_ERROR".to_string(),
                message: "Unknown error".to_string(),
            });
            return Err(error.into_error(command, subject));
        }

        let body = response.body.unwrap_or(Value::Null);
        serde_json::from_value(body).map_err(|e| {
            Error::Protocol(format!("Failed to parse {} response: {}", command, e))
        })
    }

    /// Stop the runtime process
    ///
    /// The reader keeps running until the runtime's output closes, then
    /// fails whatever is still in flight.
    pub fn shutdown(&self) -> Result<()> {
        self.stopped.store(true, Ordering::SeqCst);
        let mut child = self.child.lock();
        if child.try_wait()?.is_none() {
            tracing::debug!("Stopping runtime process");
            child.start_kill()?;
        }
        Ok(())
    }

    /// Check if the runtime is still running
    pub fn is_running(&self) -> bool {
        !self.stopped.load(Ordering::SeqCst)
            && self.child.lock().try_wait().ok().flatten().is_none()
            && !self.reader_task.is_finished()
    }
}

async fn read_loop(
    mut reader: BufReader<ChildStdout>,
    pending: PendingMap,
    registry: Arc<ListenerRegistry>,
    stopped: Arc<AtomicBool>,
) {
    loop {
        let message = match codec::read_message(&mut reader).await {
            Ok(message) => message,
            Err(Error::Protocol(reason)) => {
                tracing::warn!(%reason, "Skipping invalid message from runtime");
                continue;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Runtime output closed");
                break;
            }
        };

        match message {
            WireMessage::Response(response) => {
                if let Some(tx) = pending.lock().remove(&response.request_seq) {
                    let _ = tx.send(response);
                } else {
                    tracing::warn!(request_seq = response.request_seq, "Response without pending request");
                }
            }
            WireMessage::Event(event) => {
                let event = RuntimeEvent::from(&event);
                registry.dispatch(&event);
                // The runtime may close entities on its own (e.g. on
                // disconnect); a relaunch under the same id starts clean
                if event.name == CLOSED_EVENT {
                    registry.forget(&event.entity);
                }
            }
            WireMessage::Request(request) => {
                tracing::warn!(command = %request.command, "Ignoring request from runtime");
            }
        }
    }

    // Fail every in-flight request, and every later one
    stopped.store(true, Ordering::SeqCst);
    pending.lock().clear();
}

#[async_trait]
impl RemoteRuntime for ProcessRuntime {
    async fn connect(&self, identity: &str) -> Result<ConnectionId> {
        let body: ConnectResponseBody = self
            .request(
                "connect",
                &ConnectArguments {
                    identity: identity.to_string(),
                },
                identity,
            )
            .await?;
        Ok(body.connection)
    }

    async fn disconnect(&self, connection: &ConnectionId) -> Result<()> {
        self.request::<_, Value>(
            "disconnect",
            &DisconnectArguments {
                connection: connection.clone(),
            },
            connection.as_str(),
        )
        .await?;
        Ok(())
    }

    async fn launch(&self, connection: &ConnectionId, spec: &LaunchSpec) -> Result<EntityId> {
        let body: LaunchResponseBody = self
            .request(
                "launch",
                &LaunchArguments {
                    connection: connection.clone(),
                    spec: spec.clone(),
                },
                &spec.identity,
            )
            .await?;
        Ok(body.entity)
    }

    fn subscribe(&self, _entity: &EntityId, _event: &str, listener: EventListener) -> SubscriptionId {
        self.registry.register(listener)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.registry.remove(id);
    }

    async fn read_bounds(&self, entity: &EntityId) -> Result<Bounds> {
        self.request(
            "getBounds",
            &EntityArguments {
                entity: entity.clone(),
            },
            entity.as_str(),
        )
        .await
    }

    async fn close(&self, entity: &EntityId) -> Result<()> {
        self.request::<_, Value>(
            "close",
            &EntityArguments {
                entity: entity.clone(),
            },
            entity.as_str(),
        )
        .await?;
        self.registry.forget(entity);
        Ok(())
    }

    fn last_event(&self, entity: &EntityId, event: &str) -> Option<RuntimeEvent> {
        self.registry.last_event(entity, event)
    }
}

impl Drop for ProcessRuntime {
    fn drop(&mut self) {
        // Best-effort since we can't await in drop
        self.reader_task.abort();
        let _ = self.child.get_mut().start_kill();
    }
}
