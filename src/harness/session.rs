//! Session manager
//!
//! A session is one connection to the runtime under a fixed identity.
//! Closing is idempotent so cleanup paths can always call it.

use std::sync::Arc;

use crate::common::{Error, Result};
use crate::remote::{ConnectionId, RemoteRuntime};

pub struct Session {
    runtime: Arc<dyn RemoteRuntime>,
    identity: String,
    connection: Option<ConnectionId>,
}

impl Session {
    /// Connect to the runtime as `identity`
    pub async fn open(runtime: Arc<dyn RemoteRuntime>, identity: &str) -> Result<Self> {
        let connection = runtime.connect(identity).await?;
        tracing::info!(identity, connection = %connection, "Session opened");
        Ok(Self {
            runtime,
            identity: identity.to_string(),
            connection: Some(connection),
        })
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn is_open(&self) -> bool {
        self.connection.is_some()
    }

    pub fn runtime(&self) -> &Arc<dyn RemoteRuntime> {
        &self.runtime
    }

    /// Connection of an open session
    pub fn connection(&self) -> Result<&ConnectionId> {
        self.connection
            .as_ref()
            .ok_or_else(|| Error::SessionClosed(self.identity.clone()))
    }

    /// Release the connection; a no-op on a closed session
    pub async fn close(&mut self) -> Result<()> {
        let Some(connection) = self.connection.take() else {
            return Ok(());
        };
        self.runtime.disconnect(&connection).await?;
        tracing::info!(identity = %self.identity, "Session closed");
        Ok(())
    }

    /// Close this session and open a new one under the same identity
    pub async fn reopen(&mut self) -> Result<()> {
        self.close().await?;
        let connection = self.runtime.connect(&self.identity).await?;
        tracing::info!(identity = %self.identity, connection = %connection, "Session reopened");
        self.connection = Some(connection);
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };
        // Best-effort since we can't await in drop
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let runtime = self.runtime.clone();
                handle.spawn(async move {
                    if let Err(e) = runtime.disconnect(&connection).await {
                        tracing::warn!(error = %e, "Failed to disconnect dropped session");
                    }
                });
            }
            Err(_) => {
                tracing::warn!(identity = %self.identity, "Session dropped outside a runtime; connection leaked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{SimOptions, SimulatedRuntime};

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let sim = SimulatedRuntime::default();
        let mut session = Session::open(Arc::new(sim.clone()), "harness").await.unwrap();
        assert!(session.is_open());
        assert_eq!(sim.open_connections(), 1);

        session.close().await.unwrap();
        session.close().await.unwrap();
        assert!(!session.is_open());
        assert_eq!(sim.open_connections(), 0);
        assert!(matches!(session.connection(), Err(Error::SessionClosed(_))));
    }

    #[tokio::test]
    async fn test_open_fails_for_bound_identity() {
        let sim = SimulatedRuntime::default();
        let _first = Session::open(Arc::new(sim.clone()), "harness").await.unwrap();
        let second = Session::open(Arc::new(sim), "harness").await;
        assert!(matches!(second, Err(Error::IdentityInUse(_))));
    }

    #[tokio::test]
    async fn test_open_fails_when_unreachable() {
        let sim = SimulatedRuntime::new(SimOptions {
            unreachable: true,
            ..SimOptions::default()
        });
        let result = Session::open(Arc::new(sim), "harness").await;
        assert!(matches!(result, Err(Error::ConnectionFailed { .. })));
    }

    #[tokio::test]
    async fn test_reopen_keeps_identity() {
        let sim = SimulatedRuntime::default();
        let mut session = Session::open(Arc::new(sim.clone()), "harness").await.unwrap();
        let first = session.connection().unwrap().clone();

        session.reopen().await.unwrap();
        assert_eq!(session.identity(), "harness");
        assert_ne!(session.connection().unwrap(), &first);
        assert_eq!(sim.open_connections(), 1);
    }

    #[tokio::test]
    async fn test_drop_disconnects_in_background() {
        let sim = SimulatedRuntime::default();
        let session = Session::open(Arc::new(sim.clone()), "harness").await.unwrap();
        drop(session);

        for _ in 0..50 {
            if sim.open_connections() == 0 {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("dropped session was never disconnected");
    }
}
