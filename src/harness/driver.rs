//! Action driver
//!
//! Launches applications through a session and hands back the entity that
//! represents the application's main window.

use std::sync::Arc;

use crate::common::{Error, Result};
use crate::remote::{Bounds, ConnectionId, EntityId, LaunchSpec, RemoteRuntime};

use super::session::Session;

/// A launched application window, owned by one iteration
pub struct RemoteEntity {
    id: EntityId,
    session_identity: String,
    connection: ConnectionId,
    runtime: Arc<dyn RemoteRuntime>,
    closed: bool,
}

impl std::fmt::Debug for RemoteEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteEntity")
            .field("id", &self.id)
            .field("session", &self.session_identity)
            .field("connection", &self.connection)
            .field("closed", &self.closed)
            .finish()
    }
}

impl RemoteEntity {
    pub fn id(&self) -> &EntityId {
        &self.id
    }

    /// Identity of the session that launched this entity
    pub fn session_identity(&self) -> &str {
        &self.session_identity
    }

    pub fn connection(&self) -> &ConnectionId {
        &self.connection
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Current geometry as reported by the runtime
    pub async fn read_bounds(&self) -> Result<Bounds> {
        if self.closed {
            return Err(Error::EntityNotFound(self.id.to_string()));
        }
        self.runtime.read_bounds(&self.id).await
    }

    /// Close the window; a no-op once closed
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.runtime.close(&self.id).await?;
        tracing::debug!(entity = %self.id, "Entity closed");
        Ok(())
    }
}

impl Drop for RemoteEntity {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        // Best-effort since we can't await in drop
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let runtime = self.runtime.clone();
            let id = self.id.clone();
            handle.spawn(async move {
                if let Err(e) = runtime.close(&id).await {
                    tracing::warn!(entity = %id, error = %e, "Failed to close dropped entity");
                }
            });
        }
    }
}

/// Launch an application through an open session
///
/// The window appears asynchronously; the runtime signals completion on its
/// event stream.
pub async fn launch(session: &Session, spec: &LaunchSpec) -> Result<RemoteEntity> {
    let connection = session.connection()?.clone();
    tracing::debug!(
        identity = %spec.identity,
        requested = %spec.bounds,
        "Launching application"
    );

    let id = session.runtime().launch(&connection, spec).await?;
    Ok(RemoteEntity {
        id,
        session_identity: session.identity().to_string(),
        connection,
        runtime: session.runtime().clone(),
        closed: false,
    })
}
