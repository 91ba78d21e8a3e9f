//! Remote runtime data types
//!
//! Geometry, launch parameters, entity handles and the wire messages used
//! to talk to an out-of-process runtime.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::common::error::WireError;

/// Window geometry as reported by the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bounds {
    pub top: i32,
    pub left: i32,
    pub width: i32,
    pub height: i32,
}

impl Bounds {
    pub const fn new(top: i32, left: i32, width: i32, height: i32) -> Self {
        Self {
            top,
            left,
            width,
            height,
        }
    }

    /// Names of the fields that differ from `other`
    pub fn diff(&self, other: &Bounds) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.top != other.top {
            fields.push("top");
        }
        if self.left != other.left {
            fields.push("left");
        }
        if self.width != other.width {
            fields.push("width");
        }
        if self.height != other.height {
            fields.push("height");
        }
        fields
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "top={} left={} width={} height={}",
            self.top, self.left, self.width, self.height
        )
    }
}

/// Parameters of a single launch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchSpec {
    /// Application identity, unique among the session's active entities
    pub identity: String,
    /// Requested default geometry of the main window
    pub bounds: Bounds,
}

impl LaunchSpec {
    pub fn new(identity: impl Into<String>, bounds: Bounds) -> Self {
        Self {
            identity: identity.into(),
            bounds,
        }
    }

    /// Entity the runtime will create for this spec
    ///
    /// The main window shares the application identity, so the id is known
    /// before the launch is issued.
    pub fn entity_id(&self) -> EntityId {
        EntityId::new(&self.identity)
    }
}

/// Identity of a launched application window
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle of an open connection to the runtime
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub(crate) u64);

/// Lifecycle event published on the runtime's shared event stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeEvent {
    pub entity: EntityId,
    pub name: String,
}

impl RuntimeEvent {
    pub fn new(entity: EntityId, name: impl Into<String>) -> Self {
        Self {
            entity,
            name: name.into(),
        }
    }

    /// Both the entity and the event name must match
    pub fn matches(&self, entity: &EntityId, name: &str) -> bool {
        self.entity == *entity && self.name == name
    }
}

// === Wire Messages ===

/// Any message exchanged with an out-of-process runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WireMessage {
    Request(RequestMessage),
    Response(ResponseMessage),
    Event(EventMessage),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestMessage {
    pub seq: i64,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMessage {
    pub seq: i64,
    pub request_seq: i64,
    pub success: bool,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<WireError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMessage {
    pub seq: i64,
    pub event: String,
    pub body: EventBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBody {
    pub entity: EntityId,
}

impl From<&EventMessage> for RuntimeEvent {
    fn from(msg: &EventMessage) -> Self {
        RuntimeEvent::new(msg.body.entity.clone(), msg.event.clone())
    }
}

// === Request Arguments ===

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectArguments {
    pub identity: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectResponseBody {
    pub connection: ConnectionId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisconnectArguments {
    pub connection: ConnectionId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchArguments {
    pub connection: ConnectionId,
    #[serde(flatten)]
    pub spec: LaunchSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchResponseBody {
    pub entity: EntityId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityArguments {
    pub entity: EntityId,
}
