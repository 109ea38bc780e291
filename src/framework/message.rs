//! # Hub Messages
//!
//! Data types that flow between connection loops, the registry and the group
//! actors. Payloads are opaque bytes; the hub round-trips them without parsing.

use crate::framework::connection::{ConnectionHandle, ConnectionId};
use bytes::Bytes;
use serde::Serialize;
use std::fmt::{self, Display};
use tokio::sync::oneshot;

/// Identifier used when a connection does not supply its own group.
pub const DEFAULT_GROUP: &str = "public";

/// Application-supplied identifier that keys a group of connections.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(String);

impl GroupId {
    /// Picks the requested identifier, falling back to `default` when it is
    /// missing or empty.
    pub fn resolve(requested: Option<String>, default: &GroupId) -> Self {
        match requested {
            Some(id) if !id.is_empty() => Self(id),
            _ => default.clone(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for GroupId {
    fn default() -> Self {
        Self(DEFAULT_GROUP.to_string())
    }
}

impl Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GroupId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for GroupId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// One outbound unit written to a connection.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

impl Frame {
    /// Serializes `value` into a text frame.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_string(value).map(Frame::Text)
    }

    /// Structured error frame: `{"error": "<message>"}`.
    pub fn error(message: &str) -> Self {
        let body = ErrorBody { error: message };
        // A struct with one string field always serializes.
        Frame::Text(serde_json::to_string(&body).unwrap_or_default())
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Frame::Text(text) => text.as_bytes(),
            Frame::Binary(bytes) => bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

impl From<String> for Frame {
    fn from(text: String) -> Self {
        Frame::Text(text)
    }
}

impl From<&str> for Frame {
    fn from(text: &str) -> Self {
        Frame::Text(text.to_string())
    }
}

impl From<Bytes> for Frame {
    fn from(bytes: Bytes) -> Self {
        Frame::Binary(bytes)
    }
}

/// A frame read from a connection, addressed to its group's handler.
///
/// Immutable once built: fields are only reachable through accessors.
#[derive(Clone, Debug)]
pub struct InboundMessage<C> {
    group: GroupId,
    payload: Bytes,
    context: C,
    origin: ConnectionHandle,
}

impl<C> InboundMessage<C> {
    pub fn new(group: GroupId, payload: Bytes, context: C, origin: ConnectionHandle) -> Self {
        Self {
            group,
            payload,
            context,
            origin,
        }
    }

    pub fn group(&self) -> &GroupId {
        &self.group
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn origin(&self) -> &ConnectionHandle {
        &self.origin
    }
}

/// Type alias for the one-shot reply channel used by introspection requests.
pub type Response<T> = oneshot::Sender<T>;

/// Requests consumed by the registry loop.
#[derive(Debug)]
pub enum RegistryRequest<C> {
    Register {
        group: GroupId,
        connection: ConnectionHandle,
    },
    Submit {
        message: InboundMessage<C>,
    },
    Close {
        group: GroupId,
        connection: ConnectionHandle,
    },
    GroupCount {
        respond_to: Response<usize>,
    },
    MemberCount {
        group: GroupId,
        respond_to: Response<Option<usize>>,
    },
    Shutdown {
        respond_to: Response<()>,
    },
}

/// Commands consumed by a group actor loop.
#[derive(Debug)]
pub enum GroupCommand<C> {
    Register(ConnectionHandle),
    Message(InboundMessage<C>),
    Close(ConnectionId),
    MemberCount(Response<Option<usize>>),
    Stop,
}

/// Signals raised by group actors towards the registry.
///
/// `registrations` counts the registrations the actor had processed when it
/// emptied, so the registry can tell whether another one is still in flight.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupEvent {
    Empty {
        group: GroupId,
        generation: u64,
        registrations: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_falls_back_on_missing_or_empty_id() {
        let default = GroupId::default();
        assert_eq!(GroupId::resolve(None, &default).as_str(), "public");
        assert_eq!(GroupId::resolve(Some(String::new()), &default).as_str(), "public");
        assert_eq!(GroupId::resolve(Some("u1".into()), &default).as_str(), "u1");
    }

    #[test]
    fn error_frame_is_structured_json() {
        let frame = Frame::error("boom \"quoted\"");
        let value: serde_json::Value = serde_json::from_slice(frame.as_bytes()).unwrap();
        assert_eq!(value, serde_json::json!({ "error": "boom \"quoted\"" }));
    }
}
