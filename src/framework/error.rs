//! # Hub Errors
//!
//! Error types shared by the registry, the group actors and the transports.
//! Failures are always scoped to one connection or one reported error frame;
//! nothing here is fatal to the process.

/// Errors surfaced by the hub's client-facing operations.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("Registry closed")]
    RegistryClosed,
    #[error("Registry dropped response channel")]
    RegistryDropped,
    #[error("Group closed")]
    GroupClosed,
    #[error("Broadcast queue full")]
    BroadcastFull,
    #[error("Registry task failed: {0}")]
    TaskFailed(String),
    #[error("Encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Errors raised by a [`FrameReader`](crate::framework::FrameReader) or
/// [`FrameWriter`](crate::framework::FrameWriter).
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum TransportError {
    #[error("Connection closed")]
    Closed,
    #[error("Read failed: {0}")]
    Read(String),
    #[error("Write failed: {0}")]
    Write(String),
}
