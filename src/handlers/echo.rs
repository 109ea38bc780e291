//! # Echo Handler
//!
//! Parses each payload as a JSON object, stamps it with the group id and
//! broadcasts it to the whole group: `{"hello":1}` sent in group `u1` reaches
//! every member as `{"hello":1,"id":"u1"}`.

use crate::framework::{Broadcaster, Handler, HubError, InboundMessage};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Instant;
use tracing::debug;

/// Errors reported back to the sender of a message the echo handler rejects.
#[derive(Debug, thiserror::Error)]
pub enum EchoError {
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("expected a JSON object")]
    NotAnObject,
    #[error(transparent)]
    Hub(#[from] HubError),
}

/// Handler that echoes every JSON object to the group, tagged with the group id.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoHandler;

#[async_trait]
impl Handler for EchoHandler {
    /// Request-scoped data the transport attached to the connection.
    type Context = Value;
    type Error = EchoError;

    async fn handle(&self, message: InboundMessage<Value>, broadcast: &Broadcaster) -> Result<(), EchoError> {
        let start = Instant::now();
        let mut value: Value = serde_json::from_slice(message.payload())?;
        let object = value.as_object_mut().ok_or(EchoError::NotAnObject)?;
        object.insert("id".to_string(), Value::String(broadcast.group().to_string()));

        broadcast.send_json(&value)?;
        debug!(
            group = %message.group(),
            context = %message.context(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "Echoed"
        );
        Ok(())
    }
}
