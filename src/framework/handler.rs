//! # Handler Contract
//!
//! The [`Handler`] trait is the single application hook of the hub. Each group
//! actor invokes it once per inbound message, in arrival order, and hands it a
//! [`Broadcaster`] bound to that group's fan-out queue. The broadcaster is the
//! handler's only output path: it cannot reach the registry or the membership.

use crate::framework::error::HubError;
use crate::framework::message::{Frame, GroupId, InboundMessage};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt::Debug;
use tokio::sync::mpsc;

/// Opaque per-connection context carried on every inbound message.
///
/// Implemented for any cloneable, thread-safe `Debug` type; wrap heavy state in
/// an `Arc`.
pub trait ConnectionContext: Clone + Send + Sync + Debug + 'static {}

impl<T> ConnectionContext for T where T: Clone + Send + Sync + Debug + 'static {}

/// Application callback invoked for every message submitted to a group.
///
/// # Example
///
/// ```rust
/// use group_hub::framework::{Broadcaster, Handler, InboundMessage};
/// use async_trait::async_trait;
///
/// struct Relay;
///
/// #[derive(Debug, thiserror::Error)]
/// #[error("relay error")]
/// struct RelayError;
///
/// #[async_trait]
/// impl Handler for Relay {
///     type Context = ();
///     type Error = RelayError;
///
///     async fn handle(&self, message: InboundMessage<()>, broadcast: &Broadcaster) -> Result<(), RelayError> {
///         broadcast.send(message.payload().clone()).map_err(|_| RelayError)
///     }
/// }
/// ```
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Per-connection context supplied by the transport collaborator.
    type Context: ConnectionContext;

    /// Reported back to the originating connection as an error frame.
    type Error: std::error::Error + Send + Sync + 'static;

    async fn handle(
        &self,
        message: InboundMessage<Self::Context>,
        broadcast: &Broadcaster,
    ) -> Result<(), Self::Error>;
}

#[derive(Clone, Debug)]
enum QueueSender {
    Unbounded(mpsc::UnboundedSender<Frame>),
    Bounded(mpsc::Sender<Frame>),
}

/// Handle onto a group's fan-out queue.
///
/// `send` never waits: the frame is queued and fanned out by the group loop
/// after the current handler call returns. Once the group retires every send
/// fails with [`HubError::GroupClosed`].
#[derive(Clone, Debug)]
pub struct Broadcaster {
    group: GroupId,
    sender: QueueSender,
}

impl Broadcaster {
    pub fn group(&self) -> &GroupId {
        &self.group
    }

    pub fn send(&self, frame: impl Into<Frame>) -> Result<(), HubError> {
        let frame = frame.into();
        match &self.sender {
            QueueSender::Unbounded(sender) => {
                sender.send(frame).map_err(|_| HubError::GroupClosed)
            }
            QueueSender::Bounded(sender) => sender.try_send(frame).map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => HubError::BroadcastFull,
                mpsc::error::TrySendError::Closed(_) => HubError::GroupClosed,
            }),
        }
    }

    /// Serializes `value` and broadcasts it as a text frame.
    pub fn send_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<(), HubError> {
        self.send(Frame::json(value)?)
    }
}

/// Receiving half of a group's fan-out queue, owned by the group actor.
#[derive(Debug)]
pub(crate) enum BroadcastQueue {
    Unbounded(mpsc::UnboundedReceiver<Frame>),
    Bounded(mpsc::Receiver<Frame>),
}

impl BroadcastQueue {
    pub(crate) async fn recv(&mut self) -> Option<Frame> {
        match self {
            BroadcastQueue::Unbounded(receiver) => receiver.recv().await,
            BroadcastQueue::Bounded(receiver) => receiver.recv().await,
        }
    }
}

/// Creates a fan-out queue; `capacity: None` means unbounded.
pub(crate) fn broadcast_queue(group: GroupId, capacity: Option<usize>) -> (Broadcaster, BroadcastQueue) {
    match capacity {
        Some(capacity) => {
            let (sender, receiver) = mpsc::channel(capacity.max(1));
            (
                Broadcaster {
                    group,
                    sender: QueueSender::Bounded(sender),
                },
                BroadcastQueue::Bounded(receiver),
            )
        }
        None => {
            let (sender, receiver) = mpsc::unbounded_channel();
            (
                Broadcaster {
                    group,
                    sender: QueueSender::Unbounded(sender),
                },
                BroadcastQueue::Unbounded(receiver),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bounded_queue_rejects_when_full() {
        let (broadcaster, mut queue) = broadcast_queue(GroupId::from("g"), Some(1));
        broadcaster.send("first").unwrap();
        assert!(matches!(broadcaster.send("second"), Err(HubError::BroadcastFull)));
        assert_eq!(queue.recv().await, Some(Frame::from("first")));
    }

    #[tokio::test]
    async fn send_fails_once_queue_is_dropped() {
        let (broadcaster, queue) = broadcast_queue(GroupId::from("g"), None);
        drop(queue);
        assert!(matches!(broadcaster.send("late"), Err(HubError::GroupClosed)));
    }
}
