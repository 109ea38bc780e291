//! # Connection Loop
//!
//! [`serve_connection`] is the per-connection entry point handed to the transport
//! layer. It owns one duplex connection for its whole life:
//!
//! 1. resolves the group (default group when none is supplied) and registers,
//! 2. submits every frame it reads as an [`InboundMessage`],
//! 3. on any exit (end of stream, read or write failure, hub shutdown, or a
//!    failed registration) notifies the registry of the close and releases
//!    the connection.
//!
//! Writes never happen on the read path. Each connection has a writer task that
//! owns the [`FrameWriter`] and drains a bounded outbound queue; group actors
//! reach it through a cloned [`ConnectionHandle`].

use crate::framework::client::HubClient;
use crate::framework::error::TransportError;
use crate::framework::handler::ConnectionContext;
use crate::framework::message::{Frame, GroupId, InboundMessage};
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt::{self, Display};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of one connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn_{}", self.0)
    }
}

/// Outcome of queueing a frame on a connection's outbound queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    /// The queue is full; the frame was dropped for this connection only.
    Dropped,
    /// The writer has gone away; the connection is dead.
    Gone,
}

/// Cheaply cloneable reference to one connection's write path.
///
/// Equality and hashing go by [`ConnectionId`].
#[derive(Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    outbound: mpsc::Sender<Frame>,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId, outbound: mpsc::Sender<Frame>) -> Self {
        Self { id, outbound }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queues `frame` without waiting.
    pub fn deliver(&self, frame: Frame) -> Delivery {
        match self.outbound.try_send(frame) {
            Ok(()) => Delivery::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => Delivery::Dropped,
            Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Gone,
        }
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ConnectionHandle").field(&self.id).finish()
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ConnectionHandle {}

impl Hash for ConnectionHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Read half of an established connection.
#[async_trait]
pub trait FrameReader: Send + 'static {
    /// Next inbound frame; `Ok(None)` on an orderly end of stream.
    async fn read_frame(&mut self) -> Result<Option<Bytes>, TransportError>;
}

/// Write half of an established connection.
#[async_trait]
pub trait FrameWriter: Send + 'static {
    async fn write_frame(&mut self, frame: Frame) -> Result<(), TransportError>;

    /// Releases the underlying connection.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Why a connection loop ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ExitReason {
    EndOfStream,
    ReadFailed(TransportError),
    WriteFailed,
    Shutdown,
    RegistryClosed,
}

/// Returned by [`serve_connection`] once the connection is released.
#[derive(Debug, Clone)]
pub struct ConnectionSummary {
    pub connection: ConnectionId,
    pub group: GroupId,
    pub frames_read: u64,
    pub exit: ExitReason,
}

/// Runs one connection to completion.
///
/// `group` comes from the collaborator's request-scoped state; `None` or an
/// empty string selects the client's default group. `context` is attached to
/// every message this connection submits.
pub async fn serve_connection<C, R, W>(
    client: HubClient<C>,
    mut reader: R,
    writer: W,
    group: Option<String>,
    context: C,
) -> ConnectionSummary
where
    C: ConnectionContext,
    R: FrameReader,
    W: FrameWriter,
{
    let group = GroupId::resolve(group, client.default_group());
    let (outbound, queue) = mpsc::channel(client.outbound_capacity().max(1));
    let connection = ConnectionHandle::new(ConnectionId::next(), outbound);
    let (release, released) = oneshot::channel::<()>();
    let mut writer_task = tokio::spawn(write_loop(writer, queue, released, connection.id()));
    let mut writer_done = false;
    let mut shutdown = client.shutdown_signal();

    info!(group = %group, connection = %connection.id(), "Connection opened");

    let mut frames_read = 0u64;
    let exit = match client.register(group.clone(), connection.clone()).await {
        Err(e) => {
            warn!(group = %group, connection = %connection.id(), error = %e, "Register failed");
            ExitReason::RegistryClosed
        }
        Ok(()) => loop {
            tokio::select! {
                frame = reader.read_frame() => match frame {
                    Ok(Some(payload)) => {
                        frames_read += 1;
                        debug!(group = %group, connection = %connection.id(), bytes = payload.len(), "Frame read");
                        let message = InboundMessage::new(
                            group.clone(),
                            payload,
                            context.clone(),
                            connection.clone(),
                        );
                        if client.submit(message).await.is_err() {
                            break ExitReason::RegistryClosed;
                        }
                    }
                    Ok(None) => break ExitReason::EndOfStream,
                    Err(e) => break ExitReason::ReadFailed(e),
                },
                _ = &mut writer_task => {
                    writer_done = true;
                    break ExitReason::WriteFailed;
                }
                Ok(()) = shutdown.changed() => break ExitReason::Shutdown,
            }
        },
    };

    // Cleanup runs on every exit path, including a failed registration.
    if let Err(e) = client.close(group.clone(), connection.clone()).await {
        debug!(group = %group, connection = %connection.id(), error = %e, "Close notification not delivered");
    }
    drop(release);
    if !writer_done {
        if let Err(e) = writer_task.await {
            warn!(connection = %connection.id(), error = %e, "Writer task failed");
        }
    }

    match &exit {
        ExitReason::ReadFailed(e) => {
            warn!(group = %group, connection = %connection.id(), frames_read, error = %e, "Connection closed")
        }
        _ => info!(group = %group, connection = %connection.id(), frames_read, exit = ?exit, "Connection closed"),
    }

    ConnectionSummary {
        connection: connection.id(),
        group,
        frames_read,
        exit,
    }
}

/// Drains the outbound queue into the writer until released or a write fails,
/// then closes the queue, flushes what it still holds and closes the transport.
async fn write_loop<W: FrameWriter>(
    mut writer: W,
    mut queue: mpsc::Receiver<Frame>,
    mut released: oneshot::Receiver<()>,
    connection: ConnectionId,
) {
    let mut result = loop {
        tokio::select! {
            biased;
            frame = queue.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = writer.write_frame(frame).await {
                        break Err(e);
                    }
                }
                None => break Ok(()),
            },
            _ = &mut released => break Ok(()),
        }
    };

    // Group actors see `Delivery::Gone` from here on.
    queue.close();

    // Frames queued before the release still go out.
    if result.is_ok() {
        while let Ok(frame) = queue.try_recv() {
            if let Err(e) = writer.write_frame(frame).await {
                result = Err(e);
                break;
            }
        }
    }

    if let Err(e) = &result {
        warn!(connection = %connection, error = %e, "Write failed");
    }
    if let Err(e) = writer.close().await {
        debug!(connection = %connection, error = %e, "Transport close failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::mock;

    #[tokio::test]
    async fn released_writer_flushes_queued_frames_then_closes() {
        let (mut peer, _reader, writer) = mock::connection();
        let (outbound, queue) = mpsc::channel(4);
        let (release, released) = oneshot::channel::<()>();
        let handle = ConnectionHandle::new(ConnectionId::next(), outbound);

        assert_eq!(handle.deliver(Frame::from("one")), Delivery::Queued);
        assert_eq!(handle.deliver(Frame::error("last")), Delivery::Queued);
        drop(release);

        write_loop(writer, queue, released, handle.id()).await;

        assert_eq!(peer.next_frame().await, Some(Frame::from("one")));
        assert_eq!(peer.next_frame().await, Some(Frame::error("last")));
        assert!(peer.is_closed());
        assert_eq!(handle.deliver(Frame::from("late")), Delivery::Gone);
    }

    #[tokio::test]
    async fn writer_stops_when_peer_is_gone() {
        let (peer, _reader, writer) = mock::connection();
        let (outbound, queue) = mpsc::channel(4);
        let (_release, released) = oneshot::channel::<()>();
        let handle = ConnectionHandle::new(ConnectionId::next(), outbound);
        drop(peer);

        assert_eq!(handle.deliver(Frame::from("one")), Delivery::Queued);
        write_loop(writer, queue, released, handle.id()).await;

        assert_eq!(handle.deliver(Frame::from("two")), Delivery::Gone);
    }
}
