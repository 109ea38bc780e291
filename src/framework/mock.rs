//! # In-Memory Transport
//!
//! A duplex connection made of channels, for exercising connection loops,
//! groups and the registry without a network.
//!
//! [`connection`] returns the two halves [`serve_connection`] needs plus a
//! [`MockPeer`] playing the remote side:
//!
//! ```rust
//! use group_hub::framework::mock;
//!
//! # #[tokio::main] async fn main() {
//! let (mut peer, reader, writer) = mock::connection();
//! peer.send(r#"{"hello":1}"#);
//! peer.disconnect();
//! # drop((reader, writer));
//! # }
//! ```
//!
//! [`serve_connection`]: crate::framework::serve_connection

use crate::framework::client::HubClient;
use crate::framework::connection::{FrameReader, FrameWriter};
use crate::framework::error::TransportError;
use crate::framework::message::Frame;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

/// How long [`MockPeer::next_frame`] waits before giving up.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// Creates one in-memory connection.
pub fn connection() -> (MockPeer, MockReader, MockWriter) {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let state = Arc::new(Shared::default());

    let peer = MockPeer {
        inbound: Some(inbound_tx),
        outbound: outbound_rx,
        state: Arc::clone(&state),
    };
    let reader = MockReader { inbound: inbound_rx };
    let writer = MockWriter {
        outbound: outbound_tx,
        state,
    };
    (peer, reader, writer)
}

#[derive(Default)]
struct Shared {
    fail_writes: AtomicBool,
    closed: AtomicBool,
    closed_notify: Notify,
}

/// Remote side of an in-memory connection.
pub struct MockPeer {
    inbound: Option<mpsc::UnboundedSender<Result<Bytes, TransportError>>>,
    outbound: mpsc::UnboundedReceiver<Frame>,
    state: Arc<Shared>,
}

impl MockPeer {
    /// Delivers a frame to the connection's reader.
    pub fn send(&self, payload: impl Into<Bytes>) {
        if let Some(inbound) = &self.inbound {
            let _ = inbound.send(Ok(payload.into()));
        }
    }

    /// Makes the reader's next read fail.
    pub fn fail_read(&self, reason: &str) {
        if let Some(inbound) = &self.inbound {
            let _ = inbound.send(Err(TransportError::Read(reason.to_string())));
        }
    }

    /// Makes every subsequent write fail.
    pub fn fail_writes(&self) {
        self.state.fail_writes.store(true, Ordering::SeqCst);
    }

    /// Ends the inbound stream; the reader sees an orderly end of stream.
    pub fn disconnect(&mut self) {
        self.inbound = None;
    }

    /// Next frame written by the hub, or `None` after [`RECV_TIMEOUT`].
    pub async fn next_frame(&mut self) -> Option<Frame> {
        tokio::time::timeout(RECV_TIMEOUT, self.outbound.recv())
            .await
            .ok()
            .flatten()
    }

    /// Next frame parsed as JSON.
    pub async fn next_json(&mut self) -> Option<serde_json::Value> {
        let frame = self.next_frame().await?;
        serde_json::from_slice(frame.as_bytes()).ok()
    }

    /// True when nothing is written to this peer within `window`.
    pub async fn is_silent_for(&mut self, window: Duration) -> bool {
        !matches!(
            tokio::time::timeout(window, self.outbound.recv()).await,
            Ok(Some(_))
        )
    }

    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }

    /// Waits until the hub released the connection, up to [`RECV_TIMEOUT`].
    pub async fn closed(&self) -> bool {
        let wait = async {
            loop {
                let notified = self.state.closed_notify.notified();
                if self.is_closed() {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(RECV_TIMEOUT, wait).await.is_ok()
    }
}

/// Read half handed to the connection loop.
pub struct MockReader {
    inbound: mpsc::UnboundedReceiver<Result<Bytes, TransportError>>,
}

#[async_trait]
impl FrameReader for MockReader {
    async fn read_frame(&mut self) -> Result<Option<Bytes>, TransportError> {
        match self.inbound.recv().await {
            Some(Ok(payload)) => Ok(Some(payload)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}

/// Write half handed to the connection loop.
pub struct MockWriter {
    outbound: mpsc::UnboundedSender<Frame>,
    state: Arc<Shared>,
}

#[async_trait]
impl FrameWriter for MockWriter {
    async fn write_frame(&mut self, frame: Frame) -> Result<(), TransportError> {
        if self.state.fail_writes.load(Ordering::SeqCst) {
            return Err(TransportError::Write("injected failure".to_string()));
        }
        self.outbound
            .send(frame)
            .map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.state.closed.store(true, Ordering::SeqCst);
        self.state.closed_notify.notify_waiters();
        Ok(())
    }
}

/// Polls the registry until `group` has exactly `members` members.
///
/// `members == 0` waits for the group to be absent from the mapping.
pub async fn wait_for_members<C>(client: &HubClient<C>, group: &str, members: usize) -> bool {
    let wait = async {
        loop {
            let current = client.member_count(group).await.ok().flatten();
            let reached = match members {
                0 => current.is_none(),
                n => current == Some(n),
            };
            if reached {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(RECV_TIMEOUT, wait).await.is_ok()
}
