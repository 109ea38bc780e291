//! Core routing hub.
//!
//! # Main Components
//!
//! - [`Registry`] - top-level loop owning the group mapping
//! - [`GroupActor`] - per-group loop owning membership and handler calls
//! - [`serve_connection`] - per-connection loop driving a transport
//! - [`Handler`] / [`Broadcaster`] - the application contract
//! - [`HubClient`] - typed client for the registry
//! - [`HubError`] / [`TransportError`] - error types
//!
//! # Testing
//!
//! See [`mock`] for an in-memory transport.

pub mod client;
pub mod connection;
pub mod error;
pub mod group;
pub mod handler;
pub mod message;
pub mod mock;
pub mod registry;

pub use client::HubClient;
pub use connection::{
    serve_connection, ConnectionHandle, ConnectionId, ConnectionSummary, Delivery, ExitReason,
    FrameReader, FrameWriter,
};
pub use error::{HubError, TransportError};
pub use group::{GroupActor, GroupSettings};
pub use handler::{Broadcaster, ConnectionContext, Handler};
pub use message::{Frame, GroupId, InboundMessage, DEFAULT_GROUP};
pub use registry::{Registry, RegistrySettings};
