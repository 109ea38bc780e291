//! # Group Hub
//!
//! > **Route many long-lived connections into groups, one actor per group.**
//!
//! This crate multiplexes duplex connections (WebSockets, or anything that can
//! read and write frames) into logical groups keyed by an application-supplied
//! identifier. Each group gets its own actor that delivers inbound messages to a
//! single handler and fans the handler's output out to every member.
//!
//! ## 🏗️ Design Philosophy
//!
//! ### Two tiers of actors
//!
//! - **Registry**: one loop owning the identifier → group mapping. Groups are
//!   spawned on the first connection and retired on the last disconnect.
//! - **Group actors**: one loop per live group, owning its membership and
//!   serializing every handler call and broadcast for that group.
//!
//! Both own their state exclusively and are only reached through bounded
//! mailboxes, so there are no locks around the mapping or the membership.
//!
//! ### Backpressure
//!
//! Connection loop → registry → group hand-offs wait for mailbox room. A slow
//! handler stalls its own group's readers, not other groups.
//!
//! ## 🗺️ Module Tour
//!
//! ### 1. The Engine ([`framework`])
//! - **Role**: the registry, group actors, connection loop and handler contract.
//! - **Key items**: [`Handler`](framework::Handler), [`Broadcaster`](framework::Broadcaster),
//!   [`serve_connection`](framework::serve_connection), [`HubClient`](framework::HubClient).
//!
//! ### 2. The Orchestrator ([`lifecycle`])
//! - **Role**: configuration, startup, graceful shutdown and tracing setup.
//! - **Key items**: [`GroupHub`](lifecycle::GroupHub), [`HubConfig`](lifecycle::HubConfig).
//!
//! ### 3. The Edges ([`transport`], [`handlers`])
//! - **Role**: an axum WebSocket adapter and a ready-made echo handler.
//!
//! ## 🚀 Quick Start
//!
//! ```rust
//! use group_hub::framework::{mock, serve_connection};
//! use group_hub::handlers::EchoHandler;
//! use group_hub::lifecycle::{GroupHub, HubConfig};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let hub = GroupHub::start(EchoHandler, HubConfig::default());
//!
//!     let (mut peer, reader, writer) = mock::connection();
//!     let task = tokio::spawn(serve_connection(hub.client(), reader, writer, Some("u1".into()), json!({})));
//!     assert!(mock::wait_for_members(&hub.client(), "u1", 1).await);
//!
//!     peer.send(r#"{"hello":1}"#);
//!     assert_eq!(peer.next_json().await, Some(json!({ "hello": 1, "id": "u1" })));
//!
//!     peer.disconnect();
//!     task.await.unwrap();
//!     hub.shutdown().await.unwrap();
//! }
//! ```
//!
//! ### Running the Demo
//!
//! ```bash
//! RUST_LOG=info cargo run -- --bind 127.0.0.1:3000
//! # then connect to ws://127.0.0.1:3000/ws?id=u1
//! ```

pub mod framework;
pub mod handlers;
pub mod lifecycle;
pub mod transport;
