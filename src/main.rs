//! # Group Hub Demo Server
//!
//! Serves `GET /ws?id=<group>` over WebSocket. Every connection joins the group
//! named by `id` (or the default group) and every JSON object it sends is echoed
//! to the whole group with the group id added.
//!
//! ```bash
//! RUST_LOG=info cargo run -- --bind 0.0.0.0:3000
//! ```

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use clap::Parser;
use group_hub::framework::{serve_connection, HubClient};
use group_hub::handlers::EchoHandler;
use group_hub::lifecycle::{setup_tracing, GroupHub, HubConfig};
use group_hub::transport::ws;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "group-hub", about = "WebSocket group routing hub")]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "GROUP_HUB_BIND", default_value = "127.0.0.1:3000")]
    bind: String,

    /// Group joined by connections that do not pass `?id=`.
    #[arg(long, env = "GROUP_HUB_DEFAULT_GROUP", default_value = "public")]
    default_group: String,

    #[arg(long, env = "GROUP_HUB_REGISTRY_CAPACITY", default_value_t = 64)]
    registry_capacity: usize,

    #[arg(long, env = "GROUP_HUB_GROUP_CAPACITY", default_value_t = 32)]
    group_capacity: usize,

    #[arg(long, env = "GROUP_HUB_OUTBOUND_CAPACITY", default_value_t = 256)]
    outbound_capacity: usize,

    /// Bound the per-group fan-out queue; unbounded when omitted.
    #[arg(long, env = "GROUP_HUB_BROADCAST_CAPACITY")]
    broadcast_capacity: Option<usize>,

    /// Abandon handler calls that run longer than this many milliseconds.
    #[arg(long, env = "GROUP_HUB_HANDLER_TIMEOUT_MS")]
    handler_timeout_ms: Option<u64>,
}

impl Args {
    fn hub_config(&self) -> HubConfig {
        let config = HubConfig {
            registry_capacity: self.registry_capacity,
            group_capacity: self.group_capacity,
            outbound_capacity: self.outbound_capacity,
            broadcast_capacity: self.broadcast_capacity,
            ..HubConfig::default()
        }
        .with_default_group(self.default_group.as_str());
        match self.handler_timeout_ms {
            Some(ms) => config.with_handler_timeout(Duration::from_millis(ms)),
            None => config,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), String> {
    setup_tracing();
    let args = Args::parse();

    let hub = GroupHub::start(EchoHandler, args.hub_config());
    let app = Router::new()
        .route("/ws", get(ws_handler))
        .with_state(hub.client());

    let listener = tokio::net::TcpListener::bind(&args.bind)
        .await
        .map_err(|e| e.to_string())?;
    info!(bind = %args.bind, "Listening");

    let server = tokio::spawn(async move { axum::serve(listener, app).await });

    tokio::signal::ctrl_c().await.map_err(|e| e.to_string())?;
    info!("Interrupted");

    // Connection loops exit on the hub's shutdown signal, releasing their sockets.
    hub.shutdown().await.map_err(|e| e.to_string())?;
    server.abort();
    Ok(())
}

/// Upgrades the request and runs its connection loop. The query string becomes
/// the connection's context.
async fn ws_handler(
    upgrade: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    State(client): State<HubClient<Value>>,
) -> impl IntoResponse {
    let group = params.get("id").cloned();
    let context = serde_json::json!(params);
    upgrade.on_upgrade(move |socket| async move {
        let (reader, writer) = ws::split(socket);
        serve_connection(client, reader, writer, group, context).await;
    })
}
