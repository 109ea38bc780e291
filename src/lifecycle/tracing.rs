//! # Observability & Tracing
//!
//! [`setup_tracing`] installs a compact `tracing-subscriber` formatter filtered by
//! `RUST_LOG`. Every loop logs with structured fields rather than module paths:
//!
//! - `group` - the group identifier
//! - `connection` - the connection id (`conn_<n>`)
//! - `generation` - which incarnation of a group actor logged the line
//! - `size` - membership or mapping size after the change
//!
//! ## Usage Examples
//!
//! ```bash
//! # Lifecycle only: hub, registry, groups spawned/retired, connections opened/closed
//! RUST_LOG=info cargo run
//!
//! # Every frame, registration and broadcast
//! RUST_LOG=debug cargo run
//!
//! # Only the hub's own events
//! RUST_LOG=group_hub=debug cargo run
//! ```
//!
//! ## Workflow Trace Example
//!
//! Two connections joining `u1`, one message echoed, both leaving
//! (`RUST_LOG=debug`):
//!
//! ```text
//! INFO Connection opened group=u1 connection=conn_1
//! INFO Group spawned group=u1 generation=1 size=1
//! INFO Group started group=u1 generation=1
//! DEBUG Registered group=u1 connection=conn_1 size=1
//! INFO Connection opened group=u1 connection=conn_2
//! DEBUG Registered group=u1 connection=conn_2 size=2
//! DEBUG Message group=u1 connection=conn_1 bytes=11
//! DEBUG Broadcast group=u1 size=2 bytes=20
//! DEBUG Closed group=u1 connection=conn_1 size=1
//! DEBUG Closed group=u1 connection=conn_2 size=0
//! INFO Group retired group=u1 generation=1 size=0
//! INFO Group stopped group=u1 generation=1 size=0
//! ```

/// Installs the global subscriber. Call once, at program start.
pub fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false) // Structured fields carry the context
        .compact()
        .init();
}
