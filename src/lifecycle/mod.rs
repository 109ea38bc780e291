//! # Hub Lifecycle
//!
//! Starting, configuring and stopping a hub.
//!
//! ## Startup
//!
//! [`GroupHub::start`] builds the registry from a [`HubConfig`], binds the single
//! handler instance every group will share, and spawns the registry loop. Group
//! actors are not created up front; the registry spawns them lazily.
//!
//! ## Graceful Shutdown
//!
//! 1. **Signal connections** - a `watch` flag makes every connection loop leave
//!    its read cycle and run its normal cleanup
//! 2. **Stop the registry** - a `Shutdown` request makes the registry send
//!    `Stop` to each group and await its task
//! 3. **Await completion** - the registry task finishes and is joined
//!
//! Dropping every [`HubClient`](crate::framework::HubClient) has the same effect
//! on the registry as step 2, minus the connection signal.
//!
//! ## Observability
//!
//! See [`tracing`](self::tracing) for the logging setup and field conventions.

pub mod config;
pub mod group_hub;
pub mod tracing;

pub use self::config::*;
pub use self::group_hub::*;
pub use self::tracing::*;
