//! Transport adapters connecting real connections to the hub.

pub mod ws;
