//! Ready-made [`Handler`](crate::framework::Handler) implementations.

pub mod echo;

pub use echo::*;
