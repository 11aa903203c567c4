//! HTTP transport, configuration and logging for the fingerprint identity
//! service.
//!
//! The binary in `main.rs` wires these together; integration tests build the
//! router directly against an in-memory store.

pub mod api;
pub mod config;
pub mod logging;
