//! # Tars CLI
//!
//! Command-line entry point for running and probing Tars servers.
//!
//! - `tars serve`: run a server from a TOML config with the demo echo servant
//! - `tars ping`: liveness check against a server's `AdminObj`
//! - `tars notify`: send an admin command
//! - `tars call`: raw invocation, printing the response as JSON

pub mod demo;
pub mod probe;
