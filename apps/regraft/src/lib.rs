//! # Regraft
//!
//! Application layer for the Regraft substitution engine: the remote store
//! client, configuration, the local HTTP server and the CLI.

pub mod api;
pub mod cli;
pub mod client;
pub mod config;
