//! # Sandbox Engine
//!
//! Runs untrusted, machine-generated snippets to completion inside
//! short-lived containers and hands back their output and artifacts.
//!
//! ## Features
//!
//! - **Resource Bounded:** memory ceiling with no extra swap, fractional CPU quota
//! - **Network Isolated:** containers run with networking disabled
//! - **Deterministic Cleanup:** workspaces and containers are removed on every path
//! - **Uniform Results:** every failure comes back as an `ExecutionResult`
//! - **HTTP Gateway:** `POST /api/execute` with an admission limiter

pub mod config;
pub mod error;
pub mod gateway;
pub mod sandbox;

pub use config::Config;
pub use error::{Error, ErrorKind, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const NAME: &str = env!("CARGO_PKG_NAME");
