//! # rcrdp: remote desktop HTTP bridge
//!
//! Connects to a single remote desktop server and exposes it through a
//! small local HTTP API: screenshots as PNG, session status as JSON, and
//! keyboard / pointer injection.
//!
//! - **config**: TOML file plus CLI overrides.
//! - **bridge**: session and control-server lifecycle.

pub mod bridge;
pub mod config;
