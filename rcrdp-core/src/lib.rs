//! # rcrdp-core
//!
//! Core library for the RCRDP bridge: one live remote desktop session
//! exposed through a local HTTP control surface.
//!
//! This crate contains:
//! - **rdp**: the session-engine boundary, the background capture loop,
//!   the latest-frame cache, screenshot orchestration and input injection
//! - **http**: a minimal request parser, response writer, route table and
//!   the sequential control-plane server
//! - **error**: `BridgeError` and `EngineError`, typed with `thiserror`

pub mod error;
pub mod http;
pub mod rdp;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use error::{BridgeError, EngineError};
pub use http::{ControlServer, HttpRequest, HttpResponse, ServerConfig};
pub use rdp::{
    CaptureLoop, ConnectTarget, Frame, FrameCache, InputInjector, ScreenshotRequest,
    Screenshotter, Session, SessionEngine, SessionOptions, SessionStatus, SyntheticEngine,
};
