//! Domain-specific error types for the RCRDP bridge.
//!
//! All fallible operations return `Result<T, BridgeError>`. Failures
//! reported by the session engine are carried as [`EngineError`] and
//! converted at the session boundary.

use thiserror::Error;

/// The canonical error type for the bridge core.
#[derive(Debug, Error)]
pub enum BridgeError {
    // ── Session Errors ───────────────────────────────────────────
    /// No active session: the engine was never connected, or has been
    /// disconnected.
    #[error("RDP not connected")]
    NotConnected,

    /// `connect` was called on a session that is already connected.
    #[error("session already connected")]
    AlreadyConnected,

    /// The session engine reported a failure.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    // ── Capture Errors ───────────────────────────────────────────
    /// The frame cache is empty: no paint has completed yet.
    #[error("no frame captured yet")]
    CaptureNotReady,

    /// The image writer failed to produce the output file.
    #[error("encode failure: {0}")]
    Encode(String),

    /// The capture loop could not obtain readiness signals or drive the
    /// engine pump. Fatal to the loop, not to the process.
    #[error("protocol pump failure: {0}")]
    ProtocolPumpFailure(String),

    // ── Control-Plane Errors ─────────────────────────────────────
    /// The HTTP request line could not be parsed.
    #[error("malformed request: {0}")]
    MalformedRequest(&'static str),

    /// No handler matches the method and path.
    #[error("route not found: {0}")]
    RouteNotFound(String),

    /// The session engine refused an input event.
    #[error("input rejected: {0}")]
    InputRejected(String),

    // ── Ambient Errors ───────────────────────────────────────────
    /// The filesystem or socket layer reported an error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration was missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

// ── EngineError ──────────────────────────────────────────────────

/// Errors reported by a [`SessionEngine`](crate::rdp::engine::SessionEngine)
/// implementation.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The handshake with the remote host failed.
    #[error("failed to connect to {host}:{port}: {reason}")]
    ConnectFailed {
        host: String,
        port: u16,
        reason: String,
    },

    /// An operation that needs a live connection was called without one.
    #[error("engine is not connected")]
    NotConnected,

    /// The engine could not deliver an input event.
    #[error("input delivery failed: {0}")]
    Input(String),

    /// Readiness signals or the message pump failed.
    #[error("event pump failed: {0}")]
    Pump(String),

    /// The remote end closed the session.
    #[error("session closed by remote")]
    SessionClosed,
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for BridgeError {
    fn from(s: String) -> Self {
        BridgeError::Other(s)
    }
}

impl From<&str> for BridgeError {
    fn from(s: &str) -> Self {
        BridgeError::Other(s.to_string())
    }
}

impl From<image::ImageError> for BridgeError {
    fn from(e: image::ImageError) -> Self {
        BridgeError::Encode(e.to_string())
    }
}

impl From<tokio::task::JoinError> for BridgeError {
    fn from(e: tokio::task::JoinError) -> Self {
        BridgeError::Other(format!("blocking task failed: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = BridgeError::NotConnected;
        assert_eq!(e.to_string(), "RDP not connected");

        let e = EngineError::ConnectFailed {
            host: "10.0.0.5".into(),
            port: 3389,
            reason: "refused".into(),
        };
        assert!(e.to_string().contains("10.0.0.5:3389"));
        assert!(e.to_string().contains("refused"));
    }

    #[test]
    fn from_string() {
        let e: BridgeError = "something broke".into();
        assert!(matches!(e, BridgeError::Other(_)));
    }

    #[test]
    fn from_engine() {
        let e: BridgeError = EngineError::SessionClosed.into();
        assert!(matches!(e, BridgeError::Engine(EngineError::SessionClosed)));
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: BridgeError = io_err.into();
        assert!(matches!(e, BridgeError::Io(_)));
    }
}
