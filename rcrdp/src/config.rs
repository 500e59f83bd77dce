//! Configuration for the bridge binary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use rcrdp_core::http::{RetryPolicy, ServerConfig};
use rcrdp_core::rdp::ScreenshotConfig;
use rcrdp_core::{ConnectTarget, SessionOptions};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Remote desktop target.
    pub rdp: RdpConfig,
    /// Control-plane listener.
    pub http: HttpConfig,
    /// Capture loop tuning.
    pub capture: CaptureConfig,
    /// Screenshot retry and output settings.
    pub screenshot: ScreenshotSection,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Remote desktop connection settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RdpConfig {
    /// Server hostname or address. Required; may come from `--host`.
    pub hostname: String,
    pub port: u16,
    /// Empty means "not supplied".
    pub username: String,
    pub password: String,
    pub domain: String,
    pub desktop_width: u32,
    pub desktop_height: u32,
}

/// HTTP control-plane settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind_address: String,
    pub port: u16,
    /// Single-read ceiling in bytes.
    pub max_request_size: usize,
    pub read_timeout_ms: u64,
}

/// Capture loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Readiness wait per pump iteration.
    pub poll_interval_ms: u64,
}

/// Screenshot settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenshotSection {
    /// Directory for auto-named screenshots.
    pub output_dir: PathBuf,
    /// Black-frame retries before the frame is accepted anyway.
    pub max_retries: u32,
    /// `/screen` attempts allowed while no frame has arrived yet.
    pub first_frame_retries: u32,
    pub retry_delay_ms: u64,
    /// Move the pointer between black-frame retries.
    pub wake_nudge: bool,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Optional log file path. If empty, logs to stderr.
    pub file: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for RdpConfig {
    fn default() -> Self {
        Self {
            hostname: String::new(),
            port: rcrdp_core::rdp::types::DEFAULT_RDP_PORT,
            username: String::new(),
            password: String::new(),
            domain: String::new(),
            desktop_width: 1024,
            desktop_height: 768,
        }
    }
}

impl std::fmt::Debug for RdpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RdpConfig")
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("domain", &self.domain)
            .field("desktop_width", &self.desktop_width)
            .field("desktop_height", &self.desktop_height)
            .finish()
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".into(),
            port: 8080,
            max_request_size: rcrdp_core::http::MAX_REQUEST_SIZE,
            read_timeout_ms: 5000,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
        }
    }
}

impl Default for ScreenshotSection {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("screenshots"),
            max_retries: 20,
            first_frame_retries: 20,
            retry_delay_ms: 100,
            wake_nudge: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            file: String::new(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_owned())
}

impl BridgeConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write the default configuration to a file (for bootstrapping).
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    /// Connection target for the session, or `None` without a hostname.
    pub fn to_target(&self) -> Option<ConnectTarget> {
        if self.rdp.hostname.is_empty() {
            return None;
        }
        let mut target = ConnectTarget::new(self.rdp.hostname.clone())
            .with_port(self.rdp.port)
            .with_credentials(
                non_empty(&self.rdp.username),
                non_empty(&self.rdp.password),
                non_empty(&self.rdp.domain),
            );
        target.desktop_width = self.rdp.desktop_width.max(1);
        target.desktop_height = self.rdp.desktop_height.max(1);
        Some(target)
    }

    pub fn to_session_options(&self) -> SessionOptions {
        SessionOptions {
            poll_interval: Duration::from_millis(self.capture.poll_interval_ms.max(1)),
            screenshot: ScreenshotConfig {
                output_dir: self.screenshot.output_dir.clone(),
                max_retries: self.screenshot.max_retries,
            },
        }
    }

    pub fn to_server_config(&self) -> ServerConfig {
        ServerConfig {
            bind_address: self.http.bind_address.clone(),
            port: self.http.port,
            max_request_size: self.http.max_request_size.max(64),
            read_timeout: Duration::from_millis(self.http.read_timeout_ms),
            retry: RetryPolicy {
                delay: Duration::from_millis(self.screenshot.retry_delay_ms),
                max_not_ready: self.screenshot.first_frame_retries,
                wake_nudge: self.screenshot.wake_nudge,
            },
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
