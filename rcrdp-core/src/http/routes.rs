//! Route table and handlers.
//!
//! | Method | Path         | Handler          |
//! |--------|--------------|------------------|
//! | GET    | `/screen*`   | PNG screenshot   |
//! | GET    | `/status`    | session status   |
//! | POST   | `/sendkey`   | keyboard event   |
//! | POST   | `/sendmouse` | pointer event    |
//! | POST   | `/movemouse` | pointer move     |
//!
//! Handlers never fail: every error becomes a 4xx/5xx response.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::BridgeError;
use crate::http::request::{HttpRequest, Method};
use crate::http::response::HttpResponse;
use crate::rdp::screenshot::{CaptureOutcome, ScreenshotRequest};
use crate::rdp::session::Session;

/// Endpoint summary logged at startup.
pub const ENDPOINTS: &[(&str, &str, &str)] = &[
    ("GET", "/screen", "Get current screenshot (PNG)"),
    ("GET", "/status", "Get connection status"),
    ("POST", "/sendkey", "Send keyboard event"),
    ("POST", "/sendmouse", "Send mouse button event"),
    ("POST", "/movemouse", "Move mouse cursor"),
];

/// A resolved endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Screen,
    Status,
    SendKey,
    SendMouse,
    MoveMouse,
}

impl Route {
    /// Match a method and path. Any GET path starting with `/screen`
    /// selects the screenshot handler.
    pub fn resolve(method: Method, path: &str) -> Option<Self> {
        match method {
            Method::Get if path.starts_with("/screen") => Some(Route::Screen),
            Method::Get if path == "/status" => Some(Route::Status),
            Method::Post => match path {
                "/sendkey" => Some(Route::SendKey),
                "/sendmouse" => Some(Route::SendMouse),
                "/movemouse" => Some(Route::MoveMouse),
                _ => None,
            },
            _ => None,
        }
    }
}

/// How `/screen` paces re-invocations of the orchestrator.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Pause between attempts; no lock is held while waiting.
    pub delay: Duration,
    /// Attempts allowed while the cache is still empty.
    pub max_not_ready: u32,
    /// Wiggle the pointer between black-frame retries.
    pub wake_nudge: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(100),
            max_not_ready: 20,
            wake_nudge: true,
        }
    }
}

// ── Router ───────────────────────────────────────────────────────

/// Dispatches parsed requests against the session.
#[derive(Clone)]
pub struct Router {
    session: Arc<Session>,
    retry: RetryPolicy,
}

impl Router {
    pub fn new(session: Arc<Session>, retry: RetryPolicy) -> Self {
        Self { session, retry }
    }

    /// Route and handle one request.
    pub async fn handle(&self, request: &HttpRequest) -> HttpResponse {
        let Some(route) = Route::resolve(request.method(), request.path()) else {
            let e = BridgeError::RouteNotFound(format!("{} {}", request.method(), request.path()));
            debug!("{e}");
            return HttpResponse::from(&e);
        };

        match route {
            Route::Screen => self.get_screen().await,
            Route::Status => self.get_status(),
            Route::SendKey => self.post_sendkey(request).await,
            Route::SendMouse => self.post_sendmouse(request).await,
            Route::MoveMouse => self.post_movemouse(request).await,
        }
    }

    /// Run `op` against the session on the blocking pool. Engine calls
    /// take a std mutex that the capture thread holds for a whole pump.
    async fn on_session<T, F>(&self, op: F) -> Result<T, BridgeError>
    where
        T: Send + 'static,
        F: FnOnce(&Session) -> Result<T, BridgeError> + Send + 'static,
    {
        let session = Arc::clone(&self.session);
        tokio::task::spawn_blocking(move || op(&session)).await?
    }

    // ── GET /screen ──────────────────────────────────────────────

    async fn get_screen(&self) -> HttpResponse {
        if !self.session.is_connected() {
            return HttpResponse::text(500, "RDP not connected");
        }
        if !self.session.capture_running() {
            warn!("capture loop is not running; serving the last frame");
        }

        let path = temp_screen_path();
        if let Err(e) = self.capture_to(&path).await {
            warn!("screenshot failed: {e}");
            let _ = tokio::fs::remove_file(&path).await;
            return HttpResponse::text(500, "Screenshot failed");
        }

        let read = tokio::fs::read(&path).await;
        let _ = tokio::fs::remove_file(&path).await;
        match read {
            Ok(bytes) if bytes.is_empty() => HttpResponse::text(500, "Empty screenshot"),
            Ok(bytes) => HttpResponse::png(bytes),
            Err(e) => {
                warn!("failed to read screenshot {}: {e}", path.display());
                HttpResponse::text(500, "Failed to read screenshot")
            }
        }
    }

    /// Drive the orchestrator until it saves to `path` or gives up.
    ///
    /// `StillBlack` is bounded by the orchestrator's own retry counter;
    /// `CaptureNotReady` by `max_not_ready`, and only while the capture
    /// loop is alive to deliver a first frame.
    async fn capture_to(&self, path: &Path) -> Result<PathBuf, BridgeError> {
        let mut request = ScreenshotRequest::to(path);
        let mut not_ready = 0;

        loop {
            let session = Arc::clone(&self.session);
            let (outcome, returned) = tokio::task::spawn_blocking(move || {
                let outcome = session.screenshot(&mut request);
                (outcome, request)
            })
            .await?;
            request = returned;

            match outcome {
                Ok(CaptureOutcome::Saved(saved)) => return Ok(saved),
                Ok(CaptureOutcome::StillBlack) => {
                    if self.retry.wake_nudge {
                        self.nudge(request.retries()).await;
                    }
                    tokio::time::sleep(self.retry.delay).await;
                }
                Err(BridgeError::CaptureNotReady)
                    if not_ready < self.retry.max_not_ready && self.session.capture_running() =>
                {
                    not_ready += 1;
                    debug!(
                        attempt = not_ready,
                        first_frame = self.session.first_frame_received(),
                        "waiting for first frame"
                    );
                    tokio::time::sleep(self.retry.delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Move the pointer away and back to provoke a repaint.
    async fn nudge(&self, attempt: u32) {
        let offset = 50u32.saturating_add(attempt.saturating_mul(20)).min(u16::MAX as u32) as u16;
        if let Err(e) = self.on_session(move |s| s.move_mouse(offset, offset)).await {
            debug!("wake nudge failed: {e}");
        }
        tokio::time::sleep(self.retry.delay).await;
        if let Err(e) = self.on_session(|s| s.move_mouse(0, 0)).await {
            debug!("wake nudge failed: {e}");
        }
    }

    // ── GET /status ──────────────────────────────────────────────

    fn get_status(&self) -> HttpResponse {
        HttpResponse::json(&self.session.status())
    }

    // ── POST input ───────────────────────────────────────────────

    async fn post_sendkey(&self, request: &HttpRequest) -> HttpResponse {
        // Body validation precedes the connection check: a disconnected
        // session answers 400 here, not 500, for a bad body.
        if request.body().is_none() {
            return HttpResponse::text(400, "Missing request body");
        }
        let flags = request.json_int("flags") as u32;
        let code = request.json_int("code") as u32;
        if flags == 0 && code == 0 {
            return HttpResponse::text(400, "Invalid flags or code");
        }

        match self.on_session(move |s| s.send_key(flags, code)).await {
            Ok(()) => HttpResponse::ok(),
            Err(BridgeError::NotConnected) => HttpResponse::text(500, "RDP not connected"),
            Err(_) => HttpResponse::text(500, "Failed to send key"),
        }
    }

    async fn post_sendmouse(&self, request: &HttpRequest) -> HttpResponse {
        if request.body().is_none() {
            return HttpResponse::text(400, "Missing request body");
        }
        let flags = request.json_int("flags") as u32;
        let x = request.json_int("x") as u16;
        let y = request.json_int("y") as u16;

        match self.on_session(move |s| s.send_mouse(flags, x, y)).await {
            Ok(()) => HttpResponse::ok(),
            Err(BridgeError::NotConnected) => HttpResponse::text(500, "RDP not connected"),
            Err(_) => HttpResponse::text(500, "Failed to send mouse event"),
        }
    }

    async fn post_movemouse(&self, request: &HttpRequest) -> HttpResponse {
        if request.body().is_none() {
            return HttpResponse::text(400, "Missing request body");
        }
        let x = request.json_int("x") as u16;
        let y = request.json_int("y") as u16;

        match self.on_session(move |s| s.move_mouse(x, y)).await {
            Ok(()) => HttpResponse::ok(),
            Err(BridgeError::NotConnected) => HttpResponse::text(500, "RDP not connected"),
            Err(_) => HttpResponse::text(500, "Failed to move mouse"),
        }
    }
}

/// Unique scratch path for one `/screen` request.
fn temp_screen_path() -> PathBuf {
    static SEQ: AtomicU64 = AtomicU64::new(0);
    std::env::temp_dir().join(format!(
        "rcrdp_screen_{}_{}_{}.png",
        std::process::id(),
        chrono::Utc::now().timestamp(),
        SEQ.fetch_add(1, Ordering::Relaxed)
    ))
}
