//! The single remote desktop session.
//!
//! A [`Session`] owns the shared engine handle, the [`FrameCache`] and
//! the lifetime of the capture loop. Connect and disconnect are fully
//! serialised: disconnect stops and joins the capture loop before the
//! engine is torn down, so no pump can race a dead connection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::BridgeError;
use crate::rdp::cache::FrameCache;
use crate::rdp::capture::{CaptureExit, CaptureHandle, CaptureLoop, DEFAULT_POLL_INTERVAL};
use crate::rdp::engine::{SessionEngine, SharedEngine, lock_engine, shared};
use crate::rdp::input::InputInjector;
use crate::rdp::screenshot::{CaptureOutcome, ScreenshotConfig, ScreenshotRequest, Screenshotter};
use crate::rdp::types::{ConnectTarget, DEFAULT_RDP_PORT};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Tunables for a [`Session`].
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Capture-loop readiness wait.
    pub poll_interval: Duration,
    pub screenshot: ScreenshotConfig,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            screenshot: ScreenshotConfig::default(),
        }
    }
}

/// Snapshot reported by `GET /status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub connected: bool,
    pub hostname: String,
    pub port: u16,
    pub username: String,
}

// ── Session ──────────────────────────────────────────────────────

pub struct Session {
    engine: SharedEngine,
    cache: Arc<FrameCache>,
    first_frame: Arc<AtomicBool>,
    connected: AtomicBool,
    target: Mutex<Option<ConnectTarget>>,
    /// Also serialises connect/disconnect.
    capture: Mutex<Option<CaptureHandle>>,
    injector: InputInjector,
    screenshotter: Screenshotter,
    poll_interval: Duration,
}

impl Session {
    /// A disconnected session over `engine`.
    pub fn new(engine: impl SessionEngine + 'static, options: SessionOptions) -> Self {
        Self::with_shared(shared(engine), options)
    }

    /// A disconnected session over an already shared engine.
    pub fn with_shared(engine: SharedEngine, options: SessionOptions) -> Self {
        let cache = Arc::new(FrameCache::new());
        Self {
            injector: InputInjector::new(Arc::clone(&engine)),
            screenshotter: Screenshotter::new(Arc::clone(&cache), options.screenshot),
            engine,
            cache,
            first_frame: Arc::new(AtomicBool::new(false)),
            connected: AtomicBool::new(false),
            target: Mutex::new(None),
            capture: Mutex::new(None),
            poll_interval: options.poll_interval,
        }
    }

    /// Connect the engine and start the capture loop.
    pub fn connect(&self, target: ConnectTarget) -> Result<(), BridgeError> {
        let mut capture = lock(&self.capture);
        if self.is_connected() {
            return Err(BridgeError::AlreadyConnected);
        }

        info!("Connecting to RDP server {}:{}...", target.hostname, target.port);
        *lock(&self.target) = Some(target.clone());
        lock_engine(&self.engine).connect(&target)?;

        self.cache.clear();
        self.first_frame.store(false, Ordering::SeqCst);
        let spawned = CaptureLoop::attach(
            Arc::clone(&self.engine),
            Arc::clone(&self.cache),
            Arc::clone(&self.first_frame),
            self.poll_interval,
        )
        .spawn();

        match spawned {
            Ok(handle) => *capture = Some(handle),
            Err(e) => {
                lock_engine(&self.engine).disconnect();
                return Err(BridgeError::Io(e));
            }
        }

        self.connected.store(true, Ordering::SeqCst);
        info!("Connected to {}:{}", target.hostname, target.port);
        Ok(())
    }

    /// Stop and join the capture loop, then disconnect the engine.
    /// Idempotent.
    pub fn disconnect(&self) {
        let mut capture = lock(&self.capture);
        if !self.connected.swap(false, Ordering::SeqCst) {
            return;
        }

        if let Some(handle) = capture.take() {
            match handle.join() {
                Ok(CaptureExit::Stopped) | Ok(CaptureExit::SessionClosed) => {}
                Err(e) => warn!("capture loop had failed before disconnect: {e}"),
            }
        }
        lock_engine(&self.engine).disconnect();
        let frames = self.cache.publish_count();
        self.cache.clear();

        if let Some(target) = lock(&self.target).as_ref() {
            info!(frames, "Disconnected from {}:{}", target.hostname, target.port);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Whether a paint has completed since the last connect.
    pub fn first_frame_received(&self) -> bool {
        self.first_frame.load(Ordering::SeqCst)
    }

    /// Whether the capture loop is still pumping. A connected session
    /// whose loop died keeps serving its last (stale) frame.
    pub fn capture_running(&self) -> bool {
        lock(&self.capture)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn status(&self) -> SessionStatus {
        let target = lock(&self.target);
        SessionStatus {
            connected: self.is_connected(),
            hostname: target
                .as_ref()
                .map(|t| t.hostname.clone())
                .unwrap_or_default(),
            port: target.as_ref().map_or(DEFAULT_RDP_PORT, |t| t.port),
            username: target
                .as_ref()
                .and_then(|t| t.username.clone())
                .unwrap_or_default(),
        }
    }

    // ── Operations ───────────────────────────────────────────────

    /// One screenshot attempt; see [`Screenshotter::capture`].
    pub fn screenshot(
        &self,
        request: &mut ScreenshotRequest,
    ) -> Result<CaptureOutcome, BridgeError> {
        if !self.is_connected() {
            return Err(BridgeError::NotConnected);
        }
        self.screenshotter.capture(request)
    }

    pub fn send_key(&self, flags: u32, code: u32) -> Result<(), BridgeError> {
        if !self.is_connected() {
            return Err(BridgeError::NotConnected);
        }
        self.injector.send_key(flags, code)
    }

    pub fn send_mouse(&self, flags: u32, x: u16, y: u16) -> Result<(), BridgeError> {
        if !self.is_connected() {
            return Err(BridgeError::NotConnected);
        }
        self.injector.send_mouse(flags, x, y)
    }

    pub fn move_mouse(&self, x: u16, y: u16) -> Result<(), BridgeError> {
        if !self.is_connected() {
            return Err(BridgeError::NotConnected);
        }
        self.injector.move_mouse(x, y)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.disconnect();
    }
}
