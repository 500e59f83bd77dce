//! Background capture loop.
//!
//! Keeps the [`FrameCache`] fresh without blocking any control-plane
//! caller:
//!
//! 1. Ask the engine for its [`EventSet`].
//! 2. Wait on it for at most `poll_interval` (100 ms by default), so a
//!    stop request is observed promptly.
//! 3. Drive the engine pump once. The pump may synchronously invoke the
//!    paint handler installed by [`CaptureLoop::attach`], which copies
//!    the rendered buffer into the cache.
//! 4. Repeat until stopped or the engine reports the session closed.
//!
//! Pump failures end the loop; it never restarts itself.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::error::{BridgeError, EngineError};
use crate::rdp::cache::FrameCache;
use crate::rdp::engine::{PaintHandler, PumpStatus, SharedEngine, lock_engine};

/// Default readiness wait per iteration.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Why the capture loop stopped without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureExit {
    /// A stop was requested through the handle.
    Stopped,
    /// The engine reported the remote session closed.
    SessionClosed,
}

/// Build the paint-completion handler: flag the first frame and copy
/// the engine's buffer into `cache`.
pub fn paint_handler(cache: Arc<FrameCache>, first_frame: Arc<AtomicBool>) -> PaintHandler {
    Box::new(move |view| {
        if !first_frame.swap(true, Ordering::SeqCst) {
            info!(width = view.width, height = view.height, "first frame received");
        }
        cache.publish_view(view);
    })
}

// ── CaptureLoop ──────────────────────────────────────────────────

/// The pump-and-publish loop for one connected session.
pub struct CaptureLoop {
    engine: SharedEngine,
    running: Arc<AtomicBool>,
    poll_interval: Duration,
}

impl CaptureLoop {
    /// Create a loop over `engine` without touching its paint handler.
    pub fn new(engine: SharedEngine, poll_interval: Duration) -> Self {
        Self {
            engine,
            running: Arc::new(AtomicBool::new(true)),
            poll_interval,
        }
    }

    /// Register the paint handler that feeds `cache`, then build the
    /// loop. The handler owns its own `Arc`s, so the cache outlives the
    /// engine's reference to it.
    pub fn attach(
        engine: SharedEngine,
        cache: Arc<FrameCache>,
        first_frame: Arc<AtomicBool>,
        poll_interval: Duration,
    ) -> Self {
        lock_engine(&engine).set_paint_handler(paint_handler(cache, first_frame));
        Self::new(engine, poll_interval)
    }

    /// A cloneable handle that stops the loop when set to `false`.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Signal the loop to stop at the next poll boundary.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Whether the loop is (still) supposed to run.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run the loop on the calling thread until stopped, closed, or
    /// failed.
    ///
    /// The engine lock is only held while fetching the event set and
    /// while pumping; never during the wait.
    pub fn run(&self) -> Result<CaptureExit, BridgeError> {
        while self.is_running() {
            let events = lock_engine(&self.engine)
                .event_set()
                .map_err(|e| BridgeError::ProtocolPumpFailure(e.to_string()))?;

            events.wait(self.poll_interval);
            if !self.is_running() {
                break;
            }

            let status = lock_engine(&self.engine).check_event_handles();
            match status {
                Ok(PumpStatus::Alive) => {}
                Ok(PumpStatus::Closed) | Err(EngineError::SessionClosed) => {
                    return Ok(CaptureExit::SessionClosed);
                }
                Err(e) => return Err(BridgeError::ProtocolPumpFailure(e.to_string())),
            }
        }
        Ok(CaptureExit::Stopped)
    }

    /// Move the loop onto a dedicated background thread.
    pub fn spawn(self) -> std::io::Result<CaptureHandle> {
        let running = self.stop_handle();
        let thread = std::thread::Builder::new()
            .name("rcrdp-capture".into())
            .spawn(move || {
                let result = self.run();
                // Reflect termination for callers polling the handle.
                self.stop();
                match &result {
                    Ok(CaptureExit::Stopped) => info!("capture loop stopped"),
                    Ok(CaptureExit::SessionClosed) => {
                        warn!("capture loop ended: session closed by remote")
                    }
                    Err(e) => error!("capture loop exited: {e}"),
                }
                result
            })?;
        debug!("capture loop started");
        Ok(CaptureHandle {
            running,
            thread: Some(thread),
        })
    }
}

// ── CaptureHandle ────────────────────────────────────────────────

/// Owner of a spawned capture thread. Dropping it stops and joins.
pub struct CaptureHandle {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<Result<CaptureExit, BridgeError>>>,
}

impl CaptureHandle {
    /// Request a stop without waiting.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Whether the thread has terminated.
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(|t| t.is_finished())
    }

    /// Stop the loop and wait for the thread. Bounded by one poll
    /// interval plus one pump.
    pub fn join(mut self) -> Result<CaptureExit, BridgeError> {
        self.stop_and_join()
    }

    fn stop_and_join(&mut self) -> Result<CaptureExit, BridgeError> {
        self.stop();
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .unwrap_or_else(|_| Err(BridgeError::Other("capture thread panicked".into()))),
            None => Ok(CaptureExit::Stopped),
        }
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            let _ = self.stop_and_join();
        }
    }
}
