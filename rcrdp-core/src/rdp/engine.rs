//! The session-engine capability boundary.
//!
//! The remote desktop wire protocol (handshake, encryption, bitmap and
//! graphics channel decoding) lives behind [`SessionEngine`]. The core
//! only ever calls the narrow set of operations below.
//!
//! Engines that multiplex several sockets and timers fold them into a
//! single [`EventSet`]: every source signals the same set, and the
//! capture loop waits on it with a bounded timeout.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::error::EngineError;
use crate::rdp::types::{ConnectTarget, FramebufferView};

/// Callback invoked synchronously by the engine, from inside
/// [`SessionEngine::check_event_handles`], each time a paint completes.
pub type PaintHandler = Box<dyn FnMut(FramebufferView<'_>) + Send + 'static>;

/// Result of one pump of the engine's message queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpStatus {
    /// The session is alive; keep pumping.
    Alive,
    /// The remote end closed the session.
    Closed,
}

// ── SessionEngine ────────────────────────────────────────────────

/// Narrow capability set the core needs from a remote desktop engine.
///
/// All calls are synchronous. The core serialises access through a
/// single mutex, so implementations need not be `Sync`.
pub trait SessionEngine: Send {
    /// Perform the protocol handshake with `target`.
    fn connect(&mut self, target: &ConnectTarget) -> Result<(), EngineError>;

    /// Tear down the connection. Must be safe to call when disconnected.
    fn disconnect(&mut self);

    /// Whether the engine currently holds a live connection.
    fn is_connected(&self) -> bool;

    /// Register the paint-completion callback. Replaces any previous one.
    fn set_paint_handler(&mut self, handler: PaintHandler);

    /// The waitable readiness signal for this connection.
    fn event_set(&self) -> Result<EventSet, EngineError>;

    /// Drive the message pump once. May invoke the paint handler.
    fn check_event_handles(&mut self) -> Result<PumpStatus, EngineError>;

    /// The current rendered buffer, if any graphics state exists.
    fn framebuffer(&self) -> Option<FramebufferView<'_>>;

    /// Inject a keyboard event. `flags` is passed through verbatim.
    fn send_keyboard_event(&mut self, flags: u32, code: u32) -> Result<(), EngineError>;

    /// Inject a pointer event. `flags` is passed through verbatim.
    fn send_mouse_event(&mut self, flags: u32, x: u16, y: u16) -> Result<(), EngineError>;
}

/// The engine as shared between the capture loop and the control plane.
pub type SharedEngine = Arc<Mutex<Box<dyn SessionEngine>>>;

/// Wrap an engine for sharing.
pub fn shared(engine: impl SessionEngine + 'static) -> SharedEngine {
    let engine: Box<dyn SessionEngine> = Box::new(engine);
    Arc::new(Mutex::new(engine))
}

/// Lock the shared engine, recovering from a poisoned lock.
pub fn lock_engine(engine: &SharedEngine) -> MutexGuard<'_, Box<dyn SessionEngine>> {
    engine.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── EventSet ─────────────────────────────────────────────────────

/// A cloneable readiness signal shared between an engine and the
/// capture loop.
///
/// Waiting does not require access to the engine itself, so the engine
/// lock is never held while the capture loop sleeps.
#[derive(Clone, Default)]
pub struct EventSet {
    inner: Arc<EventSetInner>,
}

#[derive(Default)]
struct EventSetInner {
    pending: Mutex<u64>,
    cond: Condvar,
}

impl EventSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the set as ready and wake any waiter.
    pub fn signal(&self) {
        let mut pending = self
            .inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *pending = pending.saturating_add(1);
        self.inner.cond.notify_all();
    }

    /// Block until signalled or `timeout` elapses.
    ///
    /// Returns `true` if a signal was consumed, `false` on timeout.
    pub fn wait(&self, timeout: Duration) -> bool {
        let pending = self
            .inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let (mut pending, _) = self
            .inner
            .cond
            .wait_timeout_while(pending, timeout, |p| *p == 0)
            .unwrap_or_else(PoisonError::into_inner);
        if *pending > 0 {
            *pending = 0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn wait_times_out_without_signal() {
        let events = EventSet::new();
        let start = Instant::now();
        assert!(!events.wait(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn signal_is_consumed_by_wait() {
        let events = EventSet::new();
        events.signal();
        events.signal();
        assert!(events.wait(Duration::from_millis(10)));
        assert!(!events.wait(Duration::from_millis(1)));
    }

    #[test]
    fn signal_wakes_waiter_from_other_thread() {
        let events = EventSet::new();
        let remote = events.clone();
        let waiter = std::thread::spawn(move || remote.wait(Duration::from_secs(5)));
        std::thread::sleep(Duration::from_millis(10));
        events.signal();
        assert!(waiter.join().unwrap());
    }
}
