//! In-process software session engine.
//!
//! Implements [`SessionEngine`] without any network protocol: after
//! `connect` a ticker thread marks the desktop dirty every
//! `frame_interval` and signals the [`EventSet`], and each pump that
//! finds the desktop dirty repaints a test pattern and fires the paint
//! handler. The first `blank_frames` paints are all black, mimicking a
//! remote desktop that has not rendered yet.
//!
//! Injected input is recorded and the pointer position is drawn as a
//! white block, so input round-trips are visible in screenshots.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::EngineError;
use crate::rdp::engine::{EventSet, PaintHandler, PumpStatus, SessionEngine};
use crate::rdp::input::PointerFlags;
use crate::rdp::types::{BYTES_PER_PIXEL, ConnectTarget, FramebufferView, pack_rgb};

/// Side length of the pointer marker in pixels.
const CURSOR_SIZE: u32 = 8;

/// One input event as received by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputRecord {
    Key { flags: u32, code: u32 },
    Mouse { flags: u32, x: u16, y: u16 },
}

/// Shared log of injected input.
pub type InputLog = Arc<Mutex<Vec<InputRecord>>>;

/// Behaviour knobs for [`SyntheticEngine`].
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    /// Interval between desktop repaints.
    pub frame_interval: Duration,
    /// Number of initial paints that render all black.
    pub blank_frames: u64,
    /// Report the session closed after this many paints.
    pub close_after_frames: Option<u64>,
    /// Fail every `connect` call.
    pub refuse_connect: bool,
    /// Fail every input injection.
    pub reject_input: bool,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_millis(50),
            blank_frames: 0,
            close_after_frames: None,
            refuse_connect: false,
            reject_input: false,
        }
    }
}

struct Ticker {
    running: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

// ── SyntheticEngine ──────────────────────────────────────────────

/// A [`SessionEngine`] that renders a local test desktop.
pub struct SyntheticEngine {
    config: SyntheticConfig,
    connected: bool,
    events: EventSet,
    dirty: Arc<AtomicBool>,
    ticker: Option<Ticker>,
    handler: Option<PaintHandler>,
    width: u32,
    height: u32,
    buffer: Vec<u8>,
    frames_painted: u64,
    pointer: (u16, u16),
    input_log: InputLog,
}

impl SyntheticEngine {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            connected: false,
            events: EventSet::new(),
            dirty: Arc::new(AtomicBool::new(false)),
            ticker: None,
            handler: None,
            width: 0,
            height: 0,
            buffer: Vec::new(),
            frames_painted: 0,
            pointer: (0, 0),
            input_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Handle to the log of every input event accepted so far.
    pub fn input_log(&self) -> InputLog {
        Arc::clone(&self.input_log)
    }

    fn stride(&self) -> u32 {
        self.width * BYTES_PER_PIXEL as u32
    }

    fn start_ticker(&mut self) -> Result<(), EngineError> {
        let running = Arc::new(AtomicBool::new(true));
        let events = self.events.clone();
        let dirty = Arc::clone(&self.dirty);
        let interval = self.config.frame_interval;
        let flag = Arc::clone(&running);
        let thread = std::thread::Builder::new()
            .name("synthetic-ticker".into())
            .spawn(move || {
                while flag.load(Ordering::SeqCst) {
                    dirty.store(true, Ordering::SeqCst);
                    events.signal();
                    std::thread::sleep(interval);
                }
            })
            .map_err(|e| EngineError::Pump(format!("failed to start ticker: {e}")))?;
        self.ticker = Some(Ticker { running, thread });
        Ok(())
    }

    fn stop_ticker(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.running.store(false, Ordering::SeqCst);
            let _ = ticker.thread.join();
        }
    }

    fn record(&self, record: InputRecord) {
        self.input_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }

    /// Redraw the whole desktop into `buffer`.
    fn render(&mut self) {
        let stride = self.stride() as usize;
        if self.frames_painted < self.config.blank_frames {
            self.buffer.fill(0);
            return;
        }

        let (w, h) = (self.width.max(1), self.height.max(1));
        let shade = (self.frames_painted % 256) as u8;
        let (px, py) = (self.pointer.0 as u32, self.pointer.1 as u32);
        for y in 0..self.height {
            let row = &mut self.buffer[y as usize * stride..(y as usize + 1) * stride];
            for x in 0..self.width {
                let in_cursor =
                    (px..px + CURSOR_SIZE).contains(&x) && (py..py + CURSOR_SIZE).contains(&y);
                let pixel = if in_cursor {
                    pack_rgb(0xFF, 0xFF, 0xFF)
                } else {
                    pack_rgb((x * 255 / w) as u8, (y * 255 / h) as u8, shade)
                };
                let offset = x as usize * BYTES_PER_PIXEL;
                row[offset..offset + BYTES_PER_PIXEL].copy_from_slice(&pixel.to_le_bytes());
            }
        }
    }
}

impl Default for SyntheticEngine {
    fn default() -> Self {
        Self::new(SyntheticConfig::default())
    }
}

impl SessionEngine for SyntheticEngine {
    fn connect(&mut self, target: &ConnectTarget) -> Result<(), EngineError> {
        if self.config.refuse_connect || target.hostname.is_empty() {
            return Err(EngineError::ConnectFailed {
                host: target.hostname.clone(),
                port: target.port,
                reason: "connection refused".into(),
            });
        }
        if self.connected {
            self.disconnect();
        }

        self.width = target.desktop_width.max(1);
        self.height = target.desktop_height.max(1);
        self.buffer = vec![0; self.stride() as usize * self.height as usize];
        self.frames_painted = 0;
        self.pointer = (0, 0);
        self.start_ticker()?;
        self.connected = true;
        info!(
            host = %target.hostname,
            port = target.port,
            "synthetic engine connected ({}x{})",
            self.width,
            self.height
        );
        Ok(())
    }

    fn disconnect(&mut self) {
        if !self.connected {
            return;
        }
        self.stop_ticker();
        self.connected = false;
        self.handler = None;
        debug!(frames = self.frames_painted, "synthetic engine disconnected");
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn set_paint_handler(&mut self, handler: PaintHandler) {
        self.handler = Some(handler);
    }

    fn event_set(&self) -> Result<EventSet, EngineError> {
        if !self.connected {
            return Err(EngineError::NotConnected);
        }
        Ok(self.events.clone())
    }

    fn check_event_handles(&mut self) -> Result<PumpStatus, EngineError> {
        if !self.connected {
            return Err(EngineError::NotConnected);
        }
        if self
            .config
            .close_after_frames
            .is_some_and(|limit| self.frames_painted >= limit)
        {
            return Ok(PumpStatus::Closed);
        }
        if !self.dirty.swap(false, Ordering::SeqCst) {
            return Ok(PumpStatus::Alive);
        }

        self.render();
        self.frames_painted += 1;

        let view = FramebufferView {
            width: self.width,
            height: self.height,
            stride: self.width * BYTES_PER_PIXEL as u32,
            data: &self.buffer,
        };
        if let Some(handler) = self.handler.as_mut() {
            handler(view);
        }
        Ok(PumpStatus::Alive)
    }

    fn framebuffer(&self) -> Option<FramebufferView<'_>> {
        if !self.connected {
            return None;
        }
        Some(FramebufferView {
            width: self.width,
            height: self.height,
            stride: self.stride(),
            data: &self.buffer,
        })
    }

    fn send_keyboard_event(&mut self, flags: u32, code: u32) -> Result<(), EngineError> {
        if !self.connected {
            return Err(EngineError::NotConnected);
        }
        if self.config.reject_input {
            return Err(EngineError::Input("keyboard channel unavailable".into()));
        }
        self.record(InputRecord::Key { flags, code });
        Ok(())
    }

    fn send_mouse_event(&mut self, flags: u32, x: u16, y: u16) -> Result<(), EngineError> {
        if !self.connected {
            return Err(EngineError::NotConnected);
        }
        if self.config.reject_input {
            return Err(EngineError::Input("pointer channel unavailable".into()));
        }
        self.record(InputRecord::Mouse { flags, x, y });
        if PointerFlags::from_bits_retain(flags).contains(PointerFlags::MOVE) {
            self.pointer = (x, y);
            self.dirty.store(true, Ordering::SeqCst);
            self.events.signal();
        }
        Ok(())
    }
}

impl Drop for SyntheticEngine {
    fn drop(&mut self) {
        self.stop_ticker();
    }
}
