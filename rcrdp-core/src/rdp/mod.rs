//! # rdp: session, capture and injection pipeline
//!
//! ## Architecture
//!
//! ```text
//!  SessionEngine (external protocol stack)
//!  ┌──────────────────────────────┐
//!  │ EventSet ──► CaptureLoop     │  background thread
//!  │              │ check_event_handles()
//!  │              ▼                │
//!  │        PaintHandler ──────────┼──► FrameCache ──► Screenshotter ──► PNG
//!  └──────────────────────────────┘
//!          ▲
//!          └── InputInjector ◄── control plane
//! ```
//!
//! ## Sub-modules
//!
//! | Module       | Purpose                                            |
//! |------------- |----------------------------------------------------|
//! | `types`      | Frames, framebuffer views, connect targets         |
//! | `engine`     | `SessionEngine` capability trait and `EventSet`    |
//! | `synthetic`  | Software engine rendering a local test desktop     |
//! | `cache`      | Mutex-guarded latest-frame holder                  |
//! | `capture`    | Background pump-and-publish loop                   |
//! | `screenshot` | Blackness heuristic, retry policy, PNG encoding    |
//! | `input`      | Keyboard / pointer pass-through and flag names     |
//! | `session`    | Connect / disconnect lifecycle and status          |

pub mod cache;
pub mod capture;
pub mod engine;
pub mod input;
pub mod screenshot;
pub mod session;
pub mod synthetic;
pub mod types;

// ── Re-exports ───────────────────────────────────────────────────

pub use cache::FrameCache;
pub use capture::{CaptureExit, CaptureHandle, CaptureLoop};
pub use engine::{EventSet, PaintHandler, PumpStatus, SessionEngine, SharedEngine};
pub use input::{InputInjector, KeyboardFlags, PointerFlags};
pub use screenshot::{
    CaptureOutcome, ScreenshotConfig, ScreenshotRequest, Screenshotter, is_all_black,
};
pub use session::{Session, SessionOptions, SessionStatus};
pub use synthetic::{SyntheticConfig, SyntheticEngine};
pub use types::{ConnectTarget, Frame, FramebufferView};
