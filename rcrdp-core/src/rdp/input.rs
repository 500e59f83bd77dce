//! Keyboard and pointer injection into the session engine.
//!
//! Flags are opaque bitmasks owned by the engine and are passed through
//! verbatim. [`KeyboardFlags`] and [`PointerFlags`] name the common
//! bits so they can be decoded for diagnostics and built by callers.

use bitflags::bitflags;
use tracing::{debug, warn};

use crate::error::BridgeError;
use crate::rdp::engine::{SharedEngine, lock_engine};

bitflags! {
    /// Keyboard event flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct KeyboardFlags: u32 {
        const EXTENDED = 0x0100;
        const EXTENDED1 = 0x0200;
        const DOWN = 0x4000;
        const RELEASE = 0x8000;
    }
}

bitflags! {
    /// Pointer event flags. The low 9 bits carry the wheel rotation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PointerFlags: u32 {
        const WHEEL_NEGATIVE = 0x0100;
        const WHEEL = 0x0200;
        const HWHEEL = 0x0400;
        const MOVE = 0x0800;
        const BUTTON1 = 0x1000;
        const BUTTON2 = 0x2000;
        const BUTTON3 = 0x4000;
        const DOWN = 0x8000;
    }
}

// ── InputInjector ────────────────────────────────────────────────

/// Synchronous pass-through of input events into the engine.
///
/// No queueing, no coalescing: each call locks the engine, delivers one
/// event and returns. Failures are reported, never retried.
#[derive(Clone)]
pub struct InputInjector {
    engine: SharedEngine,
}

impl InputInjector {
    pub fn new(engine: SharedEngine) -> Self {
        Self { engine }
    }

    /// Inject a keyboard event.
    pub fn send_key(&self, flags: u32, code: u32) -> Result<(), BridgeError> {
        let mut engine = lock_engine(&self.engine);
        if !engine.is_connected() {
            return Err(BridgeError::NotConnected);
        }
        engine.send_keyboard_event(flags, code).map_err(|e| {
            warn!("failed to send keyboard event: {e}");
            BridgeError::InputRejected(e.to_string())
        })?;
        debug!(
            flags = ?KeyboardFlags::from_bits_retain(flags),
            "sent key event: flags={flags:#010X}, code={code:#010X}"
        );
        Ok(())
    }

    /// Inject a pointer event.
    pub fn send_mouse(&self, flags: u32, x: u16, y: u16) -> Result<(), BridgeError> {
        let mut engine = lock_engine(&self.engine);
        if !engine.is_connected() {
            return Err(BridgeError::NotConnected);
        }
        engine.send_mouse_event(flags, x, y).map_err(|e| {
            warn!("failed to send mouse event: {e}");
            BridgeError::InputRejected(e.to_string())
        })?;
        debug!(
            flags = ?PointerFlags::from_bits_retain(flags),
            "sent mouse event: flags={flags:#010X}, x={x}, y={y}"
        );
        Ok(())
    }

    /// Move the pointer: `send_mouse` with only the move bit set.
    pub fn move_mouse(&self, x: u16, y: u16) -> Result<(), BridgeError> {
        self.send_mouse(PointerFlags::MOVE.bits(), x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdp::engine::{shared, SessionEngine};
    use crate::rdp::synthetic::{InputRecord, SyntheticConfig, SyntheticEngine};
    use crate::rdp::types::ConnectTarget;

    fn connected(config: SyntheticConfig) -> (InputInjector, crate::rdp::synthetic::InputLog) {
        let mut engine = SyntheticEngine::new(config);
        engine.connect(&ConnectTarget::new("host")).unwrap();
        let log = engine.input_log();
        (InputInjector::new(shared(engine)), log)
    }

    #[test]
    fn flags_decode_known_bits() {
        let flags = PointerFlags::from_bits_retain(0x9000);
        assert!(flags.contains(PointerFlags::DOWN | PointerFlags::BUTTON1));
        assert!(!flags.contains(PointerFlags::MOVE));
        assert_eq!(KeyboardFlags::RELEASE.bits(), 0x8000);
    }

    #[test]
    fn unknown_bits_pass_through() {
        let (injector, log) = connected(SyntheticConfig::default());
        injector.send_key(0x1, 65).unwrap();
        injector.send_mouse(0xFFFF_0001, 1, 2).unwrap();
        let log = log.lock().unwrap();
        assert_eq!(log[0], InputRecord::Key { flags: 0x1, code: 65 });
        assert_eq!(
            log[1],
            InputRecord::Mouse {
                flags: 0xFFFF_0001,
                x: 1,
                y: 2
            }
        );
    }

    #[test]
    fn move_mouse_sets_only_move_bit() {
        let (injector, log) = connected(SyntheticConfig::default());
        injector.move_mouse(100, 200).unwrap();
        assert_eq!(
            log.lock().unwrap()[0],
            InputRecord::Mouse {
                flags: 0x0800,
                x: 100,
                y: 200
            }
        );
    }

    #[test]
    fn disconnected_engine_is_not_connected() {
        let injector = InputInjector::new(shared(SyntheticEngine::default()));
        assert!(matches!(
            injector.send_key(1, 65),
            Err(BridgeError::NotConnected)
        ));
        assert!(matches!(
            injector.move_mouse(0, 0),
            Err(BridgeError::NotConnected)
        ));
    }

    #[test]
    fn engine_rejection_is_surfaced() {
        let (injector, _log) = connected(SyntheticConfig {
            reject_input: true,
            ..Default::default()
        });
        assert!(matches!(
            injector.send_mouse(PointerFlags::BUTTON1.bits(), 0, 0),
            Err(BridgeError::InputRejected(_))
        ));
    }
}
