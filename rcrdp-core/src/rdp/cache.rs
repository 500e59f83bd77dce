//! Latest-frame cache shared between the capture loop and readers.
//!
//! One mutex guards the held [`Frame`] and its "unseen update" flag.
//! Critical sections are a single copy in or a single copy out, so a
//! reader always observes either nothing or one self-consistent frame.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::rdp::types::{BYTES_PER_PIXEL, Frame, FramebufferView};

#[derive(Default)]
struct Slot {
    frame: Option<Frame>,
    updated: bool,
    published: u64,
}

// ── FrameCache ───────────────────────────────────────────────────

/// Holder of the most recently captured frame.
///
/// The backing allocation is reused while the frame shape stays the
/// same; it is only replaced when width, height or stride change.
#[derive(Default)]
pub struct FrameCache {
    slot: Mutex<Slot>,
}

impl FrameCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the held frame with a copy of `data`.
    ///
    /// Returns `false`, leaving the cache untouched, if `data` cannot
    /// hold `height` rows of `stride` bytes or `stride` is too narrow
    /// for `width` pixels.
    pub fn publish(&self, data: &[u8], width: u32, height: u32, stride: u32) -> bool {
        let needed = stride as usize * height as usize;
        if data.len() < needed || (stride as usize) < width as usize * BYTES_PER_PIXEL {
            debug!(
                width,
                height,
                stride,
                len = data.len(),
                "dropping inconsistent framebuffer"
            );
            return false;
        }
        let src = &data[..needed];

        let mut slot = self.lock();
        match slot.frame.as_mut() {
            Some(frame) if frame.same_shape(width, height, stride) => {
                frame.data_mut().copy_from_slice(src);
            }
            _ => {
                // Shape checked above, so construction cannot fail.
                slot.frame = Frame::new(width, height, stride, src.to_vec());
            }
        }
        slot.updated = true;
        slot.published += 1;
        true
    }

    /// Publish straight from an engine framebuffer view.
    pub fn publish_view(&self, view: FramebufferView<'_>) -> bool {
        self.publish(view.data, view.width, view.height, view.stride)
    }

    /// Copy of the held frame if it has not been taken since the last
    /// publish; clears the update flag.
    pub fn try_take_latest(&self) -> Option<Frame> {
        let mut slot = self.lock();
        if !slot.updated {
            return None;
        }
        slot.updated = false;
        slot.frame.clone()
    }

    /// Copy of the held frame regardless of the update flag; clears the
    /// flag. `None` only if nothing was ever published.
    pub fn latest(&self) -> Option<Frame> {
        let mut slot = self.lock();
        slot.updated = false;
        slot.frame.clone()
    }

    /// Whether a publish happened since the last take.
    pub fn has_update(&self) -> bool {
        self.lock().updated
    }

    /// Total publishes since creation.
    pub fn publish_count(&self) -> u64 {
        self.lock().published
    }

    /// Drop the held frame (used when the session is torn down).
    pub fn clear(&self) {
        let mut slot = self.lock();
        slot.frame = None;
        slot.updated = false;
    }
}
