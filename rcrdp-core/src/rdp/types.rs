//! Shared types for the capture pipeline.
//!
//! [`FramebufferView`] borrows the engine's live buffer for the duration
//! of a paint callback; [`Frame`] is the owned, immutable snapshot that
//! the rest of the pipeline passes around.

use std::fmt;

/// Bytes per pixel of the engine's packed 32-bit XRGB layout.
pub const BYTES_PER_PIXEL: usize = 4;

/// Default RDP port.
pub const DEFAULT_RDP_PORT: u16 = 3389;

/// Split a packed 32-bit pixel into `(r, g, b)`. The high byte is unused.
#[inline]
pub const fn unpack_rgb(pixel: u32) -> (u8, u8, u8) {
    (
        ((pixel >> 16) & 0xFF) as u8,
        ((pixel >> 8) & 0xFF) as u8,
        (pixel & 0xFF) as u8,
    )
}

/// Pack `(r, g, b)` into the engine's 32-bit layout.
#[inline]
pub const fn pack_rgb(r: u8, g: u8, b: u8) -> u32 {
    ((r as u32) << 16) | ((g as u32) << 8) | b as u32
}

// ── FramebufferView ──────────────────────────────────────────────

/// A borrowed view of the engine's current rendered buffer.
///
/// Only valid inside a paint callback; copy it out with
/// [`FrameCache::publish`](crate::rdp::cache::FrameCache::publish).
#[derive(Debug, Clone, Copy)]
pub struct FramebufferView<'a> {
    pub width: u32,
    pub height: u32,
    /// Row pitch in bytes (may exceed `width * 4`).
    pub stride: u32,
    /// `height` rows of `stride` bytes, top-down.
    pub data: &'a [u8],
}

// ── Frame ────────────────────────────────────────────────────────

/// An immutable snapshot of one fully rendered desktop.
///
/// The buffer holds `height` rows of `stride` bytes each, top-down,
/// with every pixel stored as a little-endian packed `0x00RRGGBB`.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    stride: u32,
    data: Vec<u8>,
}

impl Frame {
    /// Build a frame from an owned buffer.
    ///
    /// Returns `None` if `data` is shorter than `stride * height` or the
    /// stride cannot hold `width` pixels.
    pub fn new(width: u32, height: u32, stride: u32, mut data: Vec<u8>) -> Option<Self> {
        let needed = stride as usize * height as usize;
        if (stride as usize) < width as usize * BYTES_PER_PIXEL || data.len() < needed {
            return None;
        }
        data.truncate(needed);
        Some(Self {
            width,
            height,
            stride,
            data,
        })
    }

    /// Frame width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Frame height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row pitch in bytes.
    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// Raw pixel bytes, `stride * height` long.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Packed pixel at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` is out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> u32 {
        let offset = y as usize * self.stride as usize + x as usize * BYTES_PER_PIXEL;
        let bytes = &self.data[offset..offset + BYTES_PER_PIXEL];
        u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    /// `(r, g, b)` at `(x, y)`.
    pub fn rgb(&self, x: u32, y: u32) -> (u8, u8, u8) {
        unpack_rgb(self.pixel(x, y))
    }

    /// Mutable buffer access for the cache's in-place refresh.
    pub(crate) fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Whether a buffer with these dimensions can reuse this allocation.
    pub(crate) fn same_shape(&self, width: u32, height: u32, stride: u32) -> bool {
        self.width == width && self.height == height && self.stride == stride
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .field("bytes", &self.data.len())
            .finish()
    }
}

// ── ConnectTarget ────────────────────────────────────────────────

/// Where and as whom the session engine should connect.
#[derive(Clone)]
pub struct ConnectTarget {
    pub hostname: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub domain: Option<String>,
    /// Requested desktop width in pixels.
    pub desktop_width: u32,
    /// Requested desktop height in pixels.
    pub desktop_height: u32,
}

impl ConnectTarget {
    /// A target with the default port and a 1024x768 desktop.
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            port: DEFAULT_RDP_PORT,
            username: None,
            password: None,
            domain: None,
            desktop_width: 1024,
            desktop_height: 768,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_credentials(
        mut self,
        username: Option<String>,
        password: Option<String>,
        domain: Option<String>,
    ) -> Self {
        self.username = username;
        self.password = password;
        self.domain = domain;
        self
    }
}

impl fmt::Debug for ConnectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectTarget")
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("domain", &self.domain)
            .field("desktop_width", &self.desktop_width)
            .field("desktop_height", &self.desktop_height)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpack_matches_channel_layout() {
        assert_eq!(unpack_rgb(0xFF12_3456), (0x12, 0x34, 0x56));
        assert_eq!(pack_rgb(0x12, 0x34, 0x56), 0x0012_3456);
    }

    #[test]
    fn frame_rejects_short_buffer() {
        assert!(Frame::new(2, 2, 8, vec![0; 15]).is_none());
        assert!(Frame::new(4, 1, 8, vec![0; 16]).is_none());
        assert!(Frame::new(2, 2, 8, vec![0; 16]).is_some());
    }

    #[test]
    fn frame_reads_padded_rows() {
        // 1x2 frame with 8-byte stride: pixel + 4 bytes padding per row.
        let mut data = vec![0u8; 16];
        data[0..4].copy_from_slice(&pack_rgb(1, 2, 3).to_le_bytes());
        data[8..12].copy_from_slice(&pack_rgb(4, 5, 6).to_le_bytes());
        let frame = Frame::new(1, 2, 8, data).unwrap();
        assert_eq!(frame.rgb(0, 0), (1, 2, 3));
        assert_eq!(frame.rgb(0, 1), (4, 5, 6));
        assert_eq!(frame.data().len(), 16);
    }

    #[test]
    fn debug_redacts_password() {
        let target = ConnectTarget::new("host").with_credentials(
            Some("admin".into()),
            Some("hunter2".into()),
            None,
        );
        let text = format!("{target:?}");
        assert!(text.contains("admin"));
        assert!(!text.contains("hunter2"));
    }
}
