//! Screenshot orchestration: take the cached frame, reject it while it
//! is still black, and hand accepted frames to the PNG encoder.
//!
//! The orchestrator never sleeps. A black frame yields
//! [`CaptureOutcome::StillBlack`] and the caller decides when to try
//! again with the same [`ScreenshotRequest`]; once the request has used
//! up its retries the black frame is saved anyway.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use image::{ImageFormat, Rgb, RgbImage};
use tracing::{debug, info, warn};

use crate::error::BridgeError;
use crate::rdp::cache::FrameCache;
use crate::rdp::types::Frame;

/// Default retry bound for black frames.
pub const MAX_SCREENSHOT_RETRIES: u32 = 20;

/// Sample every Nth pixel along both axes.
const SAMPLE_STEP: usize = 16;
/// Channels at or below this count as black.
const BLACK_THRESHOLD: u8 = 5;
/// Any channel above this makes a pixel significant.
const SIGNIFICANT_THRESHOLD: u8 = 30;
/// Sampling stops early once more than this many significant pixels
/// were seen.
const EARLY_EXIT_SIGNIFICANT: u32 = 5;
/// A black frame has fewer significant pixels than this.
const MAX_SIGNIFICANT_FOR_BLACK: u32 = 3;
/// A black frame has less than this percentage of non-black samples.
const MAX_NON_BLACK_PERCENT: u32 = 5;

// ── Blackness heuristic ──────────────────────────────────────────

/// Sampling statistics for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlacknessReport {
    pub sampled: u32,
    pub black: u32,
    pub significant: u32,
    /// Sampling was cut short by the significant-pixel limit.
    pub early_exit: bool,
}

impl BlacknessReport {
    /// Whether the frame counts as "not rendered yet".
    pub fn is_black(&self) -> bool {
        if self.early_exit {
            return false;
        }
        let non_black = self.sampled - self.black;
        non_black * 100 < self.sampled * MAX_NON_BLACK_PERCENT
            && self.significant < MAX_SIGNIFICANT_FOR_BLACK
    }
}

/// Sample `frame` on a 16-pixel grid.
pub fn analyze_blackness(frame: &Frame) -> BlacknessReport {
    let mut report = BlacknessReport::default();
    for y in (0..frame.height()).step_by(SAMPLE_STEP) {
        for x in (0..frame.width()).step_by(SAMPLE_STEP) {
            let (r, g, b) = frame.rgb(x, y);
            report.sampled += 1;
            if r <= BLACK_THRESHOLD && g <= BLACK_THRESHOLD && b <= BLACK_THRESHOLD {
                report.black += 1;
            }
            if r > SIGNIFICANT_THRESHOLD || g > SIGNIFICANT_THRESHOLD || b > SIGNIFICANT_THRESHOLD
            {
                report.significant += 1;
                if report.significant > EARLY_EXIT_SIGNIFICANT {
                    report.early_exit = true;
                    return report;
                }
            }
        }
    }
    report
}

/// Shorthand for `analyze_blackness(frame).is_black()`.
pub fn is_all_black(frame: &Frame) -> bool {
    analyze_blackness(frame).is_black()
}

// ── Encoder boundary ─────────────────────────────────────────────

/// Convert a packed frame into an 8-bit RGB raster of the same size.
pub fn to_rgb_image(frame: &Frame) -> RgbImage {
    RgbImage::from_fn(frame.width(), frame.height(), |x, y| {
        let (r, g, b) = frame.rgb(x, y);
        Rgb([r, g, b])
    })
}

/// Encode `frame` as PNG and write it to `path`.
pub fn save_png(frame: &Frame, path: &Path) -> Result<(), BridgeError> {
    to_rgb_image(frame)
        .save_with_format(path, ImageFormat::Png)
        .map_err(|e| BridgeError::Encode(format!("{}: {e}", path.display())))
}

/// `screenshot_<UTC timestamp>.png`, in ISO-8601 basic format so the
/// name carries no colons.
pub fn auto_filename(now: DateTime<Utc>) -> String {
    format!("screenshot_{}.png", now.format("%Y%m%dT%H%M%S%.3fZ"))
}

// ── Request / outcome ────────────────────────────────────────────

/// Per-request state carried across `StillBlack` retries.
#[derive(Debug, Clone, Default)]
pub struct ScreenshotRequest {
    path: Option<PathBuf>,
    retries: u32,
}

impl ScreenshotRequest {
    /// Save under an auto-generated name in the output directory.
    pub fn auto() -> Self {
        Self::default()
    }

    /// Save to exactly `path`.
    pub fn to(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            retries: 0,
        }
    }

    /// `StillBlack` results handed out so far.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

/// Non-error result of one capture attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// The frame was accepted and written here.
    Saved(PathBuf),
    /// The frame is still black; try again later with the same request.
    StillBlack,
}

// ── Screenshotter ────────────────────────────────────────────────

/// Configuration for [`Screenshotter`].
#[derive(Debug, Clone)]
pub struct ScreenshotConfig {
    /// Directory for auto-named screenshots; created on demand.
    pub output_dir: PathBuf,
    /// `StillBlack` results per request before a black frame is
    /// accepted.
    pub max_retries: u32,
}

impl Default for ScreenshotConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("screenshots"),
            max_retries: MAX_SCREENSHOT_RETRIES,
        }
    }
}

/// Pull-based screenshot workflow over a [`FrameCache`].
#[derive(Clone)]
pub struct Screenshotter {
    cache: Arc<FrameCache>,
    config: ScreenshotConfig,
}

impl Screenshotter {
    pub fn new(cache: Arc<FrameCache>, config: ScreenshotConfig) -> Self {
        Self { cache, config }
    }

    /// One capture attempt.
    ///
    /// Fails fast with [`BridgeError::CaptureNotReady`] if no frame has
    /// been published. Never blocks beyond the cache copy and the
    /// encode.
    pub fn capture(&self, request: &mut ScreenshotRequest) -> Result<CaptureOutcome, BridgeError> {
        let fresh = self.cache.has_update();
        let frame = self.cache.latest().ok_or(BridgeError::CaptureNotReady)?;

        if is_all_black(&frame) {
            if request.retries < self.config.max_retries {
                request.retries += 1;
                debug!(
                    attempt = request.retries,
                    max = self.config.max_retries,
                    fresh,
                    "frame still black"
                );
                return Ok(CaptureOutcome::StillBlack);
            }
            warn!(
                "frame still black after {} retries; saving anyway",
                request.retries
            );
        }

        let path = match &request.path {
            Some(path) => path.clone(),
            None => {
                std::fs::create_dir_all(&self.config.output_dir)?;
                self.config.output_dir.join(auto_filename(Utc::now()))
            }
        };

        save_png(&frame, &path)?;
        info!(
            "Screenshot saved to {} ({}x{})",
            path.display(),
            frame.width(),
            frame.height()
        );
        Ok(CaptureOutcome::Saved(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdp::types::{BYTES_PER_PIXEL, pack_rgb};
    use chrono::TimeZone;

    /// Solid frame of `fill`, with `(x, y, pixel)` overrides.
    fn frame_with(width: u32, height: u32, fill: u32, overrides: &[(u32, u32, u32)]) -> Frame {
        let stride = width * BYTES_PER_PIXEL as u32;
        let mut data = Vec::with_capacity((stride * height) as usize);
        for _ in 0..width * height {
            data.extend_from_slice(&fill.to_le_bytes());
        }
        for &(x, y, pixel) in overrides {
            let offset = (y * stride) as usize + x as usize * BYTES_PER_PIXEL;
            data[offset..offset + 4].copy_from_slice(&pixel.to_le_bytes());
        }
        Frame::new(width, height, stride, data).unwrap()
    }

    fn black(width: u32, height: u32) -> Frame {
        frame_with(width, height, 0, &[])
    }

    #[test]
    fn all_zero_frame_is_black() {
        let report = analyze_blackness(&black(160, 160));
        assert_eq!(report.sampled, 100);
        assert_eq!(report.black, 100);
        assert!(report.is_black());
    }

    #[test]
    fn six_bright_samples_are_not_black() {
        let grey = pack_rgb(200, 200, 200);
        let points: Vec<_> = [(0, 0), (32, 48), (64, 16), (96, 112), (128, 80), (144, 144)]
            .iter()
            .map(|&(x, y)| (x, y, grey))
            .collect();
        let report = analyze_blackness(&frame_with(160, 160, 0, &points));
        assert!(report.early_exit);
        assert!(!report.is_black());
    }

    #[test]
    fn off_grid_pixels_are_not_sampled() {
        let grey = pack_rgb(200, 200, 200);
        let frame = frame_with(64, 64, 0, &[(1, 1, grey), (17, 3, grey), (5, 40, grey)]);
        assert!(is_all_black(&frame));
    }

    #[test]
    fn dim_noise_under_threshold_is_black() {
        // Non-black but insignificant, on 2 of 100 samples.
        let dim = pack_rgb(10, 10, 10);
        let frame = frame_with(160, 160, 0, &[(0, 0, dim), (16, 0, dim)]);
        let report = analyze_blackness(&frame);
        assert_eq!(report.black, 98);
        assert_eq!(report.significant, 0);
        assert!(report.is_black());
    }

    #[test]
    fn many_dim_pixels_are_not_black() {
        // Uniform dark grey: every sample is non-black, none significant.
        let frame = frame_with(64, 64, pack_rgb(20, 20, 20), &[]);
        assert!(!is_all_black(&frame));
    }

    #[test]
    fn high_byte_is_ignored() {
        let frame = frame_with(32, 32, 0xFF00_0000, &[]);
        assert!(is_all_black(&frame));
    }

    #[test]
    fn rgb_conversion_extracts_channels() {
        let frame = frame_with(2, 1, pack_rgb(1, 2, 3), &[(1, 0, 0xAA10_2030)]);
        let img = to_rgb_image(&frame);
        assert_eq!(img.dimensions(), (2, 1));
        assert_eq!(img.get_pixel(0, 0).0, [1, 2, 3]);
        assert_eq!(img.get_pixel(1, 0).0, [0x10, 0x20, 0x30]);
    }

    #[test]
    fn save_png_writes_png_signature() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grey.png");
        save_png(&frame_with(4, 4, pack_rgb(9, 9, 9), &[]), &path).unwrap();
        let png = std::fs::read(&path).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (4, 4));
    }

    #[test]
    fn auto_filename_has_no_colons() {
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 8, 30, 5).unwrap();
        let name = auto_filename(now);
        assert_eq!(name, "screenshot_20261016T083005.000Z.png");
    }

    #[test]
    fn empty_cache_is_not_ready() {
        let shooter = Screenshotter::new(Arc::new(FrameCache::new()), ScreenshotConfig::default());
        let mut request = ScreenshotRequest::auto();
        assert!(matches!(
            shooter.capture(&mut request),
            Err(BridgeError::CaptureNotReady)
        ));
    }

    #[test]
    fn black_frame_retries_up_to_bound_then_saves() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(FrameCache::new());
        let frame = black(32, 32);
        cache.publish(frame.data(), 32, 32, frame.stride());

        let shooter = Screenshotter::new(
            Arc::clone(&cache),
            ScreenshotConfig {
                output_dir: dir.path().to_path_buf(),
                max_retries: 3,
            },
        );
        let target = dir.path().join("black.png");
        let mut request = ScreenshotRequest::to(&target);

        let mut still_black = 0;
        loop {
            match shooter.capture(&mut request).unwrap() {
                CaptureOutcome::StillBlack => still_black += 1,
                CaptureOutcome::Saved(path) => {
                    assert_eq!(path, target);
                    break;
                }
            }
            assert!(still_black <= 3, "exceeded retry bound");
        }
        assert_eq!(still_black, 3);
        assert_eq!(request.retries(), 3);
        assert!(target.exists());
    }

    #[test]
    fn rendered_frame_saves_under_auto_name() {
        let dir = tempfile::tempdir().unwrap();
        let output_dir = dir.path().join("nested").join("shots");
        let cache = Arc::new(FrameCache::new());
        let frame = frame_with(32, 32, pack_rgb(90, 120, 200), &[]);
        cache.publish(frame.data(), 32, 32, frame.stride());

        let shooter = Screenshotter::new(
            cache,
            ScreenshotConfig {
                output_dir: output_dir.clone(),
                max_retries: MAX_SCREENSHOT_RETRIES,
            },
        );
        let outcome = shooter.capture(&mut ScreenshotRequest::auto()).unwrap();
        let CaptureOutcome::Saved(path) = outcome else {
            panic!("expected saved screenshot");
        };
        assert_eq!(path.parent(), Some(output_dir.as_path()));
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("screenshot_") && name.ends_with(".png"));
        let img = image::open(&path).unwrap();
        assert_eq!((img.width(), img.height()), (32, 32));
    }

    #[test]
    fn unwritable_path_is_encode_failure() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(FrameCache::new());
        let frame = frame_with(16, 16, pack_rgb(90, 90, 90), &[]);
        cache.publish(frame.data(), 16, 16, frame.stride());
        let shooter = Screenshotter::new(cache, ScreenshotConfig::default());
        let mut request = ScreenshotRequest::to(dir.path().join("missing").join("x.png"));
        assert!(matches!(
            shooter.capture(&mut request),
            Err(BridgeError::Encode(_))
        ));
    }
}
