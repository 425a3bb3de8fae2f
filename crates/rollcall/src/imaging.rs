//! Liveness frame post-processing: downscale, recompress, base64.

use base64::{Engine, engine::general_purpose::STANDARD};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;

use rollcall_common::constants::{CAPTURE_JPEG_QUALITY, CAPTURE_TARGET_WIDTH};
use rollcall_common::{Result, RollCallError};

/// Turns raw camera stills into upload-sized JPEG text
#[derive(Debug, Clone, Copy)]
pub struct FrameEncoder {
    target_width: u32,
    quality: u8,
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::new(CAPTURE_TARGET_WIDTH, CAPTURE_JPEG_QUALITY)
    }
}

impl FrameEncoder {
    /// `quality` is clamped to the JPEG range 1-100
    pub fn new(target_width: u32, quality: u8) -> Self {
        Self {
            target_width: target_width.max(1),
            quality: quality.clamp(1, 100),
        }
    }

    pub fn target_width(&self) -> u32 {
        self.target_width
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Decode, shrink to the target width (never upscale), JPEG-encode, base64.
    ///
    /// CPU-bound; async callers should run it on the blocking pool.
    pub fn encode(&self, raw: &[u8]) -> Result<String> {
        let decoded = image::load_from_memory(raw)
            .map_err(|e| RollCallError::CaptureFailed(format!("Unreadable frame: {e}")))?;

        let (width, height) = (decoded.width(), decoded.height());
        let resized = if width > self.target_width {
            let scaled_height =
                ((height as u64 * self.target_width as u64) / width as u64).max(1) as u32;
            decoded.resize_exact(self.target_width, scaled_height, FilterType::Triangle)
        } else {
            decoded
        };

        let rgb = resized.to_rgb8();
        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, self.quality)
            .encode_image(&rgb)
            .map_err(|e| RollCallError::CaptureFailed(format!("JPEG encode failed: {e}")))?;

        tracing::trace!(
            from = %format!("{width}x{height}"),
            to = %format!("{}x{}", rgb.width(), rgb.height()),
            bytes = jpeg.len(),
            "Frame compressed"
        );

        Ok(STANDARD.encode(jpeg))
    }
}
