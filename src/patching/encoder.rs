//! Image encoding for exported patches.
//!
//! # Design Decisions
//!
//! - **RGB only**: Slides return RGBA regions; alpha is dropped before
//!   encoding so that PNG and JPEG exports hold the same pixels.
//!
//! - **Quality control**: JPEG quality is fixed per export run and validated
//!   up front, so a bad value fails before any slide is opened.

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::RgbImage;

use crate::error::EncodeError;

/// Default JPEG quality (1-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Minimum allowed JPEG quality.
pub const MIN_JPEG_QUALITY: u8 = 1;

/// Maximum allowed JPEG quality.
pub const MAX_JPEG_QUALITY: u8 = 100;

// =============================================================================
// Export Encoder
// =============================================================================

/// Output format of exported patch files.
///
/// # Example
///
/// ```ignore
/// use wsi_patcher::patching::ExportEncoder;
///
/// let encoder = ExportEncoder::jpeg(90)?;
/// let bytes = encoder.encode(&patch)?;
/// std::fs::write(format!("patch.{}", encoder.extension()), bytes)?;
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportEncoder {
    /// Lossless PNG
    #[default]
    Png,

    /// JPEG at the given quality
    Jpeg { quality: u8 },
}

impl ExportEncoder {
    /// JPEG encoder, rejecting qualities outside 1-100.
    pub fn jpeg(quality: u8) -> Result<Self, EncodeError> {
        if !is_valid_quality(quality) {
            return Err(EncodeError::InvalidQuality { quality });
        }
        Ok(ExportEncoder::Jpeg { quality })
    }

    /// File extension without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            ExportEncoder::Png => "png",
            ExportEncoder::Jpeg { .. } => "jpg",
        }
    }

    /// Encode one patch.
    ///
    /// # Errors
    ///
    /// Returns an error if the quality is invalid or the codec fails.
    pub fn encode(&self, patch: &RgbImage) -> Result<Vec<u8>, EncodeError> {
        let mut output = Vec::new();
        let result = match *self {
            ExportEncoder::Png => patch.write_with_encoder(PngEncoder::new(&mut output)),
            ExportEncoder::Jpeg { quality } => {
                if !is_valid_quality(quality) {
                    return Err(EncodeError::InvalidQuality { quality });
                }
                patch.write_with_encoder(JpegEncoder::new_with_quality(&mut output, quality))
            }
        };

        result.map_err(|e| EncodeError::Encode {
            message: e.to_string(),
        })?;
        Ok(output)
    }
}

// =============================================================================
// Utility Functions
// =============================================================================

/// Validate JPEG quality parameter.
///
/// Returns `true` if quality is in the valid range (1-100).
#[inline]
pub fn is_valid_quality(quality: u8) -> bool {
    (MIN_JPEG_QUALITY..=MAX_JPEG_QUALITY).contains(&quality)
}

// =============================================================================
// Tests
// =============================================================================
