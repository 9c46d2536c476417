//! Slide capability for format-agnostic pixel access.
//!
//! The pipeline never decodes slides itself. Everything it needs from a
//! whole-slide image goes through the [`Slide`] trait: level dimensions,
//! region reads and thumbnails. Handles are produced by a [`SlideOpener`]
//! and released with [`Slide::close`].
//!
//! Levels are indexed finest first: level 0 is full resolution, and every
//! location passed to [`Slide::read_region`] is in the pixel frame of the
//! region's own level.

use std::path::Path;

use async_trait::async_trait;
use image::{DynamicImage, RgbImage, RgbaImage};

use crate::error::SlideError;
use crate::geometry::{Region, Size};

// =============================================================================
// Slide Trait
// =============================================================================

/// An open whole-slide image.
///
/// Implementations must be thread-safe so that a caller can index several
/// slides concurrently, one handle per task.
///
/// # Example
///
/// ```ignore
/// let slide = opener.open(path).await?;
/// let thumbnail = slide.get_thumbnail(5).await?;
/// let patch = slide.read_region(&Region::square(1024, 2048, 256, 0)).await?;
/// slide.close()?;
/// ```
#[async_trait]
pub trait Slide: Send + Sync {
    /// Path the slide was opened from.
    fn path(&self) -> &Path;

    /// Dimensions of every pyramid level, finest first.
    fn dimensions(&self) -> &[Size];

    /// Number of pyramid levels.
    fn level_count(&self) -> usize {
        self.dimensions().len()
    }

    /// Dimensions of a single level.
    fn level_dimensions(&self, level: u32) -> Result<Size, SlideError> {
        self.dimensions()
            .get(level as usize)
            .copied()
            .ok_or(SlideError::LevelOutOfRange {
                level,
                levels: self.level_count(),
            })
    }

    /// Read a window of pixels.
    ///
    /// Pixels outside the level are returned fully transparent, so the
    /// output always has exactly `region.size` pixels.
    async fn read_region(&self, region: &Region) -> Result<RgbaImage, SlideError>;

    /// Read a whole level as an RGB image.
    ///
    /// Used to feed tissue detection at the labels level. The alpha channel
    /// is dropped.
    async fn get_thumbnail(&self, level: u32) -> Result<RgbImage, SlideError> {
        let size = self.level_dimensions(level)?;
        let pixels = self.read_region(&Region::full_level(level, size)).await?;
        Ok(DynamicImage::ImageRgba8(pixels).to_rgb8())
    }

    /// Release the handle.
    ///
    /// Dropping a handle also releases it; `close` exists so that callers
    /// can observe release failures.
    fn close(self: Box<Self>) -> Result<(), SlideError> {
        drop(self);
        Ok(())
    }
}

// =============================================================================
// SlideOpener Trait
// =============================================================================

/// Creates slide handles from paths.
///
/// Datasets own an opener so the decoder backing their slides can be
/// swapped without touching the pipeline.
#[async_trait]
pub trait SlideOpener: Send + Sync {
    /// Open the slide stored at `path`.
    async fn open(&self, path: &Path) -> Result<Box<dyn Slide>, SlideError>;
}
