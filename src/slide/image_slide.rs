//! Slides backed by ordinary raster images.
//!
//! An [`ImageSlide`] decodes a PNG, JPEG or TIFF (first page) into memory and
//! builds a power-of-two pyramid by repeated halving. It is meant for small
//! slides, fixtures and exported thumbnails, not for gigapixel scans.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbaImage};
use tracing::debug;

use crate::error::SlideError;
use crate::geometry::{Region, Size};

use super::reader::{Slide, SlideOpener};

/// Default number of pyramid levels to build.
pub const DEFAULT_PYRAMID_LEVELS: u32 = 6;

/// In-memory slide with a synthetic pyramid.
pub struct ImageSlide {
    path: PathBuf,
    dimensions: Vec<Size>,
    levels: Vec<RgbaImage>,
}

impl ImageSlide {
    /// Build a slide from an already decoded image.
    ///
    /// At most `levels` levels are built; halving stops early once either
    /// edge would drop to zero.
    pub fn from_image(path: impl Into<PathBuf>, image: DynamicImage, levels: u32) -> Self {
        let mut pyramid = vec![image.to_rgba8()];
        while (pyramid.len() as u32) < levels.max(1) {
            let previous = &pyramid[pyramid.len() - 1];
            let (width, height) = (previous.width() / 2, previous.height() / 2);
            if width == 0 || height == 0 {
                break;
            }
            let next = imageops::resize(previous, width, height, FilterType::Triangle);
            pyramid.push(next);
        }

        let dimensions = pyramid
            .iter()
            .map(|level| Size::new(level.width(), level.height()))
            .collect();

        Self {
            path: path.into(),
            dimensions,
            levels: pyramid,
        }
    }

    /// Decode the image at `path` and build its pyramid.
    pub async fn open(path: &Path, levels: u32) -> Result<Self, SlideError> {
        let owned = path.to_path_buf();
        let decoded = tokio::task::spawn_blocking(move || image::open(&owned))
            .await
            .map_err(|e| SlideError::Io(e.to_string()))?
            .map_err(|e| match e {
                image::ImageError::IoError(io) => SlideError::Io(io.to_string()),
                other => SlideError::Decode {
                    message: other.to_string(),
                },
            })?;

        debug!(
            "Decoded {} ({}x{})",
            path.display(),
            decoded.width(),
            decoded.height()
        );
        Ok(Self::from_image(path, decoded, levels))
    }
}

#[async_trait]
impl Slide for ImageSlide {
    fn path(&self) -> &Path {
        &self.path
    }

    fn dimensions(&self) -> &[Size] {
        &self.dimensions
    }

    async fn read_region(&self, region: &Region) -> Result<RgbaImage, SlideError> {
        let source = self
            .levels
            .get(region.level as usize)
            .ok_or(SlideError::LevelOutOfRange {
                level: region.level,
                levels: self.levels.len(),
            })?;

        // Out-of-bounds pixels stay transparent.
        let mut window = RgbaImage::new(region.size.width, region.size.height);
        imageops::replace(
            &mut window,
            source,
            -region.location.x,
            -region.location.y,
        );
        Ok(window)
    }
}

/// Opens files as [`ImageSlide`]s.
#[derive(Debug, Clone, Copy)]
pub struct ImageSlideOpener {
    levels: u32,
}

impl ImageSlideOpener {
    pub fn new(levels: u32) -> Self {
        Self { levels }
    }
}

impl Default for ImageSlideOpener {
    fn default() -> Self {
        Self::new(DEFAULT_PYRAMID_LEVELS)
    }
}

#[async_trait]
impl SlideOpener for ImageSlideOpener {
    async fn open(&self, path: &Path) -> Result<Box<dyn Slide>, SlideError> {
        let slide = ImageSlide::open(path, self.levels).await?;
        Ok(Box::new(slide))
    }
}
