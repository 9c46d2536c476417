//! Sliding-window patch finding over label rasters.
//!
//! A finder turns a label raster at a coarse pyramid level into patch
//! locations at a finer one. Each `kernel × kernel` window of label pixels
//! becomes one candidate patch of `patch_size` pixels at the patch level:
//!
//! ```text
//!   labels level (coarse)            patch level (fine)
//!   ┌──┬──┬──┬──┐                    ┌─────┬─────┐
//!   │0 │0 │1 │1 │   pool 2×2         │     │     │
//!   ├──┼──┼──┼──┤   ────────►        │  0  │  1  │  each cell is
//!   │0 │0 │1 │1 │                    │     │     │  patch_size px
//!   ├──┼──┼──┼──┤                    ├─────┼─────┤
//!   │2 │2 │0 │0 │                    │  2  │  0  │
//!   ├──┼──┼──┼──┤                    │     │     │
//!   │2 │2 │0 │0 │                    └─────┴─────┘
//!   └──┴──┴──┴──┘
//! ```

use std::collections::BTreeMap;

use ndarray::{s, Array2, ArrayView2};
use tracing::debug;

use crate::error::FinderError;
use crate::geometry::{scale_factor, Size};

use super::table::PatchRow;

// =============================================================================
// Label Pooling
// =============================================================================

/// Reduces one window of label pixels to a single label.
pub trait LabelPooling: Send + Sync {
    fn pool(&self, window: ArrayView2<'_, u32>) -> u32;
}

/// Largest label index present in the window.
///
/// Not area-weighted: one tumour pixel makes the whole window tumour.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaxLabel;

impl LabelPooling for MaxLabel {
    fn pool(&self, window: ArrayView2<'_, u32>) -> u32 {
        window.iter().copied().max().unwrap_or(0)
    }
}

/// Most frequent label in the window; ties go to the larger label.
#[derive(Debug, Clone, Copy, Default)]
pub struct Majority;

impl LabelPooling for Majority {
    fn pool(&self, window: ArrayView2<'_, u32>) -> u32 {
        let mut counts: BTreeMap<u32, usize> = BTreeMap::new();
        for &label in window.iter() {
            *counts.entry(label).or_default() += 1;
        }

        let mut best = (0, 0);
        for (label, count) in counts {
            if count >= best.1 {
                best = (label, count);
            }
        }
        best.0
    }
}

// =============================================================================
// Finder Trait
// =============================================================================

/// Patches found on one slide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundPatches {
    /// Patch rows in row-major grid order
    pub rows: Vec<PatchRow>,

    /// Pyramid level the coordinates refer to
    pub level: u32,

    /// Edge of every patch, border and jitter included
    pub patch_size: u32,
}

/// Finds patches on a slide from its label raster.
pub trait PatchFinder: Send + Sync {
    /// Level the label raster must be rendered at.
    fn labels_level(&self) -> u32;

    /// Level the returned coordinates refer to.
    fn patch_level(&self) -> u32;

    /// Find patches.
    ///
    /// `labels` is the raster at [`labels_level`](Self::labels_level) and
    /// `slide_size` the slide extent at [`patch_level`](Self::patch_level).
    fn find(&self, labels: &Array2<u32>, slide_size: Size) -> Result<FoundPatches, FinderError>;
}

// =============================================================================
// Grid Patch Finder
// =============================================================================

/// Settings of a [`GridPatchFinder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinderConfig {
    /// Level of the label raster
    pub labels_level: u32,

    /// Level patches are extracted at; at or below `labels_level`
    pub patch_level: u32,

    /// Patch edge in patch-level pixels
    pub patch_size: u32,

    /// Window step, scaled by the level difference like `patch_size`
    pub stride: u32,

    /// Extra context around each patch, in output pixels
    pub border: u32,

    /// Extra slack for random crops, in output pixels
    pub jitter: u32,

    /// Drop windows whose pooled label is 0
    pub remove_background: bool,
}

impl FinderConfig {
    /// Config with no border, no jitter and background removal on.
    pub fn new(labels_level: u32, patch_level: u32, patch_size: u32, stride: u32) -> Self {
        Self {
            labels_level,
            patch_level,
            patch_size,
            stride,
            border: 0,
            jitter: 0,
            remove_background: true,
        }
    }

    pub fn with_border(mut self, border: u32) -> Self {
        self.border = border;
        self
    }

    pub fn with_jitter(mut self, jitter: u32) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_remove_background(mut self, remove_background: bool) -> Self {
        self.remove_background = remove_background;
        self
    }

    /// Edge of every output patch, `None` on overflow.
    pub fn output_patch_size(&self) -> Option<u32> {
        self.patch_size
            .checked_add(self.border)?
            .checked_add(self.jitter)
    }

    /// How far the padded patch extends above and left of the nominal one,
    /// `None` on overflow.
    pub fn top_left_offset(&self) -> Option<u32> {
        self.border.div_ceil(2).checked_add(self.jitter)
    }
}

/// Regular grid of windows pooled with a [`LabelPooling`] policy.
pub struct GridPatchFinder {
    config: FinderConfig,
    output_patch_size: u32,
    top_left_offset: u32,
    kernel: usize,
    label_stride: usize,
    pooling: Box<dyn LabelPooling>,
}

impl GridPatchFinder {
    /// Validate `config` and build a finder using [`MaxLabel`] pooling.
    pub fn new(config: FinderConfig) -> Result<Self, FinderError> {
        if config.patch_level > config.labels_level {
            return Err(FinderError::PatchLevelAboveLabels {
                patch_level: config.patch_level,
                labels_level: config.labels_level,
            });
        }
        let scale = scale_factor(config.labels_level, config.patch_level).ok_or(
            FinderError::LevelGapTooLarge {
                patch_level: config.patch_level,
                labels_level: config.labels_level,
            },
        )?;

        if config.patch_size % scale != 0 {
            return Err(FinderError::NonIntegerKernel {
                patch_size: config.patch_size,
                scale,
            });
        }
        if config.stride % scale != 0 {
            return Err(FinderError::NonIntegerStride {
                stride: config.stride,
                scale,
            });
        }

        let kernel = (config.patch_size / scale) as usize;
        let label_stride = (config.stride / scale) as usize;
        if kernel == 0 {
            return Err(FinderError::ZeroWindow { name: "patch_size" });
        }
        if label_stride == 0 {
            return Err(FinderError::ZeroWindow { name: "stride" });
        }

        let padding_overflow = || FinderError::PaddingOverflow {
            patch_size: config.patch_size,
            border: config.border,
            jitter: config.jitter,
        };
        let output_patch_size = config.output_patch_size().ok_or_else(padding_overflow)?;
        let top_left_offset = config.top_left_offset().ok_or_else(padding_overflow)?;

        Ok(Self {
            config,
            output_patch_size,
            top_left_offset,
            kernel,
            label_stride,
            pooling: Box::new(MaxLabel),
        })
    }

    /// Replace the pooling policy.
    pub fn with_pooling(mut self, pooling: impl LabelPooling + 'static) -> Self {
        self.pooling = Box::new(pooling);
        self
    }

    pub fn config(&self) -> &FinderConfig {
        &self.config
    }

    /// Window edge in label pixels.
    pub fn kernel(&self) -> usize {
        self.kernel
    }

    /// Window step in label pixels.
    pub fn label_stride(&self) -> usize {
        self.label_stride
    }

    /// Pool every valid window position.
    fn pool_grid(&self, labels: &Array2<u32>) -> Array2<u32> {
        let (height, width) = labels.dim();
        let steps = |extent: usize| {
            if extent < self.kernel {
                0
            } else {
                (extent - self.kernel) / self.label_stride + 1
            }
        };
        let (rows, cols) = (steps(height), steps(width));

        Array2::from_shape_fn((rows, cols), |(r, c)| {
            let top = r * self.label_stride;
            let left = c * self.label_stride;
            let window = labels.slice(s![top..top + self.kernel, left..left + self.kernel]);
            self.pooling.pool(window)
        })
    }
}

impl PatchFinder for GridPatchFinder {
    fn labels_level(&self) -> u32 {
        self.config.labels_level
    }

    fn patch_level(&self) -> u32 {
        self.config.patch_level
    }

    fn find(&self, labels: &Array2<u32>, slide_size: Size) -> Result<FoundPatches, FinderError> {
        let out = self.output_patch_size;
        if slide_size.width < out || slide_size.height < out {
            return Err(FinderError::PatchLargerThanSlide {
                patch_size: out,
                width: slide_size.width,
                height: slide_size.height,
            });
        }

        let max_x = (slide_size.width - out) as i64;
        let max_y = (slide_size.height - out) as i64;
        let offset = self.top_left_offset as i64;
        let step = self.config.patch_size as i64;

        let grid = self.pool_grid(labels);
        let rows: Vec<PatchRow> = grid
            .indexed_iter()
            .filter(|&(_, &label)| !self.config.remove_background || label != 0)
            .map(|((r, c), &label)| {
                let x = (c as i64 * step - offset).clamp(0, max_x);
                let y = (r as i64 * step - offset).clamp(0, max_y);
                PatchRow::new(x, y, label)
            })
            .collect();

        debug!(
            "Pooled {}x{} label windows into {} patch(es) of {}px at level {}",
            grid.nrows(),
            grid.ncols(),
            rows.len(),
            out,
            self.config.patch_level
        );

        Ok(FoundPatches {
            rows,
            level: self.config.patch_level,
            patch_size: out,
        })
    }
}
