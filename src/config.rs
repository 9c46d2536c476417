//! Configuration management for WSI Patcher.
//!
//! This module provides the command-line interface:
//! - Command-line arguments via clap, one subcommand per pipeline stage
//! - Environment variables with `WSI_` prefix
//! - Sensible defaults for all optional settings
//!
//! # Example
//!
//! ```ignore
//! use clap::Parser;
//! use wsi_patcher::config::{Cli, Command};
//!
//! let cli = Cli::parse();
//! cli.validate()?;
//!
//! match cli.command {
//!     Command::Index(config) => println!("Indexing {}", config.dataset),
//!     _ => {}
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `WSI_DATA_ROOT` - Directory holding the datasets (default: data)
//! - `WSI_PYRAMID_LEVELS` - Synthetic pyramid depth of image slides (default: 6)
//! - `WSI_DATASET` - Dataset to index (default: camelyon16.training)
//! - `WSI_LABELS_LEVEL` - Level annotations are rendered at (default: 5)
//! - `WSI_PATCH_LEVEL` - Level patches are extracted at (default: 0)
//! - `WSI_PATCH_SIZE` - Patch edge in pixels (default: 256)
//! - `WSI_STRIDE` - Window step in pixels (default: 256)
//! - `WSI_SAMPLES_PER_CLASS` - Per-class sample cap (default: 1000)
//! - `WSI_FLOOR_SAMPLES` - Per-class sample floor (default: 1000)
//! - `WSI_SEED` - Sampler seed
//! - `WSI_JPEG_QUALITY` - JPEG quality for exports (default: 80)

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::dataset::camelyon16;
use crate::error::EncodeError;
use crate::patching::{
    is_valid_quality, ExportEncoder, FinderConfig, GridPatchFinder, DEFAULT_JPEG_QUALITY,
};
use crate::slide::DEFAULT_PYRAMID_LEVELS;

// =============================================================================
// Default Values
// =============================================================================

/// Default data root.
pub const DEFAULT_DATA_ROOT: &str = "data";

/// Default dataset to index.
pub const DEFAULT_DATASET: &str = camelyon16::TRAINING;

/// Default labels level (32x downsampled).
pub const DEFAULT_LABELS_LEVEL: u32 = 5;

/// Default patch level (full resolution).
pub const DEFAULT_PATCH_LEVEL: u32 = 0;

/// Default patch edge in pixels.
pub const DEFAULT_PATCH_SIZE: u32 = 256;

/// Default window step in pixels.
pub const DEFAULT_STRIDE: u32 = 256;

/// Default per-class sample cap.
pub const DEFAULT_SAMPLES_PER_CLASS: usize = 1000;

/// Default per-class sample floor.
pub const DEFAULT_FLOOR_SAMPLES: usize = 1000;

// =============================================================================
// CLI Structure
// =============================================================================

/// WSI Patcher - Patch indexing and export for Whole Slide Images.
///
/// Finds labelled patches on annotated slides, balances them across
/// classes and writes them out as image files.
#[derive(Parser, Debug, Clone)]
#[command(name = "wsi-patcher")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory holding the datasets.
    #[arg(long, global = true, default_value = DEFAULT_DATA_ROOT, env = "WSI_DATA_ROOT")]
    pub data_root: PathBuf,

    /// Number of synthetic pyramid levels for plain image slides.
    #[arg(long, global = true, default_value_t = DEFAULT_PYRAMID_LEVELS, env = "WSI_PYRAMID_LEVELS")]
    pub pyramid_levels: u32,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Validate global settings and the chosen command.
    pub fn validate(&self) -> Result<(), String> {
        if self.pyramid_levels == 0 {
            return Err("pyramid_levels must be greater than 0".to_string());
        }

        match &self.command {
            Command::Index(config) => config.validate(),
            Command::Summary(_) => Ok(()),
            Command::Sample(config) => config.validate(),
            Command::Export(config) => config.validate(),
        }
    }
}

/// Pipeline stages.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Find patches on every slide of a dataset and save the slides index.
    Index(IndexConfig),

    /// Print per-slide label counts of a saved slides index.
    Summary(SummaryConfig),

    /// Balance a saved index or patch set across labels.
    Sample(SampleConfig),

    /// Write the patches of a saved index or patch set as image files.
    Export(ExportConfig),
}

// =============================================================================
// Index Command
// =============================================================================

/// How a patch window is reduced to one label.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PoolingKind {
    /// Largest label index in the window
    #[default]
    Max,
    /// Most frequent label in the window
    Majority,
}

/// How tissue is told apart from background.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TissueKind {
    /// Otsu thresholds on hue and saturation
    #[default]
    Otsu,
    /// Treat every pixel as tissue
    All,
}

/// Configuration for the `index` command.
#[derive(Args, Debug, Clone)]
pub struct IndexConfig {
    /// Registered dataset name.
    #[arg(long, default_value = DEFAULT_DATASET, env = "WSI_DATASET")]
    pub dataset: String,

    /// Directory the slides index is written to.
    #[arg(short, long)]
    pub output: PathBuf,

    /// Pyramid level annotations are rendered at.
    #[arg(long, default_value_t = DEFAULT_LABELS_LEVEL, env = "WSI_LABELS_LEVEL")]
    pub labels_level: u32,

    /// Pyramid level patches are extracted at.
    #[arg(long, default_value_t = DEFAULT_PATCH_LEVEL, env = "WSI_PATCH_LEVEL")]
    pub patch_level: u32,

    /// Patch edge in patch-level pixels.
    #[arg(long, default_value_t = DEFAULT_PATCH_SIZE, env = "WSI_PATCH_SIZE")]
    pub patch_size: u32,

    /// Window step, scaled like the patch size.
    #[arg(long, default_value_t = DEFAULT_STRIDE, env = "WSI_STRIDE")]
    pub stride: u32,

    /// Context added around each patch, in output pixels.
    #[arg(long, default_value_t = 0)]
    pub border: u32,

    /// Slack added for random crops, in output pixels.
    #[arg(long, default_value_t = 0)]
    pub jitter: u32,

    /// Keep patches whose label is background.
    #[arg(long, default_value_t = false)]
    pub keep_background: bool,

    /// Window pooling policy.
    #[arg(long, value_enum, default_value_t = PoolingKind::Max)]
    pub pooling: PoolingKind,

    /// Tissue detector.
    #[arg(long, value_enum, default_value_t = TissueKind::Otsu)]
    pub tissue: TissueKind,
}

impl IndexConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.dataset.is_empty() {
            return Err("Dataset name is required. Set --dataset or WSI_DATASET".to_string());
        }
        if self.patch_size == 0 {
            return Err("patch_size must be greater than 0".to_string());
        }
        if self.stride == 0 {
            return Err("stride must be greater than 0".to_string());
        }
        if self.patch_level > self.labels_level {
            return Err(format!(
                "patch_level ({}) must not be above labels_level ({})",
                self.patch_level, self.labels_level
            ));
        }
        GridPatchFinder::new(self.finder_config())
            .map(drop)
            .map_err(|e| e.to_string())
    }

    /// Finder settings described by this configuration.
    pub fn finder_config(&self) -> FinderConfig {
        FinderConfig::new(
            self.labels_level,
            self.patch_level,
            self.patch_size,
            self.stride,
        )
        .with_border(self.border)
        .with_jitter(self.jitter)
        .with_remove_background(!self.keep_background)
    }
}

// =============================================================================
// Summary Command
// =============================================================================

/// Configuration for the `summary` command.
#[derive(Args, Debug, Clone)]
pub struct SummaryConfig {
    /// Saved slides index directory.
    pub index: PathBuf,
}

// =============================================================================
// Sample Command
// =============================================================================

/// Sampling policy.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PolicyKind {
    /// Weight rows by the inverse of their slide's patch count
    #[default]
    WeightedBySlide,
    /// Every row equally likely
    Uniform,
}

/// Configuration for the `sample` command.
#[derive(Args, Debug, Clone)]
pub struct SampleConfig {
    /// Saved slides index or patch set directory.
    pub input: PathBuf,

    /// Directory the sampled patch set is written to.
    #[arg(short, long)]
    pub output: PathBuf,

    /// Upper bound on rows per label.
    #[arg(long, default_value_t = DEFAULT_SAMPLES_PER_CLASS, env = "WSI_SAMPLES_PER_CLASS")]
    pub per_class: usize,

    /// Lower bound on rows per label; labels with fewer rows are an error.
    #[arg(long, default_value_t = DEFAULT_FLOOR_SAMPLES, env = "WSI_FLOOR_SAMPLES")]
    pub floor: usize,

    /// Only use these slide positions of an index (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub slides: Option<Vec<usize>>,

    /// Seed for reproducible samples.
    #[arg(long, env = "WSI_SEED")]
    pub seed: Option<u64>,

    /// Sampling policy.
    #[arg(long, value_enum, default_value_t = PolicyKind::WeightedBySlide)]
    pub policy: PolicyKind,
}

impl SampleConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.per_class == 0 {
            return Err("per_class must be greater than 0".to_string());
        }
        if matches!(self.slides, Some(ref s) if s.is_empty()) {
            return Err("slides must list at least one position".to_string());
        }
        Ok(())
    }
}

// =============================================================================
// Export Command
// =============================================================================

/// Exported image format.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageFormat {
    #[default]
    Png,
    Jpeg,
}

/// Configuration for the `export` command.
#[derive(Args, Debug, Clone)]
pub struct ExportConfig {
    /// Saved slides index or patch set directory.
    pub input: PathBuf,

    /// Directory patches are written to, one subdirectory per label.
    #[arg(short, long)]
    pub output: PathBuf,

    /// Image format of exported patches.
    #[arg(long, value_enum, default_value_t = ImageFormat::Png)]
    pub format: ImageFormat,

    /// JPEG quality (1-100).
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, env = "WSI_JPEG_QUALITY")]
    pub jpeg_quality: u8,
}

impl ExportConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.format == ImageFormat::Jpeg && !is_valid_quality(self.jpeg_quality) {
            return Err("jpeg_quality must be between 1 and 100".to_string());
        }
        Ok(())
    }

    /// Encoder described by this configuration.
    pub fn encoder(&self) -> Result<ExportEncoder, EncodeError> {
        match self.format {
            ImageFormat::Png => Ok(ExportEncoder::Png),
            ImageFormat::Jpeg => ExportEncoder::jpeg(self.jpeg_quality),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
