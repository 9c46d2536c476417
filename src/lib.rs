//! # WSI Patcher
//!
//! Patch indexing, class-balanced sampling and export for Whole Slide Images.
//!
//! This library turns annotated gigapixel slides into catalogs of fixed-size,
//! labelled patches for model training, and writes a balanced subset of them
//! out as image files.
//!
//! ## Features
//!
//! - **Multi-resolution patch finding**: Labels rendered at a coarse pyramid level
//!   drive patch extraction at a fine one
//! - **Tissue filtering**: Background is removed with an Otsu threshold on hue and saturation
//! - **Persistent patch sets**: CSV tables with versioned JSON metadata
//! - **Class balancing**: Per-label sampling weighted by slide
//! - **Resource-scoped export**: Each slide is opened once and closed before the next
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`geometry`] - Points, sizes and regions
//! - [`slide`] - Slide capability and an image-file implementation
//! - [`tissue`] - Tissue detection
//! - [`annotation`] - Annotation loading and rasterization
//! - [`dataset`] - Dataset catalogs and the dataset registry
//! - [`patching`] - Patch finding, patch sets, slides indexes and export
//! - [`sampling`] - Class-balancing sampler
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use wsi_patcher::{
//!     make_index, DatasetContext, DatasetRegistry, ExportEncoder, FinderConfig,
//!     GridPatchFinder, ImageSlideOpener, OtsuTissueDetector,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let context = DatasetContext::new("data", Arc::new(ImageSlideOpener::default()));
//!     let registry = DatasetRegistry::with_builtin(context);
//!
//!     let dataset = registry.get("camelyon16.training_small").await?;
//!     let finder = GridPatchFinder::new(FinderConfig::new(5, 0, 256, 256))?;
//!     let index = make_index(dataset.as_ref(), &finder, &OtsuTissueDetector).await?;
//!
//!     index
//!         .combined()
//!         .export("patches".as_ref(), &registry, &ExportEncoder::Png)
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod annotation;
pub mod config;
pub mod dataset;
pub mod error;
pub mod geometry;
pub mod patching;
pub mod sampling;
pub mod slide;
pub mod tissue;

// Re-export commonly used types
pub use annotation::{load_asap, parse_asap, Annotation, AnnotationKind, AnnotationSet};
pub use config::{Cli, Command, ExportConfig, IndexConfig, SampleConfig, SummaryConfig};
pub use dataset::{
    AnnotationRules, CatalogDataset, CatalogEntry, Dataset, DatasetContext, DatasetFactory,
    DatasetRegistry, Labels, SlideEntry,
};
pub use error::{
    AnnotationError, DatasetError, EncodeError, FinderError, IndexError, PatchSetError,
    SampleError, SlideError,
};
pub use geometry::{scale_factor, Point, Region, Size};
pub use patching::{
    index_slide, make_index, Column, ExportEncoder, ExportReport, FinderConfig, FoundPatches,
    GridPatchFinder, LabelPooling, Majority, MaxLabel, PatchDefaults, PatchFinder, PatchRow,
    PatchSet, PatchSummary, SlidesIndex, SummaryTable,
};
pub use sampling::{sample, SamplingPolicy, Uniform, WeightedBySlide};
pub use slide::{ImageSlide, ImageSlideOpener, Slide, SlideOpener};
pub use tissue::{AllTissue, OtsuTissueDetector, TissueDetector};
