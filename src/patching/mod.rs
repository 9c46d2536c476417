//! Patch indexing, persistence and export.
//!
//! - [`finder`] turns label rasters into patch locations
//! - [`PatchSet`] holds one table of patches and persists it
//! - [`SlidesIndex`] holds one patch set per slide
//! - [`make_index`] drives indexing over a dataset
//! - [`ExportEncoder`] writes patches as PNG or JPEG files

mod encoder;
pub mod finder;
mod make_index;
mod patch_set;
mod slides_index;
mod table;

pub use encoder::{
    is_valid_quality, ExportEncoder, DEFAULT_JPEG_QUALITY, MAX_JPEG_QUALITY, MIN_JPEG_QUALITY,
};
pub use finder::{
    FinderConfig, FoundPatches, GridPatchFinder, LabelPooling, Majority, MaxLabel, PatchFinder,
};
pub use make_index::{index_slide, make_index};
pub use patch_set::{
    ExportReport, PatchDefaults, PatchSet, PatchSetFields, PatchSummary, ResolvedPatch,
    FIELDS_FILE, FRAME_FILE, PATCH_SET_TYPE, PATCH_SET_VERSION,
};
pub use slides_index::{SlidesIndex, SummaryTable};
pub use table::{columns, read_rows, write_rows, Column, PatchRow};
