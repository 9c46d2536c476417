//! Slide abstraction layer.
//!
//! The indexing and export stages only talk to slides through the traits in
//! this module, so any decoder can back a dataset:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │     make_index / PatchSet::export       │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │          Dataset::open_slide            │
//! │      (resolves path, owns opener)       │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │      SlideOpener / Slide traits         │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//!            ┌─────────────────────┐
//!            │     ImageSlide      │
//!            │ (raster + pyramid)  │
//!            └─────────────────────┘
//! ```

mod image_slide;
mod reader;

pub use image_slide::{ImageSlide, ImageSlideOpener, DEFAULT_PYRAMID_LEVELS};
pub use reader::{Slide, SlideOpener};
