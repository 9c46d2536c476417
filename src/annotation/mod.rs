//! Slide annotations and their rasterization into label images.

mod asap;
mod render;

pub use asap::{load_asap, parse_asap};
pub use render::{Annotation, AnnotationKind, AnnotationSet};
