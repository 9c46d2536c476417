//! Datasets: named catalogs of slides, annotations and class labels.
//!
//! A [`Dataset`] answers everything the pipeline needs to know about a
//! collection of slides: where each slide and its annotations live, which
//! class labels exist, and how to open a slide. Datasets are looked up by
//! name through a [`DatasetRegistry`], so patch sets only ever store the
//! dataset's name.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::annotation::AnnotationSet;
use crate::error::DatasetError;
use crate::slide::Slide;

pub mod camelyon16;
mod catalog;
mod labels;
mod registry;

pub use catalog::{AnnotationRules, CatalogDataset, CatalogEntry};
pub use labels::Labels;
pub use registry::{DatasetContext, DatasetFactory, DatasetRegistry};

// =============================================================================
// SlideEntry
// =============================================================================

/// One catalog row with absolute paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlideEntry {
    /// Absolute path of the slide file
    pub slide_path: PathBuf,

    /// Absolute path of the annotation file, if the slide has one
    pub annotation_path: Option<PathBuf>,

    /// Slide-level label (e.g. "tumor" or "normal")
    pub label: String,

    /// Free-form tags
    pub tags: String,
}

// =============================================================================
// Dataset Trait
// =============================================================================

/// A named, ordered set of slides with their annotations and labels.
#[async_trait]
pub trait Dataset: Send + Sync {
    /// Registry name of the dataset.
    fn name(&self) -> &str;

    /// Directory every catalog path is relative to.
    fn root(&self) -> &Path;

    /// Number of slides.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Catalog row for slide `index` with absolute paths.
    fn entry(&self, index: usize) -> Result<SlideEntry, DatasetError>;

    /// Class name → label index.
    fn labels(&self) -> &Labels;

    /// Label index → class name.
    fn labels_by_index(&self) -> &BTreeMap<u32, String> {
        self.labels().by_index()
    }

    /// Load the annotations stored at `path`.
    ///
    /// `None` or a missing file yields an empty annotation set.
    fn load_annotations(&self, path: Option<&Path>) -> Result<AnnotationSet, DatasetError>;

    /// Load the annotations of slide `index`.
    fn load_annotations_for_slide(&self, index: usize) -> Result<AnnotationSet, DatasetError> {
        let entry = self.entry(index)?;
        self.load_annotations(entry.annotation_path.as_deref())
    }

    /// Absolute path of slide `index`.
    fn get_slide_path(&self, index: usize) -> Result<PathBuf, DatasetError> {
        Ok(self.entry(index)?.slide_path)
    }

    /// Open slide `index`. The caller owns the handle and must close it.
    async fn open_slide(&self, index: usize) -> Result<Box<dyn Slide>, DatasetError>;

    fn to_abs_path(&self, path: &Path) -> PathBuf {
        self.root().join(path)
    }

    fn to_rel_path(&self, path: &Path) -> Result<PathBuf, DatasetError> {
        path.strip_prefix(self.root())
            .map(Path::to_path_buf)
            .map_err(|_| DatasetError::OutsideRoot {
                path: path.display().to_string(),
                root: self.root().display().to_string(),
            })
    }
}
