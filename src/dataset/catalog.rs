//! Table-driven dataset implementation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::annotation::{load_asap, AnnotationSet};
use crate::error::DatasetError;
use crate::slide::{Slide, SlideOpener};

use super::{Dataset, Labels, SlideEntry};

/// One catalog row with paths relative to the dataset root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub slide: PathBuf,
    pub annotation: Option<PathBuf>,
    pub label: String,
    pub tags: String,
}

impl CatalogEntry {
    pub fn new(slide: impl Into<PathBuf>, label: impl Into<String>) -> Self {
        Self {
            slide: slide.into(),
            annotation: None,
            label: label.into(),
            tags: String::new(),
        }
    }

    pub fn with_annotation(mut self, annotation: impl Into<PathBuf>) -> Self {
        self.annotation = Some(annotation.into());
        self
    }

    pub fn with_tags(mut self, tags: impl Into<String>) -> Self {
        self.tags = tags.into();
        self
    }
}

/// How annotation files of a dataset become label rasters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationRules {
    /// Annotation group → class label
    pub groups: BTreeMap<String, String>,

    /// Paint order; later labels overwrite earlier ones
    pub labels_order: Vec<String>,

    /// Label of every pixel not covered by an annotation
    pub fill_label: String,
}

/// A dataset defined by an in-memory catalog.
///
/// Annotations are read as ASAP XML and slides are opened with the supplied
/// [`SlideOpener`].
pub struct CatalogDataset {
    name: String,
    root: PathBuf,
    entries: Vec<CatalogEntry>,
    labels: Labels,
    rules: AnnotationRules,
    opener: Arc<dyn SlideOpener>,
}

impl CatalogDataset {
    pub fn new(
        name: impl Into<String>,
        root: impl Into<PathBuf>,
        entries: Vec<CatalogEntry>,
        labels: Labels,
        rules: AnnotationRules,
        opener: Arc<dyn SlideOpener>,
    ) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            entries,
            labels,
            rules,
            opener,
        }
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn rules(&self) -> &AnnotationRules {
        &self.rules
    }

    fn catalog_entry(&self, index: usize) -> Result<&CatalogEntry, DatasetError> {
        self.entries
            .get(index)
            .ok_or_else(|| DatasetError::SlideOutOfRange {
                dataset: self.name.clone(),
                index,
                len: self.entries.len(),
            })
    }
}

#[async_trait]
impl Dataset for CatalogDataset {
    fn name(&self) -> &str {
        &self.name
    }

    fn root(&self) -> &Path {
        &self.root
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn entry(&self, index: usize) -> Result<SlideEntry, DatasetError> {
        let entry = self.catalog_entry(index)?;
        Ok(SlideEntry {
            slide_path: self.to_abs_path(&entry.slide),
            annotation_path: entry.annotation.as_deref().map(|p| self.to_abs_path(p)),
            label: entry.label.clone(),
            tags: entry.tags.clone(),
        })
    }

    fn labels(&self) -> &Labels {
        &self.labels
    }

    fn load_annotations(&self, path: Option<&Path>) -> Result<AnnotationSet, DatasetError> {
        let annotations = match path {
            Some(path) => load_asap(path, &self.rules.groups)?,
            None => Vec::new(),
        };
        Ok(AnnotationSet::new(
            annotations,
            self.labels.clone(),
            self.rules.labels_order.clone(),
            self.rules.fill_label.clone(),
        ))
    }

    async fn open_slide(&self, index: usize) -> Result<Box<dyn Slide>, DatasetError> {
        let path = self.get_slide_path(index)?;
        Ok(self.opener.open(&path).await?)
    }
}
