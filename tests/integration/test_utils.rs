//! Test utilities for integration tests.
//!
//! This module provides mock slides that record when they are opened and
//! closed, plus helpers for building small datasets on disk.

use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use ndarray::Array2;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use wsi_patcher::error::SlideError;
use wsi_patcher::{
    AnnotationRules, CatalogDataset, CatalogEntry, Dataset, DatasetContext, DatasetRegistry,
    Labels, Region, Size, Slide, SlideOpener, TissueDetector,
};

/// Name of every mock dataset.
pub const DATASET: &str = "mock.dataset";

// =============================================================================
// Slide Event Tracking
// =============================================================================

/// Something that happened to a slide handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlideEvent {
    Opened(PathBuf),
    Closed(PathBuf),
}

/// Shared, ordered record of slide events.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<SlideEvent>>>,
}

impl EventLog {
    pub fn push(&self, event: SlideEvent) {
        self.events.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<SlideEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn open_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, SlideEvent::Opened(_)))
            .count()
    }

    /// Slides that were opened, in order.
    pub fn opened(&self) -> Vec<PathBuf> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SlideEvent::Opened(p) => Some(p),
                SlideEvent::Closed(_) => None,
            })
            .collect()
    }

    /// Panics unless every open is closed before the next open, and the last
    /// open is closed too.
    pub fn assert_one_open_at_a_time(&self) {
        let mut open: Option<PathBuf> = None;
        for event in self.events() {
            match event {
                SlideEvent::Opened(path) => {
                    assert!(open.is_none(), "{:?} opened while {:?} still open", path, open);
                    open = Some(path);
                }
                SlideEvent::Closed(path) => {
                    assert_eq!(open.as_ref(), Some(&path), "closed a slide that was not open");
                    open = None;
                }
            }
        }
        assert!(open.is_none(), "{:?} was never closed", open);
    }
}

// =============================================================================
// Mock Slide
// =============================================================================

/// A slide whose pixels encode the region that was read.
///
/// Every pixel of a region read at `(x, y)` on `level` is
/// `[x % 256, y % 256, level, 255]`.
pub struct MockSlide {
    path: PathBuf,
    dimensions: Vec<Size>,
    log: EventLog,
}

#[async_trait]
impl Slide for MockSlide {
    fn path(&self) -> &Path {
        &self.path
    }

    fn dimensions(&self) -> &[Size] {
        &self.dimensions
    }

    async fn read_region(&self, region: &Region) -> Result<RgbaImage, SlideError> {
        self.level_dimensions(region.level)?;
        let pixel = Rgba([
            region.location.x.rem_euclid(256) as u8,
            region.location.y.rem_euclid(256) as u8,
            region.level as u8,
            255,
        ]);
        Ok(RgbaImage::from_pixel(
            region.size.width,
            region.size.height,
            pixel,
        ))
    }

    fn close(self: Box<Self>) -> Result<(), SlideError> {
        self.log.push(SlideEvent::Closed(self.path.clone()));
        Ok(())
    }
}

/// Opens [`MockSlide`]s with a fixed pyramid and records every open.
#[derive(Clone)]
pub struct MockOpener {
    dimensions: Vec<Size>,
    log: EventLog,
    fail_on: Option<String>,
}

impl MockOpener {
    pub fn new(dimensions: Vec<Size>) -> Self {
        Self {
            dimensions,
            log: EventLog::default(),
            fail_on: None,
        }
    }

    /// Fail to open any slide whose file name contains `pattern`.
    pub fn failing_on(mut self, pattern: impl Into<String>) -> Self {
        self.fail_on = Some(pattern.into());
        self
    }

    pub fn log(&self) -> EventLog {
        self.log.clone()
    }
}

#[async_trait]
impl SlideOpener for MockOpener {
    async fn open(&self, path: &Path) -> Result<Box<dyn Slide>, SlideError> {
        let name = path.file_name().unwrap_or_default().to_string_lossy();
        if let Some(pattern) = &self.fail_on {
            if name.contains(pattern.as_str()) {
                return Err(SlideError::Io(format!("cannot open {}", path.display())));
            }
        }

        self.log.push(SlideEvent::Opened(path.to_path_buf()));
        Ok(Box::new(MockSlide {
            path: path.to_path_buf(),
            dimensions: self.dimensions.clone(),
            log: self.log.clone(),
        }))
    }
}

/// Power-of-two pyramid starting at `width × height`.
pub fn pyramid(width: u32, height: u32, levels: u32) -> Vec<Size> {
    (0..levels)
        .map(|l| Size::new(width >> l, height >> l))
        .collect()
}

// =============================================================================
// Tissue Detectors
// =============================================================================

/// Only the left half of the image is tissue.
pub struct LeftHalfTissue;

impl TissueDetector for LeftHalfTissue {
    fn detect(&self, image: &image::RgbImage) -> Array2<bool> {
        let (width, height) = (image.width() as usize, image.height() as usize);
        Array2::from_shape_fn((height, width), |(_, col)| col < width / 2)
    }
}

/// Returns a mask of the wrong shape.
pub struct BrokenTissue;

impl TissueDetector for BrokenTissue {
    fn detect(&self, _image: &image::RgbImage) -> Array2<bool> {
        Array2::from_elem((1, 1), true)
    }
}

// =============================================================================
// Datasets
// =============================================================================

pub fn labels() -> Labels {
    Labels::new([("background", 0), ("normal", 1), ("tumor", 2)])
}

pub fn rules() -> AnnotationRules {
    AnnotationRules {
        groups: [("Tumor".to_string(), "tumor".to_string())]
            .into_iter()
            .collect::<BTreeMap<_, _>>(),
        labels_order: vec!["background".into(), "tumor".into(), "normal".into()],
        fill_label: "normal".into(),
    }
}

/// Write an ASAP file holding one square `Tumor` polygon.
pub fn write_tumor_square(path: &Path, x0: f64, y0: f64, x1: f64, y1: f64) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let xml = format!(
        r##"<?xml version="1.0"?>
<ASAP_Annotations>
  <Annotations>
    <Annotation Name="_0" Type="Polygon" PartOfGroup="Tumor" Color="#F4FA58">
      <Coordinates>
        <Coordinate Order="0" X="{x0}" Y="{y0}" />
        <Coordinate Order="1" X="{x1}" Y="{y0}" />
        <Coordinate Order="2" X="{x1}" Y="{y1}" />
        <Coordinate Order="3" X="{x0}" Y="{y1}" />
      </Coordinates>
    </Annotation>
  </Annotations>
  <AnnotationGroups />
</ASAP_Annotations>
"##
    );
    std::fs::write(path, xml).unwrap();
}

/// Two 64×64 slides with three levels under `root`:
/// `slide_a` with a tumour square over its top-left 28×28 pixels and
/// `slide_b` without annotations.
pub fn two_slide_dataset(root: &Path, opener: Arc<dyn SlideOpener>) -> Arc<dyn Dataset> {
    write_tumor_square(&root.join("ann/slide_a.xml"), 0.0, 0.0, 28.0, 28.0);

    let entries = vec![
        CatalogEntry::new("slides/slide_a.tif", "tumor").with_annotation("ann/slide_a.xml"),
        CatalogEntry::new("slides/slide_b.tif", "normal"),
    ];
    Arc::new(CatalogDataset::new(
        DATASET,
        root,
        entries,
        labels(),
        rules(),
        opener,
    ))
}

/// Registry holding only `dataset`.
pub fn registry_with(dataset: Arc<dyn Dataset>, opener: Arc<dyn SlideOpener>) -> DatasetRegistry {
    let context = DatasetContext::new(dataset.root().to_path_buf(), opener);
    DatasetRegistry::new(context).with_dataset(dataset)
}

/// Mock opener, dataset and registry over a fresh temporary directory.
pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub log: EventLog,
    pub dataset: Arc<dyn Dataset>,
    pub registry: DatasetRegistry,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_opener(MockOpener::new(pyramid(64, 64, 3)))
    }

    pub fn with_opener(opener: MockOpener) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let log = opener.log();
        let opener: Arc<dyn SlideOpener> = Arc::new(opener);
        let dataset = two_slide_dataset(dir.path(), Arc::clone(&opener));
        let registry = registry_with(Arc::clone(&dataset), opener);
        Self {
            dir,
            log,
            dataset,
            registry,
        }
    }

    /// Scratch directory inside the fixture root.
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}
