//! Camelyon16 lymph node metastasis datasets.
//!
//! Expected layout under the data root:
//!
//! ```text
//! camelyon16/raw/training/tumor/tumor_001.tif
//! camelyon16/raw/training/normal/normal_001.tif
//! camelyon16/raw/training/lesion_annotations/tumor_001.xml
//! camelyon16/raw/testing/images/test_001.tif
//! camelyon16/raw/testing/lesion_annotations/test_001.xml
//! camelyon16/raw/testing/reference.csv
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::error::DatasetError;

use super::{AnnotationRules, CatalogDataset, CatalogEntry, DatasetContext, Labels};

/// Registry name of the full training set.
pub const TRAINING: &str = "camelyon16.training";

/// Registry name of the ten-slide training subset.
pub const TRAINING_SMALL: &str = "camelyon16.training_small";

/// Registry name of the test set.
pub const TESTING: &str = "camelyon16.testing";

/// Slides kept by [`training_small`], relative to the training root.
pub const SMALL_SUBSET: [&str; 10] = [
    "normal/normal_014.tif",
    "normal/normal_038.tif",
    "normal/normal_100.tif",
    "tumor/tumor_024.tif",
    "tumor/tumor_038.tif",
    "tumor/tumor_054.tif",
    "tumor/tumor_063.tif",
    "tumor/tumor_065.tif",
    "tumor/tumor_076.tif",
    "tumor/tumor_089.tif",
];

/// Camelyon16 class labels.
pub fn labels() -> Labels {
    Labels::new([("background", 0), ("normal", 1), ("tumor", 2)])
}

/// Camelyon16 annotation groups: `Tumor`, `_0` and `_1` outline tumour,
/// `_2` outlines normal tissue inside tumour regions.
pub fn annotation_rules() -> AnnotationRules {
    let groups = [("Tumor", "tumor"), ("_0", "tumor"), ("_1", "tumor"), ("_2", "normal")]
        .iter()
        .map(|(g, l)| (g.to_string(), l.to_string()))
        .collect();

    AnnotationRules {
        groups,
        labels_order: vec!["background".into(), "tumor".into(), "normal".into()],
        fill_label: "normal".into(),
    }
}

/// Root directory of the training set.
pub fn training_root(data_root: &Path) -> PathBuf {
    data_root.join("camelyon16").join("raw").join("training")
}

/// Root directory of the test set.
pub fn testing_root(data_root: &Path) -> PathBuf {
    data_root.join("camelyon16").join("raw").join("testing")
}

/// All training slides: tumour slides first, then normal slides.
pub fn training(context: &DatasetContext) -> Result<CatalogDataset, DatasetError> {
    let root = training_root(&context.data_root);
    let entries = training_entries(&root)?;
    Ok(build(TRAINING, root, entries, context))
}

/// The ten-slide subset of [`training`] listed in [`SMALL_SUBSET`].
pub fn training_small(context: &DatasetContext) -> Result<CatalogDataset, DatasetError> {
    let root = training_root(&context.data_root);
    let entries = training_entries(&root)?
        .into_iter()
        .filter(|e| SMALL_SUBSET.iter().any(|s| e.slide == Path::new(s)))
        .collect();
    Ok(build(TRAINING_SMALL, root, entries, context))
}

/// Test slides labelled from `reference.csv`.
pub fn testing(context: &DatasetContext) -> Result<CatalogDataset, DatasetError> {
    let root = testing_root(&context.data_root);
    let slides = list_files(&root, "images", "tif")?;
    let annotations = list_files(&root, "lesion_annotations", "xml")?;
    let reference = read_reference(&root.join("reference.csv"))?;

    let entries = slides
        .into_iter()
        .map(|slide| {
            let stem = file_stem(&slide);
            let annotation = annotations.iter().find(|a| file_stem(a) == stem).cloned();
            let label = reference.get(&stem).cloned().unwrap_or_default();
            CatalogEntry {
                slide,
                annotation,
                label,
                tags: String::new(),
            }
        })
        .collect();

    Ok(build(TESTING, root, entries, context))
}

fn build(
    name: &str,
    root: PathBuf,
    entries: Vec<CatalogEntry>,
    context: &DatasetContext,
) -> CatalogDataset {
    debug!("Catalogued {} slide(s) for {}", entries.len(), name);
    CatalogDataset::new(
        name,
        root,
        entries,
        labels(),
        annotation_rules(),
        Arc::clone(&context.opener),
    )
}

/// Tumour slides are paired with annotation files by stem.
fn training_entries(root: &Path) -> Result<Vec<CatalogEntry>, DatasetError> {
    let annotations = list_files(root, "lesion_annotations", "xml")?;
    let by_stem: HashMap<String, PathBuf> = annotations
        .into_iter()
        .map(|a| (file_stem(&a), a))
        .collect();

    let tumor = list_files(root, "tumor", "tif")?
        .into_iter()
        .map(|slide| {
            let annotation = by_stem.get(&file_stem(&slide)).cloned();
            CatalogEntry {
                slide,
                annotation,
                label: "tumor".into(),
                tags: String::new(),
            }
        });
    let normal = list_files(root, "normal", "tif")?
        .into_iter()
        .map(|slide| CatalogEntry::new(slide, "normal"));

    Ok(tumor.chain(normal).collect())
}

/// Sorted files in `root/dir` with extension `ext`, relative to `root`.
///
/// A missing directory lists as empty.
fn list_files(root: &Path, dir: &str, ext: &str) -> Result<Vec<PathBuf>, DatasetError> {
    let path = root.join(dir);
    if !path.is_dir() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    let entries = std::fs::read_dir(&path).map_err(|e| DatasetError::Io(e.to_string()))?;
    for entry in entries {
        let entry = entry.map_err(|e| DatasetError::Io(e.to_string()))?;
        let file = entry.path();
        let matches = file
            .extension()
            .map(|e| e.eq_ignore_ascii_case(ext))
            .unwrap_or(false);
        if matches && file.is_file() {
            files.push(Path::new(dir).join(entry.file_name()));
        }
    }
    files.sort();
    Ok(files)
}

/// `slide_name → label` from the header-less reference CSV.
fn read_reference(path: &Path) -> Result<BTreeMap<String, String>, DatasetError> {
    if !path.is_file() {
        return Ok(BTreeMap::new());
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| DatasetError::Io(e.to_string()))?;

    let mut labels = BTreeMap::new();
    for record in reader.records() {
        let record = record.map_err(|e| DatasetError::Io(e.to_string()))?;
        if let (Some(slide), Some(label)) = (record.get(0), record.get(1)) {
            labels.insert(slide.trim().to_string(), label.trim().to_lowercase());
        }
    }
    Ok(labels)
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
