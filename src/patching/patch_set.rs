//! Patch sets: patch tables with scalar defaults.
//!
//! A patch set is what the indexer produces for a slide and what the
//! sampler and exporter consume. Each row may carry its own `patch_size`,
//! `level`, `slide_index` and `dataset_name`; when it does not, the set's
//! defaults apply (see [`PatchSet::effective`]).
//!
//! # On-disk layout
//!
//! ```text
//! <dir>/frame.csv    x,y,label[,slide_index][,dataset_name][,patch_size][,level]
//! <dir>/fields.json  {"type": "PatchSet", "version": 1, "fields": {...}}
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::dataset::{Dataset, DatasetRegistry};
use crate::error::{DatasetError, PatchSetError};
use crate::geometry::Region;
use crate::slide::Slide;

use super::encoder::ExportEncoder;
use super::table::{self, Column, PatchRow};

/// Patch table file name.
pub const FRAME_FILE: &str = "frame.csv";

/// Metadata file name.
pub const FIELDS_FILE: &str = "fields.json";

/// `type` written to the metadata file.
pub const PATCH_SET_TYPE: &str = "PatchSet";

/// Current metadata schema version.
pub const PATCH_SET_VERSION: u32 = 1;

// =============================================================================
// Metadata
// =============================================================================

/// Values applied to rows that do not carry their own.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchDefaults {
    pub patch_size: Option<u32>,
    pub level: Option<u32>,
    pub slide_index: Option<usize>,
    pub dataset_name: Option<String>,
}

/// Contents of `fields.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchSetFields {
    #[serde(rename = "type")]
    pub kind: String,
    pub version: u32,
    pub fields: PatchDefaults,
}

/// A row with every field resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPatch {
    pub x: i64,
    pub y: i64,
    pub label: u32,
    pub patch_size: u32,
    pub level: u32,
    pub slide_index: usize,
    pub dataset_name: String,
}

impl ResolvedPatch {
    pub fn region(&self) -> Region {
        Region::square(self.x, self.y, self.patch_size, self.level)
    }
}

// =============================================================================
// PatchSet
// =============================================================================

/// A patch table plus the defaults its rows fall back to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchSet {
    rows: Vec<PatchRow>,
    defaults: PatchDefaults,
}

impl PatchSet {
    pub fn new(rows: Vec<PatchRow>, defaults: PatchDefaults) -> Self {
        Self { rows, defaults }
    }

    /// Patch set for one slide, as produced by the indexer.
    pub fn for_slide(
        rows: Vec<PatchRow>,
        dataset_name: impl Into<String>,
        slide_index: usize,
        patch_size: u32,
        level: u32,
    ) -> Self {
        Self::new(
            rows,
            PatchDefaults {
                patch_size: Some(patch_size),
                level: Some(level),
                slide_index: Some(slide_index),
                dataset_name: Some(dataset_name.into()),
            },
        )
    }

    pub fn rows(&self) -> &[PatchRow] {
        &self.rows
    }

    pub fn defaults(&self) -> &PatchDefaults {
        &self.defaults
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Whether any row carries a value for `column`.
    pub fn has_column(&self, column: Column) -> bool {
        self.rows.iter().any(|r| r.has(column))
    }

    /// Same defaults, different rows.
    pub fn with_rows(&self, rows: Vec<PatchRow>) -> Self {
        Self {
            rows,
            defaults: self.defaults.clone(),
        }
    }

    /// `row` with every missing optional field filled from the defaults.
    pub fn effective(&self, row: &PatchRow) -> PatchRow {
        let d = &self.defaults;
        PatchRow {
            x: row.x,
            y: row.y,
            label: row.label,
            slide_index: row.slide_index.or(d.slide_index),
            dataset_name: row.dataset_name.clone().or_else(|| d.dataset_name.clone()),
            patch_size: row.patch_size.or(d.patch_size),
            level: row.level.or(d.level),
        }
    }

    /// Effective values of row `index`, failing on any missing field.
    pub fn resolve(&self, index: usize) -> Result<ResolvedPatch, PatchSetError> {
        let row = self.rows.get(index).map(|r| self.effective(r)).ok_or(
            PatchSetError::MissingField {
                row: index,
                field: "x",
            },
        )?;
        let missing = |field| PatchSetError::MissingField { row: index, field };

        Ok(ResolvedPatch {
            x: row.x,
            y: row.y,
            label: row.label,
            patch_size: row.patch_size.ok_or_else(|| missing("patch_size"))?,
            level: row.level.ok_or_else(|| missing("level"))?,
            slide_index: row.slide_index.ok_or_else(|| missing("slide_index"))?,
            dataset_name: row.dataset_name.ok_or_else(|| missing("dataset_name"))?,
        })
    }

    /// Distinct effective dataset names, sorted.
    fn dataset_names(&self) -> Result<BTreeSet<String>, PatchSetError> {
        let mut names = BTreeSet::new();
        for (index, row) in self.rows.iter().enumerate() {
            let name = row
                .dataset_name
                .as_ref()
                .or(self.defaults.dataset_name.as_ref())
                .ok_or(PatchSetError::MissingField {
                    row: index,
                    field: "dataset_name",
                })?;
            names.insert(name.clone());
        }
        if self.rows.is_empty() {
            names.extend(self.defaults.dataset_name.iter().cloned());
        }
        Ok(names)
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Write `frame.csv` and `fields.json` into `dir`, creating it.
    ///
    /// An empty dataset name cannot be told apart from a missing one in
    /// `frame.csv`, so rows holding one are rejected.
    pub fn save(&self, dir: &Path) -> Result<(), PatchSetError> {
        if let Some(row) = self
            .rows
            .iter()
            .position(|r| r.dataset_name.as_deref() == Some(""))
        {
            return Err(PatchSetError::EmptyDatasetName { row });
        }
        fs::create_dir_all(dir).map_err(|e| PatchSetError::io(dir, e))?;

        let frame_path = dir.join(FRAME_FILE);
        let frame = File::create(&frame_path).map_err(|e| PatchSetError::io(&frame_path, e))?;
        table::write_rows(BufWriter::new(frame), &self.rows)
            .map_err(|e| PatchSetError::csv(&frame_path, e))?;

        let fields_path = dir.join(FIELDS_FILE);
        let fields = PatchSetFields {
            kind: PATCH_SET_TYPE.to_string(),
            version: PATCH_SET_VERSION,
            fields: self.defaults.clone(),
        };
        let file = File::create(&fields_path).map_err(|e| PatchSetError::io(&fields_path, e))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &fields)
            .map_err(|e| PatchSetError::metadata(&fields_path, e))?;

        debug!("Saved {} patch(es) to {}", self.rows.len(), dir.display());
        Ok(())
    }

    /// Read a patch set written by [`save`](Self::save).
    ///
    /// Every dataset the set refers to must be registered in `registry`, and
    /// every row must resolve to a full set of fields.
    pub fn load(dir: &Path, registry: &DatasetRegistry) -> Result<Self, PatchSetError> {
        let fields_path = dir.join(FIELDS_FILE);
        let file = File::open(&fields_path).map_err(|e| PatchSetError::io(&fields_path, e))?;
        let fields: PatchSetFields = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| PatchSetError::metadata(&fields_path, e))?;

        if fields.kind != PATCH_SET_TYPE {
            return Err(PatchSetError::UnsupportedType(fields.kind));
        }
        if fields.version > PATCH_SET_VERSION {
            return Err(PatchSetError::UnsupportedVersion(fields.version));
        }

        let frame_path = dir.join(FRAME_FILE);
        let frame = File::open(&frame_path).map_err(|e| PatchSetError::io(&frame_path, e))?;
        let rows = table::read_rows(BufReader::new(frame), &frame_path)?;

        let patch_set = Self::new(rows, fields.fields);
        for name in patch_set.dataset_names()? {
            if !registry.contains(&name) {
                return Err(DatasetError::UnknownDataset(name).into());
            }
        }
        (0..patch_set.rows.len()).try_for_each(|i| patch_set.resolve(i).map(drop))?;
        Ok(patch_set)
    }

    // =========================================================================
    // Combining
    // =========================================================================

    /// Concatenate patch sets.
    ///
    /// Each set's defaults are written into its rows first. Afterwards any
    /// optional column whose rows all hold the same value moves back into
    /// the defaults.
    pub fn combine<'a>(sets: impl IntoIterator<Item = &'a PatchSet>) -> PatchSet {
        let sets: Vec<&PatchSet> = sets.into_iter().collect();
        let rows: Vec<PatchRow> = sets
            .iter()
            .flat_map(|set| set.rows.iter().map(|r| set.effective(r)))
            .collect();

        if rows.is_empty() {
            return PatchSet::new(rows, shared_defaults(&sets));
        }

        let mut combined = PatchSet::new(rows, PatchDefaults::default());
        combined.factor_out_defaults();
        combined
    }

    /// Move every uniform optional column into the defaults.
    fn factor_out_defaults(&mut self) {
        if let Some(v) = uniform(&self.rows, |r| r.slide_index) {
            self.defaults.slide_index = Some(v);
            self.rows.iter_mut().for_each(|r| r.slide_index = None);
        }
        if let Some(v) = uniform(&self.rows, |r| r.dataset_name.clone()) {
            self.defaults.dataset_name = Some(v);
            self.rows.iter_mut().for_each(|r| r.dataset_name = None);
        }
        if let Some(v) = uniform(&self.rows, |r| r.patch_size) {
            self.defaults.patch_size = Some(v);
            self.rows.iter_mut().for_each(|r| r.patch_size = None);
        }
        if let Some(v) = uniform(&self.rows, |r| r.level) {
            self.defaults.level = Some(v);
            self.rows.iter_mut().for_each(|r| r.level = None);
        }
    }

    // =========================================================================
    // Summary and Export
    // =========================================================================

    /// Row count per label name.
    ///
    /// Every label of every referenced dataset is listed, absent ones with
    /// a count of zero.
    pub async fn summary(&self, registry: &DatasetRegistry) -> Result<PatchSummary, PatchSetError> {
        let mut datasets: BTreeMap<String, Arc<dyn Dataset>> = BTreeMap::new();
        for name in self.dataset_names()? {
            let dataset = registry.get(&name).await?;
            datasets.insert(name, dataset);
        }

        let mut known: Vec<(u32, String)> = datasets
            .values()
            .flat_map(|d| {
                d.labels_by_index()
                    .iter()
                    .map(|(&i, n)| (i, n.clone()))
                    .collect::<Vec<_>>()
            })
            .collect();
        known.sort();

        let mut counts: Vec<(String, usize)> = Vec::new();
        for (_, name) in known {
            if !counts.iter().any(|(n, _)| *n == name) {
                counts.push((name, 0));
            }
        }

        for row in &self.rows {
            let dataset_name = row
                .dataset_name
                .as_ref()
                .or(self.defaults.dataset_name.as_ref());
            let dataset = dataset_name.and_then(|n| datasets.get(n));
            let name = dataset
                .and_then(|d| d.labels_by_index().get(&row.label))
                .ok_or_else(|| PatchSetError::UnknownLabel {
                    label: row.label,
                    dataset: dataset_name.cloned().unwrap_or_default(),
                })?;
            if let Some(entry) = counts.iter_mut().find(|(n, _)| n == name) {
                entry.1 += 1;
            }
        }

        Ok(PatchSummary { counts })
    }

    /// Write every patch as an image file under `output_dir/<label name>/`.
    ///
    /// Rows are visited grouped by `(dataset_name, slide_index)` so that each
    /// slide is opened once. The open slide is closed before the next one is
    /// opened and on every error path.
    pub async fn export(
        &self,
        output_dir: &Path,
        registry: &DatasetRegistry,
        encoder: &ExportEncoder,
    ) -> Result<ExportReport, PatchSetError> {
        let mut patches = (0..self.rows.len())
            .map(|i| self.resolve(i))
            .collect::<Result<Vec<_>, _>>()?;
        patches.sort_by(|a, b| {
            (&a.dataset_name, a.slide_index).cmp(&(&b.dataset_name, b.slide_index))
        });

        let mut report = ExportReport::default();
        let mut current: Option<OpenSlide> = None;
        let result = export_sorted(
            &patches,
            output_dir,
            registry,
            encoder,
            &mut current,
            &mut report,
        )
        .await;

        let closed = match current.take() {
            Some(open) => open.close(),
            None => Ok(()),
        };
        match (result, closed) {
            (Ok(()), Ok(())) => {
                info!(
                    "Exported {} patch(es) from {} slide(s) to {}",
                    report.patches_written,
                    report.slides_opened,
                    output_dir.display()
                );
                Ok(report)
            }
            (Ok(()), Err(e)) => Err(e.into()),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(close_err)) => {
                warn!("Failed to close slide after export error: {}", close_err);
                Err(e)
            }
        }
    }
}

/// The value every row holds for a column, if they all hold the same one.
fn uniform<T: PartialEq>(rows: &[PatchRow], get: impl Fn(&PatchRow) -> Option<T>) -> Option<T> {
    let mut values = rows.iter().map(get);
    let first = values.next()??;
    for value in values {
        if value.as_ref() != Some(&first) {
            return None;
        }
    }
    Some(first)
}

/// Defaults every set agrees on.
fn shared_defaults(sets: &[&PatchSet]) -> PatchDefaults {
    fn agree<T: Clone + PartialEq>(
        sets: &[&PatchSet],
        get: impl Fn(&PatchDefaults) -> &Option<T>,
    ) -> Option<T> {
        let first = get(&sets.first()?.defaults).clone()?;
        sets.iter()
            .all(|s| get(&s.defaults).as_ref() == Some(&first))
            .then_some(first)
    }

    PatchDefaults {
        patch_size: agree(sets, |d| &d.patch_size),
        level: agree(sets, |d| &d.level),
        slide_index: agree(sets, |d| &d.slide_index),
        dataset_name: agree(sets, |d| &d.dataset_name),
    }
}

// =============================================================================
// Export
// =============================================================================

/// What an export run produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportReport {
    pub patches_written: usize,
    pub slides_opened: usize,
    pub labels: BTreeSet<String>,
}

/// The one slide held open during export.
struct OpenSlide {
    dataset_name: String,
    slide_index: usize,
    dataset: Arc<dyn Dataset>,
    slide: Box<dyn Slide>,
    stem: String,
}

impl OpenSlide {
    fn is(&self, patch: &ResolvedPatch) -> bool {
        self.dataset_name == patch.dataset_name && self.slide_index == patch.slide_index
    }

    fn close(self) -> Result<(), crate::error::SlideError> {
        debug!("Closing slide {}", self.slide.path().display());
        self.slide.close()
    }
}

async fn export_sorted(
    patches: &[ResolvedPatch],
    output_dir: &Path,
    registry: &DatasetRegistry,
    encoder: &ExportEncoder,
    current: &mut Option<OpenSlide>,
    report: &mut ExportReport,
) -> Result<(), PatchSetError> {
    let mut created: BTreeSet<PathBuf> = BTreeSet::new();

    for patch in patches {
        if !current.as_ref().is_some_and(|open| open.is(patch)) {
            if let Some(previous) = current.take() {
                previous.close()?;
            }

            let dataset = registry.get(&patch.dataset_name).await?;
            let slide = dataset.open_slide(patch.slide_index).await?;
            let stem = slide
                .path()
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| format!("slide_{}", patch.slide_index));
            info!(
                "Exporting from {} slide {} ({})",
                patch.dataset_name, patch.slide_index, stem
            );
            report.slides_opened += 1;
            *current = Some(OpenSlide {
                dataset_name: patch.dataset_name.clone(),
                slide_index: patch.slide_index,
                dataset,
                slide,
                stem,
            });
        }

        let Some(open) = current.as_ref() else {
            continue;
        };

        let label = open
            .dataset
            .labels_by_index()
            .get(&patch.label)
            .cloned()
            .ok_or_else(|| PatchSetError::UnknownLabel {
                label: patch.label,
                dataset: patch.dataset_name.clone(),
            })?;

        let pixels = open.slide.read_region(&patch.region()).await?;
        let bytes = encoder.encode(&DynamicImage::ImageRgba8(pixels).to_rgb8())?;

        let label_dir = output_dir.join(&label);
        if created.insert(label_dir.clone()) {
            tokio::fs::create_dir_all(&label_dir)
                .await
                .map_err(|e| PatchSetError::io(&label_dir, e))?;
        }
        let file = label_dir.join(format!(
            "{}_{}_{}_{}.{}",
            open.stem,
            patch.x,
            patch.y,
            patch.level,
            encoder.extension()
        ));
        tokio::fs::write(&file, bytes)
            .await
            .map_err(|e| PatchSetError::io(&file, e))?;

        report.patches_written += 1;
        report.labels.insert(label);
    }
    Ok(())
}

// =============================================================================
// Summary
// =============================================================================

/// Row counts per label name, in label index order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchSummary {
    counts: Vec<(String, usize)>,
}

impl PatchSummary {
    /// Count for `label`; zero for labels not in the summary.
    pub fn count(&self, label: &str) -> usize {
        self.counts
            .iter()
            .find(|(n, _)| n == label)
            .map(|(_, c)| *c)
            .unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.counts.iter().map(|(n, c)| (n.as_str(), *c))
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.counts.iter().map(|(n, _)| n.as_str())
    }

    pub fn total(&self) -> usize {
        self.counts.iter().map(|(_, c)| c).sum()
    }
}
