//! Ordered per-slide patch sets.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::dataset::DatasetRegistry;
use crate::error::{IndexError, PatchSetError};

use super::patch_set::PatchSet;

/// One patch set per slide, in dataset order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlidesIndex {
    patch_sets: Vec<PatchSet>,
}

impl SlidesIndex {
    pub fn new(patch_sets: Vec<PatchSet>) -> Self {
        Self { patch_sets }
    }

    pub fn patch_sets(&self) -> &[PatchSet] {
        &self.patch_sets
    }

    pub fn get(&self, position: usize) -> Option<&PatchSet> {
        self.patch_sets.get(position)
    }

    pub fn len(&self) -> usize {
        self.patch_sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patch_sets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PatchSet> {
        self.patch_sets.iter()
    }

    /// Total number of patches across slides.
    pub fn patch_count(&self) -> usize {
        self.patch_sets.iter().map(PatchSet::len).sum()
    }

    /// Save each patch set to a zero-padded numbered subdirectory of `dir`.
    ///
    /// Numbered subdirectories left over from an earlier save are removed
    /// first, so that [`load`](Self::load) sees exactly these patch sets.
    pub fn save(&self, dir: &Path) -> Result<(), IndexError> {
        fs::create_dir_all(dir).map_err(|e| PatchSetError::io(dir, e))?;
        remove_numbered_subdirs(dir)?;
        let width = pad_width(self.patch_sets.len());
        for (position, patch_set) in self.patch_sets.iter().enumerate() {
            patch_set.save(&dir.join(format!("{:0width$}", position, width = width)))?;
        }
        info!(
            "Saved index of {} slide(s) to {}",
            self.patch_sets.len(),
            dir.display()
        );
        Ok(())
    }

    /// Load every subdirectory of `dir` as a patch set, in name order.
    pub fn load(dir: &Path, registry: &DatasetRegistry) -> Result<Self, IndexError> {
        let entries = fs::read_dir(dir).map_err(|e| PatchSetError::io(dir, e))?;
        let mut subdirs: Vec<PathBuf> = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| PatchSetError::io(dir, e))?.path();
            if path.is_dir() {
                subdirs.push(path);
            }
        }
        subdirs.sort();

        let patch_sets = subdirs
            .iter()
            .map(|d| PatchSet::load(d, registry))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(patch_sets))
    }

    /// Per-slide label counts, columns aligned by label name.
    pub async fn summary(&self, registry: &DatasetRegistry) -> Result<SummaryTable, IndexError> {
        let mut summaries = Vec::with_capacity(self.patch_sets.len());
        for patch_set in &self.patch_sets {
            summaries.push(patch_set.summary(registry).await?);
        }

        let mut labels: Vec<String> = Vec::new();
        for summary in &summaries {
            for label in summary.labels() {
                if !labels.iter().any(|l| l == label) {
                    labels.push(label.to_string());
                }
            }
        }

        let rows = summaries
            .iter()
            .map(|s| labels.iter().map(|l| s.count(l)).collect())
            .collect();
        Ok(SummaryTable { labels, rows })
    }

    /// A new index holding the patch sets at `positions`, in that order.
    pub fn select(&self, positions: &[usize]) -> Result<Self, IndexError> {
        let patch_sets = positions
            .iter()
            .map(|&index| {
                self.patch_sets
                    .get(index)
                    .cloned()
                    .ok_or(IndexError::SelectOutOfRange {
                        index,
                        len: self.patch_sets.len(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(patch_sets))
    }

    /// All slides' patches as one patch set.
    pub fn combined(&self) -> PatchSet {
        PatchSet::combine(&self.patch_sets)
    }
}

impl FromIterator<PatchSet> for SlidesIndex {
    fn from_iter<I: IntoIterator<Item = PatchSet>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

fn remove_numbered_subdirs(dir: &Path) -> Result<(), PatchSetError> {
    let entries = fs::read_dir(dir).map_err(|e| PatchSetError::io(dir, e))?;
    for entry in entries {
        let path = entry.map_err(|e| PatchSetError::io(dir, e))?.path();
        let numbered = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()));
        if numbered && path.is_dir() {
            fs::remove_dir_all(&path).map_err(|e| PatchSetError::io(&path, e))?;
            debug!("Removed stale patch set {}", path.display());
        }
    }
    Ok(())
}

/// Digits needed for the last position, at least two.
fn pad_width(len: usize) -> usize {
    let last = len.saturating_sub(1);
    last.to_string().len().max(2)
}

// =============================================================================
// Summary Table
// =============================================================================

/// Label counts with one row per slide.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SummaryTable {
    labels: Vec<String>,
    rows: Vec<Vec<usize>>,
}

impl SummaryTable {
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn rows(&self) -> &[Vec<usize>] {
        &self.rows
    }

    pub fn count(&self, slide: usize, label: &str) -> Option<usize> {
        let column = self.labels.iter().position(|l| l == label)?;
        self.rows.get(slide).map(|r| r[column])
    }

    /// Column sums.
    pub fn totals(&self) -> Vec<usize> {
        (0..self.labels.len())
            .map(|c| self.rows.iter().map(|r| r[c]).sum())
            .collect()
    }
}

impl fmt::Display for SummaryTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let totals = self.totals();
        let widths: Vec<usize> = self
            .labels
            .iter()
            .zip(&totals)
            .map(|(l, t)| l.len().max(t.to_string().len()))
            .collect();
        let first = "slide".len().max(self.rows.len().to_string().len());

        write!(f, "{:<first$}", "slide", first = first)?;
        for (label, w) in self.labels.iter().zip(&widths) {
            write!(f, "  {:>w$}", label, w = w)?;
        }
        writeln!(f)?;

        for (slide, row) in self.rows.iter().enumerate() {
            write!(f, "{:<first$}", slide, first = first)?;
            for (count, w) in row.iter().zip(&widths) {
                write!(f, "  {:>w$}", count, w = w)?;
            }
            writeln!(f)?;
        }

        write!(f, "{:<first$}", "total", first = first)?;
        for (total, w) in totals.iter().zip(&widths) {
            write!(f, "  {:>w$}", total, w = w)?;
        }
        writeln!(f)
    }
}
