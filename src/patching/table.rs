//! Row-oriented patch table and its CSV form.
//!
//! `x`, `y` and `label` are always present. The remaining columns are
//! optional per row; a column exists in a table when at least one row holds
//! a value for it. Empty CSV cells mean "no value".

use std::fmt;
use std::io;
use std::path::Path;

use crate::error::PatchSetError;

/// Columns of a patch table in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Column {
    X,
    Y,
    Label,
    SlideIndex,
    DatasetName,
    PatchSize,
    Level,
}

impl Column {
    /// Every column, canonical order.
    pub const ALL: [Column; 7] = [
        Column::X,
        Column::Y,
        Column::Label,
        Column::SlideIndex,
        Column::DatasetName,
        Column::PatchSize,
        Column::Level,
    ];

    /// Columns a row may leave empty.
    pub const OPTIONAL: [Column; 4] = [
        Column::SlideIndex,
        Column::DatasetName,
        Column::PatchSize,
        Column::Level,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Column::X => "x",
            Column::Y => "y",
            Column::Label => "label",
            Column::SlideIndex => "slide_index",
            Column::DatasetName => "dataset_name",
            Column::PatchSize => "patch_size",
            Column::Level => "level",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    pub fn is_optional(self) -> bool {
        Self::OPTIONAL.contains(&self)
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One patch: top-left corner at the patch level, class label, and any
/// per-row overrides of the patch set defaults.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PatchRow {
    pub x: i64,
    pub y: i64,
    pub label: u32,
    pub slide_index: Option<usize>,
    pub dataset_name: Option<String>,
    pub patch_size: Option<u32>,
    pub level: Option<u32>,
}

impl PatchRow {
    pub fn new(x: i64, y: i64, label: u32) -> Self {
        Self {
            x,
            y,
            label,
            slide_index: None,
            dataset_name: None,
            patch_size: None,
            level: None,
        }
    }

    pub fn with_slide_index(mut self, slide_index: usize) -> Self {
        self.slide_index = Some(slide_index);
        self
    }

    pub fn with_dataset_name(mut self, dataset_name: impl Into<String>) -> Self {
        self.dataset_name = Some(dataset_name.into());
        self
    }

    pub fn with_patch_size(mut self, patch_size: u32) -> Self {
        self.patch_size = Some(patch_size);
        self
    }

    pub fn with_level(mut self, level: u32) -> Self {
        self.level = Some(level);
        self
    }

    /// Whether the row holds a value for `column`.
    pub fn has(&self, column: Column) -> bool {
        match column {
            Column::X | Column::Y | Column::Label => true,
            Column::SlideIndex => self.slide_index.is_some(),
            Column::DatasetName => self.dataset_name.is_some(),
            Column::PatchSize => self.patch_size.is_some(),
            Column::Level => self.level.is_some(),
        }
    }

    /// CSV cell text; empty when the row has no value.
    fn cell(&self, column: Column) -> String {
        fn opt<T: ToString>(v: &Option<T>) -> String {
            v.as_ref().map(ToString::to_string).unwrap_or_default()
        }
        match column {
            Column::X => self.x.to_string(),
            Column::Y => self.y.to_string(),
            Column::Label => self.label.to_string(),
            Column::SlideIndex => opt(&self.slide_index),
            Column::DatasetName => opt(&self.dataset_name),
            Column::PatchSize => opt(&self.patch_size),
            Column::Level => opt(&self.level),
        }
    }
}

/// Columns present in `rows`, canonical order.
pub fn columns(rows: &[PatchRow]) -> Vec<Column> {
    Column::ALL
        .into_iter()
        .filter(|&c| !c.is_optional() || rows.iter().any(|r| r.has(c)))
        .collect()
}

// =============================================================================
// CSV
// =============================================================================

/// Write `rows` as CSV with a header line.
pub fn write_rows<W: io::Write>(writer: W, rows: &[PatchRow]) -> Result<(), csv::Error> {
    let columns = columns(rows);
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(columns.iter().map(|c| c.name()))?;
    for row in rows {
        writer.write_record(columns.iter().map(|&c| row.cell(c)))?;
    }
    writer.flush()?;
    Ok(())
}

/// Read rows written by [`write_rows`].
///
/// Unknown columns are ignored. `source` names the input in error messages.
pub fn read_rows<R: io::Read>(reader: R, source: &Path) -> Result<Vec<PatchRow>, PatchSetError> {
    let mut reader = csv::Reader::from_reader(reader);
    let headers = reader
        .headers()
        .map_err(|e| PatchSetError::csv(source, e))?
        .clone();

    let mut positions: Vec<(Column, usize)> = Vec::new();
    for (i, header) in headers.iter().enumerate() {
        if let Some(column) = Column::from_name(header.trim()) {
            positions.push((column, i));
        }
    }
    for required in [Column::X, Column::Y, Column::Label] {
        if !positions.iter().any(|(c, _)| *c == required) {
            return Err(PatchSetError::Csv {
                path: source.display().to_string(),
                message: format!("missing column {}", required),
            });
        }
    }

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(|e| PatchSetError::csv(source, e))?;
        let mut row = PatchRow::new(0, 0, 0);
        for &(column, pos) in &positions {
            let cell = record.get(pos).unwrap_or("").trim();
            if cell.is_empty() {
                if !column.is_optional() {
                    return Err(PatchSetError::MissingField {
                        row: index,
                        field: column.name(),
                    });
                }
                continue;
            }
            set_cell(&mut row, column, cell).map_err(|message| PatchSetError::Csv {
                path: source.display().to_string(),
                message: format!("row {} column {}: {}", index, column, message),
            })?;
        }
        rows.push(row);
    }
    Ok(rows)
}

fn set_cell(row: &mut PatchRow, column: Column, cell: &str) -> Result<(), String> {
    fn parse<T: std::str::FromStr>(cell: &str) -> Result<T, String>
    where
        T::Err: fmt::Display,
    {
        cell.parse::<T>()
            .map_err(|e| format!("invalid value {:?}: {}", cell, e))
    }

    match column {
        Column::X => row.x = parse(cell)?,
        Column::Y => row.y = parse(cell)?,
        Column::Label => row.label = parse(cell)?,
        Column::SlideIndex => row.slide_index = Some(parse(cell)?),
        Column::DatasetName => row.dataset_name = Some(cell.to_string()),
        Column::PatchSize => row.patch_size = Some(parse(cell)?),
        Column::Level => row.level = Some(parse(cell)?),
    }
    Ok(())
}
