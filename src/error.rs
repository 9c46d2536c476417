use thiserror::Error;

/// Errors raised while configuring or running a patch finder
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FinderError {
    /// The patch level must be at or below the labels level
    #[error("Patch level {patch_level} is above labels level {labels_level}")]
    PatchLevelAboveLabels { patch_level: u32, labels_level: u32 },

    /// Level gap too wide for a power-of-two scale in 32 bits
    #[error("Labels level {labels_level} is too far above patch level {patch_level}")]
    LevelGapTooLarge { patch_level: u32, labels_level: u32 },

    /// Patch size plus border and jitter does not fit in 32 bits
    #[error("Patch size {patch_size} with border {border} and jitter {jitter} overflows")]
    PaddingOverflow {
        patch_size: u32,
        border: u32,
        jitter: u32,
    },

    /// Patch size does not map onto a whole number of label pixels
    #[error("Patch size {patch_size} is not a multiple of the label pixel size {scale}")]
    NonIntegerKernel { patch_size: u32, scale: u32 },

    /// Stride does not map onto a whole number of label pixels
    #[error("Stride {stride} is not a multiple of the label pixel size {scale}")]
    NonIntegerStride { stride: u32, scale: u32 },

    /// Kernel or stride collapsed to zero label pixels
    #[error("{name} must be at least one label pixel")]
    ZeroWindow { name: &'static str },

    /// The padded patch cannot fit inside the slide
    #[error("Patch of {patch_size}px does not fit in a {width}x{height} slide")]
    PatchLargerThanSlide {
        patch_size: u32,
        width: u32,
        height: u32,
    },

    /// Label raster shape differs from the slide at the labels level
    #[error("Label raster is {actual:?} but the slide is {expected:?} at level {level}")]
    ShapeMismatch {
        level: u32,
        expected: (usize, usize),
        actual: (usize, usize),
    },
}

/// Errors that can occur while loading or rendering annotations
#[derive(Debug, Clone, Error)]
pub enum AnnotationError {
    /// I/O error while reading an annotation file
    #[error("I/O error reading {path}: {message}")]
    Io { path: String, message: String },

    /// The annotation file is not valid XML for the expected schema
    #[error("Malformed annotation file {path}: {message}")]
    Malformed { path: String, message: String },

    /// Annotation group with no known label
    #[error("Unknown annotation group: {0}")]
    UnknownGroup(String),

    /// Annotation label missing from the dataset label map
    #[error("Unknown annotation label: {0}")]
    UnknownLabel(String),

    /// Annotation type outside Dot, Polygon, Spline and Rectangle
    #[error("Unknown annotation type: {0}")]
    UnknownType(String),
}

/// Errors that can occur when opening or reading a slide
#[derive(Debug, Clone, Error)]
pub enum SlideError {
    /// I/O error while opening the slide
    #[error("I/O error: {0}")]
    Io(String),

    /// Slide pixels could not be decoded
    #[error("Decode error: {message}")]
    Decode { message: String },

    /// Requested pyramid level does not exist
    #[error("Invalid level {level}: slide has {levels} level(s)")]
    LevelOutOfRange { level: u32, levels: usize },
}

/// Errors raised by datasets and the dataset registry
#[derive(Debug, Clone, Error)]
pub enum DatasetError {
    /// No factory registered under this name
    #[error("Unknown dataset: {0}")]
    UnknownDataset(String),

    /// Slide index past the end of the catalog
    #[error("Slide index {index} out of range for dataset {dataset} with {len} slide(s)")]
    SlideOutOfRange {
        dataset: String,
        index: usize,
        len: usize,
    },

    /// Path is not inside the dataset root
    #[error("Path {path} is not under dataset root {root}")]
    OutsideRoot { path: String, root: String },

    /// I/O error while building a catalog
    #[error("I/O error: {0}")]
    Io(String),

    /// Slide access failed
    #[error("Slide error: {0}")]
    Slide(#[from] SlideError),

    /// Annotation loading failed
    #[error("Annotation error: {0}")]
    Annotation(#[from] AnnotationError),
}

/// Errors when encoding exported patches
#[derive(Debug, Clone, Error)]
pub enum EncodeError {
    /// JPEG quality outside 1-100
    #[error("Invalid quality {quality}: must be between 1 and 100")]
    InvalidQuality { quality: u8 },

    /// Image encoder failed
    #[error("Failed to encode patch: {message}")]
    Encode { message: String },
}

/// Errors raised by patch sets and their persistence
#[derive(Debug, Clone, Error)]
pub enum PatchSetError {
    /// Filesystem error
    #[error("I/O error on {path}: {message}")]
    Io { path: String, message: String },

    /// frame.csv could not be read or written
    #[error("CSV error in {path}: {message}")]
    Csv { path: String, message: String },

    /// fields.json could not be read or written
    #[error("Metadata error in {path}: {message}")]
    Metadata { path: String, message: String },

    /// fields.json names a type this crate does not persist
    #[error("Unsupported patch set type {0}")]
    UnsupportedType(String),

    /// fields.json schema version is newer than this crate
    #[error("Unsupported patch set version {0}")]
    UnsupportedVersion(u32),

    /// A row has neither a column value nor a default for a field
    #[error("Row {row} has no value for {field}")]
    MissingField { row: usize, field: &'static str },

    /// Row carries an empty dataset name, which frame.csv cannot represent
    #[error("Row {row} has an empty dataset name")]
    EmptyDatasetName { row: usize },

    /// Numeric label with no name in the dataset
    #[error("Label index {label} is unknown to dataset {dataset}")]
    UnknownLabel { label: u32, dataset: String },

    /// Dataset lookup or slide access failed
    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    /// Region read failed
    #[error("Slide error: {0}")]
    Slide(#[from] SlideError),

    /// Patch encoding failed
    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),
}

/// Errors raised while building or manipulating a slides index
#[derive(Debug, Clone, Error)]
pub enum IndexError {
    /// Patch finding failed
    #[error("Patch finder error: {0}")]
    Finder(#[from] FinderError),

    /// Dataset access failed
    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    /// Slide access failed
    #[error("Slide error: {0}")]
    Slide(#[from] SlideError),

    /// Per-slide patch set persistence failed
    #[error("Patch set error: {0}")]
    PatchSet(#[from] PatchSetError),

    /// Tissue mask does not cover the label raster
    #[error("Tissue mask is {actual:?} but the label raster is {expected:?}")]
    MaskMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    /// Selection refers to a slide the index does not hold
    #[error("Slide position {index} out of range for index of {len} slide(s)")]
    SelectOutOfRange { index: usize, len: usize },
}

/// Errors raised by the class-balancing sampler
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SampleError {
    /// A class cannot supply the requested number of rows
    #[error("Label {label} has {available} row(s) but {required} are required")]
    InsufficientRows {
        label: u32,
        available: usize,
        required: usize,
    },

    /// Sampling weights were rejected
    #[error("Invalid sampling weights: {0}")]
    InvalidWeights(String),
}

impl AnnotationError {
    pub(crate) fn io(path: &std::path::Path, err: std::io::Error) -> Self {
        AnnotationError::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }
}

impl PatchSetError {
    pub(crate) fn io(path: &std::path::Path, err: std::io::Error) -> Self {
        PatchSetError::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }

    pub(crate) fn csv(path: &std::path::Path, err: csv::Error) -> Self {
        PatchSetError::Csv {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }

    pub(crate) fn metadata(path: &std::path::Path, err: serde_json::Error) -> Self {
        PatchSetError::Metadata {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }
}
