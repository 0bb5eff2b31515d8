//! Error taxonomy. Every stage fails fast with one of these; nothing in the
//! crate retries.

use std::time::Duration;

use thiserror::Error;

use crate::model::{ColorSpace, ContentId, GazetteId, PaperSize};

/// A layout spec that cannot go to press. Only the first offending field is
/// ever reported.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("unsupported page size {found}, only {expected} is printed")]
    UnsupportedPageSize { found: PaperSize, expected: PaperSize },

    #[error("unsupported colour space {found}, production requires {expected}")]
    UnsupportedColorSpace { found: ColorSpace, expected: ColorSpace },

    #[error("resolution {found} DPI is below the required {required} DPI")]
    InsufficientResolution { found: u32, required: u32 },

    #[error("bleed {found_mm} mm is below the required {required_mm} mm")]
    InsufficientBleed { found_mm: f64, required_mm: f64 },
}

/// Failure reported by an image codec.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodecError {
    #[error("decode failed: {0}")]
    Decode(String),

    #[error("resize failed: {0}")]
    Resize(String),

    #[error("colour conversion failed: {0}")]
    ColorConversion(String),

    #[error("encode failed: {0}")]
    Encode(String),

    #[error("invalid target dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("codec worker failed before producing a result")]
    WorkerFailed,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("could not encode asset {item_id}: {source}")]
pub struct AssetEncodingError {
    pub item_id: ContentId,
    #[source]
    pub source: CodecError,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlacementError {
    #[error("safe area is empty: inset of {inset_mm} mm consumes the trimmed page")]
    NoSafeArea { inset_mm: f64 },

    #[error("content item {item_id} has zero natural size")]
    EmptyItem { item_id: ContentId },
}

/// Failure reported by a document writer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WriterError {
    #[error("unsupported image for {color_space}: {reason}")]
    UnsupportedImage { color_space: ColorSpace, reason: String },

    #[error("image dimensions {width}x{height} exceed the writer's limits")]
    ImageTooLarge { width: u32, height: u32 },

    #[error("writer failure: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompositionError {
    #[error("{assets} assets cannot be paired with {placements} placements")]
    CountMismatch { assets: usize, placements: usize },

    #[error("placement pages must not go backwards (page {page} after {previous})")]
    PageOrder { page: usize, previous: usize },

    #[error(transparent)]
    Writer(#[from] WriterError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("content item {0} is missing from the store")]
    MissingContent(ContentId),

    #[error("malformed manifest: {0}")]
    Manifest(String),

    #[error("store i/o error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("config i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config value `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// What went wrong while generating one document.
#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("gazette not found")]
    GazetteNotFound,

    #[error("fetch exceeded the {timeout:?} deadline")]
    FetchTimeout { timeout: Duration },

    #[error("request was cancelled")]
    Cancelled,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    AssetEncoding(#[from] AssetEncodingError),

    #[error(transparent)]
    Placement(#[from] PlacementError),

    #[error(transparent)]
    Composition(#[from] CompositionError),
}

/// A [`LayoutError`] tagged with the gazette it was raised for.
#[derive(Debug, Error)]
#[error("gazette {gazette_id}: {kind}")]
pub struct GenerationError {
    pub gazette_id: GazetteId,
    #[source]
    pub kind: LayoutError,
}

impl GenerationError {
    pub fn new(gazette_id: GazetteId, kind: impl Into<LayoutError>) -> Self {
        Self {
            gazette_id,
            kind: kind.into(),
        }
    }

    pub fn kind(&self) -> &LayoutError {
        &self.kind
    }

    pub fn into_kind(self) -> LayoutError {
        self.kind
    }
}
