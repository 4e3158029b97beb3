//! Unified error handling.
//!
//! Two error families exist:
//! - [`LineMatchError`] for failures that stop a unit of work (a catalog,
//!   a trip, a store operation)
//! - [`GeometryError`] for a single overlap computation, which callers
//!   collapse to 0% overlap

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, LineMatchError>;

/// Errors raised while preparing data, processing trips or persisting results.
#[derive(Debug, Error)]
pub enum LineMatchError {
    /// No usable line geometry for the day; nothing can be matched.
    #[error("geometry catalog is empty for {day}: no usable line shapes")]
    EmptyCatalog { day: String },

    /// A line shape could not be prepared.
    #[error("line {line_number}/{sub_line_id} has an invalid shape: {reason}")]
    InvalidLineShape {
        line_number: String,
        sub_line_id: String,
        reason: String,
    },

    /// A direction label that is neither outbound nor inbound.
    #[error("unknown direction label '{0}'")]
    InvalidDirection(String),

    /// A segment index outside the trip's trace.
    #[error("segment index {index} out of range for trace of {len} points")]
    IndexOutOfRange { index: usize, len: usize },

    /// A timestamp that cannot be represented as a calendar date/time.
    #[error("invalid timestamp {0}")]
    InvalidTimestamp(i64),

    /// An analysis record built without one of its required parts.
    #[error("analysis record is missing {0}")]
    IncompleteAnalysis(&'static str),

    /// A configuration value that cannot be used.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failure in the persistence layer.
    #[error("store error: {0}")]
    Store(String),

    #[cfg(feature = "persistence")]
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors from a single geometric operation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("geometry has no points")]
    Empty,

    #[error("non-finite coordinate ({x}, {y})")]
    NonFinite { x: f64, y: f64 },

    #[error("reference corridor has zero area")]
    DegenerateCorridor,

    #[error("buffer radius must be positive, got {0}")]
    InvalidRadius(f64),
}

/// Extension for turning missing values into typed errors.
pub trait OptionExt<T> {
    /// Map `None` to [`LineMatchError::IndexOutOfRange`].
    fn ok_or_index(self, index: usize, len: usize) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_index(self, index: usize, len: usize) -> Result<T> {
        self.ok_or(LineMatchError::IndexOutOfRange { index, len })
    }
}
