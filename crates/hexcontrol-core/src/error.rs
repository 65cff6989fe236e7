//! Error types shared across the hexcontrol crates.
//!
//! # Error Hierarchy
//!
//! - [`CoreError`]: top-level error for the core data model
//! - [`SpatialError`]: failures of the spatial indexer (tessellation, rings,
//!   centroids). A spatial failure is fatal for a run: without a cell set no
//!   downstream computation is possible.

use chrono::NaiveDate;
use thiserror::Error;

use crate::event::CellId;

/// A specialized `Result` type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Top-level error type for the core data model.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CoreError {
    /// Spatial indexer error
    #[error("Spatial index error: {0}")]
    Spatial(#[from] SpatialError),

    /// The requested time range is inverted
    #[error("Invalid time grid: start {start} is after end {end}")]
    InvalidTimeGrid {
        /// First date of the range
        start: NaiveDate,
        /// Last date of the range
        end: NaiveDate,
    },

    /// A textual value could not be parsed into a domain type
    #[error("Cannot parse {what} from '{value}'")]
    Parse {
        /// Name of the target type
        what: &'static str,
        /// The offending input
        value: String,
    },

    /// Validation error for input data
    #[error("Validation error: {message}")]
    Validation {
        /// Description of what validation failed
        message: String,
    },
}

impl CoreError {
    /// Creates a new parse error.
    #[must_use]
    pub fn parse(what: &'static str, value: impl Into<String>) -> Self {
        Self::Parse {
            what,
            value: value.into(),
        }
    }

    /// Creates a new validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

/// Errors raised by a [`SpatialIndex`](crate::SpatialIndex) implementation.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum SpatialError {
    /// The polygon cannot be tessellated
    #[error("Malformed polygon: {0}")]
    MalformedPolygon(String),

    /// The tessellation produced no cells
    #[error("Tessellation produced no cells at resolution {resolution}")]
    EmptyTessellation {
        /// Requested resolution
        resolution: u8,
    },

    /// The tessellation would exceed the configured cell budget
    #[error("Tessellation would produce {cells} cells (limit {limit})")]
    TessellationTooLarge {
        /// Number of cells the polygon would need
        cells: usize,
        /// Maximum number of cells allowed
        limit: usize,
    },

    /// Resolution outside the supported range
    #[error("Unsupported resolution {0} (expected 0..=15)")]
    InvalidResolution(u8),

    /// The cell is not known to the index
    #[error("Unknown cell '{0}'")]
    UnknownCell(CellId),

    /// The index cannot answer this query
    #[error("Operation not supported by this index: {0}")]
    Unsupported(&'static str),
}
