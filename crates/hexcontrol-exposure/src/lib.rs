//! # hexcontrol Exposure
//!
//! Decay-weighted exposure of hexagonal cells to violent events.
//!
//! For every cell and every decision date of a [`TimeGrid`], the engine sums
//! the contribution of each matching-type event located within ring radius 2
//! of the cell:
//!
//! ```text
//! exposure(cell, date) = Σ wd(distance) · wa(age) [· wcas(mean, fatalities)]
//! ```
//!
//! - **Decay weights**: [`DecayParams`] holds the logistic distance and age
//!   curves and the optional severity sigmoid.
//! - **Strategies**: [`ExposureStrategy::Direct`] queries the spatial index
//!   per cell; [`ExposureStrategy::Precomputed`] builds a dense ring mask and
//!   distance matrix once and evaluates rows in parallel. `Auto` picks one by
//!   problem size. Both produce the same matrix.
//! - **Output**: [`ExposureMatrix`], cells in rows and dates in columns.
//!
//! ## Example
//!
//! ```rust
//! use chrono::NaiveDate;
//! use geo::point;
//! use hexcontrol_core::{Event, EventKind, Frequency, HexLattice, SpatialIndex, TimeGrid};
//! use hexcontrol_exposure::{ExposureEngine, ExposureParams};
//!
//! let lattice = HexLattice::new(point!(x: 8.0, y: 9.0));
//! let cell = lattice.locate(point!(x: 8.0, y: 9.0), 5).unwrap();
//! let day = |m, d| NaiveDate::from_ymd_opt(2015, m, d).unwrap();
//!
//! let events = vec![Event::new(
//!     day(1, 10),
//!     "Nigeria",
//!     point!(x: 8.0, y: 9.0),
//!     4,
//!     EventKind::Terrorism,
//!     cell.clone(),
//! )];
//! let grid = TimeGrid::new(day(1, 1), day(3, 31), Frequency::MonthEnd).unwrap();
//!
//! let engine = ExposureEngine::new(ExposureParams::default()).unwrap();
//! let exposure = engine
//!     .compute(&lattice, &[cell], &events, EventKind::Terrorism, &grid)
//!     .unwrap();
//!
//! assert_eq!(exposure.shape(), (1, 3));
//! assert!(exposure.values()[[0, 0]] > 0.9);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod candidates;
pub mod decay;
pub mod distance;
pub mod engine;
pub mod matrix;

use hexcontrol_core::{CellId, SpatialError};

pub use decay::DecayParams;
pub use distance::great_circle_km;
pub use engine::{ExposureEngine, ExposureParams, ExposureStrategy, DEFAULT_PRECOMPUTE_THRESHOLD};
pub use matrix::ExposureMatrix;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common result type for exposure operations
pub type Result<T> = std::result::Result<T, ExposureError>;

/// Unified error type for exposure computation
#[derive(Debug, thiserror::Error)]
pub enum ExposureError {
    /// Spatial indexer failure
    #[error("Spatial index error: {0}")]
    Spatial(#[from] SpatialError),

    /// A parameter is out of its valid range
    #[error("Invalid parameter `{name}`: {reason}")]
    InvalidParameter {
        /// Parameter name
        name: &'static str,
        /// Why it is invalid
        reason: String,
    },

    /// Matrix dimensions disagree with the cell set or the time grid
    #[error("Shape mismatch for {what}: expected {expected}, got {actual}")]
    ShapeMismatch {
        /// Which dimension disagrees
        what: &'static str,
        /// Expected size
        expected: usize,
        /// Actual size
        actual: usize,
    },

    /// The same cell appears twice in a cell set
    #[error("Duplicate cell '{0}'")]
    DuplicateCell(CellId),
}

impl ExposureError {
    /// Creates an invalid parameter error.
    #[must_use]
    pub fn invalid_parameter(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }

    /// Creates a shape mismatch error.
    #[must_use]
    pub fn shape_mismatch(what: &'static str, expected: usize, actual: usize) -> Self {
        Self::ShapeMismatch {
            what,
            expected,
            actual,
        }
    }
}

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::decay::DecayParams;
    pub use crate::engine::{ExposureEngine, ExposureParams, ExposureStrategy};
    pub use crate::matrix::ExposureMatrix;
    pub use crate::{ExposureError, Result};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_error_display() {
        let err = ExposureError::shape_mismatch("dates", 12, 11);
        assert_eq!(err.to_string(), "Shape mismatch for dates: expected 12, got 11");

        let err = ExposureError::invalid_parameter("gamma_age", "must be > 0");
        assert!(err.to_string().contains("gamma_age"));
    }
}
