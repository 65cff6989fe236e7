//! # hexcontrol Core
//!
//! Shared building blocks for the hexcontrol territorial-control pipeline.
//!
//! This crate provides the data model every other stage consumes:
//!
//! - **Events**: [`Event`] and [`EventKind`], the normalized violent-event
//!   records produced by the event source (state-based conflict or terrorism).
//! - **Cells**: [`CellId`], the opaque identifier of one hexagonal tile.
//! - **Time**: [`TimeGrid`] and [`Frequency`], the shared sequence of decision
//!   dates every matrix column is aligned to.
//! - **Spatial indexing**: the [`SpatialIndex`] contract (tessellation, rings,
//!   centroids) with two in-memory implementations, [`HexLattice`] and
//!   [`CellTable`].
//! - **Errors**: [`CoreError`] and [`SpatialError`].
//!
//! ## Example
//!
//! ```rust
//! use geo::{point, polygon};
//! use hexcontrol_core::{HexLattice, SpatialIndex};
//!
//! let lattice = HexLattice::new(point!(x: 8.0, y: 9.0));
//! let area = polygon![
//!     (x: 7.9, y: 8.9),
//!     (x: 8.1, y: 8.9),
//!     (x: 8.1, y: 9.1),
//!     (x: 7.9, y: 9.1),
//! ];
//!
//! let cells = lattice.tessellate(&area, 6).unwrap();
//! assert!(!cells.is_empty());
//!
//! let ring = lattice.ring(&cells[0], 2).unwrap();
//! assert_eq!(ring.len(), 19);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod event;
pub mod spatial;
pub mod time;

pub use error::{CoreError, CoreResult, SpatialError};
pub use event::{CellId, Event, EventKind};
pub use spatial::{CellTable, HexLattice, SpatialIndex, EARTH_RADIUS_KM};
pub use time::{Frequency, TimeGrid};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Neighborhood radius (in ring hops) inside which events can expose a cell.
pub const DEFAULT_RING_RADIUS: u32 = 2;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{CoreError, CoreResult, SpatialError};
    pub use crate::event::{CellId, Event, EventKind};
    pub use crate::spatial::{CellTable, HexLattice, SpatialIndex};
    pub use crate::time::{Frequency, TimeGrid};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_valid() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_default_ring_radius() {
        assert_eq!(DEFAULT_RING_RADIUS, 2);
    }
}
