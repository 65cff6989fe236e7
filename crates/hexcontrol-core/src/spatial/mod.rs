//! Spatial indexing contract and in-memory implementations.
//!
//! The pipeline only needs four queries from a hexagonal index: fill a
//! polygon with cells, list the cells within `k` hops of a cell, return a
//! cell's centroid and (for rendering) its boundary. [`SpatialIndex`] captures
//! that contract; [`HexLattice`] and [`CellTable`] implement it.

mod lattice;
mod table;

use geo::{Point, Polygon};

use crate::error::SpatialError;
use crate::event::CellId;

pub use lattice::HexLattice;
pub use table::CellTable;

/// Mean Earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Kilometers per degree of latitude on the mean sphere.
pub(crate) const KM_PER_DEGREE: f64 = EARTH_RADIUS_KM * std::f64::consts::PI / 180.0;

/// Hexagonal tessellation and neighborhood queries.
///
/// Geographic points are `(x: longitude, y: latitude)` in degrees.
pub trait SpatialIndex: Send + Sync {
    /// Fill `polygon` with cells at `resolution`.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::MalformedPolygon`] for degenerate input and
    /// [`SpatialError::EmptyTessellation`] if no cell falls inside.
    fn tessellate(&self, polygon: &Polygon<f64>, resolution: u8) -> Result<Vec<CellId>, SpatialError>;

    /// All cells within `radius` adjacency hops of `cell`, including `cell`.
    fn ring(&self, cell: &CellId, radius: u32) -> Result<Vec<CellId>, SpatialError>;

    /// Centroid of `cell`.
    fn centroid(&self, cell: &CellId) -> Result<Point<f64>, SpatialError>;

    /// Boundary polygon of `cell`. Only used for rendering.
    fn boundary(&self, cell: &CellId) -> Result<Polygon<f64>, SpatialError>;

    /// Cell at `resolution` containing `point`, if the index covers it.
    fn locate(&self, point: Point<f64>, resolution: u8) -> Option<CellId>;
}

/// Reject polygons that cannot enclose any area.
pub(crate) fn validate_polygon(polygon: &Polygon<f64>) -> Result<(), SpatialError> {
    let mut vertices: Vec<(f64, f64)> = Vec::new();
    for coord in polygon.exterior().coords() {
        if !coord.x.is_finite() || !coord.y.is_finite() {
            return Err(SpatialError::MalformedPolygon(
                "non-finite vertex coordinate".into(),
            ));
        }
        if !vertices.iter().any(|&(x, y)| x == coord.x && y == coord.y) {
            vertices.push((coord.x, coord.y));
        }
    }
    if vertices.len() < 3 {
        return Err(SpatialError::MalformedPolygon(format!(
            "exterior ring has {} distinct vertices, need at least 3",
            vertices.len()
        )));
    }
    Ok(())
}
