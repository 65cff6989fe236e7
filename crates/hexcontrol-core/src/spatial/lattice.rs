//! Pointy-top axial hexagon lattice on a local equirectangular projection.
//!
//! Cells are addressed by axial coordinates `(q, r)` at a resolution whose
//! edge length follows the average H3 edge lengths, so a resolution-5 lattice
//! has roughly the same cell size as an H3 resolution-5 grid. Identifiers have
//! the form `hx:<resolution>:<q>:<r>`.
//!
//! The projection is anchored at `origin`; distortion grows with distance from
//! the origin latitude, which is acceptable for country-sized regions.

use std::f64::consts::PI;

use geo::{BoundingRect, Contains, LineString, Point, Polygon};

use super::{validate_polygon, SpatialIndex, KM_PER_DEGREE};
use crate::error::SpatialError;
use crate::event::CellId;

/// Average hexagon edge length in kilometers for resolutions 0..=15.
const EDGE_LENGTH_KM: [f64; 16] = [
    1107.712_591,
    418.676_005_5,
    158.244_655_8,
    59.810_857_94,
    22.606_379_4,
    8.544_408_276,
    3.229_482_772,
    1.220_629_759,
    0.461_354_684,
    0.174_375_668,
    0.065_907_807,
    0.024_910_561,
    0.009_415_526,
    0.003_559_893,
    0.001_348_575,
    0.000_509_713,
];

const SQRT_3: f64 = 1.732_050_807_568_877_2;

/// Default ceiling on the number of cells a single tessellation may produce.
const DEFAULT_MAX_CELLS: usize = 2_000_000;

/// Synthetic hexagonal lattice anchored at a geographic origin.
#[derive(Debug, Clone)]
pub struct HexLattice {
    origin: Point<f64>,
    cos_lat0: f64,
    max_cells: usize,
}

impl HexLattice {
    /// Create a lattice centred on `origin` (`x: longitude, y: latitude`).
    pub fn new(origin: Point<f64>) -> Self {
        let cos_lat0 = (origin.y() * PI / 180.0).cos().max(1e-6);
        Self {
            origin,
            cos_lat0,
            max_cells: DEFAULT_MAX_CELLS,
        }
    }

    /// Override the maximum number of cells a tessellation may produce.
    pub fn with_max_cells(mut self, max_cells: usize) -> Self {
        self.max_cells = max_cells.max(1);
        self
    }

    /// Geographic origin of the projection.
    pub fn origin(&self) -> Point<f64> {
        self.origin
    }

    /// Edge length of a cell at `resolution`, in kilometers.
    pub fn edge_length_km(resolution: u8) -> Result<f64, SpatialError> {
        EDGE_LENGTH_KM
            .get(usize::from(resolution))
            .copied()
            .ok_or(SpatialError::InvalidResolution(resolution))
    }

    /// Identifier of the cell at axial `(q, r)`.
    pub fn cell_id(resolution: u8, q: i64, r: i64) -> CellId {
        CellId::new(format!("hx:{resolution}:{q}:{r}"))
    }

    /// Decode an identifier into `(resolution, q, r)`.
    pub fn parse_cell(cell: &CellId) -> Result<(u8, i64, i64), SpatialError> {
        let unknown = || SpatialError::UnknownCell(cell.clone());
        let mut parts = cell.as_str().split(':');
        if parts.next() != Some("hx") {
            return Err(unknown());
        }
        let resolution: u8 = parts.next().and_then(|p| p.parse().ok()).ok_or_else(unknown)?;
        let q: i64 = parts.next().and_then(|p| p.parse().ok()).ok_or_else(unknown)?;
        let r: i64 = parts.next().and_then(|p| p.parse().ok()).ok_or_else(unknown)?;
        if parts.next().is_some() {
            return Err(unknown());
        }
        if usize::from(resolution) >= EDGE_LENGTH_KM.len() {
            return Err(SpatialError::InvalidResolution(resolution));
        }
        Ok((resolution, q, r))
    }

    /// Hex distance in hops between two axial coordinates.
    pub fn hex_distance(a: (i64, i64), b: (i64, i64)) -> u64 {
        let dq = a.0 - b.0;
        let dr = a.1 - b.1;
        (dq.unsigned_abs() + dr.unsigned_abs() + (dq + dr).unsigned_abs()) / 2
    }

    fn to_local(&self, point: Point<f64>) -> (f64, f64) {
        let x = (point.x() - self.origin.x()) * self.cos_lat0 * KM_PER_DEGREE;
        let y = (point.y() - self.origin.y()) * KM_PER_DEGREE;
        (x, y)
    }

    fn from_local(&self, x: f64, y: f64) -> Point<f64> {
        let lon = self.origin.x() + x / (self.cos_lat0 * KM_PER_DEGREE);
        let lat = self.origin.y() + y / KM_PER_DEGREE;
        Point::new(lon, lat)
    }

    fn axial_center(q: i64, r: i64, edge: f64) -> (f64, f64) {
        let x = edge * SQRT_3 * (q as f64 + r as f64 / 2.0);
        let y = edge * 1.5 * r as f64;
        (x, y)
    }

    fn axial_round(qf: f64, rf: f64) -> (i64, i64) {
        let sf = -qf - rf;
        let mut q = qf.round();
        let mut r = rf.round();
        let s = sf.round();

        let dq = (q - qf).abs();
        let dr = (r - rf).abs();
        let ds = (s - sf).abs();

        if dq > dr && dq > ds {
            q = -r - s;
        } else if dr > ds {
            r = -q - s;
        }
        (q as i64, r as i64)
    }

    fn axial_of_local(x: f64, y: f64, edge: f64) -> (i64, i64) {
        let qf = (SQRT_3 / 3.0 * x - y / 3.0) / edge;
        let rf = (2.0 / 3.0 * y) / edge;
        Self::axial_round(qf, rf)
    }
}

impl SpatialIndex for HexLattice {
    fn tessellate(&self, polygon: &Polygon<f64>, resolution: u8) -> Result<Vec<CellId>, SpatialError> {
        validate_polygon(polygon)?;
        let edge = Self::edge_length_km(resolution)?;
        let rect = polygon
            .bounding_rect()
            .ok_or_else(|| SpatialError::MalformedPolygon("polygon has no extent".into()))?;

        let (xmin, ymin) = self.to_local(Point::from(rect.min()));
        let (xmax, ymax) = self.to_local(Point::from(rect.max()));

        let row_height = 1.5 * edge;
        let col_width = SQRT_3 * edge;
        let r_min = (ymin / row_height).floor() as i64 - 1;
        let r_max = (ymax / row_height).ceil() as i64 + 1;
        let q_span = ((xmax - xmin) / col_width).ceil() as i64 + 3 + (r_max - r_min) / 2;

        let rows = usize::try_from(r_max - r_min + 1).unwrap_or(usize::MAX);
        let cols = usize::try_from(q_span + 1).unwrap_or(usize::MAX);
        let estimate = rows.saturating_mul(cols);
        if estimate > self.max_cells {
            return Err(SpatialError::TessellationTooLarge {
                cells: estimate,
                limit: self.max_cells,
            });
        }

        let mut cells = Vec::new();
        for r in r_min..=r_max {
            let q_min = (xmin / col_width - r as f64 / 2.0).floor() as i64 - 1;
            let q_max = (xmax / col_width - r as f64 / 2.0).ceil() as i64 + 1;
            for q in q_min..=q_max {
                let (x, y) = Self::axial_center(q, r, edge);
                if polygon.contains(&self.from_local(x, y)) {
                    cells.push(Self::cell_id(resolution, q, r));
                }
            }
        }

        if cells.is_empty() {
            return Err(SpatialError::EmptyTessellation { resolution });
        }
        tracing::debug!(resolution, cells = cells.len(), "tessellated polygon");
        Ok(cells)
    }

    fn ring(&self, cell: &CellId, radius: u32) -> Result<Vec<CellId>, SpatialError> {
        let (resolution, q0, r0) = Self::parse_cell(cell)?;
        let k = i64::from(radius);
        let mut cells = Vec::with_capacity((1 + 3 * k * (k + 1)) as usize);
        for dq in -k..=k {
            let lo = (-k).max(-dq - k);
            let hi = k.min(-dq + k);
            for dr in lo..=hi {
                cells.push(Self::cell_id(resolution, q0 + dq, r0 + dr));
            }
        }
        Ok(cells)
    }

    fn centroid(&self, cell: &CellId) -> Result<Point<f64>, SpatialError> {
        let (resolution, q, r) = Self::parse_cell(cell)?;
        let edge = Self::edge_length_km(resolution)?;
        let (x, y) = Self::axial_center(q, r, edge);
        Ok(self.from_local(x, y))
    }

    fn boundary(&self, cell: &CellId) -> Result<Polygon<f64>, SpatialError> {
        let (resolution, q, r) = Self::parse_cell(cell)?;
        let edge = Self::edge_length_km(resolution)?;
        let (cx, cy) = Self::axial_center(q, r, edge);
        let corners: Vec<(f64, f64)> = (0..6)
            .map(|i| {
                let angle = (60.0 * f64::from(i) - 30.0) * PI / 180.0;
                let p = self.from_local(cx + edge * angle.cos(), cy + edge * angle.sin());
                (p.x(), p.y())
            })
            .collect();
        Ok(Polygon::new(LineString::from(corners), vec![]))
    }

    fn locate(&self, point: Point<f64>, resolution: u8) -> Option<CellId> {
        if !point.x().is_finite() || !point.y().is_finite() {
            return None;
        }
        let edge = Self::edge_length_km(resolution).ok()?;
        let (x, y) = self.to_local(point);
        let (q, r) = Self::axial_of_local(x, y, edge);
        Some(Self::cell_id(resolution, q, r))
    }
}
