//! Spatial index backed by an explicit cell table.
//!
//! Each row carries a cell identifier, its centroid and the list of adjacent
//! cells. This is the shape in which an external tessellation (for instance an
//! H3 export) is handed to the pipeline. Rings are computed by breadth-first
//! traversal of the adjacency relation.

use std::collections::{BTreeMap, HashSet, VecDeque};

use geo::{Contains, HaversineDistance, Point, Polygon};

use super::{validate_polygon, SpatialIndex};
use crate::error::SpatialError;
use crate::event::CellId;

#[derive(Debug, Clone)]
struct CellEntry {
    centroid: Point<f64>,
    neighbors: Vec<CellId>,
}

/// In-memory cell table with adjacency lists.
#[derive(Debug, Clone, Default)]
pub struct CellTable {
    cells: BTreeMap<CellId, CellEntry>,
}

impl CellTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a cell.
    pub fn insert(&mut self, cell: CellId, centroid: Point<f64>, neighbors: Vec<CellId>) {
        self.cells.insert(cell, CellEntry { centroid, neighbors });
    }

    /// Number of cells in the table.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether the table has no cell.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Cell identifiers in sorted order.
    pub fn cell_ids(&self) -> impl Iterator<Item = &CellId> {
        self.cells.keys()
    }

    /// Adjacent cells of `cell` as listed in the table.
    pub fn neighbors(&self, cell: &CellId) -> Result<&[CellId], SpatialError> {
        self.cells
            .get(cell)
            .map(|entry| entry.neighbors.as_slice())
            .ok_or_else(|| SpatialError::UnknownCell(cell.clone()))
    }
}

impl SpatialIndex for CellTable {
    fn tessellate(&self, polygon: &Polygon<f64>, resolution: u8) -> Result<Vec<CellId>, SpatialError> {
        validate_polygon(polygon)?;
        let cells: Vec<CellId> = self
            .cells
            .iter()
            .filter(|(_, entry)| polygon.contains(&entry.centroid))
            .map(|(id, _)| id.clone())
            .collect();

        if cells.is_empty() {
            return Err(SpatialError::EmptyTessellation { resolution });
        }
        tracing::debug!(resolution, cells = cells.len(), "selected table cells inside polygon");
        Ok(cells)
    }

    fn ring(&self, cell: &CellId, radius: u32) -> Result<Vec<CellId>, SpatialError> {
        if !self.cells.contains_key(cell) {
            return Err(SpatialError::UnknownCell(cell.clone()));
        }

        let mut visited: HashSet<&CellId> = HashSet::new();
        let mut ring = vec![cell.clone()];
        let mut queue: VecDeque<(&CellId, u32)> = VecDeque::new();
        visited.insert(cell);
        queue.push_back((cell, 0));

        while let Some((current, depth)) = queue.pop_front() {
            if depth == radius {
                continue;
            }
            // cells referenced but absent from the table are leaves
            let Some(entry) = self.cells.get(current) else {
                continue;
            };
            for neighbor in &entry.neighbors {
                if visited.insert(neighbor) {
                    ring.push(neighbor.clone());
                    queue.push_back((neighbor, depth + 1));
                }
            }
        }

        Ok(ring)
    }

    fn centroid(&self, cell: &CellId) -> Result<Point<f64>, SpatialError> {
        self.cells
            .get(cell)
            .map(|entry| entry.centroid)
            .ok_or_else(|| SpatialError::UnknownCell(cell.clone()))
    }

    fn boundary(&self, _cell: &CellId) -> Result<Polygon<f64>, SpatialError> {
        Err(SpatialError::Unsupported("cell boundaries are not stored in a cell table"))
    }

    fn locate(&self, point: Point<f64>, _resolution: u8) -> Option<CellId> {
        if !point.x().is_finite() || !point.y().is_finite() {
            return None;
        }
        self.cells
            .iter()
            .map(|(id, entry)| (id, entry.centroid.haversine_distance(&point)))
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(id, _)| id.clone())
    }
}
