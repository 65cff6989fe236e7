//! Candidate events of each target cell.
//!
//! A candidate is a matching-type event whose cell lies in the target cell's
//! ring. Two sources answer the same question:
//!
//! - [`DirectCandidates`] asks the spatial index for the ring on every call
//!   and computes distances on the fly.
//! - [`PrecomputedCandidates`] materializes a dense `cells × events` ring
//!   mask and distance matrix once and then only scans rows.
//!
//! Both list candidates in ascending event order, so the downstream sums are
//! accumulated in the same order and the two strategies agree bit for bit.

use std::collections::{HashMap, HashSet};

use chrono::{Datelike, NaiveDate};
use geo::Point;
use hexcontrol_core::{CellId, Event, EventKind, SpatialIndex};
use ndarray::Array2;
use rayon::prelude::*;

use crate::distance::great_circle_km;
use crate::{ExposureError, Result};

/// Day number used for event ages.
#[inline]
pub(crate) fn day_number(date: NaiveDate) -> i64 {
    i64::from(date.num_days_from_ce())
}

/// Column view of the events of one kind.
#[derive(Debug, Clone, Default)]
pub struct EventColumns {
    days: Vec<i64>,
    locations: Vec<Point<f64>>,
    fatalities: Vec<f64>,
    by_cell: HashMap<CellId, Vec<usize>>,
    cells: Vec<CellId>,
}

impl EventColumns {
    /// Keep the events of `kind`, in input order.
    pub fn of_kind(events: &[Event], kind: EventKind) -> Self {
        let mut columns = Self::default();
        for event in events.iter().filter(|e| e.kind() == kind) {
            let idx = columns.days.len();
            columns.days.push(day_number(event.timestamp()));
            columns.locations.push(event.location());
            columns.fatalities.push(f64::from(event.fatalities()));
            columns.cells.push(event.cell().clone());
            columns
                .by_cell
                .entry(event.cell().clone())
                .or_default()
                .push(idx);
        }
        columns
    }

    /// Number of retained events.
    pub fn len(&self) -> usize {
        self.days.len()
    }

    /// Whether no event of the kind was found.
    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    /// Day number of event `idx`.
    #[inline]
    pub fn day(&self, idx: usize) -> i64 {
        self.days[idx]
    }

    /// Fatality count of event `idx`.
    #[inline]
    pub fn fatalities(&self, idx: usize) -> f64 {
        self.fatalities[idx]
    }

    /// Location of event `idx`.
    #[inline]
    pub fn location(&self, idx: usize) -> Point<f64> {
        self.locations[idx]
    }

    /// Indices of events assigned to `cell`.
    pub fn in_cell(&self, cell: &CellId) -> &[usize] {
        self.by_cell.get(cell).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// One candidate event of a target cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    /// Index into [`EventColumns`]
    pub event: usize,
    /// Distance from the cell centroid to the event, in kilometers
    pub distance_km: f64,
}

/// Enumerates the candidate events of a target cell.
pub trait CandidateSource: Sync {
    /// Replace the contents of `out` with the candidates of cell row `cell`,
    /// sorted by event index.
    fn collect(&self, cell: usize, out: &mut Vec<Candidate>) -> Result<()>;
}

/// Ring lookups and distances computed on demand.
pub struct DirectCandidates<'a> {
    index: &'a dyn SpatialIndex,
    cells: &'a [CellId],
    centroids: Vec<Point<f64>>,
    events: &'a EventColumns,
    radius: u32,
}

impl<'a> DirectCandidates<'a> {
    /// Resolve the centroids of `cells`.
    pub fn new(
        index: &'a dyn SpatialIndex,
        cells: &'a [CellId],
        events: &'a EventColumns,
        radius: u32,
    ) -> Result<Self> {
        let centroids = cells
            .iter()
            .map(|cell| index.centroid(cell))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self {
            index,
            cells,
            centroids,
            events,
            radius,
        })
    }
}

impl CandidateSource for DirectCandidates<'_> {
    fn collect(&self, cell: usize, out: &mut Vec<Candidate>) -> Result<()> {
        out.clear();
        let ring = self.index.ring(&self.cells[cell], self.radius)?;
        let mut members: Vec<usize> = ring
            .iter()
            .flat_map(|id| self.events.in_cell(id).iter().copied())
            .collect();
        members.sort_unstable();
        members.dedup();

        let origin = self.centroids[cell];
        out.extend(members.into_iter().map(|event| Candidate {
            event,
            distance_km: great_circle_km(origin, self.events.location(event)),
        }));
        Ok(())
    }
}

/// Dense ring-membership mask and distance matrix, `cells × events`.
#[derive(Debug, Clone)]
pub struct PrecomputedCandidates {
    mask: Array2<bool>,
    distances: Array2<f64>,
}

impl PrecomputedCandidates {
    /// Build both matrices, one cell row per rayon task.
    pub fn build(
        index: &dyn SpatialIndex,
        cells: &[CellId],
        events: &EventColumns,
        radius: u32,
    ) -> Result<Self> {
        let n_events = events.len();
        let rows: Vec<(Vec<bool>, Vec<f64>)> = cells
            .par_iter()
            .map(|cell| -> Result<(Vec<bool>, Vec<f64>)> {
                let origin = index.centroid(cell)?;
                let ring: HashSet<CellId> = index.ring(cell, radius)?.into_iter().collect();
                let mask: Vec<bool> = events.cells.iter().map(|c| ring.contains(c)).collect();
                let distances: Vec<f64> = events
                    .locations
                    .iter()
                    .map(|&location| great_circle_km(origin, location))
                    .collect();
                Ok((mask, distances))
            })
            .collect::<Result<_>>()?;

        let shape = (cells.len(), n_events);
        let mut mask = Vec::with_capacity(shape.0 * shape.1);
        let mut distances = Vec::with_capacity(shape.0 * shape.1);
        for (row_mask, row_distances) in rows {
            mask.extend(row_mask);
            distances.extend(row_distances);
        }

        tracing::debug!(
            cells = shape.0,
            events = shape.1,
            candidates = mask.iter().filter(|&&m| m).count(),
            "precomputed ring mask and distance matrix"
        );

        let mask_len = mask.len();
        let mask = Array2::from_shape_vec(shape, mask)
            .map_err(|_| ExposureError::shape_mismatch("ring mask", shape.0 * shape.1, mask_len))?;
        let distances_len = distances.len();
        let distances = Array2::from_shape_vec(shape, distances).map_err(|_| {
            ExposureError::shape_mismatch("distance matrix", shape.0 * shape.1, distances_len)
        })?;

        Ok(Self { mask, distances })
    }

    /// Ring-membership mask.
    pub fn mask(&self) -> &Array2<bool> {
        &self.mask
    }

    /// Centroid-to-event distances in kilometers.
    pub fn distances(&self) -> &Array2<f64> {
        &self.distances
    }
}

impl CandidateSource for PrecomputedCandidates {
    fn collect(&self, cell: usize, out: &mut Vec<Candidate>) -> Result<()> {
        out.clear();
        let mask = self.mask.row(cell);
        let distances = self.distances.row(cell);
        out.extend(
            mask.iter()
                .zip(distances.iter())
                .enumerate()
                .filter(|(_, (&member, _))| member)
                .map(|(event, (_, &distance_km))| Candidate { event, distance_km }),
        );
        Ok(())
    }
}
