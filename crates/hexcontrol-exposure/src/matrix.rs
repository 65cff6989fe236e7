//! Cell × date exposure matrix.

use std::collections::HashSet;

use chrono::NaiveDate;
use hexcontrol_core::{CellId, EventKind};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

use crate::{ExposureError, Result};

/// Exposure of every cell (rows) at every decision date (columns) to one
/// event kind. Values are finite and non-negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposureMatrix {
    kind: EventKind,
    cells: Vec<CellId>,
    dates: Vec<NaiveDate>,
    values: Array2<f64>,
}

impl ExposureMatrix {
    /// Assemble a matrix, checking that `values` is `cells × dates`, that
    /// cells are unique and that every value is finite and non-negative.
    pub fn new(
        kind: EventKind,
        cells: Vec<CellId>,
        dates: Vec<NaiveDate>,
        values: Array2<f64>,
    ) -> Result<Self> {
        if values.nrows() != cells.len() {
            return Err(ExposureError::shape_mismatch("cells", cells.len(), values.nrows()));
        }
        if values.ncols() != dates.len() {
            return Err(ExposureError::shape_mismatch("dates", dates.len(), values.ncols()));
        }
        let mut seen = HashSet::with_capacity(cells.len());
        for cell in &cells {
            if !seen.insert(cell) {
                return Err(ExposureError::DuplicateCell(cell.clone()));
            }
        }
        if let Some(bad) = values.iter().find(|v| !v.is_finite() || **v < 0.0) {
            return Err(ExposureError::invalid_parameter(
                "values",
                format!("exposure must be finite and >= 0, found {bad}"),
            ));
        }
        Ok(Self {
            kind,
            cells,
            dates,
            values,
        })
    }

    /// Event kind this matrix measures.
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Row labels.
    pub fn cells(&self) -> &[CellId] {
        &self.cells
    }

    /// Column labels.
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Raw values, `cells × dates`.
    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    /// `(cells, dates)`.
    pub fn shape(&self) -> (usize, usize) {
        self.values.dim()
    }

    /// Exposure sequence of one cell row.
    pub fn row(&self, cell: usize) -> ArrayView1<'_, f64> {
        self.values.row(cell)
    }

    /// Row index of `cell`.
    pub fn position(&self, cell: &CellId) -> Option<usize> {
        self.cells.iter().position(|c| c == cell)
    }

    /// Mean exposure of each date column across all cells.
    ///
    /// Empty matrices yield zeros.
    pub fn column_means(&self) -> Array1<f64> {
        self.values
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(self.dates.len()))
    }

    /// Largest value, or 0 for an empty matrix.
    pub fn max(&self) -> f64 {
        self.values.iter().copied().fold(0.0, f64::max)
    }

    /// Consume the matrix and return its parts.
    pub fn into_parts(self) -> (EventKind, Vec<CellId>, Vec<NaiveDate>, Array2<f64>) {
        (self.kind, self.cells, self.dates, self.values)
    }
}
