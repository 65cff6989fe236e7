//! Per-cell decoding of a whole observation matrix.
//!
//! Cells are decoded independently on the rayon pool. Each worker owns its
//! trellis, backpointer and path buffers, sized `states × dates`, and reuses
//! them across the cells it decodes. The model is shared read-only.
//!
//! A [`CancellationToken`] is checked before each cell; once it fires the
//! batch returns [`HmmError::Cancelled`] and no partial result.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use hexcontrol_core::{CellId, TimeGrid};
use ndarray::{Array2, ArrayView1, ArrayView2};
use rayon::prelude::*;

use crate::model::{ControlState, HmmModel};
use crate::observation::ObservationMatrix;
use crate::viterbi::{check_observations, decode_into, Arithmetic, DecodeSpace};
use crate::{HmmError, Result};

/// Cooperative cancellation flag shared between a run and its controller.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a token that has not fired.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Decoded control state per cell (rows) and date (columns).
#[derive(Debug, Clone, PartialEq)]
pub struct ControlMatrix {
    cells: Vec<CellId>,
    dates: Vec<NaiveDate>,
    states: Array2<ControlState>,
}

impl ControlMatrix {
    /// Assemble a matrix; `states` must be `cells × dates`.
    pub fn new(cells: Vec<CellId>, dates: Vec<NaiveDate>, states: Array2<ControlState>) -> Result<Self> {
        if states.nrows() != cells.len() {
            return Err(HmmError::shape_mismatch("cells", cells.len(), states.nrows()));
        }
        if states.ncols() != dates.len() {
            return Err(HmmError::shape_mismatch("dates", dates.len(), states.ncols()));
        }
        Ok(Self { cells, dates, states })
    }

    /// Row labels.
    pub fn cells(&self) -> &[CellId] {
        &self.cells
    }

    /// Column labels.
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// States, `cells × dates`.
    pub fn states(&self) -> &Array2<ControlState> {
        &self.states
    }

    /// `(cells, dates)`.
    pub fn shape(&self) -> (usize, usize) {
        self.states.dim()
    }

    /// Decoded path of one cell row.
    pub fn path(&self, row: usize) -> ArrayView1<'_, ControlState> {
        self.states.row(row)
    }

    /// Rendering levels in `[0, 1]`.
    pub fn levels(&self) -> Array2<f64> {
        self.states.mapv(ControlState::level)
    }

    /// `(cell, state)` pairs at `date`, for a choropleth renderer.
    pub fn time_slice(&self, date: NaiveDate) -> Option<Vec<(&CellId, ControlState)>> {
        let column = self.dates.iter().position(|&d| d == date)?;
        Some(
            self.cells
                .iter()
                .zip(self.states.column(column).iter().copied())
                .collect(),
        )
    }
}

type Tables<'a> = (
    ArrayView1<'a, f64>,
    ArrayView2<'a, f64>,
    ArrayView2<'a, f64>,
    Arithmetic,
);

/// Worker-private decoding buffers.
struct Workspace {
    trellis: Array2<f64>,
    backpointers: Array2<usize>,
    path: Vec<usize>,
    sequence: Vec<usize>,
}

impl Workspace {
    fn new(states: usize, steps: usize) -> Self {
        Self {
            trellis: Array2::zeros((states, steps)),
            backpointers: Array2::zeros((states, steps)),
            path: Vec::with_capacity(steps),
            sequence: Vec::with_capacity(steps),
        }
    }
}

/// Decodes every cell of an [`ObservationMatrix`] with one shared model.
#[derive(Debug, Clone)]
pub struct BatchDecoder {
    model: Arc<HmmModel>,
    space: DecodeSpace,
}

impl BatchDecoder {
    /// Create a decoder.
    pub fn new(model: Arc<HmmModel>, space: DecodeSpace) -> Self {
        Self { model, space }
    }

    /// Shared model.
    pub fn model(&self) -> &HmmModel {
        &self.model
    }

    /// Arithmetic in use.
    pub fn space(&self) -> DecodeSpace {
        self.space
    }

    /// Decode `observations`, whose columns must be the dates of `grid`.
    ///
    /// # Errors
    ///
    /// [`HmmError::ShapeMismatch`] if the columns disagree with `grid` in
    /// number or in dates, [`HmmError::InvalidObservation`] if a
    /// symbol is outside the model alphabet, [`HmmError::Cancelled`] if
    /// `token` fires.
    pub fn decode(
        &self,
        observations: &ObservationMatrix,
        grid: &TimeGrid,
        token: &CancellationToken,
    ) -> Result<ControlMatrix> {
        check_grid(observations.dates(), grid.dates())?;
        let n_states = self.model.n_states();
        if n_states > ControlState::ALL.len() {
            return Err(HmmError::invalid_model(
                "initial",
                format!("{n_states} states cannot be mapped to control states"),
            ));
        }

        let (n_cells, n_dates) = observations.shape();
        tracing::debug!(cells = n_cells, dates = n_dates, space = ?self.space, "decoding control paths");

        let (initial, transition, emission, arithmetic): Tables<'_> = match self.space {
            DecodeSpace::Linear => (
                self.model.initial().view(),
                self.model.transition().view(),
                self.model.emission().view(),
                Arithmetic::LINEAR,
            ),
            DecodeSpace::Log => {
                let log = self.model.log_tables();
                (log.initial.view(), log.transition.view(), log.emission.view(), Arithmetic::LOG)
            }
        };
        let alphabet = self.model.n_symbols();

        let paths: Vec<Vec<ControlState>> = (0..n_cells)
            .into_par_iter()
            .map_init(
                || Workspace::new(n_states, n_dates),
                |ws, row| -> Result<Vec<ControlState>> {
                    if token.is_cancelled() {
                        return Err(HmmError::Cancelled);
                    }
                    ws.sequence.clear();
                    ws.sequence
                        .extend(observations.symbols().row(row).iter().map(|s| s.index()));
                    check_observations(&ws.sequence, alphabet)?;
                    decode_into(
                        initial,
                        transition,
                        emission,
                        &ws.sequence,
                        arithmetic,
                        &mut ws.trellis,
                        &mut ws.backpointers,
                        &mut ws.path,
                    );
                    Ok(ws
                        .path
                        .iter()
                        .filter_map(|&s| ControlState::from_index(s))
                        .collect())
                },
            )
            .collect::<Result<_>>()?;

        let flat: Vec<ControlState> = paths.into_iter().flatten().collect();
        let states = Array2::from_shape_vec((n_cells, n_dates), flat)
            .map_err(|_| HmmError::shape_mismatch("control states", n_cells * n_dates, 0))?;
        let controls = ControlMatrix::new(observations.cells().to_vec(), observations.dates().to_vec(), states)?;

        tracing::info!(cells = n_cells, dates = n_dates, "control paths decoded");
        Ok(controls)
    }
}

fn check_grid(dates: &[NaiveDate], expected: &[NaiveDate]) -> Result<()> {
    if dates.len() != expected.len() {
        return Err(HmmError::shape_mismatch("dates", expected.len(), dates.len()));
    }
    match dates.iter().zip(expected).position(|(a, b)| a != b) {
        Some(position) => Err(HmmError::label_mismatch(
            "dates",
            expected.len(),
            position,
            expected[position],
            dates[position],
        )),
        None => Ok(()),
    }
}
