//! Observation encoding.
//!
//! Each date column is handled independently:
//!
//! 1. `λ` = mean exposure of the column. Every raw exposure `x` is scored
//!    with the Poisson density `exp(-λ) λ^x / Γ(x + 1)`, giving the
//!    terrorism scores `T` and the conventional scores `C`.
//! 2. Raw exposures below the truncation threshold `xs` are floored to 0.
//! 3. Each cell is classified, in this order:
//!    - [`Symbol::Quiet`] if both truncated exposures are exactly 0
//!    - [`Symbol::Contested`] if `|T − C| ≤ m`
//!    - [`Symbol::ConventionalDominant`] if `C > T`
//!    - [`Symbol::TerrorismDominant`] otherwise
//!
//! Scores are computed from raw exposures; truncation only feeds the quiet
//! test.

use std::collections::HashMap;
use std::fmt;

use chrono::NaiveDate;
use hexcontrol_core::{CellId, EventKind};
use hexcontrol_exposure::ExposureMatrix;
use ndarray::{Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

use crate::{HmmError, Result};

/// Number of observation symbols.
pub const ALPHABET_SIZE: usize = 4;

/// Observation alphabet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Symbol {
    /// No meaningful exposure to either kind (O1)
    Quiet = 0,
    /// Conventional exposure dominates (O2)
    ConventionalDominant = 1,
    /// Comparable exposure to both kinds (O3)
    Contested = 2,
    /// Terrorism exposure dominates (O4)
    TerrorismDominant = 3,
}

impl Symbol {
    /// All symbols in index order.
    pub const ALL: [Symbol; ALPHABET_SIZE] = [
        Symbol::Quiet,
        Symbol::ConventionalDominant,
        Symbol::Contested,
        Symbol::TerrorismDominant,
    ];

    /// Column of the emission matrix.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Symbol for an emission column, if in range.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Label `O1`..`O4`.
    pub fn label(self) -> &'static str {
        match self {
            Symbol::Quiet => "O1",
            Symbol::ConventionalDominant => "O2",
            Symbol::Contested => "O3",
            Symbol::TerrorismDominant => "O4",
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Smoothing parameters of the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderParams {
    /// Overlap `m` under which the two scores count as contested. Default: **0.15**.
    pub overlap: f64,
    /// Truncation threshold `xs` on raw exposures. Default: **0.01**.
    pub truncation: f64,
}

impl Default for EncoderParams {
    fn default() -> Self {
        Self {
            overlap: 0.15,
            truncation: 0.01,
        }
    }
}

impl EncoderParams {
    /// Both parameters must be finite and non-negative.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("overlap", self.overlap), ("truncation", self.truncation)] {
            if !value.is_finite() || value < 0.0 {
                return Err(HmmError::invalid_parameter(
                    name,
                    format!("must be finite and >= 0, got {value}"),
                ));
            }
        }
        Ok(())
    }

    /// Classify one cell at one date.
    ///
    /// `terrorism` and `conventional` are raw exposures; the scores are
    /// their Poisson scores.
    pub fn classify(
        &self,
        terrorism: f64,
        conventional: f64,
        terrorism_score: f64,
        conventional_score: f64,
    ) -> Symbol {
        let truncate = |x: f64| if x < self.truncation { 0.0 } else { x };
        if truncate(terrorism) == 0.0 && truncate(conventional) == 0.0 {
            Symbol::Quiet
        } else if (terrorism_score - conventional_score).abs() <= self.overlap {
            Symbol::Contested
        } else if conventional_score > terrorism_score {
            Symbol::ConventionalDominant
        } else {
            Symbol::TerrorismDominant
        }
    }
}

/// Poisson density of `x` under mean `lambda`, for real `x ≥ 0`.
///
/// A zero mean scores 1 at `x = 0` and 0 elsewhere.
pub fn poisson_score(x: f64, lambda: f64) -> f64 {
    if lambda <= 0.0 {
        return if x == 0.0 { 1.0 } else { 0.0 };
    }
    (-lambda + x * lambda.ln() - libm::lgamma(x + 1.0)).exp()
}

/// Poisson scores of every value, with `λ` the mean of each date column.
pub fn poisson_scores(exposure: &ExposureMatrix) -> Array2<f64> {
    let means = exposure.column_means();
    let mut scores = exposure.values().clone();
    for (mut column, &lambda) in scores.axis_iter_mut(Axis(1)).zip(means.iter()) {
        column.mapv_inplace(|x| poisson_score(x, lambda));
    }
    scores
}

/// Median of the column medians, or `None` for an empty matrix.
pub fn median_of_medians(values: &Array2<f64>) -> Option<f64> {
    let medians: Vec<f64> = values.axis_iter(Axis(1)).filter_map(median).collect();
    median(ArrayView1::from(medians.as_slice()))
}

fn median(values: ArrayView1<'_, f64>) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}

/// One observation symbol per cell (rows) and date (columns).
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationMatrix {
    cells: Vec<CellId>,
    dates: Vec<NaiveDate>,
    symbols: Array2<Symbol>,
}

impl ObservationMatrix {
    /// Assemble a matrix; `symbols` must be `cells × dates`.
    pub fn new(cells: Vec<CellId>, dates: Vec<NaiveDate>, symbols: Array2<Symbol>) -> Result<Self> {
        if symbols.nrows() != cells.len() {
            return Err(HmmError::shape_mismatch("cells", cells.len(), symbols.nrows()));
        }
        if symbols.ncols() != dates.len() {
            return Err(HmmError::shape_mismatch("dates", dates.len(), symbols.ncols()));
        }
        Ok(Self {
            cells,
            dates,
            symbols,
        })
    }

    /// Build from symbol indices, rejecting any index outside the alphabet.
    pub fn from_indices(cells: Vec<CellId>, dates: Vec<NaiveDate>, indices: Array2<usize>) -> Result<Self> {
        let n_dates = indices.ncols();
        if let Some((flat, &symbol)) = indices.iter().enumerate().find(|&(_, &i)| i >= ALPHABET_SIZE) {
            return Err(HmmError::InvalidObservation {
                symbol,
                position: flat % n_dates.max(1),
                alphabet: ALPHABET_SIZE,
            });
        }
        let symbols = indices.mapv(|i| Symbol::ALL[i]);
        Self::new(cells, dates, symbols)
    }

    /// Row labels.
    pub fn cells(&self) -> &[CellId] {
        &self.cells
    }

    /// Column labels.
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Symbols, `cells × dates`.
    pub fn symbols(&self) -> &Array2<Symbol> {
        &self.symbols
    }

    /// `(cells, dates)`.
    pub fn shape(&self) -> (usize, usize) {
        self.symbols.dim()
    }

    /// Symbol indices of one cell row.
    pub fn sequence(&self, row: usize) -> Vec<usize> {
        self.symbols.row(row).iter().map(|s| s.index()).collect()
    }

    /// Number of occurrences of each symbol.
    pub fn counts(&self) -> [usize; ALPHABET_SIZE] {
        let mut counts = [0; ALPHABET_SIZE];
        for symbol in &self.symbols {
            counts[symbol.index()] += 1;
        }
        counts
    }
}

/// Encoder output: the symbols and the two score matrices behind them.
#[derive(Debug, Clone)]
pub struct Encoding {
    /// Observation symbols
    pub observations: ObservationMatrix,
    /// Terrorism scores `T`, aligned with the observation rows
    pub terrorism_scores: Array2<f64>,
    /// Conventional scores `C`, aligned with the observation rows
    pub conventional_scores: Array2<f64>,
}

/// Turns two exposure matrices into observation symbols.
#[derive(Debug, Clone)]
pub struct ObservationEncoder {
    params: EncoderParams,
}

impl ObservationEncoder {
    /// Create an encoder with validated parameters.
    pub fn new(params: EncoderParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    /// Encoder parameters.
    pub fn params(&self) -> &EncoderParams {
        &self.params
    }

    /// Encode `terrorism` against `conventional`.
    ///
    /// Rows follow the cell order of `terrorism`; `conventional` may list the
    /// same cells in another order.
    ///
    /// # Errors
    ///
    /// [`HmmError::ShapeMismatch`] if the two matrices do not cover the same
    /// cells and dates (with the first differing label when the sizes agree), and
    /// [`HmmError::InvalidParameter`] if a matrix has the wrong event kind.
    pub fn encode(&self, terrorism: &ExposureMatrix, conventional: &ExposureMatrix) -> Result<Encoding> {
        check_kind("terrorism", terrorism, EventKind::Terrorism)?;
        check_kind("conventional", conventional, EventKind::Conventional)?;
        let order = align(terrorism, conventional)?;

        let t_scores = poisson_scores(terrorism);
        let c_scores = poisson_scores(conventional).select(Axis(0), &order);
        let c_raw = conventional.values().select(Axis(0), &order);
        let t_raw = terrorism.values();

        let (n_cells, n_dates) = terrorism.shape();
        let symbols = Array2::from_shape_fn((n_cells, n_dates), |(i, j)| {
            self.params
                .classify(t_raw[[i, j]], c_raw[[i, j]], t_scores[[i, j]], c_scores[[i, j]])
        });
        let observations =
            ObservationMatrix::new(terrorism.cells().to_vec(), terrorism.dates().to_vec(), symbols)?;

        let counts = observations.counts();
        tracing::info!(
            cells = n_cells,
            dates = n_dates,
            quiet = counts[0],
            conventional = counts[1],
            contested = counts[2],
            terrorism = counts[3],
            "observations encoded"
        );

        Ok(Encoding {
            observations,
            terrorism_scores: t_scores,
            conventional_scores: c_scores,
        })
    }
}

fn check_kind(name: &'static str, matrix: &ExposureMatrix, expected: EventKind) -> Result<()> {
    if matrix.kind() == expected {
        Ok(())
    } else {
        Err(HmmError::invalid_parameter(
            name,
            format!("expected a {expected} exposure matrix, got {}", matrix.kind()),
        ))
    }
}

/// Row of `conventional` for each row of `terrorism`.
fn align(terrorism: &ExposureMatrix, conventional: &ExposureMatrix) -> Result<Vec<usize>> {
    let (t_cells, c_cells) = (terrorism.cells(), conventional.cells());
    if t_cells.len() != c_cells.len() {
        return Err(HmmError::shape_mismatch("cells", t_cells.len(), c_cells.len()));
    }
    let (t_dates, c_dates) = (terrorism.dates(), conventional.dates());
    if t_dates.len() != c_dates.len() {
        return Err(HmmError::shape_mismatch("dates", t_dates.len(), c_dates.len()));
    }
    if let Some(position) = t_dates.iter().zip(c_dates).position(|(a, b)| a != b) {
        return Err(HmmError::label_mismatch(
            "dates",
            t_dates.len(),
            position,
            t_dates[position],
            c_dates[position],
        ));
    }

    if t_cells == c_cells {
        return Ok((0..t_cells.len()).collect());
    }
    let rows: HashMap<&CellId, usize> = c_cells.iter().enumerate().map(|(i, c)| (c, i)).collect();
    t_cells
        .iter()
        .enumerate()
        .map(|(position, cell)| {
            rows.get(cell)
                .copied()
                .ok_or_else(|| HmmError::label_mismatch("cells", t_cells.len(), position, cell, &c_cells[position]))
        })
        .collect()
}
