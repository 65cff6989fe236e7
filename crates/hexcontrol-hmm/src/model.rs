//! Validated hidden Markov model parameters.

use std::fmt;

use ndarray::{array, Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::viterbi::{check_dimensions, LogTables};
use crate::{HmmError, Result};

/// Allowed deviation of a probability vector's sum from 1.
pub const STOCHASTIC_TOLERANCE: f64 = 1e-6;

/// Territorial-control levels, from rebel to government control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ControlState {
    /// Rebel control
    R,
    /// Disputed, rebel-leaning
    DR,
    /// Disputed
    D,
    /// Disputed, government-leaning
    DG,
    /// Government control
    G,
}

impl ControlState {
    /// All states in index order.
    pub const ALL: [ControlState; 5] = [
        ControlState::R,
        ControlState::DR,
        ControlState::D,
        ControlState::DG,
        ControlState::G,
    ];

    /// State index in the model.
    pub fn index(self) -> usize {
        self as usize
    }

    /// State at `index`, if any.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Short label used in control tables.
    pub fn label(self) -> &'static str {
        match self {
            ControlState::R => "R",
            ControlState::DR => "DR",
            ControlState::D => "D",
            ControlState::DG => "DG",
            ControlState::G => "G",
        }
    }

    /// Rendering level in `[0, 1]`.
    pub fn level(self) -> f64 {
        self.index() as f64 / 4.0
    }
}

impl fmt::Display for ControlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for ControlState {
    type Err = HmmError;

    fn from_str(s: &str) -> Result<Self> {
        ControlState::ALL
            .into_iter()
            .find(|state| state.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| HmmError::invalid_parameter("control_state", format!("unknown state '{s}'")))
    }
}

/// Initial distribution `π`, transition matrix `T` and emission matrix `E`.
///
/// Construction checks that every component is stochastic; the parameters
/// are immutable afterwards.
#[derive(Debug, Clone)]
pub struct HmmModel {
    initial: Array1<f64>,
    transition: Array2<f64>,
    emission: Array2<f64>,
    log: LogTables,
}

impl HmmModel {
    /// Validate and assemble a model.
    ///
    /// # Errors
    ///
    /// [`HmmError::InvalidModelParameters`] if dimensions disagree, if an
    /// entry is negative or not finite, or if `π` or a row of `T` or `E` does
    /// not sum to 1 within [`STOCHASTIC_TOLERANCE`].
    pub fn new(initial: Array1<f64>, transition: Array2<f64>, emission: Array2<f64>) -> Result<Self> {
        check_dimensions(initial.view(), transition.view(), emission.view())?;
        check_distribution("initial", None, initial.view())?;
        for (row, values) in transition.rows().into_iter().enumerate() {
            check_distribution("transition", Some(row), values)?;
        }
        for (row, values) in emission.rows().into_iter().enumerate() {
            check_distribution("emission", Some(row), values)?;
        }

        let log = LogTables::new(initial.view(), transition.view(), emission.view());
        Ok(Self {
            initial,
            transition,
            emission,
            log,
        })
    }

    /// The five-state territorial-control model with emission alphabet
    /// O1..O4, seeded with `prior`.
    pub fn territorial(prior: &[f64]) -> Result<Self> {
        let transition = array![
            [0.250, 0.500, 0.025, 0.200, 0.025],
            [0.250, 0.150, 0.075, 0.500, 0.025],
            [0.050, 0.025, 0.050, 0.850, 0.025],
            [0.025, 0.075, 0.150, 0.125, 0.625],
            [0.050, 0.075, 0.475, 0.025, 0.375],
        ];
        let emission = array![
            [0.600, 0.175, 0.175, 0.050],
            [0.050, 0.600, 0.175, 0.175],
            [0.050, 0.175, 0.600, 0.175],
            [0.050, 0.175, 0.175, 0.600],
            [0.600, 0.050, 0.175, 0.175],
        ];
        Self::new(Array1::from(prior.to_vec()), transition, emission)
    }

    /// Number of hidden states `N`.
    pub fn n_states(&self) -> usize {
        self.initial.len()
    }

    /// Alphabet size `K`.
    pub fn n_symbols(&self) -> usize {
        self.emission.ncols()
    }

    /// Initial distribution `π`.
    pub fn initial(&self) -> &Array1<f64> {
        &self.initial
    }

    /// Transition matrix `T`, `N × N`.
    pub fn transition(&self) -> &Array2<f64> {
        &self.transition
    }

    /// Emission matrix `E`, `N × K`.
    pub fn emission(&self) -> &Array2<f64> {
        &self.emission
    }

    pub(crate) fn log_tables(&self) -> &LogTables {
        &self.log
    }
}

/// Check that `values` is a probability vector.
pub(crate) fn check_distribution(
    component: &'static str,
    row: Option<usize>,
    values: ArrayView1<'_, f64>,
) -> Result<()> {
    let place = || match row {
        Some(row) => format!("row {row}"),
        None => "vector".to_string(),
    };
    if let Some(bad) = values.iter().find(|v| !v.is_finite() || **v < 0.0) {
        return Err(HmmError::invalid_model(
            component,
            format!("{} has invalid probability {bad}", place()),
        ));
    }
    let sum: f64 = values.sum();
    if (sum - 1.0).abs() > STOCHASTIC_TOLERANCE {
        return Err(HmmError::invalid_model(
            component,
            format!("{} sums to {sum}, expected 1", place()),
        ));
    }
    Ok(())
}
