//! Viterbi decoding in linear and log space.
//!
//! Recursion, with `⊗` the product in linear space and the sum in log space:
//!
//! ```text
//! V[s, 0] = π[s] ⊗ E[s, o0]
//! V[s, k] = max_p (V[p, k-1] ⊗ T[p, s]) ⊗ E[s, ok]
//! ```
//!
//! Every argmax scans states in ascending order and replaces the running best
//! only when a score beats it by more than a factor of `1 + TIE_TOLERANCE`:
//! a relative margin on products, an absolute margin on log sums. Scores that
//! are equal in exact arithmetic but rounded differently therefore tie, and
//! ties resolve to the lowest state index in both spaces. The log variant works on `ln(x + f64::MIN_POSITIVE)`, which
//! keeps exact zeros finite.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::{HmmError, Result};

/// Relative margin by which a path probability must beat the running best
/// to replace it.
pub const TIE_TOLERANCE: f64 = 1e-9;

/// Arithmetic used by the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodeSpace {
    /// Products of probabilities. Underflows on long sequences.
    Linear,
    /// Sums of log probabilities
    #[default]
    Log,
}

impl std::str::FromStr for DecodeSpace {
    type Err = HmmError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" | "lin" => Ok(Self::Linear),
            "log" => Ok(Self::Log),
            other => Err(HmmError::invalid_parameter(
                "decode_space",
                format!("unknown decode space '{other}' (expected linear or log)"),
            )),
        }
    }
}

/// Result of decoding one sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct ViterbiOutput {
    /// Most likely state index at each step
    pub path: Vec<usize>,
    /// Best partial-path score, `states × steps`
    pub trellis: Array2<f64>,
    /// Best predecessor of each state, `states × steps` (column 0 unused)
    pub backpointers: Array2<usize>,
}

/// Decode `observations` with probabilities `initial`, `transition`, `emission`.
///
/// Only dimensions and symbol range are checked here; stochastic validation
/// belongs to [`HmmModel`](crate::HmmModel).
pub fn viterbi(
    initial: ArrayView1<'_, f64>,
    transition: ArrayView2<'_, f64>,
    emission: ArrayView2<'_, f64>,
    observations: &[usize],
) -> Result<ViterbiOutput> {
    check_dimensions(initial, transition, emission)?;
    check_observations(observations, emission.ncols())?;
    Ok(decode_owned(initial, transition, emission, observations, Arithmetic::LINEAR))
}

/// Log-space counterpart of [`viterbi`]. The trellis holds log scores.
pub fn viterbi_log(
    initial: ArrayView1<'_, f64>,
    transition: ArrayView2<'_, f64>,
    emission: ArrayView2<'_, f64>,
    observations: &[usize],
) -> Result<ViterbiOutput> {
    check_dimensions(initial, transition, emission)?;
    check_observations(observations, emission.ncols())?;
    let initial = log_guarded(initial);
    let transition = log_guarded(transition);
    let emission = log_guarded(emission);
    Ok(decode_owned(
        initial.view(),
        transition.view(),
        emission.view(),
        observations,
        Arithmetic::LOG,
    ))
}

/// Combine step and score comparison of one decode space.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Arithmetic {
    combine: fn(f64, f64) -> f64,
    exceeds: fn(f64, f64) -> bool,
}

impl Arithmetic {
    pub(crate) const LINEAR: Self = Self {
        combine: |a, b| a * b,
        exceeds: |score, best| score - best > TIE_TOLERANCE * best.abs(),
    };

    pub(crate) const LOG: Self = Self {
        combine: |a, b| a + b,
        exceeds: |score, best| score - best > TIE_TOLERANCE,
    };
}

/// Element-wise `ln(x + f64::MIN_POSITIVE)`.
pub(crate) fn log_guarded<D: ndarray::Dimension>(
    values: ndarray::ArrayView<'_, f64, D>,
) -> ndarray::Array<f64, D> {
    values.mapv(|v| (v + f64::MIN_POSITIVE).ln())
}

pub(crate) fn check_dimensions(
    initial: ArrayView1<'_, f64>,
    transition: ArrayView2<'_, f64>,
    emission: ArrayView2<'_, f64>,
) -> Result<()> {
    let n = initial.len();
    if n == 0 {
        return Err(HmmError::invalid_model("initial", "at least one state is required"));
    }
    if transition.dim() != (n, n) {
        return Err(HmmError::invalid_model(
            "transition",
            format!("expected {n}x{n}, got {}x{}", transition.nrows(), transition.ncols()),
        ));
    }
    if emission.nrows() != n || emission.ncols() == 0 {
        return Err(HmmError::invalid_model(
            "emission",
            format!("expected {n}xK with K >= 1, got {}x{}", emission.nrows(), emission.ncols()),
        ));
    }
    Ok(())
}

pub(crate) fn check_observations(observations: &[usize], alphabet: usize) -> Result<()> {
    match observations.iter().position(|&o| o >= alphabet) {
        Some(position) => Err(HmmError::InvalidObservation {
            symbol: observations[position],
            position,
            alphabet,
        }),
        None => Ok(()),
    }
}

fn decode_owned(
    initial: ArrayView1<'_, f64>,
    transition: ArrayView2<'_, f64>,
    emission: ArrayView2<'_, f64>,
    observations: &[usize],
    arithmetic: Arithmetic,
) -> ViterbiOutput {
    let shape = (initial.len(), observations.len());
    let mut trellis = Array2::zeros(shape);
    let mut backpointers = Array2::zeros(shape);
    let mut path = Vec::with_capacity(observations.len());
    decode_into(
        initial,
        transition,
        emission,
        observations,
        arithmetic,
        &mut trellis,
        &mut backpointers,
        &mut path,
    );
    ViterbiOutput {
        path,
        trellis,
        backpointers,
    }
}

/// Run the recursion into caller-owned buffers.
///
/// Dimensions and symbols must already be checked; `trellis` and
/// `backpointers` must be at least `states × observations.len()`.
#[allow(clippy::too_many_arguments)]
pub(crate) fn decode_into(
    initial: ArrayView1<'_, f64>,
    transition: ArrayView2<'_, f64>,
    emission: ArrayView2<'_, f64>,
    observations: &[usize],
    arithmetic: Arithmetic,
    trellis: &mut Array2<f64>,
    backpointers: &mut Array2<usize>,
    path: &mut Vec<usize>,
) {
    path.clear();
    let Arithmetic { combine, exceeds } = arithmetic;
    let n = initial.len();
    let len = observations.len();
    if len == 0 {
        return;
    }

    for s in 0..n {
        trellis[[s, 0]] = combine(initial[s], emission[[s, observations[0]]]);
        backpointers[[s, 0]] = 0;
    }

    for k in 1..len {
        let symbol = observations[k];
        for s in 0..n {
            let mut best = 0;
            let mut best_score = combine(trellis[[0, k - 1]], transition[[0, s]]);
            for p in 1..n {
                let score = combine(trellis[[p, k - 1]], transition[[p, s]]);
                if exceeds(score, best_score) {
                    best = p;
                    best_score = score;
                }
            }
            trellis[[s, k]] = combine(best_score, emission[[s, symbol]]);
            backpointers[[s, k]] = best;
        }
    }

    let mut last = 0;
    for s in 1..n {
        if exceeds(trellis[[s, len - 1]], trellis[[last, len - 1]]) {
            last = s;
        }
    }

    path.resize(len, 0);
    path[len - 1] = last;
    for k in (0..len - 1).rev() {
        path[k] = backpointers[[path[k + 1], k + 1]];
    }
}

/// Log tables of a model, computed once per run.
#[derive(Debug, Clone)]
pub(crate) struct LogTables {
    pub(crate) initial: Array1<f64>,
    pub(crate) transition: Array2<f64>,
    pub(crate) emission: Array2<f64>,
}

impl LogTables {
    pub(crate) fn new(
        initial: ArrayView1<'_, f64>,
        transition: ArrayView2<'_, f64>,
        emission: ArrayView2<'_, f64>,
    ) -> Self {
        Self {
            initial: log_guarded(initial),
            transition: log_guarded(transition),
            emission: log_guarded(emission),
        }
    }
}
