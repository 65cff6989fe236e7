//! Exposure aggregation.
//!
//! The engine evaluates, for each cell row, the weights of that cell's
//! candidate events at every decision date. Which [`CandidateSource`] feeds
//! the rows is the only difference between the two strategies; the weighting
//! below is shared.
//!
//! In casualty-aware mode each contributing event is additionally weighted by
//! `wcas(mean, fatalities)`, where `mean` is the mean fatality count of the
//! cell's candidates aged 0 to `severity_window_days` days. A cell without
//! such recent events at a date takes the mean `wcas` of all cells that had
//! recent events at that date, or 0.5 if none had. That mean runs over every
//! non-future candidate of those cells, including events older than the window.

use std::collections::HashSet;

use hexcontrol_core::{CellId, Event, EventKind, SpatialIndex, TimeGrid};
use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::candidates::{
    day_number, Candidate, CandidateSource, DirectCandidates, EventColumns, PrecomputedCandidates,
};
use crate::decay::DecayParams;
use crate::matrix::ExposureMatrix;
use crate::{ExposureError, Result};

/// `Auto` switches to the precomputed strategy at this many cell × event pairs.
pub const DEFAULT_PRECOMPUTE_THRESHOLD: usize = 50_000;

/// Severity weight used when no cell has recent events at a date.
const NEUTRAL_SEVERITY: f64 = 0.5;

/// How candidate events are enumerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExposureStrategy {
    /// Pick by problem size
    #[default]
    Auto,
    /// Ring query and distance per cell
    Direct,
    /// Dense ring mask and distance matrix, rows evaluated in parallel
    Precomputed,
}

impl std::str::FromStr for ExposureStrategy {
    type Err = ExposureError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "direct" => Ok(Self::Direct),
            "precomputed" => Ok(Self::Precomputed),
            other => Err(ExposureError::invalid_parameter(
                "strategy",
                format!("unknown strategy '{other}' (expected auto, direct or precomputed)"),
            )),
        }
    }
}

/// Exposure engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExposureParams {
    /// Decay curves and ring radius.
    pub decay: DecayParams,
    /// Candidate enumeration strategy. Default: **Auto**.
    pub strategy: ExposureStrategy,
    /// Cell × event pair count from which `Auto` precomputes. Default: **50 000**.
    pub precompute_threshold: usize,
    /// Multiply each contribution by the severity weight. Default: **false**.
    pub casualty_weighting: bool,
}

impl Default for ExposureParams {
    fn default() -> Self {
        Self {
            decay: DecayParams::default(),
            strategy: ExposureStrategy::Auto,
            precompute_threshold: DEFAULT_PRECOMPUTE_THRESHOLD,
            casualty_weighting: false,
        }
    }
}

impl ExposureParams {
    /// Validate the decay parameters.
    pub fn validate(&self) -> Result<()> {
        self.decay.validate()
    }

    /// Strategy actually used for a problem of `cells × events` pairs.
    pub fn resolve_strategy(&self, cells: usize, events: usize) -> ExposureStrategy {
        match self.strategy {
            ExposureStrategy::Auto if cells.saturating_mul(events) >= self.precompute_threshold => {
                ExposureStrategy::Precomputed
            }
            ExposureStrategy::Auto => ExposureStrategy::Direct,
            fixed => fixed,
        }
    }
}

/// Contribution of one cell at one date, before the severity fallback.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Term {
    /// Final value
    Plain(f64),
    /// Casualty-weighted value and the severity weights it used
    Weighted { exposure: f64, wcas_sum: f64, wcas_count: usize },
    /// No recent event: `Σ wd · wa`, still to be scaled by the fallback
    Pending(f64),
}

/// Computes [`ExposureMatrix`] values from events.
#[derive(Debug, Clone)]
pub struct ExposureEngine {
    params: ExposureParams,
}

impl ExposureEngine {
    /// Create an engine with validated parameters.
    pub fn new(params: ExposureParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    /// Engine parameters.
    pub fn params(&self) -> &ExposureParams {
        &self.params
    }

    /// Exposure of `cells` to the events of `kind` at every date of `grid`.
    ///
    /// Only events located in a cell within the ring radius of a target cell
    /// contribute to it. Events dated after a decision date contribute 0 at
    /// that date.
    ///
    /// # Errors
    ///
    /// Spatial failures (unknown cell, ring query failure) are returned as
    /// [`ExposureError::Spatial`]; duplicate cells as
    /// [`ExposureError::DuplicateCell`].
    pub fn compute(
        &self,
        index: &dyn SpatialIndex,
        cells: &[CellId],
        events: &[Event],
        kind: EventKind,
        grid: &TimeGrid,
    ) -> Result<ExposureMatrix> {
        ensure_unique(cells)?;
        let columns = EventColumns::of_kind(events, kind);
        let strategy = self.params.resolve_strategy(cells.len(), columns.len());
        let radius = self.params.decay.ring_radius;

        tracing::debug!(
            %kind,
            cells = cells.len(),
            events = columns.len(),
            dates = grid.len(),
            ?strategy,
            "computing exposure"
        );

        let decision_days: Vec<i64> = grid.dates().iter().map(|&d| day_number(d)).collect();
        let terms = match strategy {
            ExposureStrategy::Precomputed => {
                let source = PrecomputedCandidates::build(index, cells, &columns, radius)?;
                self.rows_parallel(&source, cells.len(), &columns, &decision_days)?
            }
            _ => {
                let source = DirectCandidates::new(index, cells, &columns, radius)?;
                self.rows_sequential(&source, cells.len(), &columns, &decision_days)?
            }
        };

        let values = self.finalize(terms, cells.len(), decision_days.len());
        let matrix = ExposureMatrix::new(kind, cells.to_vec(), grid.dates().to_vec(), values)?;

        tracing::info!(
            %kind,
            cells = matrix.shape().0,
            dates = matrix.shape().1,
            max = matrix.max(),
            "exposure computed"
        );
        Ok(matrix)
    }

    fn rows_sequential<S: CandidateSource>(
        &self,
        source: &S,
        n_cells: usize,
        columns: &EventColumns,
        decision_days: &[i64],
    ) -> Result<Vec<Vec<Term>>> {
        let mut scratch = Vec::new();
        (0..n_cells)
            .map(|cell| -> Result<Vec<Term>> {
                source.collect(cell, &mut scratch)?;
                Ok(self.row_terms(&scratch, columns, decision_days))
            })
            .collect()
    }

    fn rows_parallel<S: CandidateSource>(
        &self,
        source: &S,
        n_cells: usize,
        columns: &EventColumns,
        decision_days: &[i64],
    ) -> Result<Vec<Vec<Term>>> {
        (0..n_cells)
            .into_par_iter()
            .map_init(Vec::new, |scratch, cell| -> Result<Vec<Term>> {
                source.collect(cell, scratch)?;
                Ok(self.row_terms(scratch, columns, decision_days))
            })
            .collect()
    }

    /// Terms of one cell at every decision date.
    fn row_terms(&self, candidates: &[Candidate], columns: &EventColumns, decision_days: &[i64]) -> Vec<Term> {
        let decay = &self.params.decay;
        let distance_weights: Vec<f64> = candidates
            .iter()
            .map(|c| decay.distance_weight(c.distance_km))
            .collect();

        decision_days
            .iter()
            .map(|&today| {
                if !self.params.casualty_weighting {
                    let base = candidates
                        .iter()
                        .zip(&distance_weights)
                        .map(|(c, wd)| wd * decay.age_weight((today - columns.day(c.event)) as f64))
                        .sum();
                    return Term::Plain(base);
                }

                let (recent_sum, recent_count) = candidates
                    .iter()
                    .filter(|c| {
                        let age = today - columns.day(c.event);
                        (0..=decay.severity_window_days).contains(&age)
                    })
                    .fold((0.0, 0usize), |(sum, n), c| (sum + columns.fatalities(c.event), n + 1));

                if recent_count == 0 {
                    let base = candidates
                        .iter()
                        .zip(&distance_weights)
                        .map(|(c, wd)| wd * decay.age_weight((today - columns.day(c.event)) as f64))
                        .sum();
                    return Term::Pending(base);
                }

                let mean = recent_sum / recent_count as f64;
                let mut exposure = 0.0;
                let mut wcas_sum = 0.0;
                let mut wcas_count = 0;
                for (c, wd) in candidates.iter().zip(&distance_weights) {
                    let age = today - columns.day(c.event);
                    if age < 0 {
                        continue;
                    }
                    let wcas = decay.severity_weight(mean, columns.fatalities(c.event));
                    exposure += wd * decay.age_weight(age as f64) * wcas;
                    wcas_sum += wcas;
                    wcas_count += 1;
                }
                Term::Weighted {
                    exposure,
                    wcas_sum,
                    wcas_count,
                }
            })
            .collect()
    }

    /// Resolve pending terms with the per-date severity fallback.
    fn finalize(&self, terms: Vec<Vec<Term>>, n_cells: usize, n_dates: usize) -> Array2<f64> {
        let mut fallback = vec![(0.0, 0usize); n_dates];
        for row in &terms {
            for (slot, term) in fallback.iter_mut().zip(row) {
                if let Term::Weighted { wcas_sum, wcas_count, .. } = *term {
                    slot.0 += wcas_sum;
                    slot.1 += wcas_count;
                }
            }
        }
        let fallback: Vec<f64> = fallback
            .into_iter()
            .map(|(sum, n)| if n == 0 { NEUTRAL_SEVERITY } else { sum / n as f64 })
            .collect();

        let mut imputed = 0usize;
        let values = Array2::from_shape_fn((n_cells, n_dates), |(i, j)| match terms[i][j] {
            Term::Plain(v) => v,
            Term::Weighted { exposure, .. } => exposure,
            Term::Pending(base) => {
                if base > 0.0 {
                    imputed += 1;
                }
                base * fallback[j]
            }
        });

        if imputed > 0 {
            tracing::warn!(
                cells_dates = imputed,
                "no recent events in candidate set, severity weight imputed from date mean"
            );
        }
        values
    }
}

fn ensure_unique(cells: &[CellId]) -> Result<()> {
    let mut seen = HashSet::with_capacity(cells.len());
    match cells.iter().find(|cell| !seen.insert(*cell)) {
        Some(cell) => Err(ExposureError::DuplicateCell(cell.clone())),
        None => Ok(()),
    }
}
