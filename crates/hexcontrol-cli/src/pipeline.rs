//! Stage orchestration: study area, exposure, observation, decoding.
//!
//! Every stage runs in memory. Output tables are written by
//! [`RunOutput::write`] only once the whole run succeeded, so a failed or
//! cancelled run leaves no partial files.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use hexcontrol_core::{CellId, Event, EventKind, HexLattice, SpatialIndex, TimeGrid};
use hexcontrol_exposure::{ExposureEngine, ExposureMatrix};
use hexcontrol_hmm::{
    median_of_medians, BatchDecoder, CancellationToken, ControlMatrix, Encoding, HmmError, HmmModel,
    ObservationEncoder, ObservationMatrix,
};

use crate::config::RunConfig;
use crate::io::{self, EventFilter};

/// Spatial index of a run and the cells it covers.
pub struct StudyArea {
    index: Box<dyn SpatialIndex>,
    cells: Vec<CellId>,
}

impl StudyArea {
    /// Build the index named by `config` and tessellate the study area.
    ///
    /// A cell table, when configured, takes precedence over the lattice;
    /// without an area every cell of the table is studied.
    pub fn from_config(config: &RunConfig) -> Result<Self> {
        let (index, cells): (Box<dyn SpatialIndex>, Vec<CellId>) = match (&config.cell_table, &config.area) {
            (Some(path), area) => {
                let table = io::read_cell_table(path)?;
                let cells = match area {
                    Some(area) => table.tessellate(&area.to_polygon(), config.resolution)?,
                    None => table.cell_ids().cloned().collect(),
                };
                (Box::new(table), cells)
            }
            (None, Some(area)) => {
                let lattice = HexLattice::new(area.center());
                let cells = lattice
                    .tessellate(&area.to_polygon(), config.resolution)
                    .context("Failed to tessellate study area")?;
                (Box::new(lattice), cells)
            }
            (None, None) => anyhow::bail!("Either an area or a cell table is required"),
        };
        tracing::info!(cells = cells.len(), resolution = config.resolution, "study area tessellated");
        Ok(Self { index, cells })
    }

    /// The spatial index.
    pub fn index(&self) -> &dyn SpatialIndex {
        self.index.as_ref()
    }

    /// Cells studied, in row order of every output matrix.
    pub fn cells(&self) -> &[CellId] {
        &self.cells
    }

    /// Load the event table at `path`, keeping the configured countries and
    /// period.
    pub fn load_events(&self, config: &RunConfig, path: &Path) -> Result<Vec<Event>> {
        let filter = EventFilter {
            countries: &config.countries,
            start: config.start,
            end: config.end,
        };
        io::read_events(path, &filter, self.index(), config.resolution)
    }
}

/// Exposure matrices of both event kinds over the same cells and dates.
#[derive(Debug, Clone)]
pub struct Exposures {
    /// Exposure to conventional warfare
    pub conventional: ExposureMatrix,
    /// Exposure to terrorism
    pub terrorism: ExposureMatrix,
}

/// Compute both exposure matrices.
pub fn compute_exposures(
    config: &RunConfig,
    area: &StudyArea,
    grid: &TimeGrid,
    events: &[Event],
) -> Result<Exposures> {
    let engine = ExposureEngine::new(config.exposure.clone())?;
    let conventional = engine
        .compute(area.index(), area.cells(), events, EventKind::Conventional, grid)
        .context("Failed to compute conventional exposure")?;
    let terrorism = engine
        .compute(area.index(), area.cells(), events, EventKind::Terrorism, grid)
        .context("Failed to compute terrorism exposure")?;
    Ok(Exposures {
        conventional,
        terrorism,
    })
}

/// Encode exposures into observation symbols.
///
/// Logs the median of the conventional and terrorism Poisson scores, the
/// reference points for choosing the overlap `m`.
pub fn encode(config: &RunConfig, exposures: &Exposures) -> Result<Encoding> {
    let encoding = ObservationEncoder::new(config.encoder)?.encode(&exposures.terrorism, &exposures.conventional)?;
    tracing::info!(
        median_c = median_of_medians(&encoding.conventional_scores),
        median_t = median_of_medians(&encoding.terrorism_scores),
        "observation probabilities computed"
    );
    Ok(encoding)
}

/// Decode control paths with the territorial model seeded by the run's prior.
pub fn decode(
    config: &RunConfig,
    grid: &TimeGrid,
    observations: &ObservationMatrix,
    token: &CancellationToken,
) -> Result<ControlMatrix> {
    let model = HmmModel::territorial(config.prior())?;
    let decoder = BatchDecoder::new(Arc::new(model), config.decode_space);
    Ok(decoder.decode(observations, grid, token)?)
}

/// Everything a full run produces.
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// Exposure matrices
    pub exposures: Exposures,
    /// Observation symbols and the scores they were derived from
    pub encoding: Encoding,
    /// Decoded control states
    pub controls: ControlMatrix,
}

impl RunOutput {
    /// Write the four output tables into `dir`, named after `config`.
    pub fn write(&self, config: &RunConfig, dir: &Path) -> Result<Vec<PathBuf>> {
        let conventional = dir.join(config.exposure_file(EventKind::Conventional));
        let terrorism = dir.join(config.exposure_file(EventKind::Terrorism));
        let observations = dir.join(config.observation_file());
        let controls = dir.join(config.controls_file());

        io::write_exposure(&conventional, &self.exposures.conventional)?;
        io::write_exposure(&terrorism, &self.exposures.terrorism)?;
        io::write_observations(&observations, &self.encoding.observations)?;
        io::write_controls(&controls, &self.controls)?;
        Ok(vec![conventional, terrorism, observations, controls])
    }
}

/// Run every stage on the event table at `events`.
pub fn run(config: &RunConfig, events: &Path, token: &CancellationToken) -> Result<RunOutput> {
    config.validate()?;
    let grid = config.time_grid()?;
    let area = StudyArea::from_config(config)?;
    let events = area.load_events(config, events)?;

    let exposures = compute_exposures(config, &area, &grid, &events)?;
    if token.is_cancelled() {
        return Err(HmmError::Cancelled.into());
    }
    let encoding = encode(config, &exposures)?;
    let controls = decode(config, &grid, &encoding.observations, token)?;

    Ok(RunOutput {
        exposures,
        encoding,
        controls,
    })
}
