//! CSV persistence.
//!
//! Inputs are the normalized event table and an optional cell table. Outputs
//! are rectangular tables with a leading `cell` column and one column per
//! decision date:
//!
//! ```text
//! cell,2015-01-31,2015-02-28,...
//! hx:5:0:0,0.0312,0.1875,...
//! ```

use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use geo::point;
use hexcontrol_core::{CellId, CellTable, Event, EventKind, SpatialIndex};
use hexcontrol_exposure::ExposureMatrix;
use hexcontrol_hmm::{ControlMatrix, ObservationMatrix};
use ndarray::Array2;
use serde::Deserialize;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// One row of the normalized event table.
#[derive(Debug, Deserialize)]
struct EventRecord {
    timestamp: NaiveDate,
    country: String,
    latitude: f64,
    longitude: f64,
    fatalities: u32,
    #[serde(rename = "type")]
    kind: EventKind,
    #[serde(default)]
    cell: Option<String>,
}

/// One row of a cell table.
#[derive(Debug, Deserialize)]
struct CellRecord {
    cell: String,
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    neighbors: String,
}

/// Countries and period an event must fall in to be kept.
#[derive(Debug, Clone, Copy)]
pub struct EventFilter<'a> {
    /// Accepted countries, compared case-insensitively
    pub countries: &'a [String],
    /// First accepted day
    pub start: NaiveDate,
    /// Last accepted day
    pub end: NaiveDate,
}

impl EventFilter<'_> {
    fn accepts(&self, country: &str, date: NaiveDate) -> bool {
        date >= self.start
            && date <= self.end
            && self.countries.iter().any(|c| c.eq_ignore_ascii_case(country.trim()))
    }
}

/// Read the normalized event table at `path`.
///
/// Events outside `filter` are dropped. Rows without a `cell` are assigned
/// the cell of `index` containing them at `resolution`; rows the index
/// cannot place are dropped with a warning.
pub fn read_events(
    path: &Path,
    filter: &EventFilter<'_>,
    index: &dyn SpatialIndex,
    resolution: u8,
) -> Result<Vec<Event>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open event table {}", path.display()))?;

    let mut events = Vec::new();
    let (mut filtered, mut unplaced) = (0usize, 0usize);
    for (line, record) in reader.deserialize::<EventRecord>().enumerate() {
        let record = record.with_context(|| format!("Malformed event at row {} of {}", line + 1, path.display()))?;
        if !filter.accepts(&record.country, record.timestamp) {
            filtered += 1;
            continue;
        }
        let location = point!(x: record.longitude, y: record.latitude);
        let cell = match record.cell.filter(|c| !c.trim().is_empty()) {
            Some(cell) => CellId::new(cell.trim()),
            None => match index.locate(location, resolution) {
                Some(cell) => cell,
                None => {
                    unplaced += 1;
                    continue;
                }
            },
        };
        events.push(Event::new(
            record.timestamp,
            record.country,
            location,
            record.fatalities,
            record.kind,
            cell,
        ));
    }

    if unplaced > 0 {
        tracing::warn!(unplaced, "events outside the spatial index were dropped");
    }
    tracing::info!(events = events.len(), filtered, path = %path.display(), "events loaded");
    Ok(events)
}

/// Read a cell table with columns `cell,latitude,longitude,neighbors`.
///
/// Neighbors are separated by `;` or whitespace.
pub fn read_cell_table(path: &Path) -> Result<CellTable> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open cell table {}", path.display()))?;

    let mut table = CellTable::new();
    for (line, record) in reader.deserialize::<CellRecord>().enumerate() {
        let record = record.with_context(|| format!("Malformed cell at row {} of {}", line + 1, path.display()))?;
        let neighbors = record
            .neighbors
            .split(|c: char| c == ';' || c.is_whitespace())
            .filter(|n| !n.is_empty())
            .map(CellId::from)
            .collect();
        table.insert(
            CellId::new(record.cell.trim()),
            point!(x: record.longitude, y: record.latitude),
            neighbors,
        );
    }
    if table.is_empty() {
        bail!("Cell table {} has no cell", path.display());
    }
    Ok(table)
}

/// Matrix table as read back from disk, before typing its values.
struct RawTable {
    cells: Vec<CellId>,
    dates: Vec<NaiveDate>,
    values: Vec<String>,
}

fn read_table(path: &Path) -> Result<RawTable> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open table {}", path.display()))?;

    let headers = reader.headers()?.clone();
    match headers.get(0) {
        Some("cell") => {}
        other => bail!("{}: first column must be `cell`, found {:?}", path.display(), other),
    }
    let dates = headers
        .iter()
        .skip(1)
        .map(|h| {
            NaiveDate::parse_from_str(h.trim(), DATE_FORMAT)
                .with_context(|| format!("{}: column `{h}` is not a date", path.display()))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut cells = Vec::new();
    let mut values = Vec::new();
    for record in reader.records() {
        let record = record?;
        let mut fields = record.iter();
        let cell = fields.next().unwrap_or_default();
        cells.push(CellId::new(cell));
        values.extend(fields.map(str::to_string));
    }
    if values.len() != cells.len() * dates.len() {
        bail!("{}: rows do not all have {} date columns", path.display(), dates.len());
    }
    Ok(RawTable { cells, dates, values })
}

fn write_table<F>(path: &Path, cells: &[CellId], dates: &[NaiveDate], value: F) -> Result<()>
where
    F: Fn(usize, usize) -> String,
{
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    let mut header = Vec::with_capacity(dates.len() + 1);
    header.push("cell".to_string());
    header.extend(dates.iter().map(|d| d.format(DATE_FORMAT).to_string()));
    writer.write_record(&header)?;

    for (i, cell) in cells.iter().enumerate() {
        let mut row = Vec::with_capacity(dates.len() + 1);
        row.push(cell.to_string());
        row.extend((0..dates.len()).map(|j| value(i, j)));
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write an exposure matrix.
pub fn write_exposure(path: &Path, matrix: &ExposureMatrix) -> Result<()> {
    let values = matrix.values();
    write_table(path, matrix.cells(), matrix.dates(), |i, j| values[[i, j]].to_string())
}

/// Read an exposure matrix of `kind`.
pub fn read_exposure(path: &Path, kind: EventKind) -> Result<ExposureMatrix> {
    let raw = read_table(path)?;
    let values = raw
        .values
        .iter()
        .map(|v| {
            v.trim()
                .parse::<f64>()
                .with_context(|| format!("{}: `{v}` is not a number", path.display()))
        })
        .collect::<Result<Vec<_>>>()?;
    let values = Array2::from_shape_vec((raw.cells.len(), raw.dates.len()), values)?;
    Ok(ExposureMatrix::new(kind, raw.cells, raw.dates, values)?)
}

/// Write an observation matrix as symbol indices.
pub fn write_observations(path: &Path, observations: &ObservationMatrix) -> Result<()> {
    let symbols = observations.symbols();
    write_table(path, observations.cells(), observations.dates(), |i, j| {
        symbols[[i, j]].index().to_string()
    })
}

/// Read an observation matrix of symbol indices.
pub fn read_observations(path: &Path) -> Result<ObservationMatrix> {
    let raw = read_table(path)?;
    let indices = raw
        .values
        .iter()
        .map(|v| {
            v.trim()
                .parse::<usize>()
                .with_context(|| format!("{}: `{v}` is not a symbol index", path.display()))
        })
        .collect::<Result<Vec<_>>>()?;
    let indices = Array2::from_shape_vec((raw.cells.len(), raw.dates.len()), indices)?;
    Ok(ObservationMatrix::from_indices(raw.cells, raw.dates, indices)?)
}

/// Write a control matrix as state labels.
pub fn write_controls(path: &Path, controls: &ControlMatrix) -> Result<()> {
    let states = controls.states();
    write_table(path, controls.cells(), controls.dates(), |i, j| {
        states[[i, j]].label().to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hexcontrol_core::HexLattice;
    use hexcontrol_hmm::Symbol;
    use tempfile::tempdir;

    #[test]
    fn test_read_events_filters_and_locates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.csv");
        std::fs::write(
            &path,
            "timestamp,country,latitude,longitude,fatalities,type,cell\n\
             2015-03-02,Nigeria,11.0,13.0,4,terrorism,\n\
             2015-03-05,nigeria,11.0,13.0,0,conventional,custom-cell\n\
             2015-03-05,Niger,11.0,13.0,2,terrorism,\n\
             2007-03-05,Nigeria,11.0,13.0,2,terrorism,\n",
        )
        .unwrap();

        let lattice = HexLattice::new(point!(x: 13.0, y: 11.0));
        let countries = vec!["Nigeria".to_string()];
        let filter = EventFilter {
            countries: &countries,
            start: NaiveDate::from_ymd_opt(2008, 1, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2019, 12, 31).unwrap(),
        };
        let events = read_events(&path, &filter, &lattice, 5).unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind(), EventKind::Terrorism);
        assert_eq!(events[0].cell(), &lattice.locate(point!(x: 13.0, y: 11.0), 5).unwrap());
        assert_eq!(events[1].cell().as_str(), "custom-cell");
        assert_eq!(events[1].fatalities(), 0);
    }

    #[test]
    fn test_read_events_without_cell_column() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.csv");
        std::fs::write(
            &path,
            "timestamp,country,latitude,longitude,fatalities,type\n2012-06-01,Iraq,33.3,44.4,1,conventional\n",
        )
        .unwrap();
        let lattice = HexLattice::new(point!(x: 44.0, y: 33.0));
        let countries = vec!["Iraq".to_string()];
        let filter = EventFilter {
            countries: &countries,
            start: NaiveDate::from_ymd_opt(2012, 1, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2012, 12, 31).unwrap(),
        };
        let events = read_events(&path, &filter, &lattice, 5).unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_malformed_event_row() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.csv");
        std::fs::write(
            &path,
            "timestamp,country,latitude,longitude,fatalities,type\n2012-06-01,Iraq,33.3,44.4,1,airstrike\n",
        )
        .unwrap();
        let lattice = HexLattice::new(point!(x: 44.0, y: 33.0));
        let countries = vec!["Iraq".to_string()];
        let filter = EventFilter {
            countries: &countries,
            start: NaiveDate::from_ymd_opt(2012, 1, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2012, 12, 31).unwrap(),
        };
        assert!(read_events(&path, &filter, &lattice, 5).is_err());
    }

    #[test]
    fn test_cell_table() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cells.csv");
        std::fs::write(
            &path,
            "cell,latitude,longitude,neighbors\na,10.0,10.0,b\nb,10.0,10.1,a;c\nc,10.0,10.2,b\n",
        )
        .unwrap();
        let table = read_cell_table(&path).unwrap();
        assert_eq!(table.len(), 3);
        let ring = table.ring(&CellId::from("a"), 2).unwrap();
        assert_eq!(ring.len(), 3);
    }

    #[test]
    fn test_exposure_table_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out").join("exposure.csv");
        let dates = vec![
            NaiveDate::from_ymd_opt(2015, 1, 31).unwrap(),
            NaiveDate::from_ymd_opt(2015, 2, 28).unwrap(),
        ];
        let cells = vec![CellId::from("x"), CellId::from("y")];
        let values = ndarray::array![[0.1, 0.0], [1.0 / 3.0, 2.5e-9]];
        let matrix = ExposureMatrix::new(EventKind::Terrorism, cells, dates, values).unwrap();

        write_exposure(&path, &matrix).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("cell,2015-01-31,2015-02-28\n"));

        let reloaded = read_exposure(&path, EventKind::Terrorism).unwrap();
        assert_eq!(reloaded.values(), matrix.values());
        assert_eq!(reloaded.cells(), matrix.cells());
    }

    #[test]
    fn test_observation_table_rejects_bad_symbol() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("obs.csv");
        std::fs::write(&path, "cell,2015-01-31\na,2\nb,7\n").unwrap();
        assert!(read_observations(&path).is_err());

        std::fs::write(&path, "cell,2015-01-31\na,2\nb,3\n").unwrap();
        let obs = read_observations(&path).unwrap();
        assert_eq!(obs.symbols()[[1, 0]], Symbol::TerrorismDominant);
    }

    #[test]
    fn test_table_requires_cell_column() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("obs.csv");
        std::fs::write(&path, "id,2015-01-31\na,2\n").unwrap();
        assert!(read_observations(&path).is_err());
    }
}
