//! Run configuration for the hexcontrol pipeline.
//!
//! [`RunConfig`] carries every parameter of one run: the study countries and
//! period, the tessellation, the exposure and encoder parameters, the decode
//! arithmetic and the country prior table. It is serializable via [`serde`]
//! so a run can be described by a JSON file and reproduced later.
//!
//! # Example
//!
//! ```rust
//! use hexcontrol_cli::config::RunConfig;
//!
//! let cfg = RunConfig::default();
//! cfg.validate().expect("default config is valid");
//!
//! assert_eq!(cfg.countries, vec!["Nigeria".to_string()]);
//! assert_eq!(cfg.resolution, 5);
//! ```

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use geo::{point, polygon, Point, Polygon};
use hexcontrol_core::{EventKind, Frequency, HexLattice, TimeGrid};
use hexcontrol_exposure::ExposureParams;
use hexcontrol_hmm::{CountryPriors, DecodeSpace, EncoderParams};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors while loading or validating a [`RunConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read or written.
    #[error("Cannot access config file {path}: {source}")]
    FileRead {
        /// Path of the file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A field holds an unusable value.
    #[error("Invalid config value for `{field}`: {reason}")]
    InvalidValue {
        /// Name of the field
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },
}

impl ConfigError {
    /// Creates an invalid value error.
    #[must_use]
    pub fn invalid_value(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}

/// Longitude/latitude rectangle enclosing the study area.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Western edge, degrees
    pub min_lon: f64,
    /// Southern edge, degrees
    pub min_lat: f64,
    /// Eastern edge, degrees
    pub max_lon: f64,
    /// Northern edge, degrees
    pub max_lat: f64,
}

impl BoundingBox {
    /// Center point, used as the lattice origin.
    pub fn center(&self) -> Point<f64> {
        point!(
            x: (self.min_lon + self.max_lon) / 2.0,
            y: (self.min_lat + self.max_lat) / 2.0
        )
    }

    /// The rectangle as a closed polygon.
    pub fn to_polygon(&self) -> Polygon<f64> {
        polygon![
            (x: self.min_lon, y: self.min_lat),
            (x: self.max_lon, y: self.min_lat),
            (x: self.max_lon, y: self.max_lat),
            (x: self.min_lon, y: self.max_lat),
        ]
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let all = [self.min_lon, self.min_lat, self.max_lon, self.max_lat];
        if all.iter().any(|v| !v.is_finite()) {
            return Err(ConfigError::invalid_value("area", "coordinates must be finite"));
        }
        if self.min_lon >= self.max_lon || self.min_lat >= self.max_lat {
            return Err(ConfigError::invalid_value("area", "min must be below max on both axes"));
        }
        if self.min_lat < -90.0 || self.max_lat > 90.0 {
            return Err(ConfigError::invalid_value("area", "latitude outside [-90, 90]"));
        }
        Ok(())
    }
}

/// Complete configuration of one pipeline run.
///
/// Every field has a default; a JSON file only needs to name the fields it
/// overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Countries whose events are kept. The first one selects the prior.
    /// Default: **`["Nigeria"]`**.
    pub countries: Vec<String>,

    /// First day of the study period. Default: **2008-01-01**.
    pub start: NaiveDate,

    /// Last day of the study period. Default: **2019-12-31**.
    pub end: NaiveDate,

    /// Tessellation resolution (0-15). Default: **5**.
    pub resolution: u8,

    /// Spacing of decision dates. Default: **MonthEnd**.
    pub frequency: Frequency,

    /// Study area tessellated with a hexagonal lattice. Ignored for
    /// tessellation when `cell_table` is set, but still used to filter the
    /// table's cells. Default: a box around Nigeria.
    pub area: Option<BoundingBox>,

    /// Optional cell table (`cell,latitude,longitude,neighbors`) used instead
    /// of the built-in lattice.
    pub cell_table: Option<PathBuf>,

    /// Exposure decay, strategy and casualty weighting.
    pub exposure: ExposureParams,

    /// Observation smoothing `m` and truncation `xs`.
    pub encoder: EncoderParams,

    /// Viterbi arithmetic. Default: **Log**.
    pub decode_space: DecodeSpace,

    /// Country to initial distribution table.
    pub priors: CountryPriors,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            countries: vec!["Nigeria".to_string()],
            start: NaiveDate::from_ymd_opt(2008, 1, 1).unwrap_or(NaiveDate::MIN),
            end: NaiveDate::from_ymd_opt(2019, 12, 31).unwrap_or(NaiveDate::MAX),
            resolution: 5,
            frequency: Frequency::MonthEnd,
            area: Some(BoundingBox {
                min_lon: 2.67,
                min_lat: 4.27,
                max_lon: 14.68,
                max_lat: 13.89,
            }),
            cell_table: None,
            exposure: ExposureParams::default(),
            encoder: EncoderParams::default(),
            decode_space: DecodeSpace::Log,
            priors: CountryPriors::default(),
        }
    }
}

impl RunConfig {
    /// Load a [`RunConfig`] from a JSON file at `path` and validate it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::FileRead`] if the file cannot be opened and
    /// [`ConfigError::InvalidValue`] if the JSON is malformed or a value is
    /// out of range.
    pub fn from_json(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg: RunConfig = serde_json::from_str(&contents)
            .map_err(|e| ConfigError::invalid_value("(file)", e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Write this configuration as pretty-printed JSON, creating parent
    /// directories if necessary.
    pub fn to_json(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::FileRead {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::invalid_value("(serialization)", e.to_string()))?;
        std::fs::write(path, json).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Validate all fields and return the first problem found.
    ///
    /// # Validated invariants
    ///
    /// - At least one country, none blank.
    /// - `start <= end`.
    /// - `resolution` is a supported lattice resolution.
    /// - An `area` is given unless a `cell_table` is.
    /// - Exposure, encoder and prior parameters pass their own checks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.countries.is_empty() {
            return Err(ConfigError::invalid_value("countries", "at least one country is required"));
        }
        if self.countries.iter().any(|c| c.trim().is_empty()) {
            return Err(ConfigError::invalid_value("countries", "country names must not be blank"));
        }
        if self.start > self.end {
            return Err(ConfigError::invalid_value(
                "start",
                format!("{} is after end {}", self.start, self.end),
            ));
        }
        HexLattice::edge_length_km(self.resolution)
            .map_err(|e| ConfigError::invalid_value("resolution", e.to_string()))?;

        match (&self.area, &self.cell_table) {
            (None, None) => {
                return Err(ConfigError::invalid_value("area", "an area or a cell table is required"));
            }
            (Some(area), _) => area.validate()?,
            (None, Some(_)) => {}
        }

        self.exposure
            .validate()
            .map_err(|e| ConfigError::invalid_value("exposure", e.to_string()))?;
        self.encoder
            .validate()
            .map_err(|e| ConfigError::invalid_value("encoder", e.to_string()))?;
        self.priors
            .validate()
            .map_err(|e| ConfigError::invalid_value("priors", e.to_string()))?;
        Ok(())
    }

    /// Decision dates of the run.
    pub fn time_grid(&self) -> Result<TimeGrid, ConfigError> {
        TimeGrid::new(self.start, self.end, self.frequency)
            .map_err(|e| ConfigError::invalid_value("start", e.to_string()))
    }

    /// Prior of this run, keyed on the first country.
    pub fn prior(&self) -> &[f64] {
        self.priors.for_run(&self.countries)
    }

    /// Countries joined with `-`, as used in file names.
    pub fn countries_tag(&self) -> String {
        self.countries.join("-")
    }

    fn file_suffix(&self) -> String {
        format!(
            "{}_{}_{}.csv",
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d"),
            self.frequency.code()
        )
    }

    /// `exposure_<countries>_<type>_<start>_<end>_<freq>.csv`
    pub fn exposure_file(&self, kind: EventKind) -> String {
        format!("exposure_{}_{}_{}", self.countries_tag(), kind, self.file_suffix())
    }

    /// `observation_<countries>_<start>_<end>_<freq>.csv`
    pub fn observation_file(&self) -> String {
        format!("observation_{}_{}", self.countries_tag(), self.file_suffix())
    }

    /// `controls_<countries>_<start>_<end>_<freq>.csv`
    pub fn controls_file(&self) -> String {
        format!("controls_{}_{}", self.countries_tag(), self.file_suffix())
    }
}
