//! Subcommand arguments and execution.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Args;
use colored::Colorize;
use hexcontrol_core::{EventKind, Frequency};
use hexcontrol_exposure::ExposureStrategy;
use hexcontrol_hmm::{CancellationToken, ControlMatrix, ControlState, DecodeSpace, ObservationMatrix, Symbol};
use tabled::{settings::Style, Table, Tabled};

use crate::config::RunConfig;
use crate::io;
use crate::pipeline::{self, Exposures, StudyArea};
use crate::Commands;

/// Run parameters shared by every stage command. Flags override the values
/// of the configuration file.
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// JSON run configuration
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Countries, comma separated; the first one selects the prior
    #[arg(long, value_delimiter = ',')]
    pub countries: Option<Vec<String>>,

    /// First day of the study period (YYYY-MM-DD)
    #[arg(long)]
    pub start: Option<NaiveDate>,

    /// Last day of the study period (YYYY-MM-DD)
    #[arg(long)]
    pub end: Option<NaiveDate>,

    /// Tessellation resolution (0-15)
    #[arg(short, long)]
    pub resolution: Option<u8>,

    /// Decision-date frequency (D, W, M, Y)
    #[arg(short, long)]
    pub frequency: Option<Frequency>,

    /// Cell table used instead of the built-in lattice
    #[arg(long)]
    pub cell_table: Option<PathBuf>,

    /// Exposure strategy (auto, direct, precomputed)
    #[arg(long)]
    pub strategy: Option<ExposureStrategy>,

    /// Weight events by their casualties relative to recent events
    #[arg(long)]
    pub casualty_weighting: bool,

    /// Overlap m under which the scores count as contested
    #[arg(long)]
    pub overlap: Option<f64>,

    /// Truncation threshold xs on raw exposures
    #[arg(long)]
    pub truncation: Option<f64>,

    /// Viterbi arithmetic (log, linear)
    #[arg(long)]
    pub decode_space: Option<DecodeSpace>,

    /// Directory for output tables
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,
}

impl ConfigArgs {
    /// Load the configuration file, if any, and apply the flags on top.
    pub fn resolve(&self) -> Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => RunConfig::from_json(path)?,
            None => RunConfig::default(),
        };
        if let Some(countries) = &self.countries {
            config.countries = countries.clone();
        }
        if let Some(start) = self.start {
            config.start = start;
        }
        if let Some(end) = self.end {
            config.end = end;
        }
        if let Some(resolution) = self.resolution {
            config.resolution = resolution;
        }
        if let Some(frequency) = self.frequency {
            config.frequency = frequency;
        }
        if let Some(table) = &self.cell_table {
            config.cell_table = Some(table.clone());
            config.area = None;
        }
        if let Some(strategy) = self.strategy {
            config.exposure.strategy = strategy;
        }
        if self.casualty_weighting {
            config.exposure.casualty_weighting = true;
        }
        if let Some(overlap) = self.overlap {
            config.encoder.overlap = overlap;
        }
        if let Some(truncation) = self.truncation {
            config.encoder.truncation = truncation;
        }
        if let Some(space) = self.decode_space {
            config.decode_space = space;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Arguments for the exposure command
#[derive(Args, Debug, Clone)]
pub struct ExposureArgs {
    /// Normalized event table (CSV)
    #[arg(short, long)]
    pub events: PathBuf,

    #[command(flatten)]
    pub run: ConfigArgs,
}

/// Arguments for the observe command
#[derive(Args, Debug, Clone)]
pub struct ObserveArgs {
    /// Conventional exposure table (CSV)
    #[arg(long)]
    pub conventional: PathBuf,

    /// Terrorism exposure table (CSV)
    #[arg(long)]
    pub terrorism: PathBuf,

    #[command(flatten)]
    pub run: ConfigArgs,
}

/// Arguments for the decode command
#[derive(Args, Debug, Clone)]
pub struct DecodeArgs {
    /// Observation table (CSV)
    #[arg(long)]
    pub observations: PathBuf,

    #[command(flatten)]
    pub run: ConfigArgs,
}

/// Arguments for the run command
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Normalized event table (CSV)
    #[arg(short, long)]
    pub events: PathBuf,

    #[command(flatten)]
    pub run: ConfigArgs,
}

/// Symbol frequency row
#[derive(Tabled)]
struct SymbolRow {
    #[tabled(rename = "Symbol")]
    symbol: String,
    #[tabled(rename = "Meaning")]
    meaning: &'static str,
    #[tabled(rename = "Count")]
    count: usize,
}

/// Control state frequency row
#[derive(Tabled)]
struct StateRow {
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Level")]
    level: f64,
    #[tabled(rename = "Cell-dates")]
    count: usize,
}

/// Execute a command other than `version`.
pub fn execute(command: Commands, token: &CancellationToken) -> Result<()> {
    match command {
        Commands::Exposure(args) => execute_exposure(args),
        Commands::Observe(args) => execute_observe(args),
        Commands::Decode(args) => execute_decode(args, token),
        Commands::Run(args) => execute_run(args, token),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Print the versions of the binary and its libraries.
pub fn print_version() {
    println!("hexcontrol {}", env!("CARGO_PKG_VERSION"));
    println!("core: {}", hexcontrol_core::VERSION);
    println!("exposure: {}", hexcontrol_exposure::VERSION);
    println!("hmm: {}", hexcontrol_hmm::VERSION);
}

fn execute_exposure(args: ExposureArgs) -> Result<()> {
    let config = args.run.resolve()?;
    print_header("Computing exposure", &config);

    let grid = config.time_grid()?;
    let area = StudyArea::from_config(&config)?;
    let events = area.load_events(&config, &args.events)?;
    let exposures = pipeline::compute_exposures(&config, &area, &grid, &events)?;

    for (kind, matrix) in [
        (EventKind::Conventional, &exposures.conventional),
        (EventKind::Terrorism, &exposures.terrorism),
    ] {
        let path = args.run.output_dir.join(config.exposure_file(kind));
        io::write_exposure(&path, matrix)?;
        print_saved(&path);
    }
    Ok(())
}

fn execute_observe(args: ObserveArgs) -> Result<()> {
    let config = args.run.resolve()?;
    print_header("Computing observations", &config);

    let exposures = Exposures {
        conventional: io::read_exposure(&args.conventional, EventKind::Conventional)?,
        terrorism: io::read_exposure(&args.terrorism, EventKind::Terrorism)?,
    };
    let encoding = pipeline::encode(&config, &exposures)?;
    print_medians(&encoding);
    print_symbols(&encoding.observations);

    let path = args.run.output_dir.join(config.observation_file());
    io::write_observations(&path, &encoding.observations)?;
    print_saved(&path);
    Ok(())
}

fn execute_decode(args: DecodeArgs, token: &CancellationToken) -> Result<()> {
    let config = args.run.resolve()?;
    print_header("Decoding territorial control", &config);

    let grid = config.time_grid()?;
    let observations = io::read_observations(&args.observations)?;
    let controls = pipeline::decode(&config, &grid, &observations, token)
        .context("Observation dates must match the configured period and frequency")?;
    print_states(&controls);

    let path = args.run.output_dir.join(config.controls_file());
    io::write_controls(&path, &controls)?;
    print_saved(&path);
    Ok(())
}

fn execute_run(args: RunArgs, token: &CancellationToken) -> Result<()> {
    let config = args.run.resolve()?;
    print_header("Running pipeline", &config);

    let output = pipeline::run(&config, &args.events, token)?;
    print_medians(&output.encoding);
    print_symbols(&output.encoding.observations);
    print_states(&output.controls);

    for path in output.write(&config, &args.run.output_dir)? {
        print_saved(&path);
    }
    Ok(())
}

fn print_header(action: &str, config: &RunConfig) {
    println!("{} {}...", "[HEX]".bright_cyan().bold(), action);
    println!("  {} {}", "Countries:".dimmed(), config.countries.join(", "));
    println!("  {} {} to {}", "Period:".dimmed(), config.start, config.end);
    println!(
        "  {} {} at resolution {}",
        "Grid:".dimmed(),
        config.frequency,
        config.resolution
    );
    println!();
}

fn print_saved(path: &Path) {
    println!("{} Saved {}", "[OK]".green().bold(), path.display());
}

fn print_medians(encoding: &hexcontrol_hmm::Encoding) {
    let show = |v: Option<f64>| v.map_or_else(|| "n/a".to_string(), |v| format!("{v:.4}"));
    println!(
        "  {} {}",
        "Median of C:".dimmed(),
        show(hexcontrol_hmm::median_of_medians(&encoding.conventional_scores))
    );
    println!(
        "  {} {}",
        "Median of T:".dimmed(),
        show(hexcontrol_hmm::median_of_medians(&encoding.terrorism_scores))
    );
}

fn print_symbols(observations: &ObservationMatrix) {
    let counts = observations.counts();
    let meanings = ["quiet", "conventional dominant", "contested", "terrorism dominant"];
    let rows: Vec<SymbolRow> = Symbol::ALL
        .iter()
        .map(|s| SymbolRow {
            symbol: s.to_string(),
            meaning: meanings[s.index()],
            count: counts[s.index()],
        })
        .collect();
    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{table}");
}

fn print_states(controls: &ControlMatrix) {
    let mut counts = [0usize; 5];
    for state in controls.states() {
        counts[state.index()] += 1;
    }
    let rows: Vec<StateRow> = ControlState::ALL
        .iter()
        .map(|s| StateRow {
            state: s.to_string(),
            level: s.level(),
            count: counts[s.index()],
        })
        .collect();
    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{table}");
}
