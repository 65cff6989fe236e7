//! hexcontrol CLI
//!
//! Command-line pipeline from normalized conflict events to decoded
//! territorial control over a hexagonal tessellation.
//!
//! # Commands
//!
//! - **exposure**: exposure of every cell to conventional warfare and to
//!   terrorism at every decision date
//! - **observe**: observation symbols from two exposure tables
//! - **decode**: Viterbi control paths from an observation table
//! - **run**: all of the above in one pass, writing only on success
//! - **version**: display version information
//!
//! # Usage
//!
//! ```bash
//! # Full pipeline for Nigeria, monthly, at resolution 5
//! hexcontrol run --events events.csv --countries Nigeria -o out/
//!
//! # Same run from a configuration file, with the linear decoder
//! hexcontrol run --events events.csv --config run.json --decode-space linear
//!
//! # Re-decode a stored observation table
//! hexcontrol decode --observations out/observation_Nigeria_2008-01-01_2019-12-31_M.csv
//! ```

use clap::{Parser, Subcommand};

pub mod commands;
pub mod config;
pub mod io;
pub mod pipeline;

/// hexcontrol Command Line Interface
#[derive(Parser, Debug)]
#[command(name = "hexcontrol")]
#[command(author, version, about = "Territorial control from conflict events with a hidden Markov model")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compute exposure tables from an event table
    Exposure(commands::ExposureArgs),

    /// Encode two exposure tables into observation symbols
    Observe(commands::ObserveArgs),

    /// Decode control paths from an observation table
    Decode(commands::DecodeArgs),

    /// Run the whole pipeline
    Run(commands::RunArgs),

    /// Display version information
    Version,
}
