//! End-to-end runs of the pipeline through the file layer.

use std::path::Path;

use chrono::NaiveDate;
use clap::Parser;
use hexcontrol_cli::config::{BoundingBox, RunConfig};
use hexcontrol_cli::{io, pipeline, Cli, Commands};
use hexcontrol_core::{EventKind, Frequency};
use hexcontrol_hmm::{CancellationToken, DecodeSpace, HmmError};
use tempfile::tempdir;

fn small_config() -> RunConfig {
    RunConfig {
        countries: vec!["Nigeria".into()],
        start: NaiveDate::from_ymd_opt(2015, 1, 1).unwrap(),
        end: NaiveDate::from_ymd_opt(2015, 12, 31).unwrap(),
        resolution: 6,
        frequency: Frequency::MonthEnd,
        area: Some(BoundingBox {
            min_lon: 12.9,
            min_lat: 10.9,
            max_lon: 13.1,
            max_lat: 11.1,
        }),
        ..RunConfig::default()
    }
}

fn write_events(path: &Path) {
    let mut rows = String::from("timestamp,country,latitude,longitude,fatalities,type\n");
    for month in 1..=10 {
        rows.push_str(&format!("2015-{month:02}-10,Nigeria,11.0,13.0,{},terrorism\n", month * 2));
    }
    for month in [2, 5, 8] {
        rows.push_str(&format!("2015-{month:02}-15,Nigeria,11.05,13.05,3,conventional\n"));
    }
    rows.push_str("2015-04-01,Cameroon,11.0,13.0,9,terrorism\n");
    std::fs::write(path, rows).unwrap();
}

#[test]
fn full_run_writes_four_tables() {
    let dir = tempdir().unwrap();
    let events = dir.path().join("events.csv");
    write_events(&events);
    let config = small_config();

    let output = pipeline::run(&config, &events, &CancellationToken::new()).unwrap();
    let (cells, dates) = output.controls.shape();
    assert_eq!(dates, 12);
    assert!(cells > 1);

    let out_dir = dir.path().join("out");
    let written = output.write(&config, &out_dir).unwrap();
    assert_eq!(written.len(), 4);
    assert!(out_dir
        .join("exposure_Nigeria_terrorism_2015-01-01_2015-12-31_M.csv")
        .exists());
    assert!(out_dir.join("controls_Nigeria_2015-01-01_2015-12-31_M.csv").exists());

    let terrorism = io::read_exposure(&written[1], EventKind::Terrorism).unwrap();
    assert_eq!(terrorism, output.exposures.terrorism);

    let observations = io::read_observations(&written[2]).unwrap();
    assert_eq!(observations, output.encoding.observations);

    // decoding the stored table reproduces the stored controls
    let grid = config.time_grid().unwrap();
    let redecoded = pipeline::decode(&config, &grid, &observations, &CancellationToken::new()).unwrap();
    assert_eq!(redecoded, output.controls);

    let controls = std::fs::read_to_string(&written[3]).unwrap();
    let first_row = controls.lines().nth(1).unwrap();
    let label = first_row.split(',').nth(1).unwrap();
    assert!(["R", "DR", "D", "DG", "G"].contains(&label));
}

#[test]
fn cancelled_run_writes_nothing() {
    let dir = tempdir().unwrap();
    let events = dir.path().join("events.csv");
    write_events(&events);

    let token = CancellationToken::new();
    token.cancel();
    let err = pipeline::run(&small_config(), &events, &token).unwrap_err();
    assert!(matches!(err.downcast_ref::<HmmError>(), Some(HmmError::Cancelled)));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[test]
fn decode_rejects_mismatched_period() {
    let dir = tempdir().unwrap();
    let events = dir.path().join("events.csv");
    write_events(&events);
    let config = small_config();
    let output = pipeline::run(&config, &events, &CancellationToken::new()).unwrap();

    let longer = RunConfig {
        end: NaiveDate::from_ymd_opt(2016, 6, 30).unwrap(),
        ..small_config()
    };
    let grid = longer.time_grid().unwrap();
    let err = pipeline::decode(&longer, &grid, &output.encoding.observations, &CancellationToken::new())
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<HmmError>(),
        Some(HmmError::ShapeMismatch { what: "dates", .. })
    ));
}

#[test]
fn flags_override_config_file() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("run.json");
    small_config().to_json(&config_path).unwrap();

    let cli = Cli::try_parse_from([
        "hexcontrol",
        "run",
        "--events",
        "events.csv",
        "--config",
        config_path.to_str().unwrap(),
        "--countries",
        "Iraq,Syria",
        "--decode-space",
        "linear",
        "--frequency",
        "Y",
    ])
    .unwrap();

    let Commands::Run(args) = cli.command else {
        panic!("expected the run command");
    };
    let config = args.run.resolve().unwrap();
    assert_eq!(config.countries, vec!["Iraq".to_string(), "Syria".to_string()]);
    assert_eq!(config.decode_space, DecodeSpace::Linear);
    assert_eq!(config.frequency, Frequency::YearEnd);
    assert_eq!(config.resolution, 6);
    assert_eq!(config.prior(), &[0.2; 5]);
}
