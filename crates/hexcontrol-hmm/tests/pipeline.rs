//! Events through exposure, encoding and batch decoding.

use std::sync::Arc;

use approx::assert_relative_eq;
use chrono::{Duration, NaiveDate};
use geo::{point, polygon, Point};
use hexcontrol_core::{Event, EventKind, Frequency, HexLattice, SpatialIndex, TimeGrid};
use hexcontrol_exposure::{ExposureEngine, ExposureParams};
use hexcontrol_hmm::{
    BatchDecoder, CancellationToken, ControlState, CountryPriors, DecodeSpace, EncoderParams, HmmModel,
    ObservationEncoder, Symbol,
};

const RESOLUTION: u8 = 6;

fn event(lattice: &HexLattice, at: Point<f64>, day: i64, kind: EventKind) -> Event {
    let start = NaiveDate::from_ymd_opt(2015, 1, 1).unwrap();
    let cell = lattice.locate(at, RESOLUTION).unwrap();
    Event::new(start + Duration::days(day), "Nigeria", at, 3, kind, cell)
}

fn log_likelihood(model: &HmmModel, path: impl Iterator<Item = usize>, obs: &[usize]) -> f64 {
    let mut previous = None;
    let mut total = 0.0;
    for (state, &symbol) in path.zip(obs) {
        let step = match previous {
            None => model.initial()[state],
            Some(p) => model.transition()[[p, state]],
        };
        total += (step * model.emission()[[state, symbol]]).ln();
        previous = Some(state);
    }
    total
}

#[test]
fn events_to_control_paths() {
    let lattice = HexLattice::new(point!(x: 13.0, y: 11.0));
    let area = polygon![
        (x: 12.9, y: 10.9),
        (x: 13.1, y: 10.9),
        (x: 13.1, y: 11.1),
        (x: 12.9, y: 11.1),
    ];
    let cells = lattice.tessellate(&area, RESOLUTION).unwrap();
    let grid = TimeGrid::new(
        NaiveDate::from_ymd_opt(2015, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2015, 12, 31).unwrap(),
        Frequency::MonthEnd,
    )
    .unwrap();

    let hot = point!(x: 13.0, y: 11.0);
    let mut events: Vec<Event> = (0..10).map(|i| event(&lattice, hot, i * 30, EventKind::Terrorism)).collect();
    events.extend((0..4).map(|i| event(&lattice, point!(x: 13.05, y: 11.05), i * 60, EventKind::Conventional)));

    let engine = ExposureEngine::new(ExposureParams::default()).unwrap();
    let terrorism = engine.compute(&lattice, &cells, &events, EventKind::Terrorism, &grid).unwrap();
    let conventional = engine.compute(&lattice, &cells, &events, EventKind::Conventional, &grid).unwrap();

    let encoding = ObservationEncoder::new(EncoderParams::default())
        .unwrap()
        .encode(&terrorism, &conventional)
        .unwrap();
    let observations = &encoding.observations;
    assert_eq!(observations.shape(), (cells.len(), 12));
    assert!(observations.counts()[Symbol::Quiet.index()] > 0);

    let priors = CountryPriors::default();
    let model = HmmModel::territorial(priors.for_run(&["Nigeria".to_string()])).unwrap();
    let token = CancellationToken::new();

    let log = BatchDecoder::new(Arc::new(model.clone()), DecodeSpace::Log)
        .decode(observations, &grid, &token)
        .unwrap();
    let linear = BatchDecoder::new(Arc::new(model.clone()), DecodeSpace::Linear)
        .decode(observations, &grid, &token)
        .unwrap();
    assert_eq!(log.shape(), (cells.len(), 12));
    assert_eq!(log.cells(), terrorism.cells());
    assert_eq!(log.dates(), grid.dates());

    // a year is short enough for the linear trellis to stay representable
    for row in 0..cells.len() {
        let obs = observations.sequence(row);
        let p_log = log_likelihood(&model, log.path(row).iter().map(|s| s.index()), &obs);
        let p_linear = log_likelihood(&model, linear.path(row).iter().map(|s| s.index()), &obs);
        assert_relative_eq!(p_log, p_linear, max_relative = 1e-9);
    }

    let slice = log.time_slice(grid.dates()[6]).unwrap();
    assert_eq!(slice.len(), cells.len());
    assert!(slice.iter().all(|(_, s)| ControlState::ALL.contains(s)));
}
