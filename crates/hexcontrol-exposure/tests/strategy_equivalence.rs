//! Exposure engine properties over a hexagonal lattice.

use approx::assert_relative_eq;
use chrono::{Duration, NaiveDate};
use geo::{point, polygon, Point};
use hexcontrol_core::{CellId, Event, EventKind, Frequency, HexLattice, SpatialIndex, TimeGrid};
use hexcontrol_exposure::{ExposureEngine, ExposureParams, ExposureStrategy};
use proptest::prelude::*;

const RESOLUTION: u8 = 6;

fn lattice() -> HexLattice {
    HexLattice::new(point!(x: 13.0, y: 11.0))
}

fn cells(lattice: &HexLattice) -> Vec<CellId> {
    let area = polygon![
        (x: 12.85, y: 10.85),
        (x: 13.15, y: 10.85),
        (x: 13.15, y: 11.15),
        (x: 12.85, y: 11.15),
    ];
    lattice.tessellate(&area, RESOLUTION).unwrap()
}

fn base_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2016, 1, 1).unwrap()
}

fn grid() -> TimeGrid {
    TimeGrid::new(base_date(), NaiveDate::from_ymd_opt(2016, 12, 31).unwrap(), Frequency::MonthEnd).unwrap()
}

fn make_event(lattice: &HexLattice, location: Point<f64>, day_offset: i64, fatalities: u32, kind: EventKind) -> Event {
    let cell = lattice.locate(location, RESOLUTION).unwrap();
    Event::new(base_date() + Duration::days(day_offset), "Nigeria", location, fatalities, kind, cell)
}

fn engine(strategy: ExposureStrategy, casualty_weighting: bool) -> ExposureEngine {
    ExposureEngine::new(ExposureParams {
        strategy,
        casualty_weighting,
        ..ExposureParams::default()
    })
    .unwrap()
}

fn event_strategy() -> impl Strategy<Value = Vec<(f64, f64, i64, u32, bool)>> {
    prop::collection::vec(
        (12.8f64..13.2, 10.8f64..11.2, -60i64..420, 0u32..40, any::<bool>()),
        0..40,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn direct_and_precomputed_agree(raw in event_strategy(), casualty in any::<bool>()) {
        let lattice = lattice();
        let cells = cells(&lattice);
        let events: Vec<Event> = raw
            .iter()
            .map(|&(lon, lat, day, fat, terror)| {
                let kind = if terror { EventKind::Terrorism } else { EventKind::Conventional };
                make_event(&lattice, point!(x: lon, y: lat), day, fat, kind)
            })
            .collect();
        let grid = grid();

        for kind in EventKind::ALL {
            let direct = engine(ExposureStrategy::Direct, casualty)
                .compute(&lattice, &cells, &events, kind, &grid)
                .unwrap();
            let dense = engine(ExposureStrategy::Precomputed, casualty)
                .compute(&lattice, &cells, &events, kind, &grid)
                .unwrap();

            prop_assert_eq!(direct.shape(), dense.shape());
            for (a, b) in direct.values().iter().zip(dense.values().iter()) {
                prop_assert!((a - b).abs() <= 1e-12, "direct {} vs precomputed {}", a, b);
            }
            prop_assert!(direct.values().iter().all(|v| *v >= 0.0 && v.is_finite()));
        }
    }
}

#[test]
fn repeated_runs_are_bit_identical() {
    let lattice = lattice();
    let cells = cells(&lattice);
    let events: Vec<Event> = (0..30)
        .map(|i| {
            let lon = 12.9 + 0.007 * f64::from(i);
            let lat = 10.9 + 0.005 * f64::from(i % 7);
            make_event(&lattice, point!(x: lon, y: lat), i64::from(i) * 11, i as u32, EventKind::Terrorism)
        })
        .collect();
    let grid = grid();

    for strategy in [ExposureStrategy::Direct, ExposureStrategy::Precomputed] {
        let engine = engine(strategy, true);
        let first = engine.compute(&lattice, &cells, &events, EventKind::Terrorism, &grid).unwrap();
        let second = engine.compute(&lattice, &cells, &events, EventKind::Terrorism, &grid).unwrap();
        assert_eq!(first, second);
    }
}

#[test]
fn events_beyond_ring_radius_contribute_nothing() {
    let lattice = lattice();
    let target = HexLattice::cell_id(RESOLUTION, 0, 0);
    // three hops east of the target
    let outside = HexLattice::cell_id(RESOLUTION, 3, 0);
    let inside = HexLattice::cell_id(RESOLUTION, 2, 0);

    let at = |cell: &CellId, day: i64| {
        let location = lattice.centroid(cell).unwrap();
        Event::new(base_date() + Duration::days(day), "Nigeria", location, 1, EventKind::Conventional, cell.clone())
    };
    let grid = grid();

    let far_only = vec![at(&outside, 0), at(&outside, 100)];
    for strategy in [ExposureStrategy::Direct, ExposureStrategy::Precomputed] {
        let m = engine(strategy, false)
            .compute(&lattice, &[target.clone()], &far_only, EventKind::Conventional, &grid)
            .unwrap();
        assert!(m.values().iter().all(|v| *v == 0.0));
    }

    let near = vec![at(&inside, 0)];
    let m = engine(ExposureStrategy::Direct, false)
        .compute(&lattice, &[target], &near, EventKind::Conventional, &grid)
        .unwrap();
    assert!(m.values()[[0, 0]] > 0.0);
}

#[test]
fn future_events_contribute_nothing_until_they_happen() {
    let lattice = lattice();
    let cells = cells(&lattice);
    let grid = grid();
    let center = lattice.centroid(&cells[cells.len() / 2]).unwrap();
    // 2016-06-15: after the May month end, before the June one
    let events = vec![make_event(&lattice, center, 166, 3, EventKind::Terrorism)];

    let m = engine(ExposureStrategy::Auto, false)
        .compute(&lattice, &cells, &events, EventKind::Terrorism, &grid)
        .unwrap();
    let june = grid.index_of(NaiveDate::from_ymd_opt(2016, 6, 30).unwrap()).unwrap();
    for row in 0..cells.len() {
        for col in 0..june {
            assert_eq!(m.values()[[row, col]], 0.0);
        }
    }
    assert!(m.values().column(june).iter().any(|v| *v > 0.0));
}

#[test]
fn exposure_decays_with_age() {
    let lattice = lattice();
    let cells = cells(&lattice);
    let grid = grid();
    let row = cells.len() / 2;
    let center = lattice.centroid(&cells[row]).unwrap();
    let events = vec![make_event(&lattice, center, 0, 1, EventKind::Terrorism)];

    let m = engine(ExposureStrategy::Direct, false)
        .compute(&lattice, &cells, &events, EventKind::Terrorism, &grid)
        .unwrap();
    let series = m.row(row);
    for pair in series.as_slice().unwrap().windows(2) {
        assert!(pair[0] >= pair[1]);
    }
    assert_relative_eq!(series[0], 0.998, epsilon = 0.01);
}
