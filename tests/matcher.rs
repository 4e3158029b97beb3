//! Tests for matcher module

use linematch::synthetic::{BusDayScenario, dwell, straight_line, trace_along};
use linematch::{
    CatalogConfig, Direction, GeometryCatalog, GpsPoint, LineMatcher, LineShape, MatcherConfig,
};

const LAT: f64 = -16.68;
const LNG: f64 = -49.26;
const T0: i64 = 1_710_234_000;

fn two_way(sub: &str, coords: &[[f64; 2]], length_km: f64) -> Vec<LineShape> {
    vec![
        LineShape::new("001", sub, Direction::Outbound, length_km, coords.to_vec()),
        LineShape::new(
            "001",
            sub,
            Direction::Inbound,
            length_km,
            coords.iter().rev().copied().collect(),
        ),
    ]
}

fn catalog_for(shapes: &[LineShape]) -> GeometryCatalog {
    GeometryCatalog::build(shapes, &CatalogConfig::default()).unwrap()
}

#[test]
fn test_full_trace_of_straight_line() {
    let shape = straight_line(LAT, LNG, 12_000.0, 200);
    let catalog = catalog_for(&two_way("001A", &shape, 12.0));
    let trace = trace_along(&shape, 50, T0, 30);

    let segments = LineMatcher::new(&catalog, MatcherConfig::default()).find_segments(&trace);

    assert_eq!(segments.len(), 1);
    let s = &segments[0];
    assert_eq!(s.line_number, "001");
    assert_eq!(s.sub_line_id, "001A");
    assert_eq!(s.direction, Some(Direction::Outbound));
    assert_eq!(s.start_index, 0);
    assert!(s.end_index >= 47, "end {}", s.end_index);
    assert!(s.reached_end_zone);
    assert!(s.initial_overlap_pct >= 90.0);
    assert!(s.final_overlap_pct > 98.0, "final {}", s.final_overlap_pct);
}

#[test]
fn test_reverse_trace_matches_inbound() {
    let shape = straight_line(LAT, LNG, 12_000.0, 200);
    let catalog = catalog_for(&two_way("001A", &shape, 12.0));
    let reversed: Vec<[f64; 2]> = shape.iter().rev().copied().collect();
    let trace = trace_along(&reversed, 50, T0, 30);

    let segments = LineMatcher::new(&catalog, MatcherConfig::default()).find_segments(&trace);

    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0].direction, Some(Direction::Inbound));
}

#[test]
fn test_short_trip_is_skipped_even_at_full_overlap() {
    let shape = straight_line(LAT, LNG, 2_000.0, 40);
    let catalog = catalog_for(&two_way("001A", &shape, 2.0));
    // 11 fixes, 20 s apart: 200 s end to end
    let trace = trace_along(&shape, 11, T0, 20);
    let config = MatcherConfig {
        min_trip_duration_s: 300,
        ..MatcherConfig::default()
    };

    let segments = LineMatcher::new(&catalog, config).find_segments(&trace);
    assert!(segments.is_empty());
}

#[test]
fn test_minimum_duration_boundary_is_exclusive() {
    let shape = straight_line(LAT, LNG, 2_000.0, 40);
    let catalog = catalog_for(&two_way("001A", &shape, 2.0));
    // 21 fixes, 30 s apart: exactly 600 s
    let trace = trace_along(&shape, 21, T0, 30);

    let at_boundary = MatcherConfig {
        min_trip_duration_s: 600,
        ..MatcherConfig::default()
    };
    assert!(LineMatcher::new(&catalog, at_boundary).find_segments(&trace).is_empty());

    let below = MatcherConfig {
        min_trip_duration_s: 599,
        ..MatcherConfig::default()
    };
    assert_eq!(LineMatcher::new(&catalog, below).find_segments(&trace).len(), 1);
}

#[test]
fn test_idle_before_departure_is_trimmed() {
    let shape = straight_line(LAT, LNG, 12_000.0, 200);
    let catalog = catalog_for(&two_way("001A", &shape, 12.0));
    // Ten fixes standing at the terminus, then the run
    let mut trace = dwell(shape[0], 10, T0, 30);
    trace.extend(trace_along(&shape, 50, T0 + 300, 30));

    let segments = LineMatcher::new(&catalog, MatcherConfig::default()).find_segments(&trace);

    assert_eq!(segments.len(), 1);
    let s = &segments[0];
    assert_eq!(s.start_index, 10);
    assert_eq!(s.direction, Some(Direction::Outbound));
    assert!(s.final_overlap_pct > 98.0, "final {}", s.final_overlap_pct);
}

#[test]
fn test_depot_fixes_before_departure_are_trimmed() {
    let shape = straight_line(LAT, LNG, 12_000.0, 200);
    let catalog = catalog_for(&two_way("001A", &shape, 12.0));
    // Ten fixes at a depot about 2 km off the line
    let depot = [shape[0][0], shape[0][1] - 0.02];
    let mut trace = dwell(depot, 10, T0, 30);
    trace.extend(trace_along(&shape, 50, T0 + 300, 30));

    let segments = LineMatcher::new(&catalog, MatcherConfig::default()).find_segments(&trace);

    assert_eq!(segments.len(), 1);
    let s = &segments[0];
    assert!(s.start_index >= 10, "start {}", s.start_index);
    assert_eq!(s.direction, Some(Direction::Outbound));
    assert!(s.reached_end_zone);
}

#[test]
fn test_unrelated_trace_matches_nothing() {
    let shape = straight_line(LAT, LNG, 12_000.0, 200);
    let catalog = catalog_for(&two_way("001A", &shape, 12.0));
    let elsewhere = straight_line(LAT - 0.1, LNG, 12_000.0, 200);
    let trace = trace_along(&elsewhere, 50, T0, 30);

    let segments = LineMatcher::new(&catalog, MatcherConfig::default()).find_segments(&trace);
    assert!(segments.is_empty());
}

#[test]
fn test_round_trip_gives_ordered_segments() {
    let day = BusDayScenario::default().generate();
    let catalog = catalog_for(&day.lines);
    let trace = &day.trips[0].points;

    let segments = LineMatcher::new(&catalog, MatcherConfig::default()).find_segments(trace);

    assert_eq!(segments.len(), 2);
    assert_eq!(segments[0].direction, Some(Direction::Outbound));
    assert_eq!(segments[1].direction, Some(Direction::Inbound));
    assert_eq!(segments[0].start_index, 0);
    assert!(segments.iter().all(|s| s.reached_end_zone));
    for pair in segments.windows(2) {
        assert!(pair[0].end_index < pair[1].start_index);
    }
    for s in &segments {
        assert!(s.end_index >= s.start_index);
        assert!(s.end_index < trace.len());
        assert!((0.0..=100.0).contains(&s.final_overlap_pct));
    }
}

#[test]
fn test_segments_never_overlap_over_many_trips() {
    let day = BusDayScenario {
        round_trips: 3,
        gps_noise_sigma_m: 15.0,
        seed: 7,
        ..BusDayScenario::default()
    }
    .generate();
    let catalog = catalog_for(&day.lines);
    let matcher = LineMatcher::new(&catalog, MatcherConfig::default());

    // One long trace for the whole day
    let trace: Vec<GpsPoint> = day.trips.iter().flat_map(|t| t.points.clone()).collect();
    let segments = matcher.find_segments(&trace);

    assert!(segments.len() >= 5, "got {} segments", segments.len());
    for pair in segments.windows(2) {
        assert!(pair[0].end_index < pair[1].start_index);
    }
}

#[test]
fn test_direction_unresolved_without_terminus_visit() {
    let shape = straight_line(LAT, LNG, 12_000.0, 201);
    let catalog = catalog_for(&two_way("001A", &shape, 12.0));
    // From 480 m to 11 520 m: never within reach of either terminus zone
    let trace = trace_along(&shape[8..=192], 50, T0, 30);

    let segments = LineMatcher::new(&catalog, MatcherConfig::default()).find_segments(&trace);

    assert_eq!(segments.len(), 1);
    let s = &segments[0];
    assert_eq!(s.direction, None);
    assert_eq!(s.line_key(), None);
    assert!(!s.reached_end_zone);
    assert_eq!(s.sub_line_id, "001A");
}

#[test]
fn test_ties_keep_first_supplied_line() {
    let shape = straight_line(LAT, LNG, 6_000.0, 100);
    let mut shapes = two_way("001A", &shape, 6.0);
    shapes.extend(two_way("001B", &shape, 6.0));
    let catalog = catalog_for(&shapes);
    let trace = trace_along(&shape, 40, T0, 30);

    let segments = LineMatcher::new(&catalog, MatcherConfig::default()).find_segments(&trace);

    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0].sub_line_id, "001A");
}

#[test]
fn test_empty_and_single_point_traces() {
    let shape = straight_line(LAT, LNG, 2_000.0, 20);
    let catalog = catalog_for(&two_way("001A", &shape, 2.0));
    let matcher = LineMatcher::new(&catalog, MatcherConfig::default());

    assert!(matcher.find_segments(&[]).is_empty());
    assert!(matcher.find_segments(&[GpsPoint::new(T0, LAT, LNG)]).is_empty());
}
