//! Tests for classifier module

use chrono::NaiveDate;
use linematch::classifier::{baseline, median, normalize_vehicle_model, population_std};
use linematch::{
    ClassifierConfig, CohortQuery, CohortSample, Direction, LookbackWindow, PerformanceClassifier,
    PerformanceStatus, TripAnalysis, WeekdayCategory,
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn sample(day: NaiveDate, km_per_liter: f64) -> CohortSample {
    CohortSample { day, km_per_liter }
}

#[test]
fn test_empty_cohort_is_normal_with_zero_std() {
    for value in [0.1, 1.8, 42.0] {
        let b = baseline(value, &[], LookbackWindow::Days30);
        assert_eq!(b.status, PerformanceStatus::Normal);
        assert_eq!(b.std, 0.0);
        assert_eq!(b.median, value);
        assert_eq!(b.diff, 0.0);
        assert_eq!(b.sample_count, 0);
    }
}

#[test]
fn test_bands() {
    // median 2.0, std 0.2
    let cases = [
        (1.5, PerformanceStatus::LowTwoStd),
        (1.65, PerformanceStatus::LowOneAndHalfStd),
        (1.75, PerformanceStatus::SuspectedLow),
        (2.0, PerformanceStatus::Normal),
        (2.35, PerformanceStatus::Normal),
        (2.5, PerformanceStatus::TelemetryError),
    ];
    for (value, expected) in cases {
        assert_eq!(PerformanceStatus::classify(value, 2.0, 0.2), expected, "value {}", value);
    }
}

#[test]
fn test_low_boundary_is_inclusive() {
    let (m, s) = (2.0, 0.25);
    let at = m - 2.0 * s;
    assert_eq!(PerformanceStatus::classify(at, m, s), PerformanceStatus::LowTwoStd);
    assert_eq!(
        PerformanceStatus::classify(at + 1e-9, m, s),
        PerformanceStatus::LowOneAndHalfStd
    );
    assert_eq!(
        PerformanceStatus::classify(m + 2.0 * s, m, s),
        PerformanceStatus::TelemetryError
    );
}

#[test]
fn test_status_labels() {
    assert_eq!(PerformanceStatus::LowTwoStd.to_string(), "low performance (≤2 STD)");
    assert_eq!(
        PerformanceStatus::SuspectedLow.to_string(),
        "suspected low performance (≤1.0 STD)"
    );
    assert_eq!(
        serde_json::to_string(&PerformanceStatus::TelemetryError).unwrap(),
        "\"telemetry error (≥2.0 STD)\""
    );
}

#[test]
fn test_statistics() {
    let values = [1.0, 2.0, 3.0, 4.0];
    assert_eq!(median(&values), Some(2.5));
    let std = population_std(&values).unwrap();
    assert!((std - 1.118_033_988_749_895).abs() < 1e-12);
    assert_eq!(population_std(&[3.0]), Some(0.0));
}

#[test]
fn test_windows_are_independent() {
    let reference = date(2024, 6, 30);
    let mut samples = Vec::new();
    // Recent month: consistently 2.0 km/l
    for d in 1..=20 {
        samples.push(sample(date(2024, 6, d), if d % 2 == 0 { 1.9 } else { 2.1 }));
    }
    // Older history: much lower
    for d in 1..=28 {
        samples.push(sample(date(2024, 2, d), if d % 2 == 0 { 1.0 } else { 1.2 }));
    }

    let classifier = PerformanceClassifier::default();
    let baselines = classifier.classify(1.7, &samples, reference);
    assert_eq!(baselines.len(), 4);

    let by_window = |w: LookbackWindow| baselines.iter().find(|b| b.window == w).unwrap();
    assert_eq!(by_window(LookbackWindow::Days30).sample_count, 20);
    assert_eq!(by_window(LookbackWindow::Days30).status, PerformanceStatus::LowTwoStd);
    assert_eq!(by_window(LookbackWindow::Full).sample_count, 48);
    assert_ne!(by_window(LookbackWindow::Full).status, PerformanceStatus::LowTwoStd);
}

#[test]
fn test_window_bounds_are_inclusive() {
    let reference = date(2024, 6, 30);
    assert!(LookbackWindow::Days30.contains(date(2024, 5, 31), reference));
    assert!(LookbackWindow::Days30.contains(reference, reference));
    assert!(!LookbackWindow::Days30.contains(date(2024, 5, 30), reference));
    assert!(!LookbackWindow::Full.contains(date(2024, 7, 1), reference));
    assert!(LookbackWindow::Full.contains(date(2019, 1, 1), reference));
    assert_eq!(LookbackWindow::Days90.days(), Some(90));
    assert_eq!(LookbackWindow::Full.label(), "full");
}

#[test]
fn test_sanity_band_excludes_outliers_from_baseline() {
    let reference = date(2024, 6, 30);
    let samples = vec![
        sample(date(2024, 6, 10), 2.0),
        sample(date(2024, 6, 11), 2.0),
        sample(date(2024, 6, 12), 0.5),
        sample(date(2024, 6, 13), 10.0),
        sample(date(2024, 6, 14), 55.0),
    ];
    let baselines = PerformanceClassifier::default().classify(2.0, &samples, reference);
    assert_eq!(baselines[0].sample_count, 2);
    assert_eq!(baselines[0].median, 2.0);
}

#[test]
fn test_narrow_sanity_band_via_config() {
    let config = ClassifierConfig {
        min_efficiency: 1.0,
        max_efficiency: 5.0,
        ..ClassifierConfig::default()
    };
    assert!(config.in_sanity_band(1.5));
    assert!(!config.in_sanity_band(0.8));
    assert!(!config.in_sanity_band(5.0));
}

#[test]
fn test_vehicle_model_normalization() {
    assert_eq!(normalize_vehicle_model("IVECO/MASCA GRAN VIA 2019"), "IVECO/MASCA GRAN VIA");
    assert_eq!(normalize_vehicle_model("vw 17230 apache vip"), "VW 17230 APACHE VIP-SC");
    assert_eq!(normalize_vehicle_model("O500U 1826"), "O500");
    assert_eq!(
        normalize_vehicle_model("ELETRA INDUSCAR MILLENNIUM BRT"),
        "ELETRA INDUSCAR MILLENNIUM"
    );
    assert_eq!(normalize_vehicle_model("VW 22.260 CAIO INDUSCAR"), "VW 22.260 CAIO INDUSCAR");
}

fn stored(day: NaiveDate, km_per_liter: Option<f64>) -> TripAnalysis {
    TripAnalysis {
        trip_id: "trip-1".to_string(),
        driver_id: None,
        day,
        weekday_number: linematch::calendar::sql_weekday_number(day),
        is_holiday: false,
        is_holiday_eve: false,
        time_slot: "07:30".to_string(),
        vehicle_num_id: "50001".to_string(),
        asset_id: "A".to_string(),
        vehicle_model: "MB OF 1721 L59".to_string(),
        trip_ordinal: 1,
        line_number: "001".to_string(),
        sub_line_id: "001A".to_string(),
        direction: Some(Direction::Outbound),
        start_timestamp: 0,
        end_timestamp: 3_000,
        duration_s: 3_000,
        initial_overlap_pct: 92.0,
        final_overlap_pct: 98.0,
        reached_end_zone: true,
        line_length_km: 12.0,
        covered_km: 11.76,
        fuel_liters: km_per_liter.map(|k| 11.76 / k),
        km_per_liter,
        baselines: Vec::new(),
    }
}

#[test]
fn test_cohort_query_membership() {
    let query = CohortQuery {
        sub_line_id: "001A".to_string(),
        direction: Direction::Outbound,
        time_slot: "07:30".to_string(),
        category: WeekdayCategory::Weekday,
        is_holiday: false,
        vehicle_model: "MB OF 1721 MPOLO TORINO U".to_string(),
        reference_day: date(2024, 6, 30),
        min_efficiency: 0.5,
        max_efficiency: 10.0,
    };
    // Wednesday
    let day = date(2024, 6, 12);

    let member = stored(day, Some(2.0));
    assert_eq!(query.sample_of(&member), Some(sample(day, 2.0)));

    let mut other = stored(day, Some(2.0));
    other.sub_line_id = "001B".to_string();
    assert_eq!(query.sample_of(&other), None);

    let mut other = stored(day, Some(2.0));
    other.direction = Some(Direction::Inbound);
    assert_eq!(query.sample_of(&other), None);

    let mut other = stored(day, Some(2.0));
    other.direction = None;
    assert_eq!(query.sample_of(&other), None);

    let mut other = stored(day, Some(2.0));
    other.time_slot = "08:00".to_string();
    assert_eq!(query.sample_of(&other), None);

    // Saturday
    assert_eq!(query.sample_of(&stored(date(2024, 6, 15), Some(2.0))), None);

    let mut other = stored(day, Some(2.0));
    other.is_holiday = true;
    assert_eq!(query.sample_of(&other), None);

    let mut other = stored(day, Some(2.0));
    other.vehicle_model = "O500".to_string();
    assert_eq!(query.sample_of(&other), None);

    assert_eq!(query.sample_of(&stored(date(2024, 7, 1), Some(2.0))), None);
    assert_eq!(query.sample_of(&stored(day, Some(10.0))), None);
    assert_eq!(query.sample_of(&stored(day, None)), None);
}
