//! Tests for config module

use linematch::{AnalysisConfig, LineMatchError};

#[test]
fn test_empty_object_gives_defaults() {
    let config = AnalysisConfig::from_json_str("{}").unwrap();
    assert_eq!(config, AnalysisConfig::default());
    assert_eq!(config.matcher.overlap_threshold_pct, 90.0);
    assert_eq!(config.matcher.vehicle_buffer_m, 125.0);
    assert_eq!(config.catalog.short_line_zone_m, 150.0);
    assert_eq!(config.catalog.long_line_zone_m, 300.0);
    assert_eq!(config.fuel.sample_interval_s, 300);
    assert_eq!(config.classifier.timezone, "America/Sao_Paulo");
}

#[test]
fn test_partial_sections_keep_other_defaults() {
    let config = AnalysisConfig::from_json_str(
        r#"{
            "catalog": { "short_line_zone_m": 100.0, "long_line_zone_m": 250.0 },
            "classifier": { "slot_minutes": 15 }
        }"#,
    )
    .unwrap();

    assert_eq!(config.catalog.short_line_zone_m, 100.0);
    assert_eq!(config.catalog.long_line_zone_m, 250.0);
    assert_eq!(config.catalog.long_line_threshold_km, 10.0);
    assert_eq!(config.classifier.slot_minutes, 15);
    assert_eq!(config.classifier.min_efficiency, 0.5);
    assert_eq!(config.matcher.min_trip_duration_s, 600);
}

#[test]
fn test_model_divisors_from_json() {
    let config = AnalysisConfig::from_json_str(
        r#"{ "fuel": { "model_divisors": [ { "model": "ARTIC 9000", "divisor": 2500.0 } ] } }"#,
    )
    .unwrap();

    assert_eq!(config.fuel.divisor_for("ARTIC 9000"), 2500.0);
    assert_eq!(config.fuel.divisor_for("VW 17230 APACHE VIP-SC"), 1000.0);
}

#[test]
fn test_malformed_json_is_an_error() {
    let err = AnalysisConfig::from_json_str("{ \"matcher\": ").unwrap_err();
    assert!(matches!(err, LineMatchError::Json(_)));
}

#[test]
fn test_from_json_file() {
    let path = std::env::temp_dir().join(format!("linematch-config-{}.json", std::process::id()));
    std::fs::write(&path, r#"{ "matcher": { "min_trip_duration_s": 900 } }"#).unwrap();

    let config = AnalysisConfig::from_json_file(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(config.matcher.min_trip_duration_s, 900);
}

#[test]
fn test_missing_file_is_an_io_error() {
    let err = AnalysisConfig::from_json_file("/nonexistent/linematch.json").unwrap_err();
    assert!(matches!(err, LineMatchError::Io(_)));
}
