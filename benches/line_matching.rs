//! Benchmarks for catalog preparation, line matching and the pipeline.
//!
//! Run with: `cargo bench --bench line_matching`

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use linematch::synthetic::{BusDayScenario, fuel_series};
use linematch::{
    AnalysisConfig, AnalysisContext, CatalogConfig, FuelInterpolator, GeometryCatalog,
    HolidayCalendar, InMemoryStore, LineMatcher, MatcherConfig, VehicleDay, VehicleInfo,
    process_vehicle_days,
};
use std::hint::black_box;

fn bench_catalog_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("catalog_build");

    for length_m in [5_000.0, 12_000.0, 25_000.0] {
        let day = BusDayScenario {
            line_length_m: length_m,
            ..BusDayScenario::default()
        }
        .generate();
        group.bench_with_input(
            BenchmarkId::new("two_directions", format!("{}m", length_m)),
            &day.lines,
            |b, lines| {
                b.iter(|| GeometryCatalog::build(lines, &CatalogConfig::default()));
            },
        );
    }

    group.finish();
}

fn bench_find_segments(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_segments");
    group.sample_size(10);

    for points_per_run in [30, 60, 120] {
        let day = BusDayScenario {
            points_per_run,
            ..BusDayScenario::default()
        }
        .generate();
        let Ok(catalog) = GeometryCatalog::build(&day.lines, &CatalogConfig::default()) else {
            continue;
        };
        let matcher = LineMatcher::new(&catalog, MatcherConfig::default());
        let points = &day.trips[0].points;

        group.bench_with_input(
            BenchmarkId::new("round_trip", format!("{}pts", points.len())),
            points,
            |b, pts| {
                b.iter(|| matcher.find_segments(black_box(pts)));
            },
        );
    }

    group.finish();
}

fn bench_fuel(c: &mut Criterion) {
    let interpolator = FuelInterpolator::default();
    let samples = fuel_series(0, 86_400, 300, 0.0, 1_500.0);

    c.bench_function("fuel_consumed_one_hour", |b| {
        b.iter(|| interpolator.consumed(black_box(&samples), 36_120, 39_720));
    });
}

fn bench_pipeline(c: &mut Criterion) {
    let day = BusDayScenario {
        round_trips: 4,
        ..BusDayScenario::default()
    }
    .generate();
    let config = AnalysisConfig::default();
    let Ok(catalog) = GeometryCatalog::build(&day.lines, &config.catalog) else {
        return;
    };
    let Ok(ctx) = AnalysisContext::new(catalog, config, HolidayCalendar::default()) else {
        return;
    };
    let vehicle_days = vec![VehicleDay {
        vehicle: VehicleInfo {
            num_id: "50001".to_string(),
            asset_id: "281474977000001".to_string(),
            model: "MB OF 1721 L59".to_string(),
        },
        day: chrono::NaiveDate::from_ymd_opt(2024, 3, 12).unwrap_or_default(),
        trips: day.trips,
    }];

    let mut group = c.benchmark_group("pipeline");
    group.sample_size(10);
    group.bench_function("vehicle_day_4_round_trips", |b| {
        b.iter(|| {
            let store = InMemoryStore::new();
            process_vehicle_days(&ctx, &store, black_box(&vehicle_days))
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_catalog_build,
    bench_find_segments,
    bench_fuel,
    bench_pipeline
);
criterion_main!(benches);
