//! Per-trip and per-vehicle-day processing.
//!
//! For each trip of a vehicle-day:
//!
//! ```text
//! GPS trace ──► LineMatcher ──► segments
//!                                  │ (ordinal, duration filter, already stored?)
//!                                  ▼
//! fuel series ──► FuelInterpolator ──► km/l ──► cohort ──► PerformanceClassifier
//!                                                              │
//!                                                              ▼
//!                                                    TripAnalysis ──► store
//! ```
//!
//! A failing trip is logged and counted; the remaining trips of the
//! vehicle-day are still processed. The batch drivers also contain panics
//! per vehicle-day: a panicking vehicle-day reports all its trips failed. Trip ordinals are assigned per
//! vehicle-day in time order and do not depend on whether earlier trips
//! failed, so re-runs reproduce the same keys.

use crate::analysis::TripAnalysis;
use crate::calendar::{time_slot, DayContext, HolidayCalendar};
use crate::catalog::{GeometryCatalog, PreparedLine};
use crate::classifier::{normalize_vehicle_model, CohortQuery, PerformanceClassifier};
use crate::config::AnalysisConfig;
use crate::error::{LineMatchError, Result};
use crate::fuel::FuelInterpolator;
use crate::matcher::LineMatcher;
use crate::store::{AnalysisKey, AnalysisStore};
use crate::{FuelSample, GpsPoint, MatchedSegment};
use chrono::NaiveDate;
use chrono_tz::Tz;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};

/// Vehicle identifiers and model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleInfo {
    /// Fleet number
    pub num_id: String,
    /// Telemetry asset id
    pub asset_id: String,
    pub model: String,
}

/// One trip's raw telemetry, already padded by the fetch layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripInput {
    pub trip_id: String,
    #[serde(default)]
    pub driver_id: Option<String>,
    pub points: Vec<GpsPoint>,
    #[serde(default)]
    pub fuel: Vec<FuelSample>,
}

impl TripInput {
    fn start_timestamp(&self) -> i64 {
        self.points.iter().map(|p| p.timestamp).min().unwrap_or(i64::MAX)
    }
}

/// All trips of one vehicle on one service day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleDay {
    pub vehicle: VehicleInfo,
    pub day: NaiveDate,
    pub trips: Vec<TripInput>,
}

/// Borrowed inputs shared by every segment of one trip.
#[derive(Debug, Clone, Copy)]
pub struct TripScope<'a> {
    pub vehicle: &'a VehicleInfo,
    pub day: &'a DayContext,
    pub trip: &'a TripInput,
    /// Cleaned trace the segment indices point into
    pub points: &'a [GpsPoint],
    /// Fuel series sorted by timestamp
    pub fuel: &'a [FuelSample],
}

/// Outcome counts for one vehicle-day.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleDayReport {
    pub asset_id: String,
    pub day: Option<NaiveDate>,
    pub trips: usize,
    pub segments: usize,
    /// New analyses persisted
    pub written: usize,
    /// Segments not longer than the minimum trip duration
    pub skipped_short: usize,
    /// Keys found in the store before or at insert time
    pub already_present: usize,
    /// Trips whose processing failed
    pub failed_trips: usize,
}

/// Everything one processing run needs: the day's catalog, configuration
/// and holiday calendar.
pub struct AnalysisContext {
    catalog: GeometryCatalog,
    config: AnalysisConfig,
    holidays: HolidayCalendar,
    tz: Tz,
    fuel: FuelInterpolator,
    classifier: PerformanceClassifier,
}

impl AnalysisContext {
    pub fn new(catalog: GeometryCatalog, config: AnalysisConfig, holidays: HolidayCalendar) -> Result<Self> {
        let tz = config.classifier.tz()?;
        Ok(Self {
            fuel: FuelInterpolator::new(config.fuel.clone()),
            classifier: PerformanceClassifier::new(config.classifier.clone()),
            catalog,
            config,
            holidays,
            tz,
        })
    }

    pub fn catalog(&self) -> &GeometryCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn holidays(&self) -> &HolidayCalendar {
        &self.holidays
    }

    /// Matched segments of one trace (after cleaning).
    pub fn match_trip(&self, points: &[GpsPoint]) -> Vec<MatchedSegment> {
        LineMatcher::new(&self.catalog, self.config.matcher.clone()).find_segments(&clean_points(points))
    }

    /// Process every trip of a vehicle-day and persist new analyses.
    pub fn process_vehicle_day<S: AnalysisStore + ?Sized>(
        &self,
        store: &S,
        vehicle_day: &VehicleDay,
    ) -> VehicleDayReport {
        let vehicle = &vehicle_day.vehicle;
        let day = DayContext::new(vehicle_day.day, &self.holidays);
        let matcher = LineMatcher::new(&self.catalog, self.config.matcher.clone());

        let mut report = VehicleDayReport {
            asset_id: vehicle.asset_id.clone(),
            day: Some(vehicle_day.day),
            trips: vehicle_day.trips.len(),
            ..Default::default()
        };

        let mut trips: Vec<&TripInput> = vehicle_day.trips.iter().collect();
        trips.sort_by_key(|t| t.start_timestamp());

        let mut next_ordinal: u32 = 1;
        for trip in trips {
            let points = clean_points(&trip.points);
            let segments = if points.len() < 2 {
                debug!(
                    "[Pipeline] Trip {} has {} usable points, nothing to match",
                    trip.trip_id,
                    points.len()
                );
                Vec::new()
            } else {
                matcher.find_segments(&points)
            };

            let first_ordinal = next_ordinal;
            next_ordinal += segments.len() as u32;
            report.segments += segments.len();

            let mut fuel = trip.fuel.clone();
            fuel.sort_by_key(|s| s.timestamp);

            let scope = TripScope {
                vehicle,
                day: &day,
                trip,
                points: &points,
                fuel: &fuel,
            };
            let outcome = self.process_trip(store, &scope, &segments, first_ordinal, &mut report);
            if let Err(e) = outcome {
                warn!(
                    "[Pipeline] Trip {} of {} on {} failed: {}",
                    trip.trip_id, vehicle.asset_id, vehicle_day.day, e
                );
                report.failed_trips += 1;
            }
        }

        info!(
            "[Pipeline] {} {}: {} trips, {} segments, {} written, {} short, {} present, {} failed",
            vehicle.asset_id,
            vehicle_day.day,
            report.trips,
            report.segments,
            report.written,
            report.skipped_short,
            report.already_present,
            report.failed_trips
        );
        report
    }

    fn process_trip<S: AnalysisStore + ?Sized>(
        &self,
        store: &S,
        scope: &TripScope<'_>,
        segments: &[MatchedSegment],
        first_ordinal: u32,
        report: &mut VehicleDayReport,
    ) -> Result<()> {
        for (offset, segment) in segments.iter().enumerate() {
            let ordinal = first_ordinal + offset as u32;

            let duration = segment.duration_seconds(scope.points);
            if duration <= self.config.matcher.min_trip_duration_s {
                debug!(
                    "[Pipeline] Trip {} segment #{} lasts {} s, not analysed",
                    scope.trip.trip_id, ordinal, duration
                );
                report.skipped_short += 1;
                continue;
            }

            let key = AnalysisKey {
                asset_id: scope.vehicle.asset_id.clone(),
                day: scope.day.day,
                trip_ordinal: ordinal,
            };
            if store.contains(&key)? {
                report.already_present += 1;
                continue;
            }

            let analysis = self.analyze_segment(store, scope, segment, ordinal)?;
            if store.insert_ignore(&analysis)? {
                report.written += 1;
            } else {
                report.already_present += 1;
            }
        }
        Ok(())
    }

    /// Build the full analysis record of one segment.
    pub fn analyze_segment<S: AnalysisStore + ?Sized>(
        &self,
        store: &S,
        scope: &TripScope<'_>,
        segment: &MatchedSegment,
        ordinal: u32,
    ) -> Result<TripAnalysis> {
        let TripScope {
            vehicle,
            day,
            trip,
            points,
            fuel,
        } = *scope;
        let line = self.line_of(segment)?;
        let builder = TripAnalysis::builder()
            .trip(trip.trip_id.clone(), trip.driver_id.clone())
            .vehicle(vehicle)
            .day(*day)
            .ordinal(ordinal)
            .segment(segment, points)?;

        let start = points[segment.start_index].timestamp;
        let end = points[segment.end_index].timestamp;
        let slot = time_slot(start, self.tz, self.config.classifier.slot_minutes)?;

        let fuel_result = self.fuel.evaluate(
            fuel,
            start,
            end,
            line.measured_length_km,
            segment.final_overlap_pct,
            &vehicle.model,
        );

        // No cohort without a direction or without an efficiency to compare
        let baselines = match (segment.direction, fuel_result.km_per_liter) {
            (Some(direction), Some(km_per_liter)) => {
                let query = CohortQuery {
                    sub_line_id: segment.sub_line_id.clone(),
                    direction,
                    time_slot: slot.clone(),
                    category: day.category,
                    is_holiday: day.is_holiday,
                    vehicle_model: normalize_vehicle_model(&vehicle.model),
                    reference_day: day.day,
                    min_efficiency: self.config.classifier.min_efficiency,
                    max_efficiency: self.config.classifier.max_efficiency,
                };
                let cohort = store.cohort(&query)?;
                self.classifier.classify(km_per_liter, &cohort, day.day)
            }
            _ => Vec::new(),
        };

        builder
            .time_slot(slot)
            .line_length_km(line.measured_length_km)
            .fuel(fuel_result)
            .baselines(baselines)
            .build()
    }

    /// Catalog entry a segment is measured against. Unresolved directions
    /// use the first entry of the sub-line.
    fn line_of(&self, segment: &MatchedSegment) -> Result<&PreparedLine> {
        if let Some(line) = segment.line_key().and_then(|key| self.catalog.get(&key)) {
            return Ok(line);
        }
        self.catalog
            .sub_line_indices(&segment.line_number, &segment.sub_line_id)
            .first()
            .map(|&idx| &self.catalog.lines()[idx])
            .ok_or_else(|| LineMatchError::InvalidLineShape {
                line_number: segment.line_number.clone(),
                sub_line_id: segment.sub_line_id.clone(),
                reason: "not in the catalog".to_string(),
            })
    }
}

/// Valid fixes in timestamp order.
fn clean_points(points: &[GpsPoint]) -> Vec<GpsPoint> {
    let mut cleaned: Vec<GpsPoint> = points.iter().filter(|p| p.is_valid()).copied().collect();
    cleaned.sort_by_key(|p| p.timestamp);
    cleaned
}

/// One vehicle-day with panics contained.
fn process_isolated<S: AnalysisStore + ?Sized>(
    ctx: &AnalysisContext,
    store: &S,
    vehicle_day: &VehicleDay,
) -> VehicleDayReport {
    match panic::catch_unwind(AssertUnwindSafe(|| ctx.process_vehicle_day(store, vehicle_day))) {
        Ok(report) => report,
        Err(_) => {
            error!(
                "[Pipeline] {} {} aborted by a panic, {} trips not processed",
                vehicle_day.vehicle.asset_id,
                vehicle_day.day,
                vehicle_day.trips.len()
            );
            VehicleDayReport {
                asset_id: vehicle_day.vehicle.asset_id.clone(),
                day: Some(vehicle_day.day),
                trips: vehicle_day.trips.len(),
                failed_trips: vehicle_day.trips.len(),
                ..Default::default()
            }
        }
    }
}

/// Process vehicle-days one after another.
pub fn process_vehicle_days<S: AnalysisStore + ?Sized>(
    ctx: &AnalysisContext,
    store: &S,
    vehicle_days: &[VehicleDay],
) -> Vec<VehicleDayReport> {
    vehicle_days
        .iter()
        .map(|vd| process_isolated(ctx, store, vd))
        .collect()
}

/// Process vehicle-days on the rayon thread pool.
///
/// Vehicle-days share only the read-only context and the store.
#[cfg(feature = "parallel")]
pub fn process_vehicle_days_parallel<S: AnalysisStore + ?Sized>(
    ctx: &AnalysisContext,
    store: &S,
    vehicle_days: &[VehicleDay],
) -> Vec<VehicleDayReport> {
    use rayon::prelude::*;

    vehicle_days
        .par_iter()
        .map(|vd| process_isolated(ctx, store, vd))
        .collect()
}
