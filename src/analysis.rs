//! The persisted per-segment analysis record.

use crate::calendar::DayContext;
use crate::classifier::{LookbackWindow, WindowBaseline};
use crate::error::{LineMatchError, OptionExt, Result};
use crate::fuel::FuelResult;
use crate::pipeline::VehicleInfo;
use crate::store::AnalysisKey;
use crate::{Direction, GpsPoint, MatchedSegment};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One analysed line segment of a vehicle's day.
///
/// Unique per `(asset_id, day, trip_ordinal)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripAnalysis {
    pub trip_id: String,
    pub driver_id: Option<String>,

    pub day: NaiveDate,
    /// Sunday = 1 .. Saturday = 7
    pub weekday_number: u8,
    pub is_holiday: bool,
    pub is_holiday_eve: bool,
    /// Local `HH:MM` slot of the segment start
    pub time_slot: String,

    pub vehicle_num_id: String,
    pub asset_id: String,
    pub vehicle_model: String,
    pub trip_ordinal: u32,

    pub line_number: String,
    pub sub_line_id: String,
    pub direction: Option<Direction>,
    pub start_timestamp: i64,
    pub end_timestamp: i64,
    pub duration_s: i64,
    pub initial_overlap_pct: f64,
    pub final_overlap_pct: f64,
    pub reached_end_zone: bool,

    pub line_length_km: f64,
    /// `line_length_km * final_overlap_pct / 100`
    pub covered_km: f64,
    pub fuel_liters: Option<f64>,
    pub km_per_liter: Option<f64>,

    /// One entry per lookback window; empty when not classified
    pub baselines: Vec<WindowBaseline>,
}

impl TripAnalysis {
    pub fn builder() -> TripAnalysisBuilder {
        TripAnalysisBuilder::default()
    }

    pub fn key(&self) -> AnalysisKey {
        AnalysisKey {
            asset_id: self.asset_id.clone(),
            day: self.day,
            trip_ordinal: self.trip_ordinal,
        }
    }

    pub fn baseline(&self, window: LookbackWindow) -> Option<&WindowBaseline> {
        self.baselines.iter().find(|b| b.window == window)
    }
}

/// Assembles a [`TripAnalysis`] from the pieces produced by each stage.
#[derive(Debug, Default)]
pub struct TripAnalysisBuilder {
    trip: Option<(String, Option<String>)>,
    vehicle: Option<VehicleInfo>,
    day: Option<DayContext>,
    time_slot: Option<String>,
    trip_ordinal: Option<u32>,
    segment: Option<(MatchedSegment, i64, i64)>,
    line_length_km: Option<f64>,
    fuel: Option<FuelResult>,
    baselines: Vec<WindowBaseline>,
}

impl TripAnalysisBuilder {
    pub fn trip(mut self, trip_id: impl Into<String>, driver_id: Option<String>) -> Self {
        self.trip = Some((trip_id.into(), driver_id));
        self
    }

    pub fn vehicle(mut self, vehicle: &VehicleInfo) -> Self {
        self.vehicle = Some(vehicle.clone());
        self
    }

    pub fn day(mut self, day: DayContext) -> Self {
        self.day = Some(day);
        self
    }

    pub fn time_slot(mut self, slot: impl Into<String>) -> Self {
        self.time_slot = Some(slot.into());
        self
    }

    pub fn ordinal(mut self, ordinal: u32) -> Self {
        self.trip_ordinal = Some(ordinal);
        self
    }

    /// Attach the matched segment, resolving its timestamps in `points`.
    pub fn segment(mut self, segment: &MatchedSegment, points: &[GpsPoint]) -> Result<Self> {
        let start = points
            .get(segment.start_index)
            .ok_or_index(segment.start_index, points.len())?;
        let end = points
            .get(segment.end_index)
            .ok_or_index(segment.end_index, points.len())?;
        self.segment = Some((segment.clone(), start.timestamp, end.timestamp));
        Ok(self)
    }

    pub fn line_length_km(mut self, km: f64) -> Self {
        self.line_length_km = Some(km);
        self
    }

    pub fn fuel(mut self, fuel: FuelResult) -> Self {
        self.fuel = Some(fuel);
        self
    }

    pub fn baselines(mut self, baselines: Vec<WindowBaseline>) -> Self {
        self.baselines = baselines;
        self
    }

    pub fn build(self) -> Result<TripAnalysis> {
        let (trip_id, driver_id) = self.trip.ok_or(LineMatchError::IncompleteAnalysis("trip"))?;
        let vehicle = self.vehicle.ok_or(LineMatchError::IncompleteAnalysis("vehicle"))?;
        let day = self.day.ok_or(LineMatchError::IncompleteAnalysis("day"))?;
        let time_slot = self
            .time_slot
            .ok_or(LineMatchError::IncompleteAnalysis("time slot"))?;
        let trip_ordinal = self
            .trip_ordinal
            .ok_or(LineMatchError::IncompleteAnalysis("trip ordinal"))?;
        let (segment, start_timestamp, end_timestamp) = self
            .segment
            .ok_or(LineMatchError::IncompleteAnalysis("segment"))?;
        let line_length_km = self
            .line_length_km
            .ok_or(LineMatchError::IncompleteAnalysis("line length"))?;

        let (fuel_liters, km_per_liter) = match self.fuel {
            Some(f) => (f.liters, f.km_per_liter),
            None => (None, None),
        };

        Ok(TripAnalysis {
            trip_id,
            driver_id,
            day: day.day,
            weekday_number: day.weekday_number,
            is_holiday: day.is_holiday,
            is_holiday_eve: day.is_holiday_eve,
            time_slot,
            vehicle_num_id: vehicle.num_id,
            asset_id: vehicle.asset_id,
            vehicle_model: vehicle.model,
            trip_ordinal,
            line_number: segment.line_number,
            sub_line_id: segment.sub_line_id,
            direction: segment.direction,
            start_timestamp,
            end_timestamp,
            duration_s: end_timestamp - start_timestamp,
            initial_overlap_pct: segment.initial_overlap_pct,
            final_overlap_pct: segment.final_overlap_pct,
            reached_end_zone: segment.reached_end_zone,
            line_length_km,
            covered_km: line_length_km * segment.final_overlap_pct / 100.0,
            fuel_liters,
            km_per_liter,
            baselines: self.baselines,
        })
    }
}
