//! # Line Matcher
//!
//! Bus line reconstruction and fuel efficiency analysis from vehicle telemetry.
//!
//! This library provides:
//! - A catalog of reference bus line geometries (buffered corridors and terminus zones)
//! - Corridor overlap scoring for buffered GPS trajectories
//! - Sliding-window line matching that splits a trip into line segments
//! - Fuel consumption interpolation over 5-minute cumulative meter samples
//! - Cohort baseline classification of km-per-litre efficiency
//! - A per-vehicle-day pipeline with idempotent persistence
//!
//! ## Features
//!
//! - **`parallel`** - Process vehicle-days in parallel with rayon
//! - **`persistence`** - Enable the SQLite analysis store
//!
//! ## Quick Start
//!
//! ```rust
//! use linematch::synthetic::{straight_line, trace_along};
//! use linematch::{CatalogConfig, Direction, GeometryCatalog, LineMatcher, LineShape, MatcherConfig};
//!
//! let shape = straight_line(-16.68, -49.26, 12_000.0, 200);
//! let lines = vec![
//!     LineShape::new("001", "001A", Direction::Outbound, 12.0, shape.clone()),
//!     LineShape::new("001", "001A", Direction::Inbound, 12.0, shape.iter().rev().copied().collect()),
//! ];
//! let catalog = GeometryCatalog::build(&lines, &CatalogConfig::default()).unwrap();
//!
//! let trace = trace_along(&shape, 50, 1_700_000_000, 30);
//! let matcher = LineMatcher::new(&catalog, MatcherConfig::default());
//! let segments = matcher.find_segments(&trace);
//!
//! assert_eq!(segments.len(), 1);
//! assert_eq!(segments[0].direction, Some(Direction::Outbound));
//! ```

use rstar::{RTreeObject, AABB};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// Unified error handling
pub mod error;
pub use error::{GeometryError, LineMatchError, OptionExt, Result};

// Geographic utilities (distance, bounds, planar projection)
pub mod geo_utils;

// Buffering and corridor overlap scoring
pub mod overlap;
pub use overlap::{buffer_trajectory, overlap_percentage, try_overlap_percentage};

// Reference line geometries for a service day
pub mod catalog;
pub use catalog::{CatalogConfig, GeometryCatalog, LineShape, PreparedLine};

// Sliding-window trajectory to line matching
pub mod matcher;
pub use matcher::{LineMatcher, MatcherConfig};

// Fuel consumption over a matched segment
pub mod fuel;
pub use fuel::{fuel_consumed, FuelConfig, FuelInterpolator};

// Service-day calendar context (weekday, holidays, time slots)
pub mod calendar;
pub use calendar::{DayContext, HolidayCalendar, WeekdayCategory};

// Historical cohort baselines and status labels
pub mod classifier;
pub use classifier::{
    ClassifierConfig, CohortQuery, CohortSample, LookbackWindow, PerformanceClassifier, PerformanceStatus,
    WindowBaseline,
};

// Final per-segment analysis record
pub mod analysis;
pub use analysis::{TripAnalysis, TripAnalysisBuilder};

// Persistence of analyses and cohort lookups
pub mod store;
#[cfg(feature = "persistence")]
pub use store::SqliteStore;
pub use store::{AnalysisKey, AnalysisStore, InMemoryStore};

// Per-trip and per-vehicle-day processing
pub mod pipeline;
#[cfg(feature = "parallel")]
pub use pipeline::process_vehicle_days_parallel;
pub use pipeline::{
    process_vehicle_days, AnalysisContext, TripInput, TripScope, VehicleDay, VehicleDayReport, VehicleInfo,
};

// Aggregate configuration
pub mod config;
pub use config::AnalysisConfig;

// Deterministic synthetic lines, traces and fuel series
pub mod synthetic;

// ============================================================================
// Core Types
// ============================================================================

/// A timestamped GPS fix reported by a vehicle.
///
/// # Example
/// ```
/// use linematch::GpsPoint;
/// let point = GpsPoint::new(1_700_000_000, -16.6869, -49.2648); // Goiânia
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsPoint {
    /// Unix timestamp (seconds since epoch)
    pub timestamp: i64,
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS fix.
    pub fn new(timestamp: i64, latitude: f64, longitude: f64) -> Self {
        Self {
            timestamp,
            latitude,
            longitude,
        }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// A cumulative fuel-meter reading.
///
/// Readings arrive roughly every 5 minutes and only grow, except when the
/// meter is reset or rolls over.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FuelSample {
    /// Unix timestamp (seconds since epoch)
    pub timestamp: i64,
    /// Cumulative meter value (raw units, usually millilitres)
    pub value: f64,
}

impl FuelSample {
    pub fn new(timestamp: i64, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Direction of travel along a line.
///
/// Serialized with the operator's labels: `IDA` (outbound) and `VOLTA` (inbound).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "IDA", alias = "outbound")]
    Outbound,
    #[serde(rename = "VOLTA", alias = "inbound")]
    Inbound,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Outbound => "IDA",
            Direction::Inbound => "VOLTA",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = LineMatchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "IDA" | "OUTBOUND" => Ok(Direction::Outbound),
            "VOLTA" | "INBOUND" => Ok(Direction::Inbound),
            other => Err(LineMatchError::InvalidDirection(other.to_string())),
        }
    }
}

/// Identifies one catalog entry: a sub-line travelled in one direction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineKey {
    pub line_number: String,
    pub sub_line_id: String,
    pub direction: Direction,
}

/// A contiguous run of a trip's GPS trace attributed to one line.
///
/// Indices point into the trace passed to [`LineMatcher::find_segments`];
/// `end_index >= start_index` always holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedSegment {
    pub line_number: String,
    pub sub_line_id: String,
    /// `None` when no trace point reached a start zone of the sub-line
    pub direction: Option<Direction>,
    pub start_index: usize,
    pub end_index: usize,
    /// Overlap (0-100) of the window that first crossed the threshold
    pub initial_overlap_pct: f64,
    /// Overlap (0-100) of `[start_index, end_index]` against the resolved corridor
    pub final_overlap_pct: f64,
    /// Whether the end search hit a terminus zone
    pub reached_end_zone: bool,
}

impl MatchedSegment {
    /// Number of GPS points covered by the segment.
    pub fn point_count(&self) -> usize {
        self.end_index - self.start_index + 1
    }

    /// Elapsed seconds between the segment's first and last fix.
    pub fn duration_seconds(&self, points: &[GpsPoint]) -> i64 {
        match (points.get(self.start_index), points.get(self.end_index)) {
            (Some(a), Some(b)) => b.timestamp - a.timestamp,
            _ => 0,
        }
    }

    /// Catalog key of the matched line, if the direction was resolved.
    pub fn line_key(&self) -> Option<LineKey> {
        self.direction.map(|direction| LineKey {
            line_number: self.line_number.clone(),
            sub_line_id: self.sub_line_id.clone(),
            direction,
        })
    }
}

/// Geographic bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Create bounds from GPS points.
    pub fn from_points(points: &[GpsPoint]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let mut min_lat = f64::MAX;
        let mut max_lat = f64::MIN;
        let mut min_lng = f64::MAX;
        let mut max_lng = f64::MIN;

        for p in points {
            min_lat = min_lat.min(p.latitude);
            max_lat = max_lat.max(p.latitude);
            min_lng = min_lng.min(p.longitude);
            max_lng = max_lng.max(p.longitude);
        }

        Some(Self {
            min_lat,
            max_lat,
            min_lng,
            max_lng,
        })
    }

    /// Get the center of the bounds as (latitude, longitude).
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }
}

/// Planar bounding box of a prepared geometry (projected metres), for R-tree indexing.
#[derive(Debug, Clone, Copy)]
pub struct PlanarBounds {
    /// Position of the owning entry in its collection
    pub idx: usize,
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl RTreeObject for PlanarBounds {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners([self.min_x, self.min_y], [self.max_x, self.max_y])
    }
}
