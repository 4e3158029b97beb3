//! Synthetic bus-line data for tests and benchmarks.
//!
//! Generates line shapes, GPS traces that drive them, terminus dwell and
//! cumulative fuel-meter series. Everything is deterministic for a given
//! seed, so expected matches are known in advance.
//!
//! # Example
//!
//! ```rust
//! use linematch::synthetic::BusDayScenario;
//!
//! let day = BusDayScenario {
//!     round_trips: 2,
//!     ..BusDayScenario::default()
//! }
//! .generate();
//!
//! assert_eq!(day.lines.len(), 2);
//! assert_eq!(day.trips.len(), 2);
//! ```

use crate::catalog::LineShape;
use crate::geo_utils::haversine_lat_lng;
use crate::pipeline::TripInput;
use crate::{Direction, FuelSample, GpsPoint};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;

// ============================================================================
// Coordinate Helpers
// ============================================================================

/// Meters per degree of latitude (approximately constant).
const METERS_PER_DEG_LAT: f64 = 111_320.0;

fn meters_to_deg_lat(meters: f64) -> f64 {
    meters / METERS_PER_DEG_LAT
}

fn meters_to_deg_lng(meters: f64, latitude: f64) -> f64 {
    let meters_per_deg_lng = METERS_PER_DEG_LAT * latitude.to_radians().cos();
    if meters_per_deg_lng.abs() < 1e-10 {
        return 0.0;
    }
    meters / meters_per_deg_lng
}

// ============================================================================
// Line Shapes
// ============================================================================

/// Straight eastbound line of `length_m` meters as `[lng, lat]` pairs.
pub fn straight_line(lat: f64, lng: f64, length_m: f64, n_points: usize) -> Vec<[f64; 2]> {
    let n = n_points.max(2);
    let total_dlng = meters_to_deg_lng(length_m, lat);
    (0..n)
        .map(|i| {
            let f = i as f64 / (n - 1) as f64;
            [lng + total_dlng * f, lat]
        })
        .collect()
}

/// Winding line with gentle turns, one vertex every `spacing_m` meters.
pub fn winding_line(lat: f64, lng: f64, length_m: f64, spacing_m: f64, seed: u64) -> Vec<[f64; 2]> {
    let mut rng = StdRng::seed_from_u64(seed);
    let spacing = spacing_m.max(1.0);
    let steps = (length_m / spacing).ceil() as usize;

    let mut heading: f64 = rng.gen_range(0.0..(2.0 * PI));
    let mut current = [lng, lat];
    let mut coords = Vec::with_capacity(steps + 1);
    coords.push(current);

    for i in 0..steps {
        let base_turn = (i as f64 * 0.05).sin() * 0.1;
        heading += base_turn + rng.gen_range(-0.08..0.08);
        let dlat = meters_to_deg_lat(spacing * heading.sin());
        let dlng = meters_to_deg_lng(spacing * heading.cos(), current[1]);
        current = [current[0] + dlng, current[1] + dlat];
        coords.push(current);
    }

    coords
}

// ============================================================================
// Traces
// ============================================================================

/// `n` fixes evenly spaced by distance along `shape`, `step_s` seconds apart.
pub fn trace_along(shape: &[[f64; 2]], n: usize, start_ts: i64, step_s: i64) -> Vec<GpsPoint> {
    if shape.is_empty() || n == 0 {
        return Vec::new();
    }
    if shape.len() == 1 || n == 1 {
        return vec![GpsPoint::new(start_ts, shape[0][1], shape[0][0])];
    }

    let seg_lengths: Vec<f64> = shape
        .windows(2)
        .map(|w| haversine_lat_lng(w[0][1], w[0][0], w[1][1], w[1][0]))
        .collect();
    let total: f64 = seg_lengths.iter().sum();

    let mut points = Vec::with_capacity(n);
    let mut seg = 0;
    let mut seg_start = 0.0;
    for i in 0..n {
        let target = total * i as f64 / (n - 1) as f64;
        while seg + 1 < seg_lengths.len() && seg_start + seg_lengths[seg] < target {
            seg_start += seg_lengths[seg];
            seg += 1;
        }
        let f = if seg_lengths[seg] > 0.0 {
            ((target - seg_start) / seg_lengths[seg]).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let (a, b) = (shape[seg], shape[seg + 1]);
        points.push(GpsPoint::new(
            start_ts + step_s * i as i64,
            a[1] + (b[1] - a[1]) * f,
            a[0] + (b[0] - a[0]) * f,
        ));
    }
    points
}

/// A vehicle standing still at `at` for `count` fixes.
pub fn dwell(at: [f64; 2], count: usize, start_ts: i64, step_s: i64) -> Vec<GpsPoint> {
    (0..count)
        .map(|i| GpsPoint::new(start_ts + step_s * i as i64, at[1], at[0]))
        .collect()
}

/// Add Gaussian GPS noise to a trace.
pub fn add_gps_noise(points: &[GpsPoint], sigma_meters: f64, rng: &mut StdRng) -> Vec<GpsPoint> {
    if sigma_meters <= 0.0 {
        return points.to_vec();
    }

    points
        .iter()
        .map(|p| {
            // Box-Muller transform
            let u1: f64 = rng.gen_range(0.0001..1.0);
            let u2: f64 = rng.r#gen();
            let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos();
            let z1 = (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).sin();

            GpsPoint::new(
                p.timestamp,
                p.latitude + meters_to_deg_lat(z0 * sigma_meters),
                p.longitude + meters_to_deg_lng(z1 * sigma_meters, p.latitude),
            )
        })
        .collect()
}

// ============================================================================
// Fuel
// ============================================================================

/// Cumulative meter readings on `interval_s` boundaries covering
/// `[start_ts, end_ts]`, growing by `per_interval` each bucket.
pub fn fuel_series(
    start_ts: i64,
    end_ts: i64,
    interval_s: i64,
    initial_value: f64,
    per_interval: f64,
) -> Vec<FuelSample> {
    let interval = interval_s.max(1);
    let first = start_ts - start_ts.rem_euclid(interval);
    let last = end_ts - end_ts.rem_euclid(interval) + interval;

    let mut samples = Vec::new();
    let mut ts = first;
    let mut value = initial_value;
    while ts <= last {
        samples.push(FuelSample::new(ts, value));
        ts += interval;
        value += per_interval;
    }
    samples
}

// ============================================================================
// Scenario
// ============================================================================

/// A vehicle shuttling between the termini of one line.
#[derive(Debug, Clone)]
pub struct BusDayScenario {
    /// Outbound terminus as (latitude, longitude)
    pub origin: (f64, f64),
    pub line_length_m: f64,
    /// Trips generated; each is one outbound plus one inbound run
    pub round_trips: usize,
    /// Fixes per one-way run
    pub points_per_run: usize,
    /// Seconds between fixes
    pub step_s: i64,
    /// Fixes spent standing at each terminus
    pub dwell_points: usize,
    pub gps_noise_sigma_m: f64,
    /// Raw meter units consumed per 5-minute bucket
    pub fuel_per_bucket: f64,
    pub start_ts: i64,
    pub seed: u64,
}

impl Default for BusDayScenario {
    fn default() -> Self {
        Self {
            origin: (-16.6869, -49.2648),
            line_length_m: 12_000.0,
            round_trips: 1,
            points_per_run: 60,
            step_s: 30,
            dwell_points: 10,
            gps_noise_sigma_m: 5.0,
            fuel_per_bucket: 1_500.0,
            // 2024-03-12 09:00:00 UTC
            start_ts: 1_710_234_000,
            seed: 42,
        }
    }
}

/// Lines and trips produced by a [`BusDayScenario`].
#[derive(Debug, Clone)]
pub struct SyntheticBusDay {
    /// Outbound then inbound shape of sub-line `001A`
    pub lines: Vec<LineShape>,
    pub trips: Vec<TripInput>,
}

impl BusDayScenario {
    pub fn generate(&self) -> SyntheticBusDay {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let (lat, lng) = self.origin;

        let outbound = straight_line(lat, lng, self.line_length_m, 200);
        let inbound: Vec<[f64; 2]> = outbound.iter().rev().copied().collect();
        let length_km = self.line_length_m / 1000.0;

        let lines = vec![
            LineShape::new("001", "001A", Direction::Outbound, length_km, outbound.clone()),
            LineShape::new("001", "001A", Direction::Inbound, length_km, inbound.clone()),
        ];

        let mut trips = Vec::with_capacity(self.round_trips);
        let mut ts = self.start_ts;
        for trip_idx in 0..self.round_trips {
            let mut points = Vec::new();
            for shape in [&outbound, &inbound] {
                let run = trace_along(shape, self.points_per_run, ts, self.step_s);
                ts += self.step_s * self.points_per_run as i64;
                points.extend(add_gps_noise(&run, self.gps_noise_sigma_m, &mut rng));

                let end = shape[shape.len() - 1];
                points.extend(dwell(end, self.dwell_points, ts, self.step_s));
                ts += self.step_s * self.dwell_points as i64;
            }

            let first_ts = points.first().map(|p| p.timestamp).unwrap_or(ts);
            let last_ts = points.last().map(|p| p.timestamp).unwrap_or(ts);
            let fuel = fuel_series(
                first_ts - 600,
                last_ts + 600,
                300,
                1_000_000.0 + 100_000.0 * trip_idx as f64,
                self.fuel_per_bucket,
            );

            trips.push(TripInput {
                trip_id: format!("trip_{:03}", trip_idx),
                driver_id: Some(format!("driver_{:02}", trip_idx % 3)),
                points,
                fuel,
            });
        }

        SyntheticBusDay { lines, trips }
    }
}
