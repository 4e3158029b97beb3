//! Fuel consumption over a matched segment.
//!
//! Fuel meters report a cumulative value every 5 minutes. Consumption over
//! `[start, end]` is the sum of bucket deltas, with the first and last
//! buckets weighted by the fraction of the bucket inside the segment:
//!
//! ```text
//!  s0        s1        s2        s3
//!  |----+----|---------|------+--|
//!       start                 end
//!  lead: delta(s0,s1) * (300 - (start - s0)) / 300
//!  mid:  delta(s1,s2)
//!  tail: delta(s2,s3) * (300 - (s3 - end)) / 300
//! ```
//!
//! A negative delta means the meter was reset; the post-reset reading is
//! counted as fresh consumption so a reset never lowers the total.

use crate::FuelSample;
use serde::{Deserialize, Serialize};

/// Conversion divisor override for one vehicle model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDivisor {
    pub model: String,
    pub divisor: f64,
}

/// Configuration for fuel interpolation and unit conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FuelConfig {
    /// Meter sampling interval in seconds. Default: 300
    pub sample_interval_s: i64,

    /// Padding the data fetch should add around a trip, in minutes.
    /// Default: 10
    pub fetch_padding_min: i64,

    /// Raw meter units per litre. Default: 1000.0
    pub unit_divisor: f64,

    /// Models whose meters use a different conversion.
    /// Default: `VW 17230 APACHE VIP-SC` -> 5614.0
    pub model_divisors: Vec<ModelDivisor>,
}

impl Default for FuelConfig {
    fn default() -> Self {
        Self {
            sample_interval_s: 300,
            fetch_padding_min: 10,
            unit_divisor: 1000.0,
            model_divisors: vec![ModelDivisor {
                model: "VW 17230 APACHE VIP-SC".to_string(),
                divisor: 5614.0,
            }],
        }
    }
}

impl FuelConfig {
    /// Divisor converting raw meter units to litres for a vehicle model.
    pub fn divisor_for(&self, vehicle_model: &str) -> f64 {
        let model = vehicle_model.trim();
        self.model_divisors
            .iter()
            .find(|m| m.model.trim() == model)
            .map(|m| m.divisor)
            .unwrap_or(self.unit_divisor)
    }
}

/// Fuel figures for one segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FuelResult {
    /// Interpolated consumption in raw meter units
    pub raw_consumed: f64,
    /// `None` when consumption rounds to zero
    pub liters: Option<f64>,
    /// Line length scaled by the final overlap
    pub covered_km: f64,
    /// `covered_km / liters`, `None` without fuel
    pub km_per_liter: Option<f64>,
}

/// Computes segment consumption and efficiency.
#[derive(Debug, Clone, Default)]
pub struct FuelInterpolator {
    config: FuelConfig,
}

impl FuelInterpolator {
    pub fn new(config: FuelConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FuelConfig {
        &self.config
    }

    /// Samples inside the bucket-aligned window around `[start, end]`.
    ///
    /// `samples` must be sorted by timestamp.
    pub fn window<'s>(&self, samples: &'s [FuelSample], start: i64, end: i64) -> &'s [FuelSample] {
        let (from, to) = bucket_window(start, end, self.config.sample_interval_s);
        let lo = samples.partition_point(|s| s.timestamp < from);
        let hi = samples.partition_point(|s| s.timestamp <= to);
        if lo >= hi {
            &samples[0..0]
        } else {
            &samples[lo..hi]
        }
    }

    /// Raw consumption over `[start, end]` from a sorted, padded series.
    pub fn consumed(&self, samples: &[FuelSample], start: i64, end: i64) -> f64 {
        fuel_consumed(
            self.window(samples, start, end),
            start,
            end,
            self.config.sample_interval_s,
        )
    }

    /// Consumption, litres and km/l for a segment of a line.
    pub fn evaluate(
        &self,
        samples: &[FuelSample],
        start: i64,
        end: i64,
        line_length_km: f64,
        final_overlap_pct: f64,
        vehicle_model: &str,
    ) -> FuelResult {
        let raw_consumed = self.consumed(samples, start, end);
        let liters = to_liters(raw_consumed, self.config.divisor_for(vehicle_model));
        let covered_km = line_length_km * (final_overlap_pct / 100.0);
        FuelResult {
            raw_consumed,
            liters,
            covered_km,
            km_per_liter: liters.map(|l| covered_km / l),
        }
    }
}

/// Convert raw units to litres; zero (or unusable) consumption gives `None`.
pub fn to_liters(raw: f64, divisor: f64) -> Option<f64> {
    if divisor == 0.0 || !divisor.is_finite() {
        return None;
    }
    let liters = raw / divisor;
    if !liters.is_finite() || liters.abs() < 1e-9 {
        None
    } else {
        Some(liters)
    }
}

/// Bucket-aligned fetch window: start floored to the interval, end moved to
/// the next interval boundary.
pub fn bucket_window(start: i64, end: i64, interval_s: i64) -> (i64, i64) {
    let interval = interval_s.max(1);
    let from = start - start.rem_euclid(interval);
    let to = end - end.rem_euclid(interval) + interval;
    (from, to)
}

/// Raw consumption over `[start, end]` from the samples bracketing it.
///
/// Returns 0 for fewer than two samples.
pub fn fuel_consumed(samples: &[FuelSample], start: i64, end: i64, interval_s: i64) -> f64 {
    let n = samples.len();
    if n < 2 {
        return 0.0;
    }
    let interval = interval_s.max(1) as f64;

    if n == 2 {
        // One bucket holds the whole segment. Lead and tail would both scale
        // this same pair, so only the covered part is counted, once.
        let (a, b) = (&samples[0], &samples[1]);
        let covered = (end.min(b.timestamp) - start.max(a.timestamp)) as f64;
        return bucket_delta(a, b) * (covered / interval).clamp(0.0, 1.0);
    }

    let lead_fraction = (interval - (start - samples[0].timestamp) as f64) / interval;
    let lead = bucket_delta(&samples[0], &samples[1]) * lead_fraction.clamp(0.0, 1.0);

    let middle: f64 = samples[1..n - 1]
        .windows(2)
        .map(|w| bucket_delta(&w[0], &w[1]))
        .sum();

    let tail_fraction = (interval - (samples[n - 1].timestamp - end) as f64) / interval;
    let tail = bucket_delta(&samples[n - 2], &samples[n - 1]) * tail_fraction.clamp(0.0, 1.0);

    lead + middle + tail
}

/// Consumption between two consecutive readings, reset-aware.
fn bucket_delta(before: &FuelSample, after: &FuelSample) -> f64 {
    let delta = after.value - before.value;
    if delta >= 0.0 {
        delta
    } else {
        after.value.abs()
    }
}
