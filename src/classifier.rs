//! Historical cohort baselines and performance status labels.
//!
//! A trip's km/l is compared against the median of comparable historical
//! trips (same sub-line, direction, time slot, day type and vehicle model)
//! over four lookback windows. Each window is classified independently.

use crate::analysis::TripAnalysis;
use crate::calendar::{window_start, WeekdayCategory};
use crate::error::{LineMatchError, Result};
use crate::Direction;
use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Configuration for cohort selection and classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Cohort values at or below this km/l are ignored. Default: 0.5
    pub min_efficiency: f64,

    /// Cohort values at or above this km/l are ignored. Default: 10.0
    pub max_efficiency: f64,

    /// Width of a time-of-day slot in minutes. Default: 30
    pub slot_minutes: u32,

    /// IANA zone used for slots and service days. Default: America/Sao_Paulo
    pub timezone: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            min_efficiency: 0.5,
            max_efficiency: 10.0,
            slot_minutes: 30,
            timezone: "America/Sao_Paulo".to_string(),
        }
    }
}

impl ClassifierConfig {
    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| LineMatchError::InvalidConfig(format!("timezone '{}': {}", self.timezone, e)))
    }

    /// Whether a km/l value is plausible enough to enter a baseline.
    pub fn in_sanity_band(&self, km_per_liter: f64) -> bool {
        km_per_liter > self.min_efficiency && km_per_liter < self.max_efficiency
    }
}

/// Status of a trip relative to one window's baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PerformanceStatus {
    #[serde(rename = "low performance (≤2 STD)")]
    LowTwoStd,
    #[serde(rename = "low performance (≤1.5 STD)")]
    LowOneAndHalfStd,
    #[serde(rename = "suspected low performance (≤1.0 STD)")]
    SuspectedLow,
    #[serde(rename = "telemetry error (≥2.0 STD)")]
    TelemetryError,
    #[serde(rename = "NORMAL")]
    Normal,
}

impl PerformanceStatus {
    /// Band of `value` around `median`. Low-side boundaries are inclusive.
    pub fn classify(value: f64, median: f64, std: f64) -> Self {
        if value <= median - 2.0 * std {
            PerformanceStatus::LowTwoStd
        } else if value <= median - 1.5 * std {
            PerformanceStatus::LowOneAndHalfStd
        } else if value <= median - 1.0 * std {
            PerformanceStatus::SuspectedLow
        } else if value >= median + 2.0 * std {
            PerformanceStatus::TelemetryError
        } else {
            PerformanceStatus::Normal
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PerformanceStatus::LowTwoStd => "low performance (≤2 STD)",
            PerformanceStatus::LowOneAndHalfStd => "low performance (≤1.5 STD)",
            PerformanceStatus::SuspectedLow => "suspected low performance (≤1.0 STD)",
            PerformanceStatus::TelemetryError => "telemetry error (≥2.0 STD)",
            PerformanceStatus::Normal => "NORMAL",
        }
    }
}

impl fmt::Display for PerformanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lookback window ending at (and including) the reference day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LookbackWindow {
    #[serde(rename = "30_days")]
    Days30,
    #[serde(rename = "60_days")]
    Days60,
    #[serde(rename = "90_days")]
    Days90,
    #[serde(rename = "full")]
    Full,
}

impl LookbackWindow {
    pub const ALL: [LookbackWindow; 4] = [
        LookbackWindow::Days30,
        LookbackWindow::Days60,
        LookbackWindow::Days90,
        LookbackWindow::Full,
    ];

    /// Window length in days; `None` is unbounded.
    pub fn days(&self) -> Option<u32> {
        match self {
            LookbackWindow::Days30 => Some(30),
            LookbackWindow::Days60 => Some(60),
            LookbackWindow::Days90 => Some(90),
            LookbackWindow::Full => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            LookbackWindow::Days30 => "30_days",
            LookbackWindow::Days60 => "60_days",
            LookbackWindow::Days90 => "90_days",
            LookbackWindow::Full => "full",
        }
    }

    /// Whether a trip on `day` belongs to this window.
    pub fn contains(&self, day: NaiveDate, reference: NaiveDate) -> bool {
        if day > reference {
            return false;
        }
        match self.days() {
            Some(n) => day >= window_start(reference, n),
            None => true,
        }
    }
}

/// Baseline statistics and status for one lookback window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowBaseline {
    pub window: LookbackWindow,
    pub median: f64,
    /// Population standard deviation
    pub std: f64,
    /// `value - median`
    pub diff: f64,
    pub status: PerformanceStatus,
    pub sample_count: usize,
}

/// Selectors for historical trips comparable to the one being classified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortQuery {
    pub sub_line_id: String,
    pub direction: Direction,
    /// Local `HH:MM` slot of the segment start
    pub time_slot: String,
    pub category: WeekdayCategory,
    pub is_holiday: bool,
    /// Already normalized with [`normalize_vehicle_model`]
    pub vehicle_model: String,
    pub reference_day: NaiveDate,
    pub min_efficiency: f64,
    pub max_efficiency: f64,
}

impl CohortQuery {
    /// Cohort sample of a stored analysis, if it belongs to the cohort.
    ///
    /// Analyses without a direction or without an efficiency never do.
    pub fn sample_of(&self, analysis: &TripAnalysis) -> Option<CohortSample> {
        let direction = analysis.direction?;
        let km_per_liter = analysis.km_per_liter?;
        let member = self.sub_line_id == analysis.sub_line_id
            && self.direction == direction
            && self.time_slot == analysis.time_slot
            && self.category == WeekdayCategory::from_weekday_number(analysis.weekday_number)
            && self.is_holiday == analysis.is_holiday
            && self.vehicle_model == normalize_vehicle_model(&analysis.vehicle_model)
            && analysis.day <= self.reference_day
            && km_per_liter > self.min_efficiency
            && km_per_liter < self.max_efficiency;
        member.then_some(CohortSample {
            day: analysis.day,
            km_per_liter,
        })
    }
}

/// A historical efficiency value returned by a cohort lookup.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CohortSample {
    pub day: NaiveDate,
    pub km_per_liter: f64,
}

/// Model families sharing a baseline, matched by case-insensitive prefix.
const MODEL_FAMILIES: &[(&str, &str)] = &[
    ("MB OF 1721", "MB OF 1721 MPOLO TORINO U"),
    ("IVECO/MASCA", "IVECO/MASCA GRAN VIA"),
    ("VW 17230 APACHE VIP", "VW 17230 APACHE VIP-SC"),
    ("O500", "O500"),
    ("ELETRA INDUSCAR MILLENNIUM", "ELETRA INDUSCAR MILLENNIUM"),
    ("INDUSCAR", "INDUSCAR"),
    ("VW 22.260 CAIO INDUSCAR", "VW 22.260 CAIO INDUSCAR"),
];

/// Canonical model name used for cohort matching.
pub fn normalize_vehicle_model(model: &str) -> String {
    let trimmed = model.trim();
    let upper = trimmed.to_uppercase();
    MODEL_FAMILIES
        .iter()
        .find(|(prefix, _)| upper.starts_with(prefix))
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or_else(|| trimmed.to_string())
}

/// Median of a sample; `None` when empty.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}

/// Population standard deviation (divides by `n`); `None` when empty.
pub fn population_std(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some(variance.sqrt())
}

/// Classifies efficiency values against cohort history.
#[derive(Debug, Clone, Default)]
pub struct PerformanceClassifier {
    config: ClassifierConfig,
}

impl PerformanceClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Baselines for every lookback window, in [`LookbackWindow::ALL`] order.
    ///
    /// Samples outside the sanity band or after `reference` are ignored.
    pub fn classify(
        &self,
        value: f64,
        samples: &[CohortSample],
        reference: NaiveDate,
    ) -> Vec<WindowBaseline> {
        LookbackWindow::ALL
            .iter()
            .map(|&window| {
                let values: Vec<f64> = samples
                    .iter()
                    .filter(|s| window.contains(s.day, reference))
                    .filter(|s| self.config.in_sanity_band(s.km_per_liter))
                    .map(|s| s.km_per_liter)
                    .collect();
                baseline(value, &values, window)
            })
            .collect()
    }
}

/// Baseline of one window. An empty cohort is a neutral `NORMAL`
/// centred on the value itself.
pub fn baseline(value: f64, values: &[f64], window: LookbackWindow) -> WindowBaseline {
    match (median(values), population_std(values)) {
        (Some(median), Some(std)) => WindowBaseline {
            window,
            median,
            std,
            diff: value - median,
            status: PerformanceStatus::classify(value, median, std),
            sample_count: values.len(),
        },
        _ => WindowBaseline {
            window,
            median: value,
            std: 0.0,
            diff: 0.0,
            status: PerformanceStatus::Normal,
            sample_count: 0,
        },
    }
}
