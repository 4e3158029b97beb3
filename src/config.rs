//! Aggregate configuration for an analysis run.

use crate::catalog::CatalogConfig;
use crate::classifier::ClassifierConfig;
use crate::error::Result;
use crate::fuel::FuelConfig;
use crate::matcher::MatcherConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Every tunable of the pipeline. Missing sections and fields take their
/// production defaults, so a partial JSON file is enough.
///
/// ```
/// use linematch::AnalysisConfig;
/// let config: AnalysisConfig =
///     serde_json::from_str(r#"{ "matcher": { "overlap_threshold_pct": 85.0 } }"#).unwrap();
/// assert_eq!(config.matcher.overlap_threshold_pct, 85.0);
/// assert_eq!(config.matcher.min_trip_duration_s, 600);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub catalog: CatalogConfig,
    pub matcher: MatcherConfig,
    pub fuel: FuelConfig,
    pub classifier: ClassifierConfig,
}

impl AnalysisConfig {
    /// Load from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let config = serde_json::from_str(text)?;
        Ok(config)
    }
}
