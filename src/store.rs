//! Persistence of trip analyses and cohort lookups.
//!
//! Analyses are unique per `(asset_id, day, trip_ordinal)`. Inserting an
//! existing key is silently ignored, which makes re-running a vehicle-day
//! idempotent. Stores take `&self` so one handle can be shared across
//! worker threads.

use crate::analysis::TripAnalysis;
use crate::classifier::{CohortQuery, CohortSample};
use crate::error::{LineMatchError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Uniqueness key of a persisted analysis.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AnalysisKey {
    pub asset_id: String,
    pub day: NaiveDate,
    pub trip_ordinal: u32,
}

/// Storage for analyses, queried for cohort history.
pub trait AnalysisStore: Send + Sync {
    /// Whether an analysis with this key is already stored.
    fn contains(&self, key: &AnalysisKey) -> Result<bool>;

    /// Insert unless the key exists. Returns `false` when ignored.
    fn insert_ignore(&self, analysis: &TripAnalysis) -> Result<bool>;

    /// Efficiency values of stored trips belonging to the cohort.
    fn cohort(&self, query: &CohortQuery) -> Result<Vec<CohortSample>>;

    /// Number of stored analyses.
    fn count(&self) -> Result<usize>;
}

/// Store kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    rows: Mutex<BTreeMap<AnalysisKey, TripAnalysis>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored analysis, ordered by key.
    pub fn all(&self) -> Result<Vec<TripAnalysis>> {
        Ok(self.lock()?.values().cloned().collect())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<AnalysisKey, TripAnalysis>>> {
        self.rows
            .lock()
            .map_err(|_| LineMatchError::Store("in-memory store lock poisoned".to_string()))
    }
}

impl AnalysisStore for InMemoryStore {
    fn contains(&self, key: &AnalysisKey) -> Result<bool> {
        Ok(self.lock()?.contains_key(key))
    }

    fn insert_ignore(&self, analysis: &TripAnalysis) -> Result<bool> {
        let mut rows = self.lock()?;
        let key = analysis.key();
        if rows.contains_key(&key) {
            return Ok(false);
        }
        rows.insert(key, analysis.clone());
        Ok(true)
    }

    fn cohort(&self, query: &CohortQuery) -> Result<Vec<CohortSample>> {
        Ok(self
            .lock()?
            .values()
            .filter_map(|a| query.sample_of(a))
            .collect())
    }

    fn count(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }
}

#[cfg(feature = "persistence")]
pub use sqlite::SqliteStore;

#[cfg(feature = "persistence")]
mod sqlite {
    use super::*;
    use log::{debug, info, warn};
    use rusqlite::{params, Connection};

    /// Store backed by a SQLite database.
    ///
    /// Filter columns are stored individually; the full record is kept as
    /// JSON in `data`.
    pub struct SqliteStore {
        db: Mutex<Connection>,
    }

    impl SqliteStore {
        /// Open (or create) a database file.
        pub fn open(path: &str) -> Result<Self> {
            let db = Connection::open(path)?;
            Self::init_schema(&db)?;
            info!("[Store] Opened analysis database {}", path);
            Ok(Self { db: Mutex::new(db) })
        }

        /// Create an in-memory database (for testing).
        pub fn open_in_memory() -> Result<Self> {
            Self::open(":memory:")
        }

        fn init_schema(conn: &Connection) -> Result<()> {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS trip_analysis (
                    day TEXT NOT NULL,
                    trip_ordinal INTEGER NOT NULL,
                    asset_id TEXT NOT NULL,
                    trip_id TEXT NOT NULL,
                    sub_line_id TEXT NOT NULL,
                    direction TEXT,
                    time_slot TEXT NOT NULL,
                    weekday_number INTEGER NOT NULL,
                    is_holiday INTEGER NOT NULL,
                    vehicle_model TEXT NOT NULL,
                    km_per_liter REAL,
                    data TEXT NOT NULL,
                    UNIQUE (day, trip_ordinal, asset_id)
                );

                CREATE INDEX IF NOT EXISTS idx_trip_analysis_cohort
                    ON trip_analysis(sub_line_id, direction, time_slot);
                "#,
            )?;
            Ok(())
        }

        fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
            self.db
                .lock()
                .map_err(|_| LineMatchError::Store("sqlite connection lock poisoned".to_string()))
        }
    }

    impl AnalysisStore for SqliteStore {
        fn contains(&self, key: &AnalysisKey) -> Result<bool> {
            let db = self.lock()?;
            let found: i64 = db.query_row(
                "SELECT COUNT(*) FROM trip_analysis WHERE day = ?1 AND trip_ordinal = ?2 AND asset_id = ?3",
                params![key.day.to_string(), key.trip_ordinal, key.asset_id],
                |row| row.get(0),
            )?;
            Ok(found > 0)
        }

        fn insert_ignore(&self, analysis: &TripAnalysis) -> Result<bool> {
            let data = serde_json::to_string(analysis)?;
            let db = self.lock()?;
            let changed = db.execute(
                "INSERT OR IGNORE INTO trip_analysis (
                    day, trip_ordinal, asset_id, trip_id, sub_line_id, direction, time_slot,
                    weekday_number, is_holiday, vehicle_model, km_per_liter, data
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    analysis.day.to_string(),
                    analysis.trip_ordinal,
                    analysis.asset_id,
                    analysis.trip_id,
                    analysis.sub_line_id,
                    analysis.direction.map(|d| d.as_str()),
                    analysis.time_slot,
                    analysis.weekday_number,
                    analysis.is_holiday,
                    analysis.vehicle_model,
                    analysis.km_per_liter,
                    data,
                ],
            )?;
            if changed == 0 {
                debug!(
                    "[Store] {} {} #{} already stored, ignored",
                    analysis.asset_id, analysis.day, analysis.trip_ordinal
                );
            }
            Ok(changed > 0)
        }

        fn cohort(&self, query: &CohortQuery) -> Result<Vec<CohortSample>> {
            let db = self.lock()?;
            let mut stmt = db.prepare(
                "SELECT data FROM trip_analysis
                 WHERE sub_line_id = ?1 AND direction = ?2 AND time_slot = ?3
                   AND is_holiday = ?4 AND day <= ?5
                   AND km_per_liter > ?6 AND km_per_liter < ?7",
            )?;
            let rows = stmt.query_map(
                params![
                    query.sub_line_id,
                    query.direction.as_str(),
                    query.time_slot,
                    query.is_holiday,
                    query.reference_day.to_string(),
                    query.min_efficiency,
                    query.max_efficiency,
                ],
                |row| row.get::<_, String>(0),
            )?;

            let mut samples = Vec::new();
            for data in rows {
                let data = data?;
                match serde_json::from_str::<TripAnalysis>(&data) {
                    // Day category and model family are checked on the decoded record
                    Ok(a) => samples.extend(query.sample_of(&a)),
                    Err(e) => warn!("[Store] Skipping undecodable analysis row: {}", e),
                }
            }
            Ok(samples)
        }

        fn count(&self) -> Result<usize> {
            let db = self.lock()?;
            let n: i64 = db.query_row("SELECT COUNT(*) FROM trip_analysis", [], |row| row.get(0))?;
            Ok(n as usize)
        }
    }
}
