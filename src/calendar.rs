//! Service-day calendar context.
//!
//! Cohorts are split by weekday category, holiday flag and a 30-minute time
//! slot of the trip start in local time. Weekday numbers follow the SQL
//! `DOW + 1` convention used by the analysis tables: Sunday = 1 through
//! Saturday = 7.

use crate::error::{LineMatchError, Result};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Day type used to select comparable historical trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WeekdayCategory {
    /// Monday to Friday
    Weekday,
    Saturday,
    Sunday,
}

impl WeekdayCategory {
    pub fn of(weekday: Weekday) -> Self {
        match weekday {
            Weekday::Sat => WeekdayCategory::Saturday,
            Weekday::Sun => WeekdayCategory::Sunday,
            _ => WeekdayCategory::Weekday,
        }
    }

    pub fn of_date(date: NaiveDate) -> Self {
        Self::of(date.weekday())
    }

    /// Category of a Sunday = 1 .. Saturday = 7 weekday number.
    pub fn from_weekday_number(number: u8) -> Self {
        match number {
            1 => WeekdayCategory::Sunday,
            7 => WeekdayCategory::Saturday,
            _ => WeekdayCategory::Weekday,
        }
    }
}

impl fmt::Display for WeekdayCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            WeekdayCategory::Weekday => "weekday",
            WeekdayCategory::Saturday => "saturday",
            WeekdayCategory::Sunday => "sunday",
        };
        f.write_str(label)
    }
}

/// Holidays observed by the operator (national, state and city).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HolidayCalendar {
    days: BTreeSet<NaiveDate>,
}

impl HolidayCalendar {
    pub fn new(days: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            days: days.into_iter().collect(),
        }
    }

    pub fn insert(&mut self, day: NaiveDate) {
        self.days.insert(day);
    }

    pub fn is_holiday(&self, day: NaiveDate) -> bool {
        self.days.contains(&day)
    }

    /// True when the following day is a holiday.
    pub fn is_holiday_eve(&self, day: NaiveDate) -> bool {
        day.succ_opt().is_some_and(|next| self.is_holiday(next))
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}

/// Calendar facts about one service day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayContext {
    pub day: NaiveDate,
    /// Sunday = 1 .. Saturday = 7
    pub weekday_number: u8,
    pub category: WeekdayCategory,
    pub is_holiday: bool,
    pub is_holiday_eve: bool,
}

impl DayContext {
    pub fn new(day: NaiveDate, holidays: &HolidayCalendar) -> Self {
        Self {
            day,
            weekday_number: sql_weekday_number(day),
            category: WeekdayCategory::of_date(day),
            is_holiday: holidays.is_holiday(day),
            is_holiday_eve: holidays.is_holiday_eve(day),
        }
    }
}

/// Weekday number with Sunday = 1 and Saturday = 7.
pub fn sql_weekday_number(day: NaiveDate) -> u8 {
    day.weekday().num_days_from_sunday() as u8 + 1
}

/// Local start time rounded to the nearest slot, formatted `HH:MM`.
///
/// Exact ties round to the even slot. A start rounding past midnight wraps
/// to `00:00`.
pub fn time_slot(timestamp: i64, tz: Tz, slot_minutes: u32) -> Result<String> {
    let utc = DateTime::from_timestamp(timestamp, 0).ok_or(LineMatchError::InvalidTimestamp(timestamp))?;
    let local = utc.with_timezone(&tz);

    let slot_s = f64::from(slot_minutes.max(1)) * 60.0;
    let seconds = f64::from(local.num_seconds_from_midnight());
    let rounded = ((seconds / slot_s).round_ties_even() * slot_s) as i64;
    let minutes = (rounded / 60).rem_euclid(24 * 60);

    Ok(format!("{:02}:{:02}", minutes / 60, minutes % 60))
}

/// First day of a lookback window of `days` ending at `reference`.
pub fn window_start(reference: NaiveDate, days: u32) -> NaiveDate {
    reference - Duration::days(i64::from(days))
}
