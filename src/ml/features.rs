//! Calendar and lag/rolling feature derivation.
//!
//! Lags and rolling means are computed per entity over rows ordered by date.
//! A rolling mean only looks at the values *before* the current row, so a
//! row's own target never leaks into its features.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::models::{FeatureRow, Observation};

pub const CALENDAR_COLUMNS: [&str; 6] = ["year", "month", "day", "dow", "weekofyear", "quarter"];

pub fn lag_column(lag: usize) -> String {
    format!("lag_{lag}")
}

pub fn rolling_column(window: usize) -> String {
    format!("rollmean_{window}")
}

/// Names of every lag column followed by every rolling-mean column.
pub fn lag_and_rolling_columns(lags: &[usize], windows: &[usize]) -> Vec<String> {
    lags.iter()
        .map(|&l| lag_column(l))
        .chain(windows.iter().map(|&w| rolling_column(w)))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CalendarFeatures {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    /// Monday = 0.
    pub dow: u32,
    /// ISO 8601 week; early January days can fall in the previous year's week.
    pub weekofyear: u32,
    pub quarter: u32,
}

impl CalendarFeatures {
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
            day: date.day(),
            dow: date.weekday().num_days_from_monday(),
            weekofyear: date.iso_week().week(),
            quarter: (date.month() - 1) / 3 + 1,
        }
    }

    fn values(&self) -> [(&'static str, f64); 6] {
        [
            ("year", f64::from(self.year)),
            ("month", f64::from(self.month)),
            ("day", f64::from(self.day)),
            ("dow", f64::from(self.dow)),
            ("weekofyear", f64::from(self.weekofyear)),
            ("quarter", f64::from(self.quarter)),
        ]
    }

    pub fn insert_into(&self, row: &mut FeatureRow) {
        for (name, value) in self.values() {
            row.set(name, value);
        }
    }

    /// Writes only the calendar columns the row already carries.
    pub fn overlay(&self, row: &mut FeatureRow) {
        for (name, value) in self.values() {
            row.set_if_present(name, value);
        }
    }
}

/// `lag` positions back within the series; `None` before the series has that
/// much history.
pub fn lag_series(values: &[f64], lag: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| i.checked_sub(lag).map(|j| values[j]))
        .collect()
}

/// Mean of the up-to-`window` values preceding each position.
pub fn rolling_mean_series(values: &[f64], window: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            let n = window.min(i);
            if n == 0 {
                return None;
            }
            let preceding = &values[i - n..i];
            Some(preceding.iter().sum::<f64>() / n as f64)
        })
        .collect()
}

/// Sorts observations by (entity, date) and writes `lag_{L}` and
/// `rollmean_{W}` into each row's features.
pub fn add_lags_and_rolls(observations: &mut [Observation], lags: &[usize], windows: &[usize]) {
    observations.sort_by(|a, b| (&a.entity, a.date).cmp(&(&b.entity, b.date)));

    for group in observations.chunk_by_mut(|a, b| a.entity == b.entity) {
        let targets: Vec<f64> = group.iter().map(|o| o.target).collect();

        for &lag in lags {
            let column = lag_column(lag);
            for (obs, value) in group.iter_mut().zip(lag_series(&targets, lag)) {
                obs.features.set(column.clone(), value);
            }
        }
        for &window in windows {
            let column = rolling_column(window);
            for (obs, value) in group.iter_mut().zip(rolling_mean_series(&targets, window)) {
                obs.features.set(column.clone(), value);
            }
        }
    }
}

/// Adds calendar columns derived from each observation's date.
pub fn add_calendar_features(observations: &mut [Observation]) {
    for obs in observations.iter_mut() {
        CalendarFeatures::from_date(obs.date).insert_into(&mut obs.features);
    }
}
