use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ml::features::CalendarFeatures;
use crate::models::EntityKey;

/// One forecast step for one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForecastRow {
    pub entity: EntityKey,
    pub date: NaiveDate,
    pub predicted: i64,
}

/// Flat representation used by the JSON and CSV responses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub product_id: String,
    pub predicted: i64,
}

impl From<&ForecastRow> for ForecastPoint {
    fn from(row: &ForecastRow) -> Self {
        Self {
            date: row.date,
            product_id: row.entity.to_string(),
            predicted: row.predicted,
        }
    }
}

/// Global forecast produced once at startup; immutable afterwards.
#[derive(Debug, Clone)]
pub struct ForecastTable {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub horizon_days: usize,
    /// Sorted by (entity, date).
    rows: Vec<ForecastRow>,
}

impl ForecastTable {
    pub fn new(mut rows: Vec<ForecastRow>, horizon_days: usize) -> Self {
        rows.sort_by(|a, b| (&a.entity, a.date).cmp(&(&b.entity, b.date)));
        Self {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            horizon_days,
            rows,
        }
    }

    pub fn rows(&self) -> &[ForecastRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows of one entity in date order.
    pub fn for_entity(&self, entity: &EntityKey) -> &[ForecastRow] {
        let start = self.rows.partition_point(|r| &r.entity < entity);
        let end = self.rows.partition_point(|r| &r.entity <= entity);
        &self.rows[start..end]
    }

    /// Contiguous per-entity slices in key order.
    pub fn entities(&self) -> impl Iterator<Item = &[ForecastRow]> {
        self.rows.chunk_by(|a, b| a.entity == b.entity)
    }
}

#[derive(Debug, Deserialize)]
pub struct ForecastQueryParams {
    pub product_id: Option<String>,
    pub format: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ForecastResponse {
    pub product_id: String,
    pub rows: usize,
    pub data: Vec<ForecastPoint>,
}

#[derive(Debug, Deserialize)]
pub struct SnapshotQueryParams {
    pub path: Option<String>,
    pub horizon: Option<usize>,
}

/// One future row of a file-driven forecast, flattened to the column names of
/// the input file.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SnapshotForecastRow {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub keys: BTreeMap<String, String>,
    #[serde(flatten)]
    pub proxies: BTreeMap<String, f64>,
    #[serde(flatten)]
    pub calendar: CalendarFeatures,
    pub predicted: i64,
}

#[derive(Debug, Serialize)]
pub struct SnapshotResponse {
    pub rows: usize,
    pub data: Vec<SnapshotForecastRow>,
}
