use std::path::Path;

use crate::config::SnapshotConfig;
use crate::data::table::{cell, parse_date, parse_number, Table};
use crate::errors::ForecastError;
use crate::ml::features::{CalendarFeatures, CALENDAR_COLUMNS};
use crate::ml::SnapshotObservation;
use crate::models::{EntityKey, FeatureRow};

struct SnapshotColumns {
    date: usize,
    keys: Vec<usize>,
    proxies: Vec<usize>,
}

fn locate(table: &Table, config: &SnapshotConfig) -> Result<SnapshotColumns, ForecastError> {
    table.require_columns(&config.required_columns())?;
    let keys = table.require_columns(&config.key_columns)?;
    let proxies = table.require_columns(&config.proxy_columns)?;
    let date = table.require_columns(&[&config.date_column])?[0];
    Ok(SnapshotColumns { date, keys, proxies })
}

/// Parses one row, or `None` when any required field is unreadable.
fn parse_row(row: &[String], columns: &SnapshotColumns) -> Option<(EntityKey, chrono::NaiveDate, Vec<f64>)> {
    let date = parse_date(cell(row, columns.date))?;
    let mut parts = Vec::with_capacity(columns.keys.len());
    for &i in &columns.keys {
        let part = cell(row, i);
        if part.is_empty() {
            return None;
        }
        parts.push(part);
    }
    let proxies = columns
        .proxies
        .iter()
        .map(|&i| parse_number(cell(row, i)))
        .collect::<Option<Vec<f64>>>()?;
    Some((EntityKey::composite(parts), date, proxies))
}

/// Rows of a snapshot file with every key, date and proxy readable.
pub fn snapshot_from_table(
    table: &Table,
    config: &SnapshotConfig,
) -> Result<Vec<SnapshotObservation>, ForecastError> {
    let columns = locate(table, config)?;

    let observations: Vec<SnapshotObservation> = table
        .rows()
        .filter_map(|row| parse_row(row, &columns))
        .map(|(entity, date, proxies)| SnapshotObservation {
            entity,
            date,
            proxies: proxies.into_iter().map(Some).collect(),
        })
        .collect();

    let dropped = table.len() - observations.len();
    if observations.is_empty() {
        return Err(ForecastError::EmptyData(format!(
            "no usable snapshot rows after cleaning ({dropped} dropped)"
        )));
    }
    if dropped > 0 {
        tracing::debug!(dropped, "Dropped unreadable snapshot rows");
    }
    Ok(observations)
}

pub fn load_snapshot(
    path: impl AsRef<Path>,
    config: &SnapshotConfig,
) -> Result<Vec<SnapshotObservation>, ForecastError> {
    let table = Table::read_csv(path)?;
    snapshot_from_table(&table, config)
}

/// Training set for the snapshot predictor: keys, proxies and calendar
/// features per row, with the observed target.
#[derive(Debug, Clone)]
pub struct SnapshotTraining {
    pub feature_columns: Vec<String>,
    pub categorical: Vec<String>,
    pub rows: Vec<FeatureRow>,
    pub targets: Vec<f64>,
}

impl SnapshotTraining {
    pub fn from_table(table: &Table, config: &SnapshotConfig) -> Result<Self, ForecastError> {
        let columns = locate(table, config)?;
        let target_idx = table.require_columns(&[&config.target_column])?[0];

        let mut rows = Vec::new();
        let mut targets = Vec::new();
        for raw in table.rows() {
            let Some(target) = parse_number(cell(raw, target_idx)) else {
                continue;
            };
            let Some((entity, date, proxies)) = parse_row(raw, &columns) else {
                continue;
            };

            let mut row = FeatureRow::new();
            for (column, part) in config.key_columns.iter().zip(entity.parts()) {
                row.set(column.clone(), part.as_str());
            }
            for (column, value) in config.proxy_columns.iter().zip(proxies) {
                row.set(column.clone(), value);
            }
            CalendarFeatures::from_date(date).insert_into(&mut row);
            rows.push(row);
            targets.push(target);
        }

        if rows.is_empty() {
            return Err(ForecastError::EmptyData(
                "snapshot training file has no usable rows".into(),
            ));
        }

        let feature_columns = config
            .key_columns
            .iter()
            .chain(&config.proxy_columns)
            .cloned()
            .chain(CALENDAR_COLUMNS.iter().map(|c| c.to_string()))
            .collect();

        tracing::info!(
            rows = rows.len(),
            dropped = table.len() - rows.len(),
            "Prepared snapshot training set"
        );
        Ok(Self {
            feature_columns,
            categorical: config.key_columns.clone(),
            rows,
            targets,
        })
    }

    pub fn load(path: impl AsRef<Path>, config: &SnapshotConfig) -> Result<Self, ForecastError> {
        let table = Table::read_csv(path)?;
        Self::from_table(&table, config)
    }
}
