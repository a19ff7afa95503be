use std::path::Path;

use crate::config::HistoryConfig;
use crate::data::table::{cell, parse_date, parse_number, Table};
use crate::errors::ForecastError;
use crate::models::{EntityKey, FeatureRow, FeatureValue, Observation};

/// Cleaned historical table ready for feature engineering.
#[derive(Debug, Clone)]
pub struct History {
    pub observations: Vec<Observation>,
    /// Every column except date and target, in file order. Includes the key.
    pub columns: Vec<String>,
    /// Subset of `columns` encoded as categories.
    pub categorical: Vec<String>,
    pub dropped_rows: usize,
}

impl History {
    pub fn load(path: impl AsRef<Path>, config: &HistoryConfig) -> Result<Self, ForecastError> {
        let path = path.as_ref();
        let table = Table::read_csv(path)?;
        let history = Self::from_table(&table, config)?;
        tracing::info!(
            path = %path.display(),
            rows = history.observations.len(),
            dropped = history.dropped_rows,
            entities = history.entity_count(),
            "Loaded consumption history"
        );
        Ok(history)
    }

    /// Drops rows whose date, key or target cannot be read, then types the
    /// remaining columns.
    pub fn from_table(table: &Table, config: &HistoryConfig) -> Result<Self, ForecastError> {
        let required = [&config.date_column, &config.key_column, &config.target_column];
        let idx = table.require_columns(&required)?;
        let (date_idx, key_idx, target_idx) = (idx[0], idx[1], idx[2]);

        let feature_idx: Vec<usize> = (0..table.headers().len())
            .filter(|&i| i != date_idx && i != target_idx)
            .collect();

        let mut kept = Vec::new();
        let mut dropped_rows = 0;
        for row in table.rows() {
            let date = parse_date(cell(row, date_idx));
            let key = cell(row, key_idx);
            let target = parse_number(cell(row, target_idx));
            match (date, target) {
                (Some(date), Some(target)) if !key.is_empty() => kept.push((row, date, target)),
                _ => dropped_rows += 1,
            }
        }
        if kept.is_empty() {
            return Err(ForecastError::EmptyData(format!(
                "no usable rows after cleaning ({dropped_rows} dropped)"
            )));
        }
        if dropped_rows > 0 {
            tracing::warn!(dropped_rows, "Dropped history rows with unreadable date, key or target");
        }

        let numeric: Vec<bool> = feature_idx
            .iter()
            .map(|&i| {
                i != key_idx
                    && kept.iter().all(|(row, _, _)| {
                        let raw = cell(row, i);
                        raw.is_empty() || parse_number(raw).is_some()
                    })
            })
            .collect();

        let columns: Vec<String> = feature_idx.iter().map(|&i| table.headers()[i].clone()).collect();
        let categorical = columns
            .iter()
            .zip(&numeric)
            .filter(|(_, &is_numeric)| !is_numeric)
            .map(|(c, _)| c.clone())
            .collect();

        let observations = kept
            .into_iter()
            .map(|(row, date, target)| {
                let mut features = FeatureRow::new();
                for ((&i, column), &is_numeric) in feature_idx.iter().zip(&columns).zip(&numeric) {
                    let raw = cell(row, i);
                    let value = if raw.is_empty() {
                        FeatureValue::Missing
                    } else if is_numeric {
                        parse_number(raw).into()
                    } else {
                        FeatureValue::from(raw)
                    };
                    features.set(column.clone(), value);
                }
                Observation {
                    entity: EntityKey::single(cell(row, key_idx)),
                    date,
                    target,
                    features,
                }
            })
            .collect();

        Ok(Self {
            observations,
            columns,
            categorical,
            dropped_rows,
        })
    }

    pub fn entity_count(&self) -> usize {
        let mut keys: Vec<&EntityKey> = self.observations.iter().map(|o| &o.entity).collect();
        keys.sort();
        keys.dedup();
        keys.len()
    }
}
