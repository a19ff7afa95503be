use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::EntityKey;

/// A single cell handed to a predictor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Number(f64),
    Category(String),
    Missing,
}

impl FeatureValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    /// Category label of the value; numbers are rendered the way they would be
    /// read back from a table cell.
    pub fn as_category(&self) -> Option<String> {
        match self {
            Self::Category(s) => Some(s.clone()),
            Self::Number(v) => Some(v.to_string()),
            Self::Missing => None,
        }
    }
}

impl From<f64> for FeatureValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<Option<f64>> for FeatureValue {
    fn from(v: Option<f64>) -> Self {
        v.map_or(Self::Missing, Self::Number)
    }
}

impl From<&str> for FeatureValue {
    fn from(v: &str) -> Self {
        Self::Category(v.to_string())
    }
}

/// Feature name to value mapping for one prediction input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureRow(BTreeMap<String, FeatureValue>);

impl FeatureRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Row holding every given column as an explicit null.
    pub fn with_columns<S: AsRef<str>>(columns: &[S]) -> Self {
        Self(
            columns
                .iter()
                .map(|c| (c.as_ref().to_string(), FeatureValue::Missing))
                .collect(),
        )
    }

    pub fn get(&self, column: &str) -> Option<&FeatureValue> {
        self.0.get(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.0.contains_key(column)
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl Into<FeatureValue>) {
        self.0.insert(column.into(), value.into());
    }

    /// Overwrites `column` only when the row already carries it.
    pub fn set_if_present(&mut self, column: &str, value: impl Into<FeatureValue>) {
        if let Some(slot) = self.0.get_mut(column) {
            *slot = value.into();
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FeatureValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One cleaned historical row.
#[derive(Debug, Clone)]
pub struct Observation {
    pub entity: EntityKey,
    pub date: NaiveDate,
    pub target: f64,
    /// Key column, exogenous columns and, once engineered, lag/rolling and
    /// calendar features.
    pub features: FeatureRow,
}
