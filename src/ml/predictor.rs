use crate::errors::ForecastError;
use crate::models::FeatureRow;

/// A fitted regression function.
///
/// Implementations are shared read-only across request handlers, so `predict`
/// takes `&self` and must be safe to call concurrently.
pub trait Predictor: Send + Sync {
    /// Feature columns the model was fit on, in training order.
    fn feature_columns(&self) -> &[String];

    /// One prediction per row, in row order.
    fn predict(&self, rows: &[FeatureRow]) -> Result<Vec<f64>, ForecastError>;
}

/// Rejects rows that lack any column of `columns`. Explicit nulls pass.
pub fn check_schema(columns: &[String], rows: &[FeatureRow]) -> Result<(), ForecastError> {
    for (i, row) in rows.iter().enumerate() {
        let missing: Vec<&str> = columns
            .iter()
            .map(String::as_str)
            .filter(|c| !row.contains(c))
            .collect();
        if !missing.is_empty() {
            return Err(ForecastError::Schema(format!(
                "row {i} lacks expected columns {missing:?}"
            )));
        }
    }
    Ok(())
}

/// Output shaping applied to every raw prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostProcess {
    pub round: bool,
    pub non_negative: bool,
}

impl Default for PostProcess {
    fn default() -> Self {
        Self {
            round: true,
            non_negative: true,
        }
    }
}

impl PostProcess {
    /// Round half to even, clamp at zero, then truncate to an integer.
    pub fn apply(&self, raw: f64) -> i64 {
        let mut value = raw;
        if self.round {
            value = value.round_ties_even();
        }
        if self.non_negative {
            value = value.max(0.0);
        }
        value as i64
    }

    pub fn apply_all(&self, raw: &[f64]) -> Vec<i64> {
        raw.iter().map(|&v| self.apply(v)).collect()
    }
}
