//! Multi-step forecasting that feeds each day's predictions back in as the
//! lag and rolling-mean history of the next day.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};

use crate::config::{ForecastConfig, HistoryConfig};
use crate::errors::ForecastError;
use crate::ml::buffer::EntityBuffer;
use crate::ml::features::{lag_column, rolling_column, CalendarFeatures};
use crate::ml::predictor::{PostProcess, Predictor};
use crate::models::{EntityKey, FeatureRow, ForecastRow, Observation};

/// Per-entity state for one forecast run.
struct EntityState<'h> {
    last_date: NaiveDate,
    buffer: EntityBuffer,
    /// Most recent observed feature row; supplies exogenous values that are
    /// held constant over the whole horizon.
    base: &'h FeatureRow,
}

#[derive(Debug, Clone)]
pub struct RecursiveForecaster {
    pub key_column: String,
    pub lags: Vec<usize>,
    pub windows: Vec<usize>,
    pub horizon: usize,
    pub post: PostProcess,
}

impl RecursiveForecaster {
    pub fn from_config(history: &HistoryConfig, forecast: &ForecastConfig) -> Self {
        Self {
            key_column: history.key_column.clone(),
            lags: forecast.lags.clone(),
            windows: forecast.rolling_windows.clone(),
            horizon: forecast.horizon_days,
            post: forecast.post_process(),
        }
    }

    /// Forecasts `horizon` days past each entity's last observation.
    ///
    /// Every submitted row carries all of `feature_columns`; columns that are
    /// neither in the entity's base row nor derivable stay null. Output is
    /// sorted by (entity, date).
    pub fn forecast(
        &self,
        predictor: &dyn Predictor,
        history: &[Observation],
        feature_columns: &[String],
    ) -> Result<Vec<ForecastRow>, ForecastError> {
        let mut states = self.seed(history);
        if states.is_empty() {
            tracing::warn!("No entities in history; nothing to forecast");
            return Ok(Vec::new());
        }

        let mut output = Vec::with_capacity(states.len() * self.horizon);
        for step in 1..=self.horizon {
            let offset = Duration::days(step as i64);
            let batch: Vec<FeatureRow> = states
                .iter()
                .map(|(entity, state)| self.feature_row(entity, state, state.last_date + offset, feature_columns))
                .collect();

            let raw = predictor.predict(&batch)?;
            if raw.len() != batch.len() {
                return Err(ForecastError::Predictor(format!(
                    "step {step}: {} predictions for {} entities",
                    raw.len(),
                    batch.len()
                )));
            }

            for ((entity, state), value) in states.iter_mut().zip(self.post.apply_all(&raw)) {
                output.push(ForecastRow {
                    entity: entity.clone(),
                    date: state.last_date + offset,
                    predicted: value,
                });
                state.buffer.push(value as f64);
            }
            tracing::debug!(step, entities = batch.len(), "Forecast step complete");
        }

        output.sort_by(|a, b| (&a.entity, a.date).cmp(&(&b.entity, b.date)));
        tracing::info!(
            entities = states.len(),
            horizon = self.horizon,
            rows = output.len(),
            "Recursive forecast complete"
        );
        Ok(output)
    }

    fn seed<'h>(&self, history: &'h [Observation]) -> BTreeMap<EntityKey, EntityState<'h>> {
        let memory = EntityBuffer::memory_for(&self.lags, &self.windows);

        let mut ordered: Vec<&Observation> = history.iter().collect();
        ordered.sort_by(|a, b| (&a.entity, a.date).cmp(&(&b.entity, b.date)));

        ordered
            .chunk_by(|a, b| a.entity == b.entity)
            .filter_map(|group| {
                let last = group.last()?;
                let state = EntityState {
                    last_date: last.date,
                    buffer: EntityBuffer::from_history(group.iter().map(|o| o.target), memory),
                    base: &last.features,
                };
                Some((last.entity.clone(), state))
            })
            .collect()
    }

    fn feature_row(
        &self,
        entity: &EntityKey,
        state: &EntityState<'_>,
        date: NaiveDate,
        feature_columns: &[String],
    ) -> FeatureRow {
        let mut row = FeatureRow::with_columns(feature_columns);

        for (column, value) in state.base.iter() {
            row.set_if_present(column, value.clone());
        }

        CalendarFeatures::from_date(date).overlay(&mut row);

        for &lag in &self.lags {
            row.set_if_present(&lag_column(lag), state.buffer.lag(lag));
        }
        for &window in &self.windows {
            row.set_if_present(&rolling_column(window), state.buffer.rolling_mean(window));
        }

        row.set_if_present(&self.key_column, entity.primary());
        row
    }
}
