use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use crate::config::{AppConfig, ForecastConfig, ModelSource, SnapshotConfig};
use crate::data::History;
use crate::ml::features::{
    add_calendar_features, add_lags_and_rolls, lag_and_rolling_columns, CALENDAR_COLUMNS,
};
use crate::ml::{GbdtParams, GbdtPipeline, Predictor, RecursiveForecaster};
use crate::models::{FeatureRow, FeatureValue, ForecastTable, Observation};

/// History with lag, rolling and calendar features attached to every row.
#[derive(Debug, Clone)]
pub struct EngineeredHistory {
    pub observations: Vec<Observation>,
    pub feature_columns: Vec<String>,
    pub categorical: Vec<String>,
    lag_columns: Vec<String>,
}

impl EngineeredHistory {
    pub fn new(history: History, forecast: &ForecastConfig) -> Self {
        let History {
            mut observations,
            columns,
            categorical,
            ..
        } = history;

        add_lags_and_rolls(&mut observations, &forecast.lags, &forecast.rolling_windows);
        add_calendar_features(&mut observations);

        let lag_columns = lag_and_rolling_columns(&forecast.lags, &forecast.rolling_windows);
        let mut feature_columns: Vec<String> = Vec::new();
        for column in columns
            .into_iter()
            .chain(lag_columns.iter().cloned())
            .chain(CALENDAR_COLUMNS.iter().map(|c| c.to_string()))
        {
            if !feature_columns.contains(&column) {
                feature_columns.push(column);
            }
        }

        Self {
            observations,
            feature_columns,
            categorical,
            lag_columns,
        }
    }

    /// Rows whose lag and rolling features are all present, ordered by
    /// (date, entity), with their targets.
    pub fn training_set(&self) -> (Vec<FeatureRow>, Vec<f64>) {
        let mut ready: Vec<&Observation> = self
            .observations
            .iter()
            .filter(|o| {
                self.lag_columns
                    .iter()
                    .all(|c| o.features.get(c).is_some_and(|v| !FeatureValue::is_missing(v)))
            })
            .collect();
        ready.sort_by(|a, b| (a.date, &a.entity).cmp(&(b.date, &b.entity)));

        ready
            .into_iter()
            .map(|o| (o.features.clone(), o.target))
            .unzip()
    }
}

/// The startup forecast and the predictor that produced it.
pub struct GlobalForecast {
    pub predictor: Arc<dyn Predictor>,
    pub source: ModelSource,
    pub table: ForecastTable,
}

fn global_predictor(config: &AppConfig, history: &EngineeredHistory) -> anyhow::Result<GbdtPipeline> {
    match config.model.source {
        ModelSource::Load => {
            let path = config
                .model
                .path
                .as_deref()
                .context("model.path is required when model.source = load")?;
            let pipeline = GbdtPipeline::load(path)
                .with_context(|| format!("loading global pipeline from {path}"))?;
            info!(path, trained_at = %pipeline.trained_at, "Loaded global pipeline");
            Ok(pipeline)
        }
        ModelSource::Train => {
            let (rows, targets) = history.training_set();
            info!(rows = rows.len(), columns = history.feature_columns.len(), "Training global pipeline");
            let pipeline = GbdtPipeline::fit(
                history.feature_columns.clone(),
                &history.categorical,
                &rows,
                &targets,
                &GbdtParams::from(&config.model),
            )
            .context("training global pipeline")?;

            if let Some(path) = config.model.save_path.as_deref() {
                pipeline
                    .save(path)
                    .with_context(|| format!("saving global pipeline to {path}"))?;
                info!(path, "Saved global pipeline");
            }
            Ok(pipeline)
        }
    }
}

/// Loads the history, fits or loads the global predictor and runs the
/// recursive forecast over every entity. Any failure here is fatal.
pub fn build_global_forecast(config: &AppConfig) -> anyhow::Result<GlobalForecast> {
    let history = History::load(&config.history.path, &config.history)
        .with_context(|| format!("loading history from {}", config.history.path))?;
    let engineered = EngineeredHistory::new(history, &config.forecast);

    let pipeline = global_predictor(config, &engineered)?;
    let predictor: Arc<dyn Predictor> = Arc::new(pipeline);

    let forecaster = RecursiveForecaster::from_config(&config.history, &config.forecast);
    let rows = forecaster
        .forecast(predictor.as_ref(), &engineered.observations, predictor.feature_columns())
        .context("running global forecast")?;
    let table = ForecastTable::new(rows, config.forecast.horizon_days);

    info!(
        run_id = %table.run_id,
        rows = table.len(),
        horizon = table.horizon_days,
        "Global forecast ready"
    );
    Ok(GlobalForecast {
        predictor,
        source: config.model.source,
        table,
    })
}

/// The snapshot predictor is optional: failure leaves the snapshot endpoint
/// unavailable without stopping the service.
pub fn load_snapshot_predictor(config: &SnapshotConfig) -> Option<Arc<dyn Predictor>> {
    match GbdtPipeline::load(&config.model_path) {
        Ok(pipeline) => {
            info!(
                path = %config.model_path,
                columns = pipeline.feature_columns().len(),
                "Loaded snapshot pipeline"
            );
            Some(Arc::new(pipeline))
        }
        Err(e) => {
            warn!(path = %config.model_path, error = %e, "Snapshot pipeline unavailable");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Table;
    use crate::models::EntityKey;

    fn engineered(lags: Vec<usize>, windows: Vec<usize>) -> EngineeredHistory {
        let mut csv = String::from("Date,Product_ID,Quantity_Consumed,Price\n");
        for day in 1..=10 {
            csv.push_str(&format!("2025-01-{day:02},B,{day},1.0\n"));
            csv.push_str(&format!("2025-01-{day:02},A,{},2.0\n", day * 2));
        }
        let table = Table::from_reader(csv.as_bytes()).unwrap();
        let history = History::from_table(&table, &Default::default()).unwrap();
        let forecast = ForecastConfig {
            lags,
            rolling_windows: windows,
            ..Default::default()
        };
        EngineeredHistory::new(history, &forecast)
    }

    #[test]
    fn test_feature_column_order() {
        let e = engineered(vec![1, 7], vec![7]);
        assert_eq!(
            e.feature_columns,
            vec![
                "Product_ID", "Price", "lag_1", "lag_7", "rollmean_7", "year", "month", "day", "dow",
                "weekofyear", "quarter"
            ]
        );
        assert_eq!(e.categorical, vec!["Product_ID"]);
    }

    #[test]
    fn test_training_set_requires_all_lags() {
        let e = engineered(vec![1, 7], vec![7]);
        let (rows, targets) = e.training_set();

        // lag_7 is first available on the eighth day of each product
        assert_eq!(rows.len(), 6);
        assert_eq!(targets.len(), 6);
        // Sorted by date, then entity
        assert_eq!(rows[0].get("Product_ID"), Some(&FeatureValue::Category("A".into())));
        assert_eq!(rows[1].get("Product_ID"), Some(&FeatureValue::Category("B".into())));
        assert_eq!(targets[0], 16.0);
        assert_eq!(targets[1], 8.0);
        for row in &rows {
            assert!(e.feature_columns.iter().all(|c| row.contains(c)));
        }
    }

    #[test]
    fn test_observations_grouped_by_entity() {
        let e = engineered(vec![1], vec![]);
        assert_eq!(e.observations[0].entity, EntityKey::single("A"));
        assert_eq!(e.observations[10].entity, EntityKey::single("B"));
    }

    #[test]
    fn test_missing_snapshot_model_is_not_fatal() {
        let config = SnapshotConfig {
            model_path: "/nonexistent/snapshot_pipeline.json".into(),
            ..Default::default()
        };
        assert!(load_snapshot_predictor(&config).is_none());
    }
}
