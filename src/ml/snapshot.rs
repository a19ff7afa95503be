//! Flat forecasts for the entities present on the last day of a freshly
//! supplied file.
//!
//! Each entity's proxy inputs are estimated once, as trailing medians, and
//! held constant over the horizon. Only the calendar features move.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{Duration, NaiveDate};

use crate::config::SnapshotConfig;
use crate::errors::ForecastError;
use crate::ml::features::CalendarFeatures;
use crate::ml::predictor::{check_schema, PostProcess, Predictor};
use crate::ml::stats::median;
use crate::models::{EntityKey, FeatureRow, SnapshotForecastRow};

/// One cleaned row of a snapshot file. `proxies` is aligned with the
/// forecaster's proxy columns.
#[derive(Debug, Clone)]
pub struct SnapshotObservation {
    pub entity: EntityKey,
    pub date: NaiveDate,
    pub proxies: Vec<Option<f64>>,
}

#[derive(Debug, Clone)]
pub struct SnapshotForecaster {
    pub key_columns: Vec<String>,
    /// Position within `key_columns` of the secondary grouping key.
    pub group_index: usize,
    pub proxy_columns: Vec<String>,
    pub window: usize,
    pub post: PostProcess,
}

impl SnapshotForecaster {
    pub fn from_config(config: &SnapshotConfig, post: PostProcess) -> Result<Self, ForecastError> {
        let group_index = config.group_index().ok_or_else(|| {
            ForecastError::Config(format!(
                "group column {} is not one of the key columns {:?}",
                config.group_column, config.key_columns
            ))
        })?;
        Ok(Self {
            key_columns: config.key_columns.clone(),
            group_index,
            proxy_columns: config.proxy_columns.clone(),
            window: config.proxy_window,
            post,
        })
    }

    pub fn forecast(
        &self,
        predictor: &dyn Predictor,
        observations: &[SnapshotObservation],
        horizon: usize,
    ) -> Result<Vec<SnapshotForecastRow>, ForecastError> {
        let Some(last_date) = observations.iter().map(|o| o.date).max() else {
            return Ok(Vec::new());
        };

        let mut seen = HashSet::new();
        let entities: Vec<&EntityKey> = observations
            .iter()
            .filter(|o| o.date == last_date && seen.insert(&o.entity))
            .map(|o| &o.entity)
            .collect();

        let proxies = ProxyIndex::new(observations, self.group_index, self.proxy_columns.len());

        let mut pending = Vec::with_capacity(entities.len() * horizon);
        let mut batch = Vec::with_capacity(entities.len() * horizon);
        for entity in entities {
            let values = proxies.resolve(entity, self.window);
            let keys: BTreeMap<String, String> = self
                .key_columns
                .iter()
                .zip(entity.parts())
                .map(|(c, v)| (c.clone(), v.clone()))
                .collect();
            let proxy_map: BTreeMap<String, f64> = self
                .proxy_columns
                .iter()
                .cloned()
                .zip(values.iter().copied())
                .collect();

            for step in 1..=horizon {
                let date = last_date + Duration::days(step as i64);
                let calendar = CalendarFeatures::from_date(date);

                let mut row = FeatureRow::new();
                for (column, value) in &keys {
                    row.set(column.clone(), value.as_str());
                }
                for (column, value) in &proxy_map {
                    row.set(column.clone(), *value);
                }
                calendar.insert_into(&mut row);
                batch.push(row);

                pending.push(SnapshotForecastRow {
                    date,
                    keys: keys.clone(),
                    proxies: proxy_map.clone(),
                    calendar,
                    predicted: 0,
                });
            }
        }

        if batch.is_empty() {
            return Ok(Vec::new());
        }
        check_schema(predictor.feature_columns(), &batch)?;

        let raw = predictor.predict(&batch)?;
        if raw.len() != batch.len() {
            return Err(ForecastError::Predictor(format!(
                "{} predictions for {} snapshot rows",
                raw.len(),
                batch.len()
            )));
        }
        for (row, value) in pending.iter_mut().zip(self.post.apply_all(&raw)) {
            row.predicted = value;
        }

        tracing::info!(
            last_date = %last_date,
            rows = pending.len(),
            horizon,
            "Snapshot forecast complete"
        );
        Ok(pending)
    }
}

/// Observations indexed by exact key and by secondary grouping key, each list
/// ordered by date.
struct ProxyIndex<'a> {
    by_key: HashMap<&'a EntityKey, Vec<&'a SnapshotObservation>>,
    by_group: HashMap<&'a str, Vec<&'a SnapshotObservation>>,
    group_index: usize,
    global: Vec<f64>,
}

impl<'a> ProxyIndex<'a> {
    fn new(observations: &'a [SnapshotObservation], group_index: usize, width: usize) -> Self {
        let mut ordered: Vec<&SnapshotObservation> = observations.iter().collect();
        ordered.sort_by_key(|o| o.date);

        let mut by_key: HashMap<&EntityKey, Vec<&SnapshotObservation>> = HashMap::new();
        let mut by_group: HashMap<&str, Vec<&SnapshotObservation>> = HashMap::new();
        for obs in ordered {
            by_key.entry(&obs.entity).or_default().push(obs);
            if let Some(group) = obs.entity.part(group_index) {
                by_group.entry(group).or_default().push(obs);
            }
        }

        let global = (0..width)
            .map(|j| {
                let mut values: Vec<f64> = observations.iter().filter_map(|o| proxy_at(o, j)).collect();
                median(&mut values).unwrap_or(0.0)
            })
            .collect();

        Self {
            by_key,
            by_group,
            group_index,
            global,
        }
    }

    /// Exact key, then secondary key, then the whole input.
    fn resolve(&self, entity: &EntityKey, window: usize) -> Vec<f64> {
        let exact = self.by_key.get(entity);
        let group = entity
            .part(self.group_index)
            .and_then(|g| self.by_group.get(g));

        self.global
            .iter()
            .enumerate()
            .map(|(j, &fallback)| {
                exact
                    .and_then(|rows| trailing_median(rows, j, window))
                    .or_else(|| group.and_then(|rows| trailing_median(rows, j, window)))
                    .unwrap_or(fallback)
            })
            .collect()
    }
}

fn proxy_at(obs: &SnapshotObservation, column: usize) -> Option<f64> {
    obs.proxies.get(column).copied().flatten()
}

/// Median of the non-null values among the last `window` rows.
fn trailing_median(rows: &[&SnapshotObservation], column: usize, window: usize) -> Option<f64> {
    let tail = &rows[rows.len().saturating_sub(window)..];
    let mut values: Vec<f64> = tail.iter().filter_map(|o| proxy_at(o, column)).collect();
    median(&mut values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FeatureValue;
    use std::sync::Mutex;

    struct ProxyEcho {
        columns: Vec<String>,
        seen: Mutex<Vec<FeatureRow>>,
    }

    impl ProxyEcho {
        fn new(columns: &[&str]) -> Self {
            Self {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl Predictor for ProxyEcho {
        fn feature_columns(&self) -> &[String] {
            &self.columns
        }

        /// Returns the first proxy column so outputs expose the resolved proxy.
        fn predict(&self, rows: &[FeatureRow]) -> Result<Vec<f64>, ForecastError> {
            self.seen.lock().unwrap().extend(rows.iter().cloned());
            Ok(rows
                .iter()
                .map(|r| r.get("ssq").and_then(FeatureValue::as_number).unwrap_or(-1.0))
                .collect())
        }
    }

    fn forecaster() -> SnapshotForecaster {
        SnapshotForecaster {
            key_columns: vec!["flight".into(), "product".into()],
            group_index: 1,
            proxy_columns: vec!["ssq".into(), "ret".into()],
            window: 28,
            post: PostProcess::default(),
        }
    }

    fn obs(flight: &str, product: &str, day: u32, ssq: Option<f64>, ret: Option<f64>) -> SnapshotObservation {
        SnapshotObservation {
            entity: EntityKey::composite([flight, product]),
            date: NaiveDate::from_ymd_opt(2025, 3, day).unwrap(),
            proxies: vec![ssq, ret],
        }
    }

    const COLUMNS: [&str; 9] = [
        "flight", "product", "ssq", "ret", "year", "month", "day", "dow", "quarter",
    ];

    #[test]
    fn test_only_entities_on_last_date_are_forecast() {
        let predictor = ProxyEcho::new(&COLUMNS);
        let input = vec![
            obs("F1", "P1", 1, Some(10.0), Some(1.0)),
            obs("F2", "P1", 2, Some(20.0), Some(2.0)),
            obs("F3", "P2", 2, Some(30.0), Some(3.0)),
            obs("F2", "P1", 2, Some(22.0), Some(2.0)),
        ];

        let out = forecaster().forecast(&predictor, &input, 3).unwrap();

        assert_eq!(out.len(), 6);
        let flights: Vec<&str> = out.iter().map(|r| r.keys["flight"].as_str()).collect();
        assert_eq!(flights, vec!["F2", "F2", "F2", "F3", "F3", "F3"]);
        assert_eq!(out[0].date, NaiveDate::from_ymd_opt(2025, 3, 3).unwrap());
        assert_eq!(out[2].date, NaiveDate::from_ymd_opt(2025, 3, 5).unwrap());
        // median(20, 22)
        assert_eq!(out[0].proxies["ssq"], 21.0);
        assert_eq!(out[0].predicted, 21);
    }

    #[test]
    fn test_proxies_flat_across_horizon() {
        let predictor = ProxyEcho::new(&COLUMNS);
        let input = vec![obs("F1", "P1", 1, Some(4.0), Some(0.0)), obs("F1", "P1", 2, Some(6.0), Some(2.0))];

        let out = forecaster().forecast(&predictor, &input, 4).unwrap();

        assert!(out.iter().all(|r| r.proxies["ssq"] == 5.0 && r.proxies["ret"] == 1.0));
        let days: Vec<u32> = out.iter().map(|r| r.calendar.day).collect();
        assert_eq!(days, vec![3, 4, 5, 6]);
    }

    #[test]
    fn test_secondary_key_median_used_before_global() {
        let predictor = ProxyEcho::new(&COLUMNS);
        let input = vec![
            // Same product on another flight
            obs("F9", "P1", 1, Some(50.0), Some(5.0)),
            obs("F8", "P1", 1, Some(70.0), Some(7.0)),
            // Unrelated product dominates the global median
            obs("F7", "P2", 1, Some(1.0), Some(1.0)),
            obs("F7", "P2", 1, Some(1.0), Some(1.0)),
            obs("F7", "P2", 1, Some(1.0), Some(1.0)),
            // Target entity has no usable proxy values of its own
            obs("F1", "P1", 2, None, None),
        ];

        let out = forecaster().forecast(&predictor, &input, 1).unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].keys["flight"], "F1");
        assert_eq!(out[0].proxies["ssq"], 60.0);
        assert_eq!(out[0].proxies["ret"], 6.0);
    }

    #[test]
    fn test_global_median_then_zero() {
        let predictor = ProxyEcho::new(&COLUMNS);
        let input = vec![
            obs("F7", "P2", 1, Some(3.0), None),
            obs("F1", "P1", 2, None, None),
        ];

        let out = forecaster().forecast(&predictor, &input, 1).unwrap();

        assert_eq!(out[0].proxies["ssq"], 3.0);
        assert_eq!(out[0].proxies["ret"], 0.0);
    }

    #[test]
    fn test_trailing_window_limits_history() {
        let predictor = ProxyEcho::new(&COLUMNS);
        let mut f = forecaster();
        f.window = 2;
        let input = vec![
            obs("F1", "P1", 1, Some(100.0), Some(0.0)),
            obs("F1", "P1", 3, Some(8.0), Some(0.0)),
            obs("F1", "P1", 2, Some(6.0), Some(0.0)),
        ];

        let out = f.forecast(&predictor, &input, 1).unwrap();
        assert_eq!(out[0].proxies["ssq"], 7.0);
    }

    #[test]
    fn test_rows_carry_keys_proxies_and_calendar() {
        let predictor = ProxyEcho::new(&COLUMNS);
        forecaster()
            .forecast(&predictor, &[obs("F1", "P1", 2, Some(2.0), Some(1.0))], 1)
            .unwrap();

        let seen = predictor.seen.lock().unwrap();
        let row = &seen[0];
        assert_eq!(row.get("flight"), Some(&FeatureValue::Category("F1".into())));
        assert_eq!(row.get("product"), Some(&FeatureValue::Category("P1".into())));
        assert_eq!(row.get("ret"), Some(&FeatureValue::Number(1.0)));
        assert_eq!(row.get("weekofyear"), Some(&FeatureValue::Number(10.0)));
    }

    #[test]
    fn test_unsatisfiable_schema_fails_loudly() {
        let predictor = ProxyEcho::new(&["flight", "product", "ssq", "ret", "temperature"]);
        let err = forecaster()
            .forecast(&predictor, &[obs("F1", "P1", 2, Some(2.0), Some(1.0))], 1)
            .unwrap_err();
        assert!(matches!(err, ForecastError::Schema(_)));
        assert!(predictor.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_empty_input_yields_no_rows() {
        let predictor = ProxyEcho::new(&COLUMNS);
        assert!(forecaster().forecast(&predictor, &[], 14).unwrap().is_empty());
    }

    #[test]
    fn test_negative_outputs_clamped() {
        let predictor = ProxyEcho::new(&COLUMNS);
        let out = forecaster()
            .forecast(&predictor, &[obs("F1", "P1", 2, Some(-4.6), Some(1.0))], 2)
            .unwrap();
        assert!(out.iter().all(|r| r.predicted == 0));
    }
}
