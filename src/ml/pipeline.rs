//! Gradient-boosted regression pipeline: imputation, one-hot encoding and a
//! `gbdt` tree ensemble behind the [`Predictor`] trait.

use std::fmt;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use gbdt::config::Config;
use gbdt::decision_tree::{Data, DataVec};
use gbdt::gradient_boost::GBDT;
use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;
use crate::errors::ForecastError;
use crate::ml::predictor::{check_schema, Predictor};
use crate::ml::stats::median;
use crate::models::{FeatureRow, FeatureValue};

const ARTIFACT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GbdtParams {
    pub iterations: usize,
    pub max_depth: u32,
    pub shrinkage: f32,
    pub min_leaf_size: usize,
}

impl Default for GbdtParams {
    fn default() -> Self {
        Self::from(&ModelConfig::default())
    }
}

impl From<&ModelConfig> for GbdtParams {
    fn from(config: &ModelConfig) -> Self {
        Self {
            iterations: config.iterations,
            max_depth: config.max_depth,
            shrinkage: config.shrinkage,
            min_leaf_size: config.min_leaf_size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum ColumnEncoding {
    /// Missing values take the training median.
    Numeric { fill: f64 },
    /// Missing values take the most frequent level; unseen levels encode as all zeros.
    Categorical { fill: Option<String>, levels: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ColumnSpec {
    name: String,
    encoding: ColumnEncoding,
}

impl ColumnSpec {
    fn width(&self) -> usize {
        match &self.encoding {
            ColumnEncoding::Numeric { .. } => 1,
            ColumnEncoding::Categorical { levels, .. } => levels.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Preprocessor {
    columns: Vec<ColumnSpec>,
}

impl Preprocessor {
    fn fit(columns: &[String], categorical: &[String], rows: &[FeatureRow]) -> Self {
        let specs = columns
            .iter()
            .map(|name| {
                let values: Vec<&FeatureValue> = rows
                    .iter()
                    .filter_map(|r| r.get(name))
                    .filter(|v| !v.is_missing())
                    .collect();
                let is_categorical = categorical.contains(name)
                    || values.iter().any(|v| matches!(v, FeatureValue::Category(_)));

                let encoding = if is_categorical {
                    let mut labels: Vec<String> =
                        values.iter().filter_map(|v| v.as_category()).collect();
                    labels.sort();
                    let fill = most_frequent(&labels);
                    labels.dedup();
                    ColumnEncoding::Categorical {
                        fill,
                        levels: labels,
                    }
                } else {
                    let mut numbers: Vec<f64> = values.iter().filter_map(|v| v.as_number()).collect();
                    ColumnEncoding::Numeric {
                        fill: median(&mut numbers).unwrap_or(0.0),
                    }
                };
                ColumnSpec {
                    name: name.clone(),
                    encoding,
                }
            })
            .collect();
        Self { columns: specs }
    }

    fn width(&self) -> usize {
        self.columns.iter().map(ColumnSpec::width).sum()
    }

    fn transform(&self, row: &FeatureRow) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.width());
        for spec in &self.columns {
            let value = row.get(&spec.name).unwrap_or(&FeatureValue::Missing);
            match &spec.encoding {
                ColumnEncoding::Numeric { fill } => {
                    let number = match value {
                        FeatureValue::Number(v) if v.is_finite() => *v,
                        FeatureValue::Category(s) => s.parse().unwrap_or(*fill),
                        _ => *fill,
                    };
                    out.push(number as f32);
                }
                ColumnEncoding::Categorical { fill, levels } => {
                    let label = value.as_category().or_else(|| fill.clone());
                    let hit = label.and_then(|l| levels.binary_search(&l).ok());
                    out.extend((0..levels.len()).map(|i| if Some(i) == hit { 1.0 } else { 0.0 }));
                }
            }
        }
        out
    }
}

/// Ties resolve to the smallest label. Expects sorted input.
fn most_frequent(sorted: &[String]) -> Option<String> {
    let mut best: Option<(&String, usize)> = None;
    for run in sorted.chunk_by(|a, b| a == b) {
        if best.map_or(true, |(_, n)| run.len() > n) {
            best = Some((&run[0], run.len()));
        }
    }
    best.map(|(label, _)| label.clone())
}

/// Fitted preprocessing plus tree ensemble.
#[derive(Serialize, Deserialize)]
pub struct GbdtPipeline {
    feature_columns: Vec<String>,
    preprocessor: Preprocessor,
    model: GBDT,
    pub trained_at: DateTime<Utc>,
    pub training_rows: usize,
}

#[derive(Serialize)]
struct ArtifactRef<'a> {
    version: u32,
    pipeline: &'a GbdtPipeline,
}

#[derive(Deserialize)]
struct Artifact {
    version: u32,
    pipeline: GbdtPipeline,
}

impl GbdtPipeline {
    /// Fits on `rows`, whose columns are `feature_columns`. Columns listed in
    /// `categorical` are one-hot encoded even when their values look numeric.
    pub fn fit(
        feature_columns: Vec<String>,
        categorical: &[String],
        rows: &[FeatureRow],
        targets: &[f64],
        params: &GbdtParams,
    ) -> Result<Self, ForecastError> {
        if rows.is_empty() {
            return Err(ForecastError::EmptyData("no training rows".into()));
        }
        if rows.len() != targets.len() {
            return Err(ForecastError::Schema(format!(
                "{} training rows but {} targets",
                rows.len(),
                targets.len()
            )));
        }
        check_schema(&feature_columns, rows)?;

        let preprocessor = Preprocessor::fit(&feature_columns, categorical, rows);
        let width = preprocessor.width();
        if width == 0 {
            return Err(ForecastError::Schema("feature set encodes to zero width".into()));
        }

        let mut cfg = Config::new();
        cfg.set_feature_size(width);
        cfg.set_max_depth(params.max_depth);
        cfg.set_iterations(params.iterations);
        cfg.set_shrinkage(params.shrinkage);
        cfg.set_min_leaf_size(params.min_leaf_size);
        cfg.set_loss("SquaredError");
        cfg.set_debug(false);

        let mut training: DataVec = rows
            .iter()
            .zip(targets)
            .map(|(row, &y)| Data::new_training_data(preprocessor.transform(row), 1.0, y as f32, None))
            .collect();

        let mut model = GBDT::new(&cfg);
        model.fit(&mut training);

        tracing::info!(
            rows = rows.len(),
            columns = feature_columns.len(),
            encoded_width = width,
            iterations = params.iterations,
            "Fitted gradient-boosted pipeline"
        );

        Ok(Self {
            feature_columns,
            preprocessor,
            model,
            trained_at: Utc::now(),
            training_rows: rows.len(),
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ForecastError> {
        let json = serde_json::to_string(&ArtifactRef {
            version: ARTIFACT_VERSION,
            pipeline: self,
        })?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ForecastError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ForecastError::FileNotFound(path.to_path_buf()));
        }
        let artifact: Artifact = serde_json::from_slice(&fs::read(path)?)?;
        if artifact.version != ARTIFACT_VERSION {
            return Err(ForecastError::Model(format!(
                "unsupported artifact version {} (expected {ARTIFACT_VERSION})",
                artifact.version
            )));
        }
        Ok(artifact.pipeline)
    }
}

impl Predictor for GbdtPipeline {
    fn feature_columns(&self) -> &[String] {
        &self.feature_columns
    }

    fn predict(&self, rows: &[FeatureRow]) -> Result<Vec<f64>, ForecastError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        check_schema(&self.feature_columns, rows)?;

        let batch: DataVec = rows
            .iter()
            .map(|row| Data::new_test_data(self.preprocessor.transform(row), None))
            .collect();
        let predicted = self.model.predict(&batch);
        if predicted.len() != rows.len() {
            return Err(ForecastError::Predictor(format!(
                "model returned {} predictions for {} rows",
                predicted.len(),
                rows.len()
            )));
        }
        Ok(predicted.into_iter().map(f64::from).collect())
    }
}

impl fmt::Debug for GbdtPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GbdtPipeline")
            .field("feature_columns", &self.feature_columns)
            .field("encoded_width", &self.preprocessor.width())
            .field("trained_at", &self.trained_at)
            .field("training_rows", &self.training_rows)
            .finish()
    }
}
