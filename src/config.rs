use serde::Deserialize;

use crate::ml::PostProcess;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub forecast: ForecastConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub snapshot: SnapshotConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    5001
}

/// Where the historical consumption table lives and which columns matter.
#[derive(Debug, Deserialize, Clone)]
pub struct HistoryConfig {
    #[serde(default = "default_history_path")]
    pub path: String,
    #[serde(default = "default_date_column")]
    pub date_column: String,
    #[serde(default = "default_key_column")]
    pub key_column: String,
    #[serde(default = "default_target_column")]
    pub target_column: String,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            path: default_history_path(),
            date_column: default_date_column(),
            key_column: default_key_column(),
            target_column: default_target_column(),
        }
    }
}

fn default_history_path() -> String {
    "consumption_history.csv".into()
}
fn default_date_column() -> String {
    "Date".into()
}
fn default_key_column() -> String {
    "Product_ID".into()
}
fn default_target_column() -> String {
    "Quantity_Consumed".into()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ForecastConfig {
    #[serde(default = "default_horizon_days")]
    pub horizon_days: usize,
    #[serde(default = "default_true")]
    pub round_outputs: bool,
    #[serde(default = "default_true")]
    pub non_negative: bool,
    #[serde(default = "default_lags")]
    pub lags: Vec<usize>,
    #[serde(default = "default_rolling_windows")]
    pub rolling_windows: Vec<usize>,
    #[serde(default = "default_max_horizon_days")]
    pub max_horizon_days: usize,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            horizon_days: default_horizon_days(),
            round_outputs: true,
            non_negative: true,
            lags: default_lags(),
            rolling_windows: default_rolling_windows(),
            max_horizon_days: default_max_horizon_days(),
        }
    }
}

impl ForecastConfig {
    pub fn post_process(&self) -> PostProcess {
        PostProcess {
            round: self.round_outputs,
            non_negative: self.non_negative,
        }
    }
}

fn default_horizon_days() -> usize {
    28
}
fn default_true() -> bool {
    true
}
fn default_lags() -> Vec<usize> {
    vec![1, 7, 28]
}
fn default_rolling_windows() -> Vec<usize> {
    vec![7, 28]
}
fn default_max_horizon_days() -> usize {
    366
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelSource {
    /// Fit the pipeline in-process from the history table.
    #[default]
    Train,
    /// Read a previously saved pipeline artifact.
    Load,
}

impl std::fmt::Display for ModelSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Train => write!(f, "train"),
            Self::Load => write!(f, "load"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    #[serde(default)]
    pub source: ModelSource,
    pub path: Option<String>,
    pub save_path: Option<String>,
    #[serde(default = "default_iterations")]
    pub iterations: usize,
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    #[serde(default = "default_shrinkage")]
    pub shrinkage: f32,
    #[serde(default = "default_min_leaf_size")]
    pub min_leaf_size: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            source: ModelSource::Train,
            path: None,
            save_path: None,
            iterations: default_iterations(),
            max_depth: default_max_depth(),
            shrinkage: default_shrinkage(),
            min_leaf_size: default_min_leaf_size(),
        }
    }
}

fn default_iterations() -> usize {
    300
}
fn default_max_depth() -> u32 {
    6
}
fn default_shrinkage() -> f32 {
    0.05
}
fn default_min_leaf_size() -> usize {
    10
}

/// Settings for the file-driven forecast, whose model is loaded from storage.
#[derive(Debug, Deserialize, Clone)]
pub struct SnapshotConfig {
    #[serde(default = "default_snapshot_model_path")]
    pub model_path: String,
    pub training_path: Option<String>,
    #[serde(default = "default_date_column")]
    pub date_column: String,
    #[serde(default = "default_snapshot_key_columns")]
    pub key_columns: Vec<String>,
    #[serde(default = "default_key_column")]
    pub group_column: String,
    #[serde(default = "default_proxy_columns")]
    pub proxy_columns: Vec<String>,
    #[serde(default = "default_target_column")]
    pub target_column: String,
    #[serde(default = "default_proxy_window")]
    pub proxy_window: usize,
    #[serde(default = "default_snapshot_horizon")]
    pub default_horizon: usize,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            model_path: default_snapshot_model_path(),
            training_path: None,
            date_column: default_date_column(),
            key_columns: default_snapshot_key_columns(),
            group_column: default_key_column(),
            proxy_columns: default_proxy_columns(),
            target_column: default_target_column(),
            proxy_window: default_proxy_window(),
            default_horizon: default_snapshot_horizon(),
        }
    }
}

impl SnapshotConfig {
    /// Columns an uploaded snapshot file must carry.
    pub fn required_columns(&self) -> Vec<String> {
        let mut required = self.key_columns.clone();
        required.push(self.date_column.clone());
        required.extend(self.proxy_columns.iter().cloned());
        required
    }

    pub fn group_index(&self) -> Option<usize> {
        self.key_columns.iter().position(|c| c == &self.group_column)
    }
}

fn default_snapshot_model_path() -> String {
    "snapshot_pipeline.json".into()
}
fn default_snapshot_key_columns() -> Vec<String> {
    vec!["Flight_ID".into(), "Product_ID".into()]
}
fn default_proxy_columns() -> Vec<String> {
    vec![
        "Standard_Specification_Qty".into(),
        "Quantity_Returned".into(),
    ]
}
fn default_proxy_window() -> usize {
    28
}
fn default_snapshot_horizon() -> usize {
    14
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("FORECAST")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("forecast.lags")
                    .with_list_parse_key("forecast.rolling_windows")
                    .with_list_parse_key("snapshot.key_columns")
                    .with_list_parse_key("snapshot.proxy_columns"),
            )
            .build()?;

        let app_config: AppConfig = config.try_deserialize()?;
        app_config.validate()?;
        Ok(app_config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let forecast = &self.forecast;
        if forecast.lags.iter().chain(&forecast.rolling_windows).any(|&n| n == 0) {
            anyhow::bail!("lags and rolling windows must be at least 1");
        }
        if forecast.horizon_days == 0 || forecast.horizon_days > forecast.max_horizon_days {
            anyhow::bail!(
                "forecast.horizon_days must be between 1 and {}",
                forecast.max_horizon_days
            );
        }
        if self.model.source == ModelSource::Load && self.model.path.is_none() {
            anyhow::bail!("model.path is required when model.source = load");
        }
        if self.snapshot.group_index().is_none() {
            anyhow::bail!(
                "snapshot.group_column '{}' must be one of snapshot.key_columns",
                self.snapshot.group_column
            );
        }
        if self.snapshot.proxy_window == 0 {
            anyhow::bail!("snapshot.proxy_window must be at least 1");
        }
        Ok(())
    }
}
