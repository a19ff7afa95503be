pub mod forecasts;
pub mod health;
pub mod snapshot;

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::bootstrap::GlobalForecast;
use crate::config::{AppConfig, ModelSource};
use crate::ml::Predictor;
use crate::models::ForecastTable;

/// Shared application state available to all handlers. Built once at startup
/// and read-only afterwards.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub predictor: Arc<dyn Predictor>,
    pub model_source: ModelSource,
    pub forecast: Arc<ForecastTable>,
    pub snapshot_model: Option<Arc<dyn Predictor>>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        global: GlobalForecast,
        snapshot_model: Option<Arc<dyn Predictor>>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            predictor: global.predictor,
            model_source: global.source,
            forecast: Arc::new(global.table),
            snapshot_model,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/v1/forecasts", get(forecasts::query))
        .route("/api/v1/forecasts/summary", get(forecasts::summary))
        .route("/api/v1/forecasts/snapshot", get(snapshot::forecast_file))
        .route("/api/v1/forecasts/:product_id", get(forecasts::detail))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
