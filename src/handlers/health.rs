use axum::{extract::State, Json};

use crate::handlers::AppState;

pub async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "model_trained": true,
        "model_source": state.model_source.to_string(),
        "feature_columns": state.predictor.feature_columns().len(),
        "forecast_run_id": state.forecast.run_id,
        "forecast_generated_at": state.forecast.generated_at,
        "forecast_rows": state.forecast.len(),
        "snapshot_model": {
            "path": state.config.snapshot.model_path,
            "loaded": state.snapshot_model.is_some(),
        },
    }))
}
