use axum::{
    extract::{Query, State},
    Json,
};

use crate::data::load_snapshot;
use crate::errors::{AppError, ForecastError};
use crate::handlers::AppState;
use crate::ml::SnapshotForecaster;
use crate::models::{SnapshotQueryParams, SnapshotResponse};

/// Forecast for the entities on the last day of a CSV file on the server.
pub async fn forecast_file(
    State(state): State<AppState>,
    Query(params): Query<SnapshotQueryParams>,
) -> Result<Json<SnapshotResponse>, AppError> {
    let path = params
        .path
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| AppError::bad_request("missing query parameter 'path'"))?;

    let max = state.config.forecast.max_horizon_days;
    let horizon = params.horizon.unwrap_or(state.config.snapshot.default_horizon);
    if horizon == 0 || horizon > max {
        return Err(AppError::bad_request(format!(
            "horizon must be between 1 and {max}"
        )));
    }

    let predictor = state
        .snapshot_model
        .clone()
        .ok_or_else(|| AppError::service_unavailable("snapshot model"))?;
    let forecaster =
        SnapshotForecaster::from_config(&state.config.snapshot, state.config.forecast.post_process())?;
    let config = state.config.clone();

    tracing::info!(path = %path, horizon, "Running snapshot forecast");
    let rows = tokio::task::spawn_blocking(move || -> Result<_, ForecastError> {
        let observations = load_snapshot(&path, &config.snapshot)?;
        forecaster.forecast(predictor.as_ref(), &observations, horizon)
    })
    .await
    .map_err(|e| AppError::internal(format!("snapshot task failed: {e}")))??;

    Ok(Json(SnapshotResponse {
        rows: rows.len(),
        data: rows,
    }))
}
