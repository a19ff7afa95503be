use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};

use crate::errors::{AppError, ForecastError};
use crate::handlers::AppState;
use crate::ml::summary::{product_detail, summarize};
use crate::models::{
    EntityKey, ForecastPoint, ForecastQueryParams, ForecastResponse, PredictionsSummary,
    ProductDetail,
};

/// Global forecast rows for one product, as JSON or a CSV attachment.
pub async fn query(
    State(state): State<AppState>,
    Query(params): Query<ForecastQueryParams>,
) -> Result<Response, AppError> {
    let product_id = params
        .product_id
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::bad_request("missing query parameter 'product_id'"))?;

    let data: Vec<ForecastPoint> = state
        .forecast
        .for_entity(&EntityKey::single(product_id.as_str()))
        .iter()
        .map(ForecastPoint::from)
        .collect();

    let wants_csv = params
        .format
        .as_deref()
        .is_some_and(|f| f.eq_ignore_ascii_case("csv"));
    if wants_csv && !data.is_empty() {
        return csv_attachment(&product_id, &data);
    }

    Ok(Json(ForecastResponse {
        product_id,
        rows: data.len(),
        data,
    })
    .into_response())
}

fn csv_attachment(product_id: &str, points: &[ForecastPoint]) -> Result<Response, AppError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for point in points {
        writer.serialize(point).map_err(ForecastError::from)?;
    }
    let body = writer
        .into_inner()
        .map_err(|e| AppError::internal(format!("failed to encode CSV: {e}")))?;

    let headers = [
        (header::CONTENT_TYPE, "text/csv".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=forecast_{product_id}.csv"),
        ),
    ];
    Ok((headers, body).into_response())
}

pub async fn summary(State(state): State<AppState>) -> Json<PredictionsSummary> {
    Json(summarize(&state.forecast))
}

pub async fn detail(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
) -> Result<Json<ProductDetail>, AppError> {
    product_detail(&state.forecast, &product_id)
        .map(Json)
        .ok_or_else(|| AppError::not_found("product", &product_id))
}
