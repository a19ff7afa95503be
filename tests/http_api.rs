use std::io::Write;
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use chrono::{Duration, NaiveDate};
use serde_json::Value;
use tempfile::NamedTempFile;
use tower::ServiceExt;

use consumption_forecast::bootstrap::GlobalForecast;
use consumption_forecast::config::{AppConfig, ModelSource};
use consumption_forecast::errors::ForecastError;
use consumption_forecast::handlers::{router, AppState};
use consumption_forecast::ml::features::CALENDAR_COLUMNS;
use consumption_forecast::ml::Predictor;
use consumption_forecast::models::{EntityKey, FeatureRow, FeatureValue, ForecastRow, ForecastTable};

/// Echoes one numeric feature back as the prediction.
struct Echo {
    columns: Vec<String>,
    source: &'static str,
}

impl Predictor for Echo {
    fn feature_columns(&self) -> &[String] {
        &self.columns
    }

    fn predict(&self, rows: &[FeatureRow]) -> Result<Vec<f64>, ForecastError> {
        Ok(rows
            .iter()
            .map(|r| r.get(self.source).and_then(FeatureValue::as_number).unwrap_or(0.0))
            .collect())
    }
}

fn forecast_table() -> ForecastTable {
    let start = NaiveDate::from_ymd_opt(2025, 2, 1).unwrap();
    let mut rows = Vec::new();
    for (entity, values) in [("SNK001", [10, 12, 14]), ("BEV001", [3, 3, 3])] {
        for (i, predicted) in values.into_iter().enumerate() {
            rows.push(ForecastRow {
                entity: EntityKey::single(entity),
                date: start + Duration::days(i as i64),
                predicted,
            });
        }
    }
    ForecastTable::new(rows, 3)
}

fn snapshot_predictor(config: &AppConfig) -> Arc<dyn Predictor> {
    let snapshot = &config.snapshot;
    let columns = snapshot
        .key_columns
        .iter()
        .chain(&snapshot.proxy_columns)
        .cloned()
        .chain(CALENDAR_COLUMNS.iter().map(|c| c.to_string()))
        .collect();
    Arc::new(Echo {
        columns,
        source: "Standard_Specification_Qty",
    })
}

fn app(with_snapshot_model: bool) -> Router {
    let config = AppConfig::default();
    let global = GlobalForecast {
        predictor: Arc::new(Echo {
            columns: vec!["lag_1".into()],
            source: "lag_1",
        }),
        source: ModelSource::Train,
        table: forecast_table(),
    };
    let snapshot_model = with_snapshot_model.then(|| snapshot_predictor(&config));
    router(AppState::new(config, global, snapshot_model))
}

async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>, Option<String>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec(), content_type)
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let (status, body, _) = get(app, uri).await;
    (status, serde_json::from_slice(&body).unwrap())
}

fn snapshot_file(body: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        "Flight_ID,Date,Product_ID,Standard_Specification_Qty,Quantity_Returned"
    )
    .unwrap();
    write!(file, "{body}").unwrap();
    file
}

#[tokio::test]
async fn test_health_reports_models() {
    let (status, body) = get_json(app(true), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["model_source"], "train");
    assert_eq!(body["forecast_rows"], 6);
    assert_eq!(body["snapshot_model"]["loaded"], true);

    let (_, body) = get_json(app(false), "/health").await;
    assert_eq!(body["snapshot_model"]["loaded"], false);
}

#[tokio::test]
async fn test_forecast_requires_product_id() {
    let (status, body) = get_json(app(true), "/api/v1/forecasts").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_forecast_json_for_product() {
    let (status, body) = get_json(app(true), "/api/v1/forecasts?product_id=SNK001").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["product_id"], "SNK001");
    assert_eq!(body["rows"], 3);
    assert_eq!(body["data"][0]["date"], "2025-02-01");
    assert_eq!(body["data"][2]["predicted"], 14);

    let (status, body) = get_json(app(true), "/api/v1/forecasts?product_id=NOPE").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rows"], 0);
    assert_eq!(body["data"], Value::Array(vec![]));
}

#[tokio::test]
async fn test_forecast_csv_attachment() {
    let (status, body, content_type) = get(app(true), "/api/v1/forecasts?product_id=BEV001&format=csv").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("text/csv"));
    let text = String::from_utf8(body).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "date,product_id,predicted");
    assert_eq!(lines[1], "2025-02-01,BEV001,3");
    assert_eq!(lines.len(), 4);
}

#[tokio::test]
async fn test_summary_and_detail() {
    let (status, body) = get_json(app(true), "/api/v1/forecasts/summary").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["metadata"]["total_products"], 2);
    assert_eq!(body["metadata"]["forecast_horizon_days"], 3);
    assert_eq!(body["predictions"][0]["product_id"], "BEV001");

    let (status, body) = get_json(app(true), "/api/v1/forecasts/SNK001").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_predicted"], 36);
    assert_eq!(body["history"][0]["day_of_week"], "Saturday");
    assert_eq!(body["history"][0]["week_number"], 5);

    let (status, body) = get_json(app(true), "/api/v1/forecasts/UNKNOWN").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_snapshot_forecast_from_file() {
    let file = snapshot_file(
        "FL1,2025-04-01,SNK001,10,1\n\
         FL1,2025-04-02,SNK001,12,0\n\
         FL2,2025-04-02,BEV001,6,2\n\
         FL3,2025-03-30,SNK001,40,0\n",
    );
    let uri = format!("/api/v1/forecasts/snapshot?path={}&horizon=2", file.path().display());
    let (status, body) = get_json(app(true), &uri).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rows"], 4);
    let first = &body["data"][0];
    assert_eq!(first["Flight_ID"], "FL1");
    assert_eq!(first["Product_ID"], "SNK001");
    assert_eq!(first["date"], "2025-04-03");
    assert_eq!(first["Standard_Specification_Qty"], 11.0);
    assert_eq!(first["predicted"], 11);
    assert_eq!(first["dow"], 3);
    assert_eq!(body["data"][3]["Flight_ID"], "FL2");
}

#[tokio::test]
async fn test_snapshot_uses_default_horizon() {
    let file = snapshot_file("FL1,2025-04-02,SNK001,12,0\n");
    let uri = format!("/api/v1/forecasts/snapshot?path={}", file.path().display());
    let (status, body) = get_json(app(true), &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rows"], 14);
}

#[tokio::test]
async fn test_snapshot_errors() {
    let (status, _) = get_json(app(true), "/api/v1/forecasts/snapshot").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let file = snapshot_file("FL1,2025-04-02,SNK001,12,0\n");
    let uri = format!("/api/v1/forecasts/snapshot?path={}", file.path().display());
    let (status, body) = get_json(app(false), &uri).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "SERVICE_UNAVAILABLE");

    let (status, _) = get_json(app(true), "/api/v1/forecasts/snapshot?path=/no/such/file.csv").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let uri = format!("/api/v1/forecasts/snapshot?path={}&horizon=5000", file.path().display());
    let (status, _) = get_json(app(true), &uri).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut bad = NamedTempFile::new().unwrap();
    writeln!(bad, "Flight_ID,Date,Quantity_Returned").unwrap();
    writeln!(bad, "FL1,2025-04-02,0").unwrap();
    let uri = format!("/api/v1/forecasts/snapshot?path={}", bad.path().display());
    let (status, body) = get_json(app(true), &uri).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["details"]["missing_columns"],
        serde_json::json!(["Product_ID", "Standard_Specification_Qty"])
    );
}

#[tokio::test]
async fn test_snapshot_without_readable_rows_is_rejected() {
    let file = snapshot_file(
        "FL1,not-a-date,SNK001,12,0\n\
         FL2,2025-04-02,BEV001,n/a,1\n",
    );
    let uri = format!("/api/v1/forecasts/snapshot?path={}", file.path().display());
    let (status, body) = get_json(app(true), &uri).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");
}
