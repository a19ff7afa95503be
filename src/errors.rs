use std::path::PathBuf;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Errors raised while loading tables, deriving features or running a predictor.
#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("missing required columns: {0:?}")]
    MissingColumns(Vec<String>),

    #[error("no usable rows: {0}")]
    EmptyData(String),

    #[error("file does not exist: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("feature schema mismatch: {0}")]
    Schema(String),

    #[error("prediction failed: {0}")]
    Predictor(String),

    #[error("model artifact error: {0}")]
    Model(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

impl From<serde_json::Error> for ForecastError {
    fn from(err: serde_json::Error) -> Self {
        Self::Model(err.to_string())
    }
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub body: ApiError,
}

impl AppError {
    fn with_status(status: StatusCode, code: &str, msg: impl Into<String>) -> Self {
        Self {
            status,
            body: ApiError {
                code: code.into(),
                message: msg.into(),
                details: None,
            },
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::with_status(StatusCode::BAD_REQUEST, "BAD_REQUEST", msg)
    }

    pub fn not_found(resource: &str, id: &str) -> Self {
        Self::with_status(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{resource} '{id}' not found"),
        )
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::with_status(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg)
    }

    pub fn service_unavailable(service: &str) -> Self {
        Self::with_status(
            StatusCode::SERVICE_UNAVAILABLE,
            "SERVICE_UNAVAILABLE",
            format!("{service} is currently unavailable"),
        )
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.body.details = Some(details);
        self
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<ForecastError> for AppError {
    fn from(err: ForecastError) -> Self {
        match err {
            ForecastError::MissingColumns(ref missing) => {
                let missing = serde_json::json!({ "missing_columns": missing });
                Self::bad_request(err.to_string()).details(missing)
            }
            ForecastError::EmptyData(_) => Self::bad_request(err.to_string()),
            ForecastError::FileNotFound(ref path) => {
                tracing::warn!(path = %path.display(), "Requested input file not found");
                Self::with_status(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    err.to_string(),
                )
            }
            other => {
                tracing::error!("Forecast processing error: {:?}", other);
                Self::internal(format!("processing failed: {other}"))
            }
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!("Internal error: {:?}", err);
        Self::internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_columns_is_client_error() {
        let err: AppError = ForecastError::MissingColumns(vec!["Date".into()]).into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.body.code, "BAD_REQUEST");
        assert!(err.body.details.is_some());
    }

    #[test]
    fn test_missing_file_is_unavailable() {
        let err: AppError = ForecastError::FileNotFound(PathBuf::from("/nope.csv")).into();
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(err.body.message.contains("/nope.csv"));
    }

    #[test]
    fn test_predictor_failure_is_internal_with_text() {
        let err: AppError = ForecastError::Predictor("boom".into()).into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.body.message.contains("boom"));
    }
}
