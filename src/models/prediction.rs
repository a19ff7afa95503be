use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Increasing,
    Decreasing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyPrediction {
    pub date: NaiveDate,
    pub predicted_consumption: i64,
    pub day_of_week: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub week_number: Option<u32>,
}

/// Aggregate view over one product's forecast horizon.
#[derive(Debug, Clone, Serialize)]
pub struct ProductPrediction {
    pub product_id: String,
    pub predictability_score: f64,
    pub total_predicted: i64,
    pub avg_daily_consumption: f64,
    pub max_consumption: i64,
    pub min_consumption: i64,
    pub days_forecasted: usize,
    pub trend: Trend,
    pub trend_percentage: f64,
    pub variability: f64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub history: Vec<DailyPrediction>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ForecastAlert {
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct SummaryMetadata {
    pub total_products: usize,
    pub forecast_horizon_days: usize,
}

#[derive(Debug, Serialize)]
pub struct PredictionsSummary {
    pub predictions: Vec<ProductPrediction>,
    pub alerts: Vec<ForecastAlert>,
    pub metadata: SummaryMetadata,
}

#[derive(Debug, Serialize)]
pub struct ProductDetail {
    pub product_id: String,
    pub history: Vec<DailyPrediction>,
    pub total_predicted: i64,
    pub avg_daily: f64,
}
