//! Per-product views over the global forecast: horizon totals, first-week
//! versus last-week trend, variability and the alerts derived from them.

use chrono::Datelike;

use crate::ml::stats::{mean, sample_std};
use crate::models::{
    AlertSeverity, DailyPrediction, EntityKey, ForecastAlert, ForecastRow, ForecastTable,
    PredictionsSummary, ProductDetail, ProductPrediction, SummaryMetadata, Trend,
};

const TREND_WINDOW: usize = 7;
const TREND_RECOMMENDATION_PCT: f64 = 20.0;
const TREND_ALERT_PCT: f64 = 30.0;
const VARIABILITY_RECOMMENDATION_PCT: f64 = 30.0;
const VARIABILITY_ALERT_PCT: f64 = 40.0;

fn round1(v: f64) -> f64 {
    (v * 10.0).round_ties_even() / 10.0
}

fn daily(row: &ForecastRow, with_week: bool) -> DailyPrediction {
    DailyPrediction {
        date: row.date,
        predicted_consumption: row.predicted,
        day_of_week: row.date.format("%A").to_string(),
        week_number: with_week.then(|| row.date.iso_week().week()),
    }
}

/// Summary of one product's rows, which must be non-empty and date ordered.
pub fn summarize_product(rows: &[ForecastRow]) -> Option<(ProductPrediction, Vec<ForecastAlert>)> {
    let first = rows.first()?;
    let last = rows.last()?;
    let product_id = first.entity.to_string();

    let values: Vec<f64> = rows.iter().map(|r| r.predicted as f64).collect();
    let total: i64 = rows.iter().map(|r| r.predicted).sum();
    let avg = mean(&values)?;
    let max = rows.iter().map(|r| r.predicted).max()?;
    let min = rows.iter().map(|r| r.predicted).min()?;

    let first_week = mean(&values[..TREND_WINDOW.min(values.len())])?;
    let last_week = mean(&values[values.len().saturating_sub(TREND_WINDOW)..])?;
    let trend = if last_week > first_week {
        Trend::Increasing
    } else {
        Trend::Decreasing
    };
    let trend_pct = if first_week > 0.0 {
        (last_week - first_week) / first_week * 100.0
    } else {
        0.0
    };

    let variability = if avg > 0.0 {
        sample_std(&values) / avg * 100.0
    } else {
        0.0
    };
    let score = (100.0 - variability).clamp(0.0, 100.0);

    let mut recommendations = Vec::new();
    if trend_pct > TREND_RECOMMENDATION_PCT {
        recommendations.push(format!("High projected demand (+{trend_pct:.1}%)"));
        recommendations.push("Consider increasing stock".to_string());
    } else if trend_pct < -TREND_RECOMMENDATION_PCT {
        recommendations.push(format!("Low projected demand ({trend_pct:.1}%)"));
        recommendations.push("Adjust purchase orders".to_string());
    }
    if variability > VARIABILITY_RECOMMENDATION_PCT {
        recommendations.push("High consumption variability".to_string());
        recommendations.push("Monitor weekly patterns".to_string());
    } else {
        recommendations.push("Stable, predictable consumption".to_string());
    }

    let mut alerts = Vec::new();
    if variability > VARIABILITY_ALERT_PCT {
        alerts.push(ForecastAlert {
            severity: AlertSeverity::Warning,
            title: format!("High variability - {product_id}"),
            message: format!("Product {product_id} shows {variability:.1}% variability in consumption"),
        });
    }
    if trend_pct > TREND_ALERT_PCT {
        alerts.push(ForecastAlert {
            severity: AlertSeverity::Info,
            title: format!("Rising trend - {product_id}"),
            message: format!("Demand increasing {trend_pct:.1}% over the coming weeks"),
        });
    }

    let prediction = ProductPrediction {
        product_id,
        predictability_score: round1(score),
        total_predicted: total,
        avg_daily_consumption: round1(avg),
        max_consumption: max,
        min_consumption: min,
        days_forecasted: rows.len(),
        trend,
        trend_percentage: round1(trend_pct),
        variability: round1(variability),
        start_date: first.date,
        end_date: last.date,
        history: rows.iter().map(|r| daily(r, false)).collect(),
        recommendations,
    };
    Some((prediction, alerts))
}

/// All products, most predictable first.
pub fn summarize(table: &ForecastTable) -> PredictionsSummary {
    let mut predictions = Vec::new();
    let mut alerts = Vec::new();
    for rows in table.entities() {
        if let Some((prediction, product_alerts)) = summarize_product(rows) {
            predictions.push(prediction);
            alerts.extend(product_alerts);
        }
    }
    predictions.sort_by(|a, b| b.predictability_score.total_cmp(&a.predictability_score));

    PredictionsSummary {
        metadata: SummaryMetadata {
            total_products: predictions.len(),
            forecast_horizon_days: table.horizon_days,
        },
        predictions,
        alerts,
    }
}

pub fn product_detail(table: &ForecastTable, product_id: &str) -> Option<ProductDetail> {
    let rows = table.for_entity(&EntityKey::single(product_id));
    if rows.is_empty() {
        return None;
    }
    let values: Vec<f64> = rows.iter().map(|r| r.predicted as f64).collect();
    Some(ProductDetail {
        product_id: product_id.to_string(),
        history: rows.iter().map(|r| daily(r, true)).collect(),
        total_predicted: rows.iter().map(|r| r.predicted).sum(),
        avg_daily: mean(&values).unwrap_or_default(),
    })
}
