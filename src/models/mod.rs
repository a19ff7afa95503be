pub mod entity;
pub mod feature;
pub mod forecast;
pub mod prediction;

pub use entity::EntityKey;
pub use feature::{FeatureRow, FeatureValue, Observation};
pub use forecast::{
    ForecastPoint, ForecastQueryParams, ForecastResponse, ForecastRow, ForecastTable,
    SnapshotForecastRow, SnapshotQueryParams, SnapshotResponse,
};
pub use prediction::{
    AlertSeverity, DailyPrediction, ForecastAlert, PredictionsSummary, ProductDetail,
    ProductPrediction, SummaryMetadata, Trend,
};
