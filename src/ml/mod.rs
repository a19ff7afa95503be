pub mod buffer;
pub mod features;
pub mod pipeline;
pub mod predictor;
pub mod recursive;
pub mod snapshot;
pub mod stats;
pub mod summary;

pub use pipeline::{GbdtParams, GbdtPipeline};
pub use predictor::{PostProcess, Predictor};
pub use recursive::RecursiveForecaster;
pub use snapshot::{SnapshotForecaster, SnapshotObservation};
