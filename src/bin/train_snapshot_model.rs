//! Fits the pipeline behind the snapshot endpoint and writes it to
//! `snapshot.model_path`.
//!
//! Reads the same configuration as the server; `snapshot.training_path` must
//! point at a CSV carrying the key, date, proxy and target columns.

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use consumption_forecast::config::AppConfig;
use consumption_forecast::data::SnapshotTraining;
use consumption_forecast::ml::{GbdtParams, GbdtPipeline};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "consumption_forecast=info,train_snapshot_model=info".into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = AppConfig::load()?;
    let snapshot = &config.snapshot;
    let training_path = snapshot
        .training_path
        .as_deref()
        .context("snapshot.training_path must be set to train the snapshot model")?;

    let training = SnapshotTraining::load(training_path, snapshot)
        .with_context(|| format!("reading snapshot training data from {training_path}"))?;

    let pipeline = GbdtPipeline::fit(
        training.feature_columns,
        &training.categorical,
        &training.rows,
        &training.targets,
        &GbdtParams::from(&config.model),
    )
    .context("training snapshot pipeline")?;

    pipeline
        .save(&snapshot.model_path)
        .with_context(|| format!("writing snapshot pipeline to {}", snapshot.model_path))?;

    tracing::info!(
        path = %snapshot.model_path,
        rows = pipeline.training_rows,
        "Snapshot pipeline saved"
    );
    Ok(())
}
