use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use consumption_forecast::bootstrap;
use consumption_forecast::config::AppConfig;
use consumption_forecast::handlers::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "consumption_forecast=info,tower_http=info".into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    // Load configuration
    let config = AppConfig::load()?;
    tracing::info!(
        history = %config.history.path,
        horizon = config.forecast.horizon_days,
        model_source = %config.model.source,
        "Configuration loaded"
    );

    // Train (or load) the global model and build the forecast before serving
    let startup_config = config.clone();
    let (global, snapshot_model) = tokio::task::spawn_blocking(move || {
        let global = bootstrap::build_global_forecast(&startup_config)?;
        let snapshot_model = bootstrap::load_snapshot_predictor(&startup_config.snapshot);
        anyhow::Ok((global, snapshot_model))
    })
    .await??;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::new(config, global, snapshot_model);
    let app = handlers::router(state);

    // Start server
    tracing::info!("Starting consumption forecast server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
