//! HeartGuard wearable - ECG classification on the patient's device
//!
//! Reads the biosignal in fixed windows, classifies each window, publishes
//! the resulting status to the shared store and serves health, metrics and
//! the latest reading over HTTP.

use anyhow::{Context, Result};
use guard_lib::{
    classifier::OnnxClassifier,
    clinical::ClinicalMapper,
    health::{components, HealthRegistry},
    observability::{MonitorMetrics, StructuredLogger},
    session::{MonitoringSession, SessionConfig},
    signal::{SignalSource, WindowDriver},
    sync::{HttpStatusStore, PublisherConfig, StatusPublisher, ADVISORY_DISPLAY_CHARS},
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const WEARABLE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting heartguard-wearable");

    let config_file = std::env::var("HEARTGUARD_CONFIG").ok();
    let config = config::WearableConfig::load(config_file.as_deref())?;
    info!(
        device_id = %config.device_id,
        patient = %config.patient_name,
        region = %config.region,
        store_url = %config.store_url,
        "Wearable configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::CLASSIFIER).await;
    health_registry.register(components::PUBLISHER).await;

    let metrics = MonitorMetrics::new();

    let logger = StructuredLogger::new(&config.device_id);
    logger.log_startup(WEARABLE_VERSION, "wearable");

    let source = SignalSource::from_path(&config.samples_path)
        .with_context(|| format!("Failed to load samples from {}", config.samples_path))?;
    info!(samples = source.len(), "Signal source loaded");

    let store = Arc::new(
        HttpStatusStore::new(&config.store_url, config.publish_timeout())
            .context("Failed to create status store client")?,
    );
    let profile = config.patient_profile();
    let publisher = StatusPublisher::new(
        store,
        profile.clone(),
        PublisherConfig {
            timeout: config.publish_timeout(),
            advisory_chars: ADVISORY_DISPLAY_CHARS,
        },
    );

    let (session, updates) = MonitoringSession::new(
        WindowDriver::new(source, config.window_size),
        ClinicalMapper::new(profile.region),
        publisher,
        SessionConfig {
            beat_interval: config.beat_interval(),
        },
        logger.clone(),
    );
    let session = session.with_health(health_registry.clone());

    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        metrics.clone(),
        updates,
    ));

    health_registry.set_ready(true).await;

    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
    let model_path = config.model_path.clone();
    let window_size = config.window_size;
    let session_handle = tokio::spawn(session.run(
        move || OnnxClassifier::from_path(&model_path, window_size),
        shutdown_rx,
    ));

    // The API keeps serving the terminal status after the session ends
    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    let _ = shutdown_tx.send(());

    match session_handle.await {
        Ok(Ok(summary)) => info!(
            windows = summary.windows,
            publish_failures = summary.publish_failures,
            "Session summary"
        ),
        Ok(Err(e)) => error!(error = %e, "Session ended with a fatal error"),
        Err(e) => error!(error = %e, "Session task panicked"),
    }

    api_handle.abort();
    info!("Shutting down");

    Ok(())
}
