//! Fraud Scoring Service - Main Entry Point
//!
//! Answers scoring, health, metrics and model-management requests over NATS.

use anyhow::Result;
use fraud_scoring_service::{
    config::AppConfig, metrics::MetricsReporter, service::ScoringService, transport::RequestServer,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("fraud_scoring_service={}", config.logging.level)))?;

    if config.logging.format == "pretty" {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = AppConfig::load()?;
    init_logging(&config)?;

    info!("Starting Fraud Scoring Service v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Fusion weights: model={:.2}, rules={:.2}; thresholds: decline>={:.2}, review>={:.2}",
        config.scoring.model_weight,
        config.scoring.rule_weight,
        config.scoring.thresholds.decline,
        config.scoring.thresholds.review
    );

    let service = Arc::new(ScoringService::from_config(&config)?);
    info!(model_path = %config.model.path, "Scoring service initialized");

    // Warm the estimator; a missing artifact is reported per request, not fatal
    let health = service.health().await;
    if health.model_loaded {
        info!("Estimator loaded");
    } else {
        warn!(model_path = %config.model.path, "Estimator unavailable, serving degraded");
    }

    // Connect to NATS
    let client = async_nats::connect(&config.nats.url).await?;
    info!("Connected to NATS at {}", config.nats.url);

    // Start metrics reporter
    let reporter = MetricsReporter::new(
        service.metrics_collector().clone(),
        config.metrics.report_interval_secs,
    );
    tokio::spawn(reporter.start());

    info!(
        "Starting request loop with {} parallel workers on {}",
        config.pipeline.workers, config.nats.score_subject
    );
    let server = RequestServer::new(
        client,
        config.nats.clone(),
        service.clone(),
        config.pipeline.workers,
    );

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutdown signal received"),
    }

    // Print final summary
    info!("Service shutting down...");
    service.metrics_collector().print_summary();

    Ok(())
}
