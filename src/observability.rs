//! Observability module for centralized metrics, tracing, and logging setup.
//!
//! This module provides:
//! - Structured logging with configurable levels and formats
//! - Metrics collection with an optional Prometheus recorder
//! - Span and metric helpers for the preprocessing pipeline

use anyhow::Result;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::prelude::*;

use crate::observability_config::{LogFormat, ObservabilityConfig};

/// Initialize logging and metrics from environment variables
pub fn init_observability() -> Result<Option<PrometheusHandle>> {
    let config = ObservabilityConfig::from_env();
    init_observability_with_config(&config)
}

/// Initialize logging and, when enabled, the Prometheus metrics recorder
///
/// Returns the recorder handle so the caller can render a snapshot.
pub fn init_observability_with_config(
    config: &ObservabilityConfig,
) -> Result<Option<PrometheusHandle>> {
    // Validate configuration
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid observability configuration: {}", e))?;

    // Initialize tracing first
    init_tracing_with_config(config)?;

    let metrics_handle = if config.enable_metrics {
        Some(init_metrics()?)
    } else {
        None
    };

    tracing::info!(
        environment = %config.environment,
        metrics_enabled = %config.enable_metrics,
        "Observability stack initialized successfully"
    );
    Ok(metrics_handle)
}

/// Initialize structured logging with tracing and configuration
fn init_tracing_with_config(config: &ObservabilityConfig) -> Result<()> {
    // RUST_LOG wins; otherwise the configured level applies to this crate
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().or_else(|_| {
        tracing_subscriber::EnvFilter::try_new(format!(
            "adaptive_binarization={},image_preprocessing={},warn",
            config.log_level, config.log_level
        ))
    })?;

    match config.effective_log_format() {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_thread_names(false),
            )
            .try_init()?,
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .try_init()?,
    }

    tracing::info!(
        environment = %config.environment,
        log_level = %config.log_level,
        "Tracing initialized with structured logging"
    );
    Ok(())
}

/// Initialize metrics collection with Prometheus exporter
fn init_metrics() -> Result<PrometheusHandle> {
    let builder = PrometheusBuilder::new();
    let handle = builder.install_recorder()?;

    tracing::info!("Metrics collection initialized");
    Ok(handle)
}

/// Create a span for a preprocessing stage
pub fn preprocessing_span(operation: &str, width: u32, height: u32) -> tracing::Span {
    tracing::info_span!(
        "preprocessing_operation",
        operation = operation,
        width = width,
        height = height,
        component = "preprocessing"
    )
}

/// Create a span for image file operations
pub fn io_span(operation: &str, path: &str) -> tracing::Span {
    tracing::info_span!("io_operation", operation = operation, path = path, component = "image_io")
}

/// Record preprocessing operation metrics
pub fn record_preprocessing_metrics(operation: &str, duration: std::time::Duration, pixels: usize) {
    let operation = operation.to_string();
    metrics::counter!("preprocessing_operations_total", "operation" => operation.clone())
        .increment(1);
    metrics::histogram!("preprocessing_duration_seconds", "operation" => operation)
        .record(duration.as_secs_f64());
    metrics::histogram!("preprocessing_pixels").record(pixels as f64);
}

/// Record image file operation metrics
pub fn record_io_metrics(operation: &str, success: bool, bytes: u64) {
    let operation = operation.to_string();
    metrics::counter!(
        "image_io_operations_total",
        "operation" => operation,
        "result" => if success { "success" } else { "failure" }
    )
    .increment(1);
    if success {
        metrics::histogram!("image_io_bytes").record(bytes as f64);
    }
}
