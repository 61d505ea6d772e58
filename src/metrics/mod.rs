//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Transaction submissions and failures per path
//! - Batch sizes
//! - Reward queries and health checks

use crate::error::{GatewayError, GatewayResult};

use axum::{http::StatusCode, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};
use std::net::SocketAddr;
use tracing::info;

lazy_static! {
    // Transaction metrics
    pub static ref TX_SUBMITTED: CounterVec = register_counter_vec!(
        "ppn_gateway_transactions_submitted_total",
        "Total transactions accepted by the pool",
        &["path"]
    ).unwrap();

    pub static ref TX_FAILED: CounterVec = register_counter_vec!(
        "ppn_gateway_transactions_failed_total",
        "Total transactions rejected, by failure kind",
        &["path", "reason"]
    ).unwrap();

    pub static ref BATCH_SIZE: HistogramVec = register_histogram_vec!(
        "ppn_gateway_batch_size",
        "Number of transactions per batch request",
        &["path"],
        vec![1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0]
    ).unwrap();

    // Reward metrics
    pub static ref REWARDS_REQUESTS: CounterVec = register_counter_vec!(
        "ppn_gateway_rewards_requests_total",
        "Total reward aggregation requests",
        &[]
    ).unwrap();

    // Health metrics
    pub static ref HEALTH_CHECK_SUCCESS: CounterVec = register_counter_vec!(
        "ppn_gateway_health_check_success_total",
        "Total successful node health checks",
        &[]
    ).unwrap();

    pub static ref HEALTH_CHECK_FAILURE: CounterVec = register_counter_vec!(
        "ppn_gateway_health_check_failure_total",
        "Total failed node health checks",
        &[]
    ).unwrap();
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub async fn run(&self) -> GatewayResult<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}

async fn metrics_handler() -> Result<String, (StatusCode, String)> {
    gather().map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

/// Render all registered metrics in the Prometheus text format
pub fn gather() -> GatewayResult<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| GatewayError::Internal(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| GatewayError::Internal(e.to_string()))
}

// Helper functions to record metrics

pub fn record_tx_submitted(path: &str) {
    TX_SUBMITTED.with_label_values(&[path]).inc();
}

pub fn record_tx_failed(path: &str, reason: &str) {
    TX_FAILED.with_label_values(&[path, reason]).inc();
}

pub fn record_batch_size(path: &str, size: usize) {
    BATCH_SIZE.with_label_values(&[path]).observe(size as f64);
}

pub fn record_rewards_request() {
    REWARDS_REQUESTS.with_label_values(&[]).inc();
}

pub fn record_health_check() {
    HEALTH_CHECK_SUCCESS.with_label_values(&[]).inc();
}

pub fn record_health_check_failure() {
    HEALTH_CHECK_FAILURE.with_label_values(&[]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_includes_recorded_metrics() {
        record_tx_submitted("test");
        record_tx_failed("test", "decode");
        record_batch_size("test", 3);

        let text = gather().unwrap();
        assert!(text.contains("ppn_gateway_transactions_submitted_total"));
        assert!(text.contains("reason=\"decode\""));
        assert!(text.contains("ppn_gateway_batch_size"));
    }
}
