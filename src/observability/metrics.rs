//! # Metrics
//!
//! Prometheus metrics for provisioning runs and the database-ping function.
//!
//! ## Metrics Exposed
//!
//! - `connection_pooling_provision_operations_total` - Resource operations by kind and operation
//! - `connection_pooling_provision_errors_total` - Failed resource operations by kind and operation
//! - `connection_pooling_provision_retries_total` - Retries after transient failures
//! - `connection_pooling_provision_duration_seconds` - Duration of whole apply/destroy runs
//! - `connection_pooling_resources_managed` - Resources currently created by the engine
//! - `connection_pooling_pings_total` - Pings by outcome state
//! - `connection_pooling_ping_duration_seconds` - Database round-trip latency
//! - `connection_pooling_pings_throttled_total` - Requests rejected while a ping was in flight
//! - `connection_pooling_credential_fetch_duration_seconds` - Secret retrieval latency

use anyhow::Result;
use prometheus::{Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static PROVISION_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "connection_pooling_provision_operations_total",
            "Total number of resource operations performed by the provisioning engine",
        ),
        &["kind", "operation"],
    )
    .expect("Failed to create PROVISION_OPERATIONS_TOTAL metric - this should never happen")
});

static PROVISION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "connection_pooling_provision_errors_total",
            "Total number of failed resource operations",
        ),
        &["kind", "operation"],
    )
    .expect("Failed to create PROVISION_ERRORS_TOTAL metric - this should never happen")
});

static PROVISION_RETRIES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "connection_pooling_provision_retries_total",
        "Total number of retries after transient provisioning failures",
    )
    .expect("Failed to create PROVISION_RETRIES_TOTAL metric - this should never happen")
});

static PROVISION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "connection_pooling_provision_duration_seconds",
            "Duration of apply and destroy runs in seconds",
        )
        .buckets(vec![1.0, 10.0, 60.0, 300.0, 600.0, 1200.0, 1800.0, 3600.0]),
        &["operation"],
    )
    .expect("Failed to create PROVISION_DURATION metric - this should never happen")
});

static RESOURCES_MANAGED: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "connection_pooling_resources_managed",
        "Current number of resources created by the provisioning engine",
    )
    .expect("Failed to create RESOURCES_MANAGED metric - this should never happen")
});

static PINGS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "connection_pooling_pings_total",
            "Total number of database pings by outcome",
        ),
        &["state"],
    )
    .expect("Failed to create PINGS_TOTAL metric - this should never happen")
});

static PING_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "connection_pooling_ping_duration_seconds",
            "Database round-trip latency through the proxy in seconds",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
    )
    .expect("Failed to create PING_DURATION metric - this should never happen")
});

static PINGS_THROTTLED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "connection_pooling_pings_throttled_total",
        "Total number of requests rejected because a ping was already in flight",
    )
    .expect("Failed to create PINGS_THROTTLED_TOTAL metric - this should never happen")
});

static CREDENTIAL_FETCH_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "connection_pooling_credential_fetch_duration_seconds",
            "Duration of credential retrieval from the secret store in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
    )
    .expect("Failed to create CREDENTIAL_FETCH_DURATION metric - this should never happen")
});

fn register(collector: Box<dyn prometheus::core::Collector>) -> Result<()> {
    match REGISTRY.register(collector) {
        Ok(()) | Err(prometheus::Error::AlreadyReg) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Register every metric with [`REGISTRY`]; safe to call more than once
pub fn register_metrics() -> Result<()> {
    register(Box::new(PROVISION_OPERATIONS_TOTAL.clone()))?;
    register(Box::new(PROVISION_ERRORS_TOTAL.clone()))?;
    register(Box::new(PROVISION_RETRIES_TOTAL.clone()))?;
    register(Box::new(PROVISION_DURATION.clone()))?;
    register(Box::new(RESOURCES_MANAGED.clone()))?;
    register(Box::new(PINGS_TOTAL.clone()))?;
    register(Box::new(PING_DURATION.clone()))?;
    register(Box::new(PINGS_THROTTLED_TOTAL.clone()))?;
    register(Box::new(CREDENTIAL_FETCH_DURATION.clone()))?;
    Ok(())
}

/// Prometheus text exposition of every registered metric
pub fn encode() -> Result<Vec<u8>> {
    use prometheus::Encoder;
    let mut buffer = Vec::new();
    prometheus::TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(buffer)
}

pub fn record_provision_operation(kind: &str, operation: &str) {
    PROVISION_OPERATIONS_TOTAL
        .with_label_values(&[kind, operation])
        .inc();
}

pub fn record_provision_error(kind: &str, operation: &str) {
    PROVISION_ERRORS_TOTAL
        .with_label_values(&[kind, operation])
        .inc();
}

pub fn increment_provision_retries() {
    PROVISION_RETRIES_TOTAL.inc();
}

pub fn observe_provision_duration(operation: &str, duration: f64) {
    PROVISION_DURATION
        .with_label_values(&[operation])
        .observe(duration);
}

pub fn set_resources_managed(count: usize) {
    RESOURCES_MANAGED.set(i64::try_from(count).unwrap_or(i64::MAX));
}

pub fn record_ping(state: &str, duration: f64) {
    PINGS_TOTAL.with_label_values(&[state]).inc();
    PING_DURATION.observe(duration);
}

pub fn increment_pings_throttled() {
    PINGS_THROTTLED_TOTAL.inc();
}

pub fn observe_credential_fetch_duration(duration: f64) {
    CREDENTIAL_FETCH_DURATION.observe(duration);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_is_idempotent() {
        register_metrics().unwrap();
        register_metrics().unwrap();
        increment_pings_throttled();
        let text = String::from_utf8(encode().unwrap()).unwrap();
        assert!(text.contains("connection_pooling_pings_throttled_total"));
    }
}
