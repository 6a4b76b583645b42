//! Common test utilities for the integration tests
//!
//! Builds the default stack from an in-memory function package and sets up
//! an in-memory provisioner with instant retries.

#![allow(dead_code, reason = "each test binary uses a subset of the helpers")]

use connection_pooling::prelude::*;
use connection_pooling::provision::FailureMode;
use std::sync::Once;
use std::time::Duration;

static TRACING_INIT: Once = Once::new();

/// Route logs through the test writer so `cargo test -- --nocapture` shows them
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

pub fn code() -> CodeAsset {
    CodeAsset::from_bytes("bootstrap.zip", b"database-ping function package")
}

pub fn default_stack() -> Stack {
    stack_from(&StackConfig::default())
}

pub fn stack_from(config: &StackConfig) -> Stack {
    ConnectionPoolingStack::new(config, code())
        .build()
        .expect("default configuration should build")
}

pub fn id(name: &str) -> ResourceId {
    ResourceId::new(name).expect("test ids are valid")
}

/// Retries without sleeping
pub fn fast_options() -> ProvisionerOptions {
    ProvisionerOptions {
        max_attempts: 4,
        backoff_start: Duration::from_millis(1),
        backoff_max: Duration::from_millis(1),
        region: "eu-west-1".to_string(),
    }
}

pub fn simulator(stack: &Stack) -> Provisioner<InMemoryProvisioner> {
    Provisioner::new(
        InMemoryProvisioner::new(stack.name(), "eu-west-1"),
        fast_options(),
    )
}

pub fn failing_simulator(
    stack: &Stack,
    failures: &[(&str, FailureMode)],
) -> Provisioner<InMemoryProvisioner> {
    let backend = failures
        .iter()
        .fold(InMemoryProvisioner::new(stack.name(), "eu-west-1"), |p, (name, mode)| {
            p.with_failure(&id(name), mode.clone())
        });
    Provisioner::new(backend, fast_options())
}
