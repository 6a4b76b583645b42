//! # Observability
//!
//! - `logging`: tracing subscriber setup (json or text)
//! - `metrics`: Prometheus metrics for provisioning and the ping function

pub mod logging;
pub mod metrics;

pub use logging::{init_tracing, init_tracing_with_env_file};
pub use metrics::register_metrics;
