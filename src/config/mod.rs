//! # Configuration
//!
//! - `stack.rs` - Deployment description loaded from YAML, with env overrides
//! - `function.rs` - Runtime settings of the database-ping function, from env
//!
//! Nothing reads the process environment implicitly: both configs are built
//! once and passed explicitly to the code that needs them.

mod function;
mod stack;

pub use function::FunctionConfig;
pub use stack::{
    ComputeConfig, DatabaseConfig, GatewayConfig, NetworkConfig, ProvisioningConfig, ProxyConfig,
    StackConfig,
};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid configuration '{field}': {reason}")]
    Invalid { field: String, reason: String },

    #[error("required environment variable {0} is not set")]
    MissingEnv(&'static str),
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Read a variable as a boolean (`true`/`1`/`yes`/`on`)
fn var_or_default_bool(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    lookup(key)
        .map(|v| {
            let v = v.to_lowercase();
            v == "true" || v == "1" || v == "yes" || v == "on"
        })
        .unwrap_or(default)
}

/// Non-empty variable or `None`
fn non_empty(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key).filter(|v| !v.trim().is_empty())
}

pub(crate) fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}
