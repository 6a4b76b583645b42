//! # Logging
//!
//! Tracing subscriber setup shared by every binary. `RUST_LOG` controls the
//! filter (default `connection_pooling=info`), `LOG_FORMAT` selects `json`
//! (one object per line, what CloudWatch Logs Insights parses) or `text`.

use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "connection_pooling=info";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Text,
}

impl LogFormat {
    /// Unknown values fall back to `default`
    pub fn parse_or(value: Option<&str>, default: LogFormat) -> LogFormat {
        match value.map(|v| v.trim().to_lowercase()).as_deref() {
            Some("json") => LogFormat::Json,
            Some("text") | Some("pretty") => LogFormat::Text,
            _ => default,
        }
    }
}

/// Load the env file (`.env` from the working directory or its parents when
/// `env_file` is `None`) and then install the subscriber, so `RUST_LOG` and
/// `LOG_FORMAT` set in the file take effect.
pub fn init_tracing_with_env_file(default_format: LogFormat, env_file: Option<&Path>) {
    let loaded = load_env_file(env_file);
    init_tracing(default_format);
    match loaded {
        Ok(path) => tracing::debug!(path = %path.display(), "Loaded env file"),
        Err(e) => tracing::debug!("No env file loaded: {}", e),
    }
}

fn load_env_file(env_file: Option<&Path>) -> Result<PathBuf, dotenvy::Error> {
    match env_file {
        Some(path) => dotenvy::from_path(path).map(|()| path.to_path_buf()),
        None => dotenvy::dotenv(),
    }
}

fn selected_format(default_format: LogFormat) -> LogFormat {
    LogFormat::parse_or(std::env::var("LOG_FORMAT").ok().as_deref(), default_format)
}

/// Install the global subscriber. A second call is a no-op.
pub fn init_tracing(default_format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());
    let format = selected_format(default_format);

    let result = match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_current_span(true)
            .with_env_filter(filter)
            .try_init(),
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init(),
    };
    if let Err(e) = result {
        tracing::debug!("Tracing subscriber already initialized: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_format() {
        assert_eq!(LogFormat::parse_or(Some("JSON"), LogFormat::Text), LogFormat::Json);
        assert_eq!(LogFormat::parse_or(Some("text"), LogFormat::Json), LogFormat::Text);
        assert_eq!(LogFormat::parse_or(Some("xml"), LogFormat::Json), LogFormat::Json);
        assert_eq!(LogFormat::parse_or(None, LogFormat::Text), LogFormat::Text);
    }

    #[test]
    fn test_env_file_settings_reach_format_selection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "LOG_FORMAT=json\n").unwrap();
        std::env::remove_var("LOG_FORMAT");

        assert_eq!(load_env_file(Some(&path)).unwrap(), path);
        assert_eq!(selected_format(LogFormat::Text), LogFormat::Json);
    }

    #[test]
    fn test_missing_env_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_env_file(Some(&dir.path().join("absent.env"))).is_err());
    }
}
