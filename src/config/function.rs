//! # Function Runtime Configuration
//!
//! Settings of the database-ping function, read once at startup. The stack
//! injects `DB_USER_SECRET_NAME` and `DB_HOST`; both are required and their
//! absence is a startup error rather than a per-request one.

use super::{non_empty, process_env, var_or_default_bool, ConfigError};
use crate::constants::*;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionConfig {
    /// Name of the credential secret (never its value)
    pub secret_name: String,
    /// Proxy endpoint; overrides the host stored in the secret
    pub db_host: String,
    /// Overrides the port stored in the secret
    pub db_port: Option<u16>,
    /// CA bundle for verifying the proxy certificate; system roots when unset
    pub ca_bundle: Option<PathBuf>,
    pub connect_timeout_secs: u64,
    /// Port the HTTP server listens on
    pub port: u16,
    pub log_stream_name: String,
    /// Allow at most one ping in flight, rejecting the rest
    pub enforce_single_flight: bool,
}

impl FunctionConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(process_env)
    }

    /// Build from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let secret_name = non_empty(&lookup, ENV_DB_USER_SECRET_NAME)
            .ok_or(ConfigError::MissingEnv(ENV_DB_USER_SECRET_NAME))?;
        let db_host =
            non_empty(&lookup, ENV_DB_HOST).ok_or(ConfigError::MissingEnv(ENV_DB_HOST))?;

        let db_port = match non_empty(&lookup, "DB_PORT") {
            Some(raw) => Some(raw.trim().parse::<u16>().map_err(|e| {
                ConfigError::invalid("DB_PORT", format!("'{raw}' is not a port: {e}"))
            })?),
            None => None,
        };

        let connect_timeout_secs = match non_empty(&lookup, "DB_CONNECT_TIMEOUT_SECS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(0) => {
                    return Err(ConfigError::invalid(
                        "DB_CONNECT_TIMEOUT_SECS",
                        "must be at least 1 second",
                    ))
                }
                Ok(secs) => secs,
                Err(e) => {
                    return Err(ConfigError::invalid(
                        "DB_CONNECT_TIMEOUT_SECS",
                        format!("'{raw}' is not a number of seconds: {e}"),
                    ))
                }
            },
            None => DEFAULT_DB_CONNECT_TIMEOUT_SECS,
        };

        let port = non_empty(&lookup, "AWS_LWA_PORT")
            .or_else(|| non_empty(&lookup, "PORT"))
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(DEFAULT_FUNCTION_PORT);

        Ok(Self {
            secret_name,
            db_host,
            db_port,
            ca_bundle: non_empty(&lookup, "DB_CA_BUNDLE").map(PathBuf::from),
            connect_timeout_secs,
            port,
            log_stream_name: non_empty(&lookup, "AWS_LAMBDA_LOG_STREAM_NAME")
                .unwrap_or_else(|| LOCAL_LOG_STREAM_NAME.to_string()),
            enforce_single_flight: var_or_default_bool(&lookup, "ENFORCE_SINGLE_FLIGHT", true),
        })
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<&str, &str> = vars.iter().copied().collect();
        move |k| vars.get(k).map(|v| (*v).to_string())
    }

    #[test]
    fn test_required_variables() {
        let err = FunctionConfig::from_lookup(lookup(&[("DB_HOST", "proxy.local")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnv("DB_USER_SECRET_NAME")));

        let err = FunctionConfig::from_lookup(lookup(&[("DB_USER_SECRET_NAME", "db/creds")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnv("DB_HOST")));

        // blank counts as missing
        let err = FunctionConfig::from_lookup(lookup(&[
            ("DB_USER_SECRET_NAME", "db/creds"),
            ("DB_HOST", "  "),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnv("DB_HOST")));
    }

    #[test]
    fn test_defaults() {
        let config = FunctionConfig::from_lookup(lookup(&[
            ("DB_USER_SECRET_NAME", "db/creds"),
            ("DB_HOST", "proxy.local"),
        ]))
        .unwrap();
        assert_eq!(config.db_port, None);
        assert_eq!(config.port, 8080);
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.log_stream_name, "local");
        assert!(config.enforce_single_flight);
    }

    #[test]
    fn test_overrides() {
        let config = FunctionConfig::from_lookup(lookup(&[
            ("DB_USER_SECRET_NAME", "db/creds"),
            ("DB_HOST", "proxy.local"),
            ("DB_PORT", "3307"),
            ("AWS_LWA_PORT", "9000"),
            ("PORT", "7000"),
            ("AWS_LAMBDA_LOG_STREAM_NAME", "2024/01/01/[$LATEST]abc"),
        ]))
        .unwrap();
        assert_eq!(config.db_port, Some(3307));
        assert_eq!(config.port, 9000);
        assert_eq!(config.log_stream_name, "2024/01/01/[$LATEST]abc");
    }

    #[test]
    fn test_invalid_port_is_an_error() {
        let err = FunctionConfig::from_lookup(lookup(&[
            ("DB_USER_SECRET_NAME", "db/creds"),
            ("DB_HOST", "proxy.local"),
            ("DB_PORT", "mysql"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field, .. } if field == "DB_PORT"));
    }

    #[test]
    fn test_connect_timeout_must_be_positive() {
        for raw in ["0", "soon"] {
            let err = FunctionConfig::from_lookup(lookup(&[
                ("DB_USER_SECRET_NAME", "db/creds"),
                ("DB_HOST", "proxy.local"),
                ("DB_CONNECT_TIMEOUT_SECS", raw),
            ]))
            .unwrap_err();
            assert!(
                matches!(&err, ConfigError::Invalid { field, .. } if field == "DB_CONNECT_TIMEOUT_SECS"),
                "{raw}: {err}"
            );
        }

        let config = FunctionConfig::from_lookup(lookup(&[
            ("DB_USER_SECRET_NAME", "db/creds"),
            ("DB_HOST", "proxy.local"),
            ("DB_CONNECT_TIMEOUT_SECS", "12"),
        ]))
        .unwrap();
        assert_eq!(config.connect_timeout(), Duration::from_secs(12));
    }
}
