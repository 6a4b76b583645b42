//! # Database Credentials
//!
//! The function resolves its database credential once, at cold start, from
//! the secret named by `DB_USER_SECRET_NAME`. The secret JSON carries
//! `username`, `password`, `host`, `port` and `engine`; the host and port are
//! then replaced by the proxy endpoint from the function configuration.
//!
//! The password lives in a [`Zeroizing`] buffer and is redacted from `Debug`.

use crate::config::FunctionConfig;
use crate::observability::metrics;
use async_trait::async_trait;
use aws_sdk_secretsmanager::Client as SecretsManagerClient;
use serde::Deserialize;
use std::fmt;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info_span, Instrument};
use zeroize::Zeroizing;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("secret '{0}' was not found")]
    NotFound(String),

    #[error("secret '{0}' has no string value")]
    Empty(String),

    #[error("secret '{name}' is not valid credential JSON: {reason}")]
    Malformed { name: String, reason: String },

    #[error("failed to read secret '{name}': {message}")]
    Fetch { name: String, message: String },
}

/// A resolved database login
#[derive(Clone)]
pub struct DbCredential {
    pub username: String,
    password: Zeroizing<String>,
    pub host: String,
    pub port: u16,
    pub engine: Option<String>,
}

impl DbCredential {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        host: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            username: username.into(),
            password: Zeroizing::new(password.into()),
            host: host.into(),
            port,
            engine: None,
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// Replace host (and port when set) with the configured proxy endpoint
    #[must_use]
    pub fn with_overrides(mut self, config: &FunctionConfig) -> Self {
        self.host = config.db_host.clone();
        if let Some(port) = config.db_port {
            self.port = port;
        }
        self
    }
}

impl fmt::Debug for DbCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbCredential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("engine", &self.engine)
            .finish()
    }
}

#[derive(Deserialize)]
struct SecretDocument {
    username: String,
    password: String,
    #[serde(default)]
    host: Option<String>,
    #[serde(default, deserialize_with = "port_from_number_or_string")]
    port: Option<u16>,
    #[serde(default)]
    engine: Option<String>,
}

fn port_from_number_or_string<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u16),
        Text(String),
    }
    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Number(n)) => Ok(Some(n)),
        Some(Raw::Text(s)) => s.trim().parse().map(Some).map_err(serde::de::Error::custom),
    }
}

/// Parse a secret value; host and port fall back to the defaults when absent
pub fn parse_secret(name: &str, value: &str, default_port: u16) -> Result<DbCredential, CredentialError> {
    let doc: SecretDocument = serde_json::from_str(value).map_err(|e| CredentialError::Malformed {
        name: name.to_string(),
        // serde_json error text never includes the input
        reason: e.to_string(),
    })?;
    if doc.username.trim().is_empty() {
        return Err(CredentialError::Malformed {
            name: name.to_string(),
            reason: "username is empty".to_string(),
        });
    }
    Ok(DbCredential {
        username: doc.username,
        password: Zeroizing::new(doc.password),
        host: doc.host.unwrap_or_default(),
        port: doc.port.unwrap_or(default_port),
        engine: doc.engine,
    })
}

/// Where the function gets its database login from
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn fetch(&self, secret_name: &str) -> Result<DbCredential, CredentialError>;
}

/// Fetch the credential from the configured source and apply endpoint overrides
pub async fn resolve_credential(
    source: &dyn CredentialSource,
    config: &FunctionConfig,
) -> Result<DbCredential, CredentialError> {
    let start = Instant::now();
    let credential = source.fetch(&config.secret_name).await?;
    metrics::observe_credential_fetch_duration(start.elapsed().as_secs_f64());
    Ok(credential.with_overrides(config))
}

pub struct SecretsManagerCredentialSource {
    client: SecretsManagerClient,
    default_port: u16,
}

impl fmt::Debug for SecretsManagerCredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretsManagerCredentialSource")
            .field("default_port", &self.default_port)
            .finish_non_exhaustive()
    }
}

impl SecretsManagerCredentialSource {
    /// Client from the default credential chain (the function's execution role)
    pub async fn from_env(default_port: u16) -> Self {
        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .load()
            .await;
        Self::new(SecretsManagerClient::new(&sdk_config), default_port)
    }

    pub fn new(client: SecretsManagerClient, default_port: u16) -> Self {
        Self {
            client,
            default_port,
        }
    }
}

#[async_trait]
impl CredentialSource for SecretsManagerCredentialSource {
    async fn fetch(&self, secret_name: &str) -> Result<DbCredential, CredentialError> {
        let span = info_span!("secretsmanager.get", secret.name = secret_name);

        async move {
            let response = self
                .client
                .get_secret_value()
                .secret_id(secret_name)
                .send()
                .await
                .map_err(|e| {
                    let not_found = e
                        .as_service_error()
                        .is_some_and(|se| se.is_resource_not_found_exception());
                    if not_found {
                        CredentialError::NotFound(secret_name.to_string())
                    } else {
                        CredentialError::Fetch {
                            name: secret_name.to_string(),
                            message: e
                                .as_service_error()
                                .map_or_else(|| e.to_string(), ToString::to_string),
                        }
                    }
                })?;

            let value = response
                .secret_string()
                .ok_or_else(|| CredentialError::Empty(secret_name.to_string()))?;
            let credential = parse_secret(secret_name, value, self.default_port)?;
            debug!(username = %credential.username, "Fetched database credential");
            Ok(credential)
        }
        .instrument(span)
        .await
    }
}

/// Fixed credential, for local runs and tests
#[derive(Debug, Clone)]
pub struct StaticCredentialSource {
    credential: DbCredential,
}

impl StaticCredentialSource {
    pub fn new(credential: DbCredential) -> Self {
        Self { credential }
    }
}

#[async_trait]
impl CredentialSource for StaticCredentialSource {
    async fn fetch(&self, _secret_name: &str) -> Result<DbCredential, CredentialError> {
        Ok(self.credential.clone())
    }
}
