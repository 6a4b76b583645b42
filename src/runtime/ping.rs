//! Database round-trip through the proxy.

use super::credentials::DbCredential;
use crate::config::FunctionConfig;
use crate::constants::PING_QUERY;
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlSslMode};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum PingError {
    #[error("database connection failed: {0}")]
    Connect(String),

    #[error("ping query failed: {0}")]
    Query(String),

    #[error("ping query returned {0}, expected 5")]
    UnexpectedResult(i64),

    #[error("ping timed out after {0:?}")]
    Timeout(Duration),
}

/// Runs a trivial query against the database
#[async_trait]
pub trait DatabasePinger: Send + Sync {
    /// Round-trip latency of one successful query
    async fn ping(&self) -> Result<Duration, PingError>;
}

/// MySQL through the proxy, one pooled connection per function instance, TLS required
#[derive(Debug, Clone)]
pub struct MySqlPinger {
    pool: MySqlPool,
    timeout: Duration,
}

impl MySqlPinger {
    /// Build a lazy pool; the first connection is opened by the first ping
    pub fn new(credential: &DbCredential, config: &FunctionConfig) -> Self {
        let mut options = MySqlConnectOptions::new()
            .host(&credential.host)
            .port(credential.port)
            .username(&credential.username)
            .password(credential.password())
            .ssl_mode(MySqlSslMode::VerifyIdentity);
        if let Some(ca) = &config.ca_bundle {
            options = options.ssl_ca(ca);
        }

        let pool = MySqlPoolOptions::new()
            .max_connections(1)
            .min_connections(0)
            .acquire_timeout(config.connect_timeout())
            .connect_lazy_with(options);

        Self {
            pool,
            timeout: config.connect_timeout(),
        }
    }
}

#[async_trait]
impl DatabasePinger for MySqlPinger {
    async fn ping(&self) -> Result<Duration, PingError> {
        let start = Instant::now();
        let query = sqlx::query_scalar::<_, i64>(PING_QUERY).fetch_one(&self.pool);
        let value = tokio::time::timeout(self.timeout, query)
            .await
            .map_err(|_elapsed| PingError::Timeout(self.timeout))?
            .map_err(|e| match e {
                sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
                    PingError::Connect(e.to_string())
                }
                other => PingError::Query(other.to_string()),
            })?;
        if value != 5 {
            return Err(PingError::UnexpectedResult(value));
        }
        let latency = start.elapsed();
        debug!(latency_ms = latency.as_millis() as u64, "Ping succeeded");
        Ok(latency)
    }
}
