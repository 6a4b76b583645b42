//! # Database Ping Function
//!
//! HTTP server run inside the function (behind the Lambda Web Adapter) or
//! locally. At cold start it reads its configuration from the environment,
//! resolves the database credential from Secrets Manager and builds the
//! pooled connection through the proxy; only then does it report ready.

use anyhow::{Context, Result};
use connection_pooling::config::FunctionConfig;
use connection_pooling::constants::{DEFAULT_DATABASE_PORT, SERVICE_NAME};
use connection_pooling::observability::{self, logging::LogFormat};
use connection_pooling::runtime::{
    resolve_credential, start_server, AppState, MySqlPinger, SecretsManagerCredentialSource,
};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // rustls needs a process-wide provider before any TLS client is built
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        anyhow::bail!("Failed to install rustls crypto provider");
    }

    observability::init_tracing_with_env_file(LogFormat::Json, None);

    info!(
        service = SERVICE_NAME,
        build_time = env!("BUILD_DATETIME"),
        git_hash = env!("BUILD_GIT_HASH"),
        "Starting database-ping function"
    );

    observability::register_metrics().context("Failed to register metrics")?;

    let config = FunctionConfig::from_env().map_err(|e| {
        error!("Invalid function configuration: {}", e);
        e
    })?;

    let source = SecretsManagerCredentialSource::from_env(DEFAULT_DATABASE_PORT).await;
    let credential = resolve_credential(&source, &config)
        .await
        .with_context(|| format!("Failed to resolve credential '{}'", config.secret_name))?;
    info!(
        host = %credential.host,
        port = credential.port,
        username = %credential.username,
        "Resolved database credential"
    );

    let pinger = MySqlPinger::new(&credential, &config);
    drop(credential);

    let state = Arc::new(AppState::new(
        Arc::new(pinger),
        config.log_stream_name.clone(),
        config.enforce_single_flight,
    ));
    state.set_ready(true);

    start_server(config.port, state).await
}
