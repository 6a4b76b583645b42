//! # Function Runtime
//!
//! The database-ping function: resolve the credential at cold start, keep one
//! pooled connection through the proxy, answer `GET /` with a ping result.
//!
//! - `credentials.rs` - [`CredentialSource`] and the Secrets Manager implementation
//! - `ping.rs` - [`DatabasePinger`] and the MySQL implementation
//! - `handler.rs` - axum router, single-flight admission and probes

pub mod credentials;
pub mod handler;
pub mod ping;

pub use credentials::{
    parse_secret, resolve_credential, CredentialError, CredentialSource, DbCredential,
    SecretsManagerCredentialSource, StaticCredentialSource,
};
pub use handler::{router, start_server, AppState, PingResponse, PingState};
pub use ping::{DatabasePinger, MySqlPinger, PingError};
