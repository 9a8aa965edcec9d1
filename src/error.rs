//! Unified error type.

use std::path::PathBuf;

/// The error type returned by tyrion's fallible operations.
///
/// Everything here is a startup or transport failure. Per-request problems
/// (unknown route, bad body, failed serialisation) never surface as `Error`:
/// they are logged and answered with an HTTP status on that request alone.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid bind address `{0}`")]
    InvalidAddr(String),

    /// TLS certificate and key must be configured together.
    #[error("invalid tls config: {0}")]
    InvalidTls(&'static str),

    #[error("tls: {0}")]
    Tls(#[from] tokio_rustls::rustls::Error),

    #[error("config `{path}`: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("config field `{field}` has invalid value `{value}`")]
    ConfigValue { field: &'static str, value: String },

    #[error("access log: {0}")]
    AccessLog(#[from] tracing_appender::rolling::InitError),
}
