//! Error types for the HTTP server.

use thiserror::Error;

use crate::parser::Error as ParserError;

/// Errors that can occur during HTTP server operation.
#[derive(Debug, Error)]
pub enum Error {
    /// Error parsing an HTTP request.
    #[error("Parse error: {0}")]
    ParseError(#[from] ParserError),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// The configuration is inconsistent or could not be loaded.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A proxy target is not a usable `http://` origin.
    #[error("Invalid proxy target {target}: {reason}")]
    InvalidProxyTarget { target: String, reason: String },

    /// An exchange with a proxy upstream could not be relayed.
    #[error("Proxy error: {0}")]
    ProxyError(String),

    /// TLS credentials could not be loaded.
    #[error("TLS error: {0}")]
    TlsError(String),

    /// Port probing ran past the last valid port number.
    #[error("No free port found starting from {0}")]
    PortExhausted(u16),

    /// JSON deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}
