//! Error types for the API Gateway

use std::io;

use thiserror::Error;

/// Result type alias for the API Gateway
pub type Result<T> = std::result::Result<T, Error>;

/// API Gateway errors
///
/// Only startup and transport paths return these.  The trust pipeline turns
/// every certificate or distinguished-name failure into a deny decision
/// before it can leave the pipeline.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Certificate could not be decoded or parsed
    #[error("Certificate error: {0}")]
    Certificate(String),

    /// Distinguished name could not be parsed
    #[error("Invalid distinguished name: {0}")]
    DistinguishedName(String),

    /// TLS setup error
    #[error("TLS error: {0}")]
    Tls(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
