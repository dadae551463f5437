//! API Gateway Library
//!
//! Edge-trust layer for a reverse-proxy gateway in front of SECOM-style
//! services.
//!
//! # Features
//!
//! - **Forwarded X.509 identities**: trust client certificates forwarded by a
//!   TLS-terminating proxy (`X-SSL-CERT`, `X-SSL-SDN`, `X-SSL-Verify`) only
//!   from allowed hosts, fail-closed
//! - **Direct mTLS**: client certificates from the gateway's own TLS listener
//! - **Organisation policy**: subject `O` must start with the configured MRN
//! - **Identity propagation**: `X-SECOM-MRN` / `X-SECOM-CERT` for backends
//! - **Prefix stripping**: per-route path rewriting with context path
//!
//! # Request flow
//!
//! ```text
//! request → ForwardingGuard → AuthenticationConverter → X509AuthenticationManager
//!         → IdentityPropagation → StripContextAndPrefix → backend
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod forwarding;
pub mod gateway;
pub mod x509;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
///
/// `RUST_LOG` takes precedence over `level`.
///
/// # Errors
///
/// Returns `Error::Internal` if a global subscriber is already installed.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    let installed = match format {
        Some("json") => subscriber.with(fmt::layer().json()).try_init(),
        _ => subscriber.with(fmt::layer()).try_init(),
    };

    installed.map_err(|e| Error::Internal(format!("Failed to install tracing subscriber: {e}")))
}
