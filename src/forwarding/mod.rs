//! Forwarded client identities.
//!
//! When a TLS-terminating proxy (nginx, HAProxy) sits in front of the gateway,
//! the original client certificate arrives in headers instead of the TLS
//! session.  [`ForwardingGuard`] decides whether those headers may be trusted.
//!
//! | Header | Meaning |
//! |--------|---------|
//! | `X-SSL-Forwarded` | request passed through upstream TLS termination |
//! | `X-SSL-Verify` | upstream verification result, must be `SUCCESS` |
//! | `X-SSL-CERT` | URL-encoded PEM client certificate |
//! | `X-SSL-SDN` | subject DN of the client certificate |
//! | `X-Forwarded-For` | forwarding indicator (simplified mode only) |

mod guard;

use axum::http::HeaderMap;

pub use guard::{ForwardedIdentity, ForwardingGuard, GuardOutcome, RejectReason, SubjectSource};

/// Upstream verification result.
pub const X_SSL_VERIFY: &str = "x-ssl-verify";
/// URL-encoded PEM client certificate.
pub const X_SSL_CERT: &str = "x-ssl-cert";
/// Client certificate subject DN.
pub const X_SSL_SDN: &str = "x-ssl-sdn";
/// Forwarding marker.
pub const X_SSL_FORWARDED: &str = "x-ssl-forwarded";
/// Standard forwarding chain header.
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// `X-SSL-Verify` value for a verified client.
pub const VERIFY_SUCCESS: &str = "SUCCESS";

/// Headers consumed at the edge and never forwarded to backends.
pub const CONSUMED_HEADERS: [&str; 4] = [X_SSL_VERIFY, X_SSL_CERT, X_SSL_SDN, X_SSL_FORWARDED];

/// Trimmed, non-blank UTF-8 value of the first `name` header.
pub(crate) fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
