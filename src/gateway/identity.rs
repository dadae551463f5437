//! Identity propagation to backends.
//!
//! Once a request is authenticated with a certificate, backends receive:
//!
//! - `X-SECOM-MRN`: the subject `UID` (OID 0.9.2342.19200300.100.1.1)
//! - `X-SECOM-CERT`: Base64 (standard alphabet) of the certificate DER
//!
//! The headers are returned as [`HeaderAdditions`] and applied by the proxy
//! to its outbound request; the inbound request is never mutated.

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::{debug, warn};

use crate::x509::{AttributeType, AuthenticationToken};

/// Client MRN header.
pub const X_SECOM_MRN: HeaderName = HeaderName::from_static("x-secom-mrn");
/// Client certificate header.
pub const X_SECOM_CERT: HeaderName = HeaderName::from_static("x-secom-cert");

/// Explicit set of headers to add to an outbound request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderAdditions(Vec<(HeaderName, HeaderValue)>);

impl HeaderAdditions {
    /// `true` when nothing is added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of headers to add.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Headers in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&HeaderName, &HeaderValue)> {
        self.0.iter().map(|(name, value)| (name, value))
    }

    /// Insert every header, replacing existing values of the same name.
    pub fn apply_to(&self, headers: &mut HeaderMap) {
        for (name, value) in &self.0 {
            headers.insert(name.clone(), value.clone());
        }
    }

    fn push(&mut self, name: HeaderName, value: HeaderValue) {
        self.0.push((name, value));
    }
}

/// Computes identity headers from an authentication token.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityPropagation;

impl IdentityPropagation {
    /// Headers for `token`.
    ///
    /// Empty unless the token is authenticated and certificate-backed.
    /// Values that cannot be carried in a header are skipped.
    #[must_use]
    pub fn headers_for(&self, token: Option<&AuthenticationToken>) -> HeaderAdditions {
        let mut additions = HeaderAdditions::default();
        let Some(cert) = token
            .filter(|t| t.is_authenticated())
            .and_then(AuthenticationToken::certificate)
        else {
            return additions;
        };

        match cert.subject().first(&AttributeType::UserId) {
            Some(mrn) => match HeaderValue::from_str(mrn) {
                Ok(value) => additions.push(X_SECOM_MRN, value),
                Err(e) => warn!(error = %e, "Client MRN is not a valid header value"),
            },
            None => debug!(subject = %cert.subject(), "Certificate carries no MRN"),
        }

        match HeaderValue::from_str(&STANDARD.encode(cert.der())) {
            Ok(value) => additions.push(X_SECOM_CERT, value),
            Err(e) => warn!(error = %e, "Client certificate could not be encoded"),
        }

        additions
    }

    /// Remove client-supplied copies of the identity headers.
    pub fn strip_inbound(&self, headers: &mut HeaderMap) {
        headers.remove(X_SECOM_MRN);
        headers.remove(X_SECOM_CERT);
    }
}
