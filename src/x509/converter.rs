//! Candidate token extraction.
//!
//! The converter never decides trust; it only turns whatever identity material
//! the request carries into an unauthenticated [`AuthenticationToken`].  Every
//! failure becomes `None` so the request can fall through to the next
//! mechanism.

use std::sync::Arc;

use axum::http::HeaderMap;
use tracing::{debug, warn};

use crate::forwarding::{ForwardedIdentity, X_SSL_CERT, X_SSL_SDN, header_str};
use crate::x509::certificate::{CertificateParser, ClientCertificate, PeerCertificates};
use crate::x509::token::{AuthenticationToken, Credentials};

/// Principal used when only a forwarded subject DN is available.
pub const FORWARDED_SERVICE_PRINCIPAL: &str = "x509-forwarded";

/// Builds candidate tokens from headers or the TLS session.
#[derive(Debug, Clone)]
pub struct AuthenticationConverter {
    parser: Arc<dyn CertificateParser>,
}

impl AuthenticationConverter {
    /// Create a converter using `parser` for header and DER payloads.
    pub fn new(parser: Arc<dyn CertificateParser>) -> Self {
        Self { parser }
    }

    /// Candidate from forwarded headers.
    ///
    /// `X-SSL-CERT` wins over `X-SSL-SDN` when both are present.
    #[must_use]
    pub fn convert_headers(&self, headers: &HeaderMap) -> Option<AuthenticationToken> {
        if let Some(raw) = header_str(headers, X_SSL_CERT) {
            return match self.parser.parse_header(raw) {
                Ok(cert) => Self::from_certificate(cert),
                Err(e) => {
                    warn!(error = %e, "Forwarded client certificate could not be parsed");
                    None
                }
            };
        }

        Self::from_subject_dn(headers)
    }

    /// Candidate from an identity the forwarding guard already trusted.
    ///
    /// Reuses the certificate the guard parsed instead of decoding
    /// `X-SSL-CERT` again.
    #[must_use]
    pub fn convert_forwarded(
        &self,
        identity: ForwardedIdentity,
        headers: &HeaderMap,
    ) -> Option<AuthenticationToken> {
        match identity.certificate {
            Some(cert) => Self::from_certificate(cert),
            None => Self::from_subject_dn(headers),
        }
    }

    /// Candidate from the leaf certificate of the TLS session.
    #[must_use]
    pub fn convert_peer(&self, peer: &PeerCertificates) -> Option<AuthenticationToken> {
        let leaf = peer.leaf()?;
        match self.parser.parse_der(leaf) {
            Ok(cert) => Self::from_certificate(cert),
            Err(e) => {
                warn!(error = %e, "Peer certificate could not be parsed");
                None
            }
        }
    }

    fn from_subject_dn(headers: &HeaderMap) -> Option<AuthenticationToken> {
        header_str(headers, X_SSL_SDN).map(|sdn| {
            AuthenticationToken::unauthenticated(
                FORWARDED_SERVICE_PRINCIPAL,
                Credentials::SubjectDn(sdn.to_string()),
            )
        })
    }

    fn from_certificate(cert: ClientCertificate) -> Option<AuthenticationToken> {
        let Some(principal) = cert.subject().organizational_unit().map(str::to_string) else {
            debug!(subject = %cert.subject(), "Certificate subject has no OU");
            return None;
        };
        Some(AuthenticationToken::unauthenticated(
            principal,
            Credentials::Certificate(cert),
        ))
    }
}
