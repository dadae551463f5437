//! Client certificate parsing.
//!
//! Certificates reach the gateway two ways:
//!
//! - DER from the TLS handshake ([`PeerCertificates`], inserted by the TLS
//!   acceptor);
//! - a URL-encoded PEM string in `X-SSL-CERT`, set by a TLS-terminating proxy
//!   (nginx `$ssl_client_escaped_cert`).
//!
//! Both end up as an owned [`ClientCertificate`] that lives for one request.
//! Header payloads are size-checked before any decoding happens.

use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use percent_encoding::percent_decode_str;
use rustls::pki_types::CertificateDer;
use rustls::pki_types::pem::PemObject;
use x509_parser::certificate::X509Certificate;
use x509_parser::prelude::FromDer;

use crate::x509::dn::DistinguishedName;
use crate::{Error, Result};

const PEM_BEGIN: &str = "-----BEGIN CERTIFICATE-----";
const PEM_END: &str = "-----END CERTIFICATE-----";

// ─────────────────────────────────────────────────────────────────────────────
// Parsed certificate
// ─────────────────────────────────────────────────────────────────────────────

/// An owned, parsed X.509 client certificate.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCertificate {
    der: Vec<u8>,
    subject: DistinguishedName,
    serial: String,
    not_before: i64,
    not_after: i64,
}

impl ClientCertificate {
    /// Parse a DER-encoded certificate.
    ///
    /// # Errors
    ///
    /// Returns `Error::Certificate` if the bytes are not a complete X.509
    /// certificate.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let (rest, cert) = X509Certificate::from_der(der)
            .map_err(|e| Error::Certificate(format!("Failed to parse certificate: {e}")))?;
        if !rest.is_empty() {
            return Err(Error::Certificate(format!(
                "{} trailing bytes after certificate",
                rest.len()
            )));
        }

        let validity = cert.validity();
        Ok(Self {
            der: der.to_vec(),
            subject: DistinguishedName::from_x509_name(cert.subject()),
            serial: cert.raw_serial_as_string(),
            not_before: validity.not_before.timestamp(),
            not_after: validity.not_after.timestamp(),
        })
    }

    /// Parse a PEM certificate.
    ///
    /// Proxies flatten PEM into a header by replacing line breaks with spaces
    /// or tabs, so the body is re-broken into lines before decoding.  A bare
    /// Base64 body without the armour lines is also accepted.
    ///
    /// # Errors
    ///
    /// Returns `Error::Certificate` on unbalanced armour, an invalid PEM body
    /// or an invalid certificate.
    pub fn from_pem(pem: &str) -> Result<Self> {
        let pem = pem.trim();
        let (body, begin, end) = {
            let after_begin = pem.strip_prefix(PEM_BEGIN);
            let rest = after_begin.unwrap_or(pem);
            let before_end = rest.strip_suffix(PEM_END);
            (
                before_end.unwrap_or(rest),
                after_begin.is_some(),
                before_end.is_some(),
            )
        };
        if begin != end {
            return Err(Error::Certificate("unbalanced PEM armour".to_string()));
        }

        let lines: Vec<&str> = body.split_whitespace().collect();
        if lines.is_empty() {
            return Err(Error::Certificate("empty PEM body".to_string()));
        }
        let normalized = format!("{PEM_BEGIN}\n{}\n{PEM_END}\n", lines.join("\n"));

        let der = CertificateDer::from_pem_slice(normalized.as_bytes())
            .map_err(|e| Error::Certificate(format!("Invalid PEM certificate: {e}")))?;

        Self::from_der(&der)
    }

    /// Raw DER bytes.
    #[must_use]
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Subject attributes.
    #[must_use]
    pub fn subject(&self) -> &DistinguishedName {
        &self.subject
    }

    /// Serial number as colon-separated hex.
    #[must_use]
    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// `true` if `unix_time` (seconds) is inside the validity window.
    #[must_use]
    pub fn is_valid_at(&self, unix_time: i64) -> bool {
        self.not_before <= unix_time && unix_time <= self.not_after
    }

    /// `true` if the certificate is valid now.
    #[must_use]
    pub fn is_currently_valid(&self) -> bool {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX));
        self.is_valid_at(now)
    }
}

impl fmt::Debug for ClientCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCertificate")
            .field("subject", &self.subject.to_string())
            .field("serial", &self.serial)
            .field("not_before", &self.not_before)
            .field("not_after", &self.not_after)
            .field("der_len", &self.der.len())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Peer certificates from the TLS session
// ─────────────────────────────────────────────────────────────────────────────

/// DER certificate chain presented by the TLS peer, leaf first.
///
/// Inserted into request extensions by the TLS acceptor.  Cloning only bumps
/// a reference count; the chain belongs to the connection.
#[derive(Debug, Clone, Default)]
pub struct PeerCertificates(Arc<[Vec<u8>]>);

impl PeerCertificates {
    /// Wrap a DER chain.
    pub fn new(chain: impl IntoIterator<Item = Vec<u8>>) -> Self {
        Self(chain.into_iter().collect())
    }

    /// The leaf (client) certificate.
    #[must_use]
    pub fn leaf(&self) -> Option<&[u8]> {
        self.0.first().map(Vec::as_slice)
    }

    /// Number of certificates in the chain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `true` when the peer presented no certificate.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Parser seam
// ─────────────────────────────────────────────────────────────────────────────

/// Certificate decoding used by the guard and the converter.
pub trait CertificateParser: Send + Sync + fmt::Debug {
    /// Decode a forwarded header value (URL-encoded PEM).
    fn parse_header(&self, value: &str) -> Result<ClientCertificate>;

    /// Decode a DER certificate from the TLS session.
    fn parse_der(&self, der: &[u8]) -> Result<ClientCertificate>;
}

/// Default [`CertificateParser`] backed by `x509-parser`.
#[derive(Debug, Clone)]
pub struct X509CertificateParser {
    max_bytes: usize,
}

impl X509CertificateParser {
    /// Create a parser rejecting payloads above `max_bytes`.
    #[must_use]
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    fn check_size(&self, len: usize) -> Result<()> {
        if len > self.max_bytes {
            return Err(Error::Certificate(format!(
                "certificate payload of {len} bytes exceeds limit of {}",
                self.max_bytes
            )));
        }
        Ok(())
    }
}

impl CertificateParser for X509CertificateParser {
    fn parse_header(&self, value: &str) -> Result<ClientCertificate> {
        self.check_size(value.len())?;

        // `+` is a Base64 character here, so it is not treated as a space.
        let decoded = percent_decode_str(value)
            .decode_utf8()
            .map_err(|e| Error::Certificate(format!("Header is not valid UTF-8 once decoded: {e}")))?;

        ClientCertificate::from_pem(&decoded)
    }

    fn parse_der(&self, der: &[u8]) -> Result<ClientCertificate> {
        self.check_size(der.len())?;
        ClientCertificate::from_der(der)
    }
}
