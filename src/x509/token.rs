//! Per-request authentication token.

use crate::x509::certificate::ClientCertificate;

/// Credentials backing an [`AuthenticationToken`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    /// A parsed client certificate (direct TLS or `X-SSL-CERT`).
    Certificate(ClientCertificate),
    /// A raw subject DN string (`X-SSL-SDN` without a certificate).
    SubjectDn(String),
    /// Nothing usable.
    None,
}

/// Who the request is, from the converter onward.
///
/// Converters create tokens unauthenticated; only the authentication manager
/// flips the flag.  Tokens are request-scoped and never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticationToken {
    principal: String,
    credentials: Credentials,
    authenticated: bool,
}

impl AuthenticationToken {
    /// Unauthenticated candidate.
    pub fn unauthenticated(principal: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            principal: principal.into(),
            credentials,
            authenticated: false,
        }
    }

    /// Principal name (the subject `OU` for certificates).
    #[must_use]
    pub fn principal(&self) -> &str {
        &self.principal
    }

    /// Credentials the token was built from.
    #[must_use]
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// `true` once the authentication manager accepted the token.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// The certificate, when the token is certificate-backed.
    #[must_use]
    pub fn certificate(&self) -> Option<&ClientCertificate> {
        match &self.credentials {
            Credentials::Certificate(cert) => Some(cert),
            _ => None,
        }
    }

    pub(crate) fn with_authenticated(mut self, authenticated: bool) -> Self {
        self.authenticated = authenticated;
        self
    }
}
