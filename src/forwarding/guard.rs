//! Forwarding trust guard.
//!
//! Every branch that cannot positively establish trust rejects.  The checks
//! run in a fixed order and the first failure wins:
//!
//! 1. no forwarding header → [`GuardOutcome::NotForwarded`]
//! 2. forwarding disabled
//! 3. `Host` not in the allowed set
//! 4. `X-SSL-Verify` not `SUCCESS`
//! 5. certificate header missing, oversized or unparseable
//! 6. certificate outside its validity window
//! 7. organisation of `X-SSL-SDN` (or of the certificate subject) not allowed

use std::sync::Arc;

use axum::http::HeaderMap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{ForwardingMode, X509Config};
use crate::context::RequestContext;
use crate::forwarding::{
    X_FORWARDED_FOR, X_SSL_CERT, X_SSL_FORWARDED, X_SSL_SDN, X_SSL_VERIFY, VERIFY_SUCCESS,
    header_str,
};
use crate::x509::{
    CertificateParser, ClientCertificate, DistinguishedName, X509AuthenticationManager,
};

/// Why forwarded identity material was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    /// Forwarding headers arrived while forwarding is off.
    #[error("certificate forwarding is disabled")]
    ForwardingDisabled,
    /// `Host` is not an allowed forwarding host.
    #[error("host {0:?} may not forward client certificates")]
    HostNotAllowed(Option<String>),
    /// `X-SSL-Verify` is not `SUCCESS` (or absent in simplified mode).
    #[error("upstream verification result {0:?} is not SUCCESS")]
    VerificationFailed(Option<String>),
    /// No `X-SSL-CERT` where one is required.
    #[error("forwarded client certificate is missing")]
    MissingCertificate,
    /// Oversized, undecodable or unparseable `X-SSL-CERT`.
    #[error("forwarded client certificate is malformed")]
    MalformedCertificate,
    /// Certificate outside its validity window.
    #[error("forwarded client certificate is outside its validity period")]
    CertificateExpired,
    /// No `X-SSL-SDN` in simplified mode.
    #[error("forwarded subject DN is missing")]
    MissingSubjectDn,
    /// `X-SSL-SDN` could not be parsed.
    #[error("forwarded subject DN is malformed")]
    MalformedSubjectDn,
    /// Subject organisation does not match the allowed MRN prefix.
    #[error("organisation {0:?} is not allowed")]
    OrganisationNotAllowed(Option<String>),
}

impl RejectReason {
    /// Structural failures are authentication errors (401); the rest are
    /// policy refusals (403).
    #[must_use]
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::MissingCertificate
                | Self::MalformedCertificate
                | Self::MissingSubjectDn
                | Self::MalformedSubjectDn
        )
    }
}

/// Where the authorized subject came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectSource {
    /// `X-SSL-SDN`
    SubjectDnHeader,
    /// Subject of the `X-SSL-CERT` certificate
    Certificate,
}

/// Identity that passed the guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardedIdentity {
    /// Subject that passed the organisation check
    pub subject: DistinguishedName,
    /// Where the subject came from
    pub source: SubjectSource,
    /// Parsed `X-SSL-CERT`, when one was forwarded
    pub certificate: Option<ClientCertificate>,
}

/// Guard decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome {
    /// No forwarding header: the normal authentication path applies.
    NotForwarded,
    /// Forwarded headers are structurally sound and the organisation is allowed.
    Trusted(ForwardedIdentity),
    /// Forwarded headers must not be trusted.
    Rejected(RejectReason),
}

/// Evaluates forwarded certificate headers against the trust policy.
#[derive(Debug, Clone)]
pub struct ForwardingGuard {
    config: Arc<X509Config>,
    allowed_hosts: Vec<String>,
    parser: Arc<dyn CertificateParser>,
    manager: X509AuthenticationManager,
}

impl ForwardingGuard {
    /// Create a guard over the shared trust policy.
    pub fn new(config: Arc<X509Config>, parser: Arc<dyn CertificateParser>) -> Self {
        let allowed_hosts = config
            .forwarding
            .hosts
            .iter()
            .map(|h| normalize_host(h))
            .filter(|h| !h.is_empty())
            .collect();
        let manager = X509AuthenticationManager::from_config(&config);
        Self {
            config,
            allowed_hosts,
            parser,
            manager,
        }
    }

    /// `true` if any recognised forwarding header is present.
    #[must_use]
    pub fn is_forwarded(&self, headers: &HeaderMap) -> bool {
        let marker = [X_SSL_FORWARDED, X_SSL_CERT, X_SSL_SDN, X_SSL_VERIFY]
            .iter()
            .any(|name| headers.contains_key(*name));
        marker
            || (self.config.forwarding.mode == ForwardingMode::Simplified
                && headers.contains_key(X_FORWARDED_FOR))
    }

    /// Decide whether forwarded identity material may be trusted.
    #[must_use]
    pub fn evaluate(&self, ctx: &RequestContext<'_>) -> GuardOutcome {
        let headers = ctx.headers();
        if !self.is_forwarded(headers) {
            return GuardOutcome::NotForwarded;
        }

        match self.check(ctx) {
            Ok(identity) => {
                debug!(
                    subject = %identity.subject,
                    source = ?identity.source,
                    "Forwarded client identity trusted"
                );
                GuardOutcome::Trusted(identity)
            }
            Err(reason) => {
                warn!(host = ctx.host().unwrap_or("-"), reason = %reason, "Forwarded client identity rejected");
                GuardOutcome::Rejected(reason)
            }
        }
    }

    fn check(&self, ctx: &RequestContext<'_>) -> Result<ForwardedIdentity, RejectReason> {
        let forwarding = &self.config.forwarding;
        let simplified = forwarding.mode == ForwardingMode::Simplified;
        let headers = ctx.headers();

        if !forwarding.enabled {
            return Err(RejectReason::ForwardingDisabled);
        }

        if !self.is_host_allowed(ctx.host()) {
            return Err(RejectReason::HostNotAllowed(ctx.host().map(str::to_string)));
        }

        let verify = header_str(headers, X_SSL_VERIFY);
        match verify {
            Some(VERIFY_SUCCESS) => {}
            None if !simplified && !headers.contains_key(X_SSL_VERIFY) => {}
            other => return Err(RejectReason::VerificationFailed(other.map(str::to_string))),
        }

        let certificate = match header_str(headers, X_SSL_CERT) {
            Some(raw) => Some(self.parse_certificate(raw)?),
            None if headers.contains_key(X_SSL_CERT) => {
                return Err(RejectReason::MissingCertificate);
            }
            None if simplified && !forwarding.require_certificate => None,
            None => return Err(RejectReason::MissingCertificate),
        };

        if let Some(cert) = &certificate {
            if !cert.is_currently_valid() {
                return Err(RejectReason::CertificateExpired);
            }
        }

        let identity = match (header_str(headers, X_SSL_SDN), certificate) {
            (Some(sdn), certificate) => ForwardedIdentity {
                subject: X509AuthenticationManager::parse_x509_principal(sdn)
                    .map_err(|_| RejectReason::MalformedSubjectDn)?,
                source: SubjectSource::SubjectDnHeader,
                certificate,
            },
            (None, _) if simplified => return Err(RejectReason::MissingSubjectDn),
            (None, Some(cert)) => ForwardedIdentity {
                subject: cert.subject().clone(),
                source: SubjectSource::Certificate,
                certificate: Some(cert),
            },
            (None, None) => return Err(RejectReason::MissingCertificate),
        };

        if !self.manager.is_organisation_allowed(&identity.subject) {
            return Err(RejectReason::OrganisationNotAllowed(
                identity.subject.organization().map(str::to_string),
            ));
        }

        Ok(identity)
    }

    fn parse_certificate(&self, raw: &str) -> Result<ClientCertificate, RejectReason> {
        self.parser.parse_header(raw).map_err(|e| {
            debug!(error = %e, "Forwarded certificate rejected");
            RejectReason::MalformedCertificate
        })
    }

    fn is_host_allowed(&self, host: Option<&str>) -> bool {
        host.map(normalize_host)
            .is_some_and(|host| self.allowed_hosts.iter().any(|allowed| *allowed == host))
    }
}

/// Lowercase host without port; IPv6 literals lose their brackets.
fn normalize_host(host: &str) -> String {
    let host = host.trim();
    let bare = if let Some(rest) = host.strip_prefix('[') {
        rest.split_once(']').map_or(rest, |(addr, _)| addr)
    } else if host.matches(':').count() == 1 {
        host.split_once(':').map_or(host, |(name, _)| name)
    } else {
        host
    };
    bare.trim_end_matches('.').to_ascii_lowercase()
}
