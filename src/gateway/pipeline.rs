//! Trust pipeline: guard → converter → authorizer.
//!
//! The stages are plain values composed in order; each works on an explicit
//! [`RequestContext`] and none needs an async runtime, so the whole decision
//! can be tested synchronously.
//!
//! | Guard | Converter | Authorizer | Outcome |
//! |-------|-----------|------------|---------|
//! | `Rejected` | - | - | `Denied(Untrusted)` |
//! | `Trusted` | no candidate | - | `Denied(NoCandidate)` |
//! | `Trusted` | candidate | refused | `Denied(Unauthorized)` |
//! | `Trusted` | candidate | accepted | `Authenticated` |
//! | `NotForwarded` | no peer certificate | - | `Deferred` |
//! | `NotForwarded` | peer candidate | refused | `Denied(Unauthorized)` |
//! | `NotForwarded` | peer candidate | accepted | `Authenticated` |

use std::sync::Arc;

use axum::http::StatusCode;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::X509Config;
use crate::context::RequestContext;
use crate::forwarding::{ForwardingGuard, GuardOutcome, RejectReason};
use crate::x509::{
    AuthenticationConverter, AuthenticationToken, CertificateParser, X509AuthenticationManager,
    X509CertificateParser,
};

/// Decides who a request is.
pub trait Authenticator: Send + Sync {
    /// Run the trust decision for one request.
    fn authenticate(&self, ctx: &RequestContext<'_>) -> AuthOutcome;
}

/// Result of the trust decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// An authenticated token for the rest of the request.
    Authenticated(AuthenticationToken),
    /// No identity material for this mechanism; later stages decide.
    Deferred,
    /// Identity material was presented and refused.
    Denied(DenyReason),
}

/// Why an identity was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DenyReason {
    /// The forwarding guard refused the request.
    #[error("{0}")]
    Untrusted(RejectReason),
    /// Forwarding was trusted but no token could be built.
    #[error("no client identity could be extracted")]
    NoCandidate,
    /// The authentication manager rejected the principal.
    #[error("principal {principal:?} is not authorized")]
    Unauthorized {
        /// Principal of the rejected token
        principal: String,
    },
}

impl DenyReason {
    /// HTTP status for this refusal.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Untrusted(reason) if reason.is_structural() => StatusCode::UNAUTHORIZED,
            Self::NoCandidate => StatusCode::UNAUTHORIZED,
            Self::Untrusted(_) | Self::Unauthorized { .. } => StatusCode::FORBIDDEN,
        }
    }
}

/// The X.509 trust pipeline.
#[derive(Debug, Clone)]
pub struct TrustPipeline {
    guard: ForwardingGuard,
    converter: AuthenticationConverter,
    manager: X509AuthenticationManager,
}

impl TrustPipeline {
    /// Assemble the stages from their parts.
    #[must_use]
    pub fn new(
        guard: ForwardingGuard,
        converter: AuthenticationConverter,
        manager: X509AuthenticationManager,
    ) -> Self {
        Self {
            guard,
            converter,
            manager,
        }
    }

    /// Pipeline with the default `x509-parser` backed parser.
    #[must_use]
    pub fn from_config(config: Arc<X509Config>) -> Self {
        let parser: Arc<dyn CertificateParser> =
            Arc::new(X509CertificateParser::new(config.max_certificate_bytes));
        Self::new(
            ForwardingGuard::new(Arc::clone(&config), Arc::clone(&parser)),
            AuthenticationConverter::new(parser),
            X509AuthenticationManager::from_config(&config),
        )
    }

    fn authorize(&self, candidate: AuthenticationToken) -> AuthOutcome {
        let token = self.manager.authenticate(candidate);
        if token.is_authenticated() {
            info!(principal = token.principal(), "Client authenticated");
            AuthOutcome::Authenticated(token)
        } else {
            AuthOutcome::Denied(DenyReason::Unauthorized {
                principal: token.principal().to_string(),
            })
        }
    }
}

impl Authenticator for TrustPipeline {
    fn authenticate(&self, ctx: &RequestContext<'_>) -> AuthOutcome {
        match self.guard.evaluate(ctx) {
            GuardOutcome::Rejected(reason) => AuthOutcome::Denied(DenyReason::Untrusted(reason)),
            GuardOutcome::Trusted(identity) => {
                match self.converter.convert_forwarded(identity, ctx.headers()) {
                    Some(candidate) => self.authorize(candidate),
                    None => AuthOutcome::Denied(DenyReason::NoCandidate),
                }
            }
            GuardOutcome::NotForwarded => {
                match ctx.peer().and_then(|peer| self.converter.convert_peer(peer)) {
                    Some(candidate) => self.authorize(candidate),
                    None => {
                        debug!("No client certificate, deferring");
                        AuthOutcome::Deferred
                    }
                }
            }
        }
    }
}
