//! Read-only view of a request for the trust pipeline.

use axum::extract::Request;
use axum::http::{HeaderMap, header};

use crate::x509::PeerCertificates;

/// What the trust pipeline may look at: headers, declared host and the
/// peer certificates of the TLS session.  Borrowed from the request, so
/// nothing outlives it.
#[derive(Debug, Clone, Copy)]
pub struct RequestContext<'a> {
    headers: &'a HeaderMap,
    host: Option<&'a str>,
    peer: Option<&'a PeerCertificates>,
}

impl<'a> RequestContext<'a> {
    /// View of an axum request.
    ///
    /// The host comes from the `Host` header, or the URI authority for
    /// HTTP/2 requests that carry `:authority` only.
    #[must_use]
    pub fn from_request(request: &'a Request) -> Self {
        let headers = request.headers();
        let host = headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .or_else(|| request.uri().authority().map(|a| a.as_str()));
        Self {
            headers,
            host,
            peer: request.extensions().get::<PeerCertificates>(),
        }
    }

    /// View over explicit parts.
    #[must_use]
    pub fn new(headers: &'a HeaderMap) -> Self {
        let host = headers.get(header::HOST).and_then(|v| v.to_str().ok());
        Self {
            headers,
            host,
            peer: None,
        }
    }

    /// Attach the TLS peer chain.
    #[must_use]
    pub fn with_peer(mut self, peer: &'a PeerCertificates) -> Self {
        self.peer = Some(peer);
        self
    }

    /// Request headers.
    #[must_use]
    pub fn headers(&self) -> &'a HeaderMap {
        self.headers
    }

    /// Host the request was addressed to, from `Host` or the URI authority.
    #[must_use]
    pub fn host(&self) -> Option<&'a str> {
        self.host
    }

    /// Peer certificates, if the TLS session presented any.
    #[must_use]
    pub fn peer(&self) -> Option<&'a PeerCertificates> {
        self.peer.filter(|p| !p.is_empty())
    }
}
