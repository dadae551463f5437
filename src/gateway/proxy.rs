//! Route table and reverse proxy.
//!
//! A request is matched to the route with the longest path prefix (on segment
//! boundaries), its path is rewritten by the route's
//! [`StripContextAndPrefix`], identity headers and the context path
//! (`X-Forwarded-Prefix`) are attached and the request is streamed to the
//! backend.
//!
//! Paths with `.` or `..` segments, percent-encoded or not, are refused before
//! matching: the upstream URL would resolve them after the route was chosen.
//!
//! | Condition | Status |
//! |-----------|--------|
//! | dot segment in path | 400 |
//! | no route matches | 404 |
//! | route requires authentication, none established | 401 |
//! | backend timed out | 504 |
//! | backend unreachable / invalid response | 502 |

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use gateway_core::{RewrittenPath, StripContextAndPrefix};
use percent_encoding::percent_decode_str;
use tracing::{debug, error, warn};
use url::Url;

use super::error_response;
use super::identity::IdentityPropagation;
use super::router::AppState;
use crate::config::RouteConfig;
use crate::forwarding::CONSUMED_HEADERS;
use crate::x509::AuthenticationToken;
use crate::{Error, Result};

/// Hop-by-hop headers, never forwarded in either direction.
const HOP_BY_HOP_HEADERS: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Context path of the matched route, as seen by the backend.
pub const X_FORWARDED_PREFIX: HeaderName = HeaderName::from_static("x-forwarded-prefix");

// ─────────────────────────────────────────────────────────────────────────────
// Routes
// ─────────────────────────────────────────────────────────────────────────────

/// A configured backend route.
#[derive(Debug, Clone)]
pub struct Route {
    /// Identifier used in logs
    pub id: String,
    /// Normalised path prefix (no trailing `/` except for root)
    pub prefix: String,
    /// Backend base URL
    pub upstream: Url,
    /// Path rewrite applied before forwarding
    pub rewrite: StripContextAndPrefix,
    /// Reject requests without an authenticated client
    pub require_authentication: bool,
}

impl Route {
    /// Build a route from its configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the backend URI is not a valid URL.
    pub fn from_config(config: &RouteConfig) -> Result<Self> {
        let upstream = Url::parse(&config.uri).map_err(|e| {
            Error::Config(format!("Invalid URI '{}' for route '{}': {e}", config.uri, config.id))
        })?;
        Ok(Self {
            id: config.id.clone(),
            prefix: normalize_prefix(&config.path),
            upstream,
            rewrite: config.rewrite_filter(),
            require_authentication: config.require_authentication,
        })
    }

    fn matches(&self, path: &str) -> bool {
        if self.prefix == "/" {
            return true;
        }
        path.strip_prefix(self.prefix.as_str())
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    }

    /// Backend URL for an already rewritten path.
    fn upstream_url(&self, rewritten: &str, query: Option<&str>) -> Url {
        let mut url = self.upstream.clone();
        let base = self.upstream.path().trim_end_matches('/');
        url.set_path(&format!("{base}{rewritten}"));
        url.set_query(query);
        url
    }
}

/// A resolved request.
#[derive(Debug, Clone)]
pub struct RouteMatch<'a> {
    /// Matched route
    pub route: &'a Route,
    /// Backend path and context path
    pub rewritten: RewrittenPath,
    /// Full upstream URL, query included
    pub upstream: Url,
}

/// Routes ordered for longest-prefix matching.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    /// Build the table from configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for any invalid route.
    pub fn from_config(routes: &[RouteConfig]) -> Result<Self> {
        let routes = routes.iter().map(Route::from_config).collect::<Result<Vec<_>>>()?;
        Ok(Self::new(routes))
    }

    /// Build a table; longer prefixes are matched first.
    #[must_use]
    pub fn new(mut routes: Vec<Route>) -> Self {
        routes.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
        Self { routes }
    }

    /// Number of routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// `true` if no routes are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Match `path` and compute the rewritten backend URL.
    ///
    /// Paths with dot segments never match.
    #[must_use]
    pub fn resolve(&self, path: &str, query: Option<&str>) -> Option<RouteMatch<'_>> {
        if has_dot_segments(path) {
            return None;
        }
        let route = self.routes.iter().find(|r| r.matches(path))?;
        let rewritten = route.rewrite.apply(path);
        let upstream = route.upstream_url(&rewritten.path, query);
        Some(RouteMatch {
            route,
            rewritten,
            upstream,
        })
    }
}

/// `true` if a segment of `path` is `.` or `..` after percent-decoding.
///
/// Decoded `/` and `\` split segments too, so `..%2f` and `%5c..` count.
#[must_use]
pub fn has_dot_segments(path: &str) -> bool {
    path.split('/').any(|segment| {
        percent_decode_str(segment)
            .decode_utf8_lossy()
            .split(['/', '\\'])
            .map(str::trim)
            .any(|part| part == "." || part == "..")
    })
}

fn normalize_prefix(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handler
// ─────────────────────────────────────────────────────────────────────────────

/// Fallback handler forwarding matched requests to their backend.
pub async fn proxy_handler(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let (parts, body) = request.into_parts();

    if has_dot_segments(parts.uri.path()) {
        warn!(path = %parts.uri.path(), "Dot segment in request path");
        return error_response(StatusCode::BAD_REQUEST, "Path must not contain dot segments");
    }

    let Some(matched) = state.routes.resolve(parts.uri.path(), parts.uri.query()) else {
        debug!(path = %parts.uri.path(), "No route matched");
        return error_response(StatusCode::NOT_FOUND, "No route matches this path");
    };
    let route = matched.route;

    let token = parts.extensions.get::<AuthenticationToken>();
    if route.require_authentication && token.is_none_or(|t| !t.is_authenticated()) {
        warn!(route = %route.id, path = %parts.uri.path(), "Route requires an authenticated client");
        return error_response(StatusCode::UNAUTHORIZED, "Client certificate authentication required");
    }

    let mut headers = forwardable_headers(&parts.headers);
    let propagation = IdentityPropagation;
    propagation.strip_inbound(&mut headers);
    propagation.headers_for(token).apply_to(&mut headers);
    match HeaderValue::from_str(&matched.rewritten.context_path) {
        Ok(prefix) => {
            headers.insert(X_FORWARDED_PREFIX, prefix);
        }
        Err(_) => {
            headers.remove(X_FORWARDED_PREFIX);
        }
    }

    debug!(
        route = %route.id,
        upstream = %matched.upstream,
        context_path = %matched.rewritten.context_path,
        "Proxying request"
    );

    let upstream = state
        .client
        .request(parts.method, matched.upstream.clone())
        .headers(headers)
        .timeout(state.request_timeout)
        .body(reqwest::Body::wrap_stream(body.into_data_stream()))
        .send()
        .await;

    match upstream {
        Ok(response) => into_response(response),
        Err(e) if e.is_timeout() => {
            warn!(route = %route.id, error = %e, "Backend timed out");
            error_response(StatusCode::GATEWAY_TIMEOUT, "Backend timed out")
        }
        Err(e) => {
            error!(route = %route.id, error = %e, "Backend request failed");
            error_response(StatusCode::BAD_GATEWAY, "Backend unavailable")
        }
    }
}

fn into_response(upstream: reqwest::Response) -> Response {
    let status = upstream.status();
    let headers = forwardable_headers(upstream.headers());
    let mut response = Body::from_stream(upstream.bytes_stream()).into_response();
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Copy of `headers` without hop-by-hop, `Host` and consumed `X-SSL-*` headers.
///
/// Headers named in `Connection` are hop-by-hop for this message and are
/// dropped as well (RFC 9110 §7.6.1).
fn forwardable_headers(headers: &HeaderMap) -> HeaderMap {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect();

    let mut forwarded = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if should_forward(name) && !listed.contains(name) {
            forwarded.append(name.clone(), value.clone());
        }
    }
    forwarded
}

fn should_forward(name: &HeaderName) -> bool {
    *name != header::HOST
        && !HOP_BY_HOP_HEADERS.contains(name)
        && !CONSUMED_HEADERS.contains(&name.as_str())
}
