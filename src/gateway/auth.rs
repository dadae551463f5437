//! Trust middleware
//!
//! Runs the [`Authenticator`] for every request outside the public paths:
//!
//! - `Authenticated` → the token is inserted into request extensions
//! - `Deferred` → the request continues without a token; routes that require
//!   authentication answer 401 later
//! - `Denied` → JSON 401/403, the request never reaches a backend

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

use super::error_response;
use super::pipeline::AuthOutcome;
use super::router::AppState;
use crate::context::RequestContext;

/// Axum middleware applying the trust pipeline.
pub async fn trust_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    if state.is_public_path(&path) {
        debug!(path = %path, "Public path, skipping trust pipeline");
        return next.run(request).await;
    }

    let outcome = state
        .authenticator
        .authenticate(&RequestContext::from_request(&request));

    match outcome {
        AuthOutcome::Authenticated(token) => {
            debug!(principal = token.principal(), path = %path, "Authenticated request");
            request.extensions_mut().insert(token);
            next.run(request).await
        }
        AuthOutcome::Deferred => next.run(request).await,
        AuthOutcome::Denied(reason) => {
            let status = reason.status();
            warn!(path = %path, status = status.as_u16(), reason = %reason, "Request denied");
            let message = if status == StatusCode::UNAUTHORIZED {
                "Client identity could not be established"
            } else {
                "Client is not allowed to access this gateway"
            };
            error_response(status, message)
        }
    }
}
