//! HTTP router and handlers

use std::sync::Arc;
use std::time::Duration;

use axum::{Json, Router, middleware, response::IntoResponse, routing::get};
use serde_json::json;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

use super::auth::trust_middleware;
use super::pipeline::Authenticator;
use super::proxy::{RouteTable, has_dot_segments, proxy_handler};

/// Shared application state
pub struct AppState {
    /// Trust decision for every non-public request
    pub authenticator: Arc<dyn Authenticator>,
    /// Backend routes
    pub routes: RouteTable,
    /// Outbound HTTP client
    pub client: reqwest::Client,
    /// Paths that bypass the trust pipeline
    pub public_paths: Vec<String>,
    /// Upstream request timeout
    pub request_timeout: Duration,
}

impl AppState {
    /// `true` if `path` equals a public path or lies below one.
    ///
    /// Paths with dot segments are never public.
    #[must_use]
    pub fn is_public_path(&self, path: &str) -> bool {
        !has_dot_segments(path)
            && self.public_paths.iter().any(|public| {
                let public = public.trim_end_matches('/');
                path.strip_prefix(public)
                    .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
            })
    }
}

/// Create the router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .fallback(proxy_handler)
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            trust_middleware,
        ))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}
