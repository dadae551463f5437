//! Gateway server implementation

pub mod auth;
pub mod identity;
pub mod pipeline;
pub mod proxy;
mod router;
mod server;
pub mod tls;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

pub use auth::trust_middleware;
pub use identity::{HeaderAdditions, IdentityPropagation, X_SECOM_CERT, X_SECOM_MRN};
pub use pipeline::{AuthOutcome, Authenticator, DenyReason, TrustPipeline};
pub use proxy::{Route, RouteMatch, RouteTable, X_FORWARDED_PREFIX, has_dot_segments};
pub use router::{AppState, create_router};
pub use server::Gateway;

/// JSON error body shared by the middleware and the proxy.
pub(crate) fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(json!({
            "error": {
                "status": status.as_u16(),
                "message": message
            }
        })),
    )
        .into_response()
}
