use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::common::cluster::SECRET_HEADER;
use crate::common::error::ClusterError;

/// Rejects any request whose secret header does not match; used by both the
/// management API and the worker command router.
pub async fn require_secret(
    State(secret): State<Arc<str>>,
    request: Request,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .get(SECRET_HEADER)
        .and_then(|value| value.to_str().ok());
    match presented {
        Some(value) if value == &*secret => next.run(request).await,
        _ => {
            log::warn!(
                "rejected {} {}: bad or missing {}",
                request.method(),
                request.uri().path(),
                SECRET_HEADER
            );
            ClusterError::Unauthorized.into_response()
        }
    }
}
