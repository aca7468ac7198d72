//! Unauthenticated utility handlers.

use axum::Json;

/// Liveness check.
pub async fn ping() -> Json<&'static str> {
    Json("pong")
}
