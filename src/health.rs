//! HTTP debug/health surface. Thin `axum` router with a single liveness
//! probe, deliberately minimal since it carries no part of the core
//! contract.

use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};

pub fn router() -> Router {
    Router::new().route("/healthz", get(healthz))
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
