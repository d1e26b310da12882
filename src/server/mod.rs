use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::{DefaultBodyLimit, Request};
use axum::http::{Method, header};
use axum::middleware::{self as axum_mw, Next};
use axum::response::Response;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};

use crate::pipeline::Pipeline;

mod error;
mod routes;

/// Shared state handed to every route handler.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(routes::health))
        .route("/upload", post(routes::upload))
        .route("/api/upload", post(routes::upload))
        .route("/download/{filename}", get(routes::download))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(axum_mw::from_fn(request_log))
        .layer(cors)
        .with_state(state)
}

/// Log every request with its status and latency. Request bodies hold
/// the API key and are never logged.
async fn request_log(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(req).await;

    tracing::info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "api_request"
    );

    response
}
