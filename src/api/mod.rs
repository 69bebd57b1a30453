//! API layer -- axum routes, handlers, and middleware.

mod routes;
pub mod state;

use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use self::state::AppState;

/// Build the application router with all API routes.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers(Any)
        .allow_origin(Any);

    Router::new()
        .nest("/api/v1", routes::api_routes())
        .fallback(fallback)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn fallback() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "not found")
}

/// Handler error, rendered as `{ "error": { "message", "type" } }`.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, "not_found", m),
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, "bad_request", m),
            ApiError::Internal(e) => {
                tracing::error!(error = %e, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal", "internal error".to_string())
            }
        };
        let body = json!({ "error": { "message": message, "type": kind } });
        (status, Json(body)).into_response()
    }
}

impl From<crate::engine::EngineError> for ApiError {
    fn from(e: crate::engine::EngineError) -> Self {
        match e {
            crate::engine::EngineError::UnknownIncident(id) => {
                ApiError::NotFound(format!("unknown incident {id}"))
            }
            other => ApiError::Internal(other.into()),
        }
    }
}

impl From<crate::responders::directory::DirectoryError> for ApiError {
    fn from(e: crate::responders::directory::DirectoryError) -> Self {
        use crate::responders::directory::DirectoryError;
        match e {
            DirectoryError::UnknownResponder(_) => ApiError::NotFound(e.to_string()),
            DirectoryError::NoContactPoints(_) => ApiError::BadRequest(e.to_string()),
        }
    }
}
