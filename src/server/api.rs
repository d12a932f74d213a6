//! API route definitions

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::{handlers, state::AppState};

async fn handle_404() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": true,
            "message": "Not found. Visit /api/health to check API status.",
        })),
    )
}

async fn handle_405() -> impl IntoResponse {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({
            "error": true,
            "message": "Method not allowed. Check the API documentation for supported methods.",
        })),
    )
}

/// Create the main application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let upload_limit = state.settings.max_upload_size.saturating_add(64 * 1024);

    let api_routes = Router::new()
        // Datasets
        .route("/upload", post(handlers::upload_data))
        .route("/columns/:file_id", get(handlers::get_columns))
        .route("/dataset/:file_id/preview", get(handlers::get_dataset_preview))
        .route("/datasets", get(handlers::list_datasets))
        .route("/validate/:file_id", post(handlers::validate_data))
        .route("/algorithms/:problem_type", get(handlers::list_algorithms))
        // Training sessions
        .route("/train", post(handlers::start_training))
        .route("/train/status/:session_id", get(handlers::get_training_status))
        .route("/sessions", get(handlers::list_sessions))
        .route(
            "/session/:session_id",
            get(handlers::get_session).delete(handlers::delete_session),
        )
        .route(
            "/session/:session_id/models/:model_name/download",
            get(handlers::download_model),
        )
        .route("/download-model", post(handlers::download_model_post))
        // Inference
        .route("/predict", post(handlers::predict))
        // Explainability
        .route("/explain/importance", post(handlers::get_feature_importance))
        .route("/explain/local", post(handlers::get_local_explanation))
        // System
        .route("/health", get(handlers::health_check))
        .fallback(handle_404)
        .method_not_allowed_fallback(handle_405);

    // CORS configured via CORS_ORIGIN env var (default: allow all)
    let cors = match std::env::var("CORS_ORIGIN") {
        Ok(origin) if !origin.is_empty() && origin != "*" => CorsLayer::new()
            .allow_origin(
                origin
                    .parse::<axum::http::HeaderValue>()
                    .unwrap_or_else(|_| axum::http::HeaderValue::from_static("*")),
            )
            .allow_methods(Any)
            .allow_headers(Any),
        _ => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    };

    Router::new()
        .nest("/api", api_routes)
        .fallback(handle_404)
        .method_not_allowed_fallback(handle_405)
        .with_state(state)
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
