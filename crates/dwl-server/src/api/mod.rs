//! Router assembly and service-level routes

use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};
use sqlx::PgPool;
use tower_http::{compression::CompressionLayer, services::ServeDir};

use crate::{
    config::{CorsConfig, ServerConfig},
    error::AppError,
    features::{self, FeatureState},
    middleware,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Pool probed by `/health`; `None` when the pipeline runs without PostgreSQL
    pub db: Option<PgPool>,
    pub features: FeatureState,
}

/// Create the application router with all routes and middleware
pub fn create_router(state: AppState, server: &ServerConfig, cors: &CorsConfig) -> Router {
    let mut router = Router::new()
        .route("/health", get(health_check))
        .with_state(state.db.clone())
        .merge(features::router(state.features));

    if let Some(dir) = &server.static_dir {
        tracing::info!(dir = %dir.display(), "Serving static files");
        router = router.fallback_service(ServeDir::new(dir));
    }

    // Apply layers from innermost to outermost
    router
        .layer(middleware::body_limit_layer(server.max_upload_bytes))
        .layer(CompressionLayer::new())
        .layer(middleware::tracing_layer())
        .layer(middleware::cors_layer(cors))
}

/// Health check handler
async fn health_check(State(db): State<Option<PgPool>>) -> Result<Json<Value>, AppError> {
    let Some(db) = db else {
        return Ok(Json(json!({
            "status": "healthy",
            "database": "not_configured"
        })));
    };

    sqlx::query("SELECT 1").execute(&db).await?;

    Ok(Json(json!({
        "status": "healthy",
        "database": "connected"
    })))
}
