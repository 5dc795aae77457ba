use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Method, Request},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use hyper::Server;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::auth::TokenService;
use crate::config::{Config, ServerConfig};
use crate::db::Database;
use crate::error::{AppError, Result};
use crate::metrics::{self, MetricName};
use crate::routes;

/// Shared handles given to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn Database>,
    pub tokens: Arc<TokenService>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(db: Arc<dyn Database>, config: Config) -> Self {
        Self {
            db,
            tokens: Arc::new(TokenService::from_config(&config.auth)),
            config: Arc::new(config),
        }
    }
}

async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "message": "PROOF API",
        "version": env!("CARGO_PKG_VERSION"),
        "docs": "/api",
    }))
}

/// Health check endpoint
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "environment": state.config.environment,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn prometheus_metrics() -> impl IntoResponse {
    metrics::render()
}

async fn track_requests(req: Request<Body>, next: Next<Body>) -> Response {
    let response = next.run(req).await;
    metrics::increment_labeled(
        MetricName::HttpRequests,
        "status",
        response.status().as_u16().to_string(),
    );
    response
}

fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    if server.cors_origins.is_empty() {
        return layer.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = server
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("CORS: invalid origin '{}' skipped", origin);
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

/// Create the HTTP router with every route family mounted under `/api`.
pub fn create_server(state: AppState) -> Router {
    let cors = cors_layer(&state.config.server);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/metrics", get(prometheus_metrics))
        .nest("/api", routes::api_router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn(track_requests))
                .layer(cors),
        )
        .with_state(state)
}

/// Start the HTTP server on the configured host and port.
pub async fn start_server(state: AppState) -> Result<()> {
    let server = state.config.server.clone();
    let addr: SocketAddr = format!("{}:{}", server.host, server.port)
        .parse()
        .map_err(|e| AppError::Config(format!("Invalid listen address: {e}")))?;

    let app = create_server(state);

    info!("HTTP server running on http://{addr}");
    info!("Health check: http://{addr}/health");

    Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .map_err(|e| AppError::Internal(format!("Server error: {e}")))?;

    Ok(())
}
