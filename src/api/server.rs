//! Axum server for the paginated news API.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderName, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::api::config::ServerConfig;
use crate::origin::{OriginCache, PaginationAssembler};

/// Shared state for all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub assembler: PaginationAssembler,
    /// Cancelled on server shutdown; streaming responses end with it.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(cache: Arc<OriginCache>) -> Self {
        Self {
            assembler: PaginationAssembler::new(cache),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn cache(&self) -> &Arc<OriginCache> {
        self.assembler.cache()
    }
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([HeaderName::from_static("content-type")]);

    if config.allowed_origins.is_empty() {
        return cors.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(origins))
}

/// Build the axum router with all API routes.
pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    let shared_state = Arc::new(state);

    Router::new()
        .route("/news", get(super::routes::news::get_news))
        .route("/news/section", get(super::routes::news::get_section))
        .route("/news/poll", get(super::routes::news::poll_news))
        .route("/news/ingest", post(super::routes::news::ingest_news))
        .route("/news/stream", get(super::routes::stream::news_stream))
        .route("/news/events", get(super::routes::stream::event_stream))
        .route("/health", get(super::routes::health::get_health))
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(cors_layer(config))
        .layer(TraceLayer::new_for_http())
        .with_state(shared_state)
}

/// Serve on an already bound listener until `state.shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    config: &ServerConfig,
) -> std::io::Result<()> {
    let shutdown = state.shutdown.clone();
    let app = build_router(state, config);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

/// Bind `config.addr()` and serve until `state.shutdown` is cancelled.
pub async fn start_server(config: &ServerConfig, state: AppState) -> std::io::Result<()> {
    let addr = config.addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("News API server listening on {addr}");
    serve(listener, state, config).await
}
