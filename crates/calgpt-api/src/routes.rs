//! Router setup with all API routes and middleware.

use std::future::Future;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use calgpt_core::config::CalgptConfig;
use calgpt_core::error::CalgptError;

use crate::handlers;
use crate::state::AppState;

/// Allowed browser origins: the configured list, or localhost on the server
/// port and the port after it (the front-end dev server).
fn cors_origins(config: &CalgptConfig) -> Vec<HeaderValue> {
    let origins = if config.server.cors_origins.is_empty() {
        let port = config.general.port;
        let dev_port = port.saturating_add(1);
        vec![
            format!("http://127.0.0.1:{}", port),
            format!("http://localhost:{}", port),
            format!("http://127.0.0.1:{}", dev_port),
            format!("http://localhost:{}", dev_port),
        ]
    } else {
        config.server.cors_origins.clone()
    };

    origins
        .into_iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect()
}

/// Create the axum Router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(cors_origins(&state.config)))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    let body_limit = state.config.server.max_body_bytes;

    let api_routes = Router::new()
        .route("/api/query", post(handlers::query))
        .route("/api/sessions", post(handlers::create_session))
        .route(
            "/api/sessions/{id}",
            get(handlers::get_session).delete(handlers::delete_session),
        )
        .route("/api/sessions/{id}/query", post(handlers::session_query))
        .layer(DefaultBodyLimit::max(body_limit));

    Router::new()
        .route("/health", get(handlers::health))
        .merge(api_routes)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Bind the configured address and serve until `shutdown` resolves.
pub async fn start_server<F>(state: AppState, shutdown: F) -> Result<(), CalgptError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = format!(
        "{}:{}",
        state.config.general.bind_address, state.config.general.port
    );
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| CalgptError::Api(format!("Failed to bind {}: {}", addr, e)))?;

    tracing::info!(addr = %addr, "API server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| CalgptError::Api(format!("Server error: {}", e)))?;

    tracing::info!("API server stopped");
    Ok(())
}
