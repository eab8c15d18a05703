// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.

use std::time::Instant;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{delete, get, post},
};
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use zapline_config::model::ServerConfig;
use zapline_core::ZaplineError;
use zapline_session::SessionManager;

use crate::auth::{AuthConfig, auth_middleware};
use crate::handlers;

/// Largest accepted request body.
const MAX_BODY_BYTES: usize = 256 * 1024;

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub manager: SessionManager,
    pub auth: AuthConfig,
    pub started_at: Instant,
}

impl GatewayState {
    pub fn new(manager: SessionManager, bearer_token: Option<String>) -> Self {
        Self {
            manager,
            auth: AuthConfig { bearer_token },
            started_at: Instant::now(),
        }
    }
}

/// Builds the application router.
///
/// - GET /health (unauthenticated)
/// - GET /v1/sessions
/// - POST /v1/sessions/{tenant}/initialize
/// - GET /v1/sessions/{tenant}/status
/// - POST /v1/sessions/{tenant}/disconnect
/// - POST /v1/sessions/{tenant}/messages
/// - DELETE /v1/sessions/{tenant}/contexts/{sender}
/// - POST /v1/inbound
pub fn router(state: GatewayState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::get_health))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route("/v1/sessions", get(handlers::list_sessions))
        .route(
            "/v1/sessions/{tenant}/initialize",
            post(handlers::initialize_session),
        )
        .route(
            "/v1/sessions/{tenant}/status",
            get(handlers::get_session_status),
        )
        .route(
            "/v1/sessions/{tenant}/disconnect",
            post(handlers::disconnect_session),
        )
        .route("/v1/sessions/{tenant}/messages", post(handlers::send_message))
        .route(
            "/v1/sessions/{tenant}/contexts/{sender}",
            delete(handlers::clear_sender_context),
        )
        .route("/v1/inbound", post(handlers::post_inbound))
        .route_layer(axum_middleware::from_fn_with_state(
            state.auth.clone(),
            auth_middleware,
        ))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(DefaultBodyLimit::max(MAX_BODY_BYTES)),
        )
}

/// Serves the API until `shutdown` is cancelled.
pub async fn start_server(
    config: &ServerConfig,
    state: GatewayState,
    shutdown: CancellationToken,
) -> Result<(), ZaplineError> {
    if state.auth.bearer_token.is_none() {
        tracing::warn!("server.bearer_token is not set -- every API request will be rejected");
    }

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ZaplineError::Gateway {
            message: format!("failed to bind HTTP server to {addr}: {e}"),
            source: Some(Box::new(e)),
        })?;

    tracing::info!(addr = %addr, "HTTP server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|e| ZaplineError::Gateway {
            message: format!("HTTP server error: {e}"),
            source: Some(Box::new(e)),
        })?;

    tracing::info!("HTTP server stopped");
    Ok(())
}
