//! Axum HTTP server for the wallet API.
//!
//! Operator routes under `/wallet`, the relay bridge callback under
//! `/relay/events`, a health check and optional static files. The operator
//! routes and the bridge callback each have their own bearer token.

pub mod auth;
pub mod handlers;
pub mod types;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use axum::{
    Router,
    extract::{DefaultBodyLimit, Request, State},
    http::{HeaderValue, Method, StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tokio::task::JoinHandle;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use self::auth::{AuthState, auth_middleware};
use self::handlers::*;
use crate::broker::SessionBroker;
use crate::config::ServerConfig;
use crate::error::ServerError;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct ServerState {
    pub broker: SessionBroker,
    pub public_dir: Option<PathBuf>,
}

/// Build the full router for `config`.
pub fn router(broker: SessionBroker, config: &ServerConfig) -> Router {
    let api_auth = AuthState::new(config.api_token.clone());
    let events_auth = AuthState::new(config.events_token.clone());
    let state = ServerState {
        broker,
        public_dir: config.public_dir.clone(),
    };

    let public = Router::new().route("/api/health", get(health_handler));

    let protected = Router::new()
        .route("/wallet/create", post(create_wallet_handler))
        .route("/wallet/connect", post(connect_handler))
        .route("/wallet/approve-session", post(approve_session_handler))
        .route("/wallet/reject-session", post(reject_session_handler))
        .route("/wallet/approve-request", post(approve_request_handler))
        .route("/wallet/reject-request", post(reject_request_handler))
        .route("/wallet/status", get(status_handler))
        .route_layer(middleware::from_fn_with_state(api_auth, auth_middleware));

    let relay = Router::new()
        .route("/relay/events", post(relay_events_handler))
        .route_layer(middleware::from_fn_with_state(events_auth, auth_middleware));

    // Only the service's own origins may call the API from a browser.
    let origins: Vec<HeaderValue> = [
        config.base_url.clone(),
        format!("http://localhost:{}", config.port),
        format!("http://127.0.0.1:{}", config.port),
    ]
    .iter()
    .filter_map(|origin| origin.parse().ok())
    .collect();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(AllowHeaders::list([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
        ]));

    Router::new()
        .merge(public)
        .merge(protected)
        .merge(relay)
        .fallback(static_file_handler)
        .layer(cors)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
            tracing::info_span!(
                "http",
                request_id = %Uuid::new_v4(),
                method = %request.method(),
                path = %request.uri().path(),
            )
        }))
        .with_state(state)
}

/// Bind `addr` and serve `app` until `shutdown` resolves.
///
/// Returns the actual bound `SocketAddr` (useful when binding to port 0) and
/// the serving task.
pub async fn start_server(
    addr: SocketAddr,
    app: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::StartupFailed {
            reason: format!("Failed to bind to {}: {}", addr, e),
        })?;
    let bound_addr = listener
        .local_addr()
        .map_err(|e| ServerError::StartupFailed {
            reason: format!("Failed to get local addr: {}", e),
        })?;

    let task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                shutdown.await;
                tracing::info!("Wallet API shutting down");
            })
            .await
        {
            tracing::error!("Wallet API server error: {}", e);
        }
    });

    tracing::info!(addr = %bound_addr, "Wallet API listening");
    Ok((bound_addr, task))
}

// --- Static files ---

async fn static_file_handler(State(state): State<ServerState>, request: Request) -> Response {
    if request.method() != Method::GET && request.method() != Method::HEAD {
        return (StatusCode::NOT_FOUND, "Not found").into_response();
    }
    let Some(root) = &state.public_dir else {
        return (StatusCode::NOT_FOUND, "Not found").into_response();
    };
    let path = request.uri().path().trim_start_matches('/');
    let path = if path.is_empty() { "index.html" } else { path };
    serve_public_file(root, path).await
}

/// Resolve `path` inside `root`, refusing anything that escapes it.
async fn serve_public_file(root: &Path, path: &str) -> Response {
    if path.contains("..") || path.contains('\\') {
        return (StatusCode::BAD_REQUEST, "Invalid path").into_response();
    }

    let canonical = match root.join(path).canonicalize() {
        Ok(p) => p,
        Err(_) => return (StatusCode::NOT_FOUND, "Not found").into_response(),
    };
    let root_canonical = match root.canonicalize() {
        Ok(p) => p,
        Err(_) => return (StatusCode::NOT_FOUND, "Not found").into_response(),
    };
    if !canonical.starts_with(&root_canonical) {
        return (StatusCode::FORBIDDEN, "Forbidden").into_response();
    }

    match tokio::fs::read(&canonical).await {
        Ok(contents) => {
            let mime = mime_guess::from_path(&canonical)
                .first_or_octet_stream()
                .to_string();
            ([(header::CONTENT_TYPE, mime)], contents).into_response()
        }
        Err(_) => (StatusCode::NOT_FOUND, "Not found").into_response(),
    }
}
