//! Gateway router: every proxied request funnels through the dispatcher;
//! a handful of control endpoints drive generation installs at deploy time.
//!
//! - `ANY /*` (fallback): classify and serve via the strategy dispatcher
//! - `GET /health`
//! - `GET /cache/status`
//! - `POST /cache/install`, `POST /cache/activate`

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::dispatch::Dispatcher;
use crate::cache::lifecycle::{GenerationState, Lifecycle};
use crate::config::Config;
use crate::fetch::OriginRequest;

/// Application state shared across handlers.
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub lifecycle: Arc<Lifecycle>,
    pub config: Arc<Config>,
    pub start_time: Instant,
}

/// Build the axum router with the proxy fallback and control routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/cache/status", get(cache_status))
        .route("/cache/install", post(install))
        .route("/cache/activate", post(activate))
        .fallback(proxy)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

// ─── Control Types ─────────────────────────────────────────────────────────

/// Body for install/activate; omitting it targets the configured generation.
#[derive(Debug, Deserialize)]
pub struct GenerationRequest {
    pub generation: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GenerationResponse {
    pub generation: String,
    pub state: GenerationState,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub active_generation: Option<String>,
    pub entries: usize,
    pub configured_generation: String,
    pub configured_state: GenerationState,
    pub uptime_secs: u64,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: impl std::fmt::Display) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
        .into_response()
}

// ─── Handlers ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn cache_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let active_generation = state.lifecycle.active_generation().await;
    let entries = match state.lifecycle.active_store().await {
        Some(store) => store.len().await,
        None => 0,
    };
    let configured = state.config.cache.generation.clone();
    let configured_state = state.lifecycle.state(&configured).await;

    Json(StatusResponse {
        active_generation,
        entries,
        configured_generation: configured,
        configured_state,
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

async fn install(
    State(state): State<Arc<AppState>>,
    body: Option<Json<GenerationRequest>>,
) -> Response {
    let generation = requested_generation(&state, body);

    match state
        .lifecycle
        .install(&generation, &state.config.shell.assets)
        .await
    {
        Ok(()) => Json(GenerationResponse {
            state: state.lifecycle.state(&generation).await,
            generation,
        })
        .into_response(),
        Err(e) => error_response(StatusCode::BAD_GATEWAY, e),
    }
}

async fn activate(
    State(state): State<Arc<AppState>>,
    body: Option<Json<GenerationRequest>>,
) -> Response {
    let generation = requested_generation(&state, body);

    match state.lifecycle.activate(&generation).await {
        Ok(()) => Json(GenerationResponse {
            state: state.lifecycle.state(&generation).await,
            generation,
        })
        .into_response(),
        Err(e) => error_response(StatusCode::CONFLICT, e),
    }
}

fn requested_generation(state: &AppState, body: Option<Json<GenerationRequest>>) -> String {
    body.and_then(|Json(req)| req.generation)
        .unwrap_or_else(|| state.config.cache.generation.clone())
}

/// Proxy fallback: everything that is not a control route goes through the
/// cache controller.
async fn proxy(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let request_id = Uuid::new_v4();
    let (parts, body) = request.into_parts();

    let url = if parts.uri.scheme().is_some() {
        // Absolute-form target (proxy style): pass through as-is so
        // cross-origin resources can be routed here too.
        parts.uri.to_string()
    } else {
        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        state.config.origin_url(path_and_query)
    };

    let body = match axum::body::to_bytes(body, state.config.server.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => return error_response(StatusCode::PAYLOAD_TOO_LARGE, e),
    };

    let headers = parts
        .headers
        .iter()
        .filter(|(name, _)| !is_hop_by_hop(name.as_str()))
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    let origin_request = OriginRequest {
        method: parts.method.as_str().to_string(),
        url: url.clone(),
        headers,
        body,
    };

    info!(%request_id, method = %parts.method, url = %url, "Proxying request");

    match state.dispatcher.handle(origin_request).await {
        Ok(response) => {
            let mut builder = Response::builder()
                .status(StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY));
            for (name, value) in &response.headers {
                if !is_hop_by_hop(name) && !name.eq_ignore_ascii_case("content-length") {
                    builder = builder.header(name, value);
                }
            }
            builder
                .body(Body::from(response.body))
                .unwrap_or_else(|e| {
                    warn!(%request_id, error = %e, "Failed to assemble proxied response");
                    StatusCode::BAD_GATEWAY.into_response()
                })
        }
        Err(e) => {
            warn!(%request_id, url = %url, error = %e, "Proxy fetch failed");
            error_response(StatusCode::BAD_GATEWAY, e)
        }
    }
}

fn is_hop_by_hop(name: &str) -> bool {
    matches!(
        name.to_ascii_lowercase().as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
            | "host"
    )
}
