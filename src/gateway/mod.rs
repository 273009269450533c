//! Local axum gateway with body limits and timeouts.
//!
//! Serves the same handler as the Lambda adapter so a signed request can be
//! replayed against a workstation or a staging box:
//! - `POST /event` runs the full handler
//! - `GET /health` reports liveness and the deployment
//!
//! Request bodies are capped at 64KB and every request is bounded by a
//! timeout, matching what API Gateway enforces in production.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{any, get},
    Router,
};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

use crate::handler::{Handler, InboundRequest};

/// Maximum request body size (64KB). Slack payloads are far smaller.
pub const MAX_BODY_SIZE: usize = 65_536;
/// Request timeout. Longer than the handler deadline so the handler answers first.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Shared state for all axum handlers
#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<Handler>,
}

/// Build the router with middleware.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/event", any(handle_event))
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        ))
}

/// Run the HTTP gateway until the process is interrupted.
pub async fn run_gateway(host: &str, port: u16, handler: Arc<Handler>) -> Result<()> {
    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_port = listener.local_addr()?.port();

    tracing::info!(
        deployment = %handler.deployment(),
        "gateway listening on http://{host}:{actual_port} (POST /event, GET /health)"
    );

    let app = router(AppState { handler });
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down gateway");
}

// ══════════════════════════════════════════════════════════════════════════════
// AXUM HANDLERS
// ══════════════════════════════════════════════════════════════════════════════

/// GET /health: liveness, no secrets.
async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "deployment": state.handler.deployment().as_str(),
    }))
}

/// ANY /event: non-POST methods get a 405 from the handler.
async fn handle_event(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = InboundRequest::from_parts(method.as_str(), &headers, body.to_vec());
    let mut response = state.handler.handle(request, None).await;

    // The process outlives the request here, so the chat post runs in the background.
    if let Some(notification) = response.notification.take() {
        let handler = Arc::clone(&state.handler);
        tokio::spawn(async move { handler.deliver(Some(notification)).await });
    }

    response.into_http::<axum::body::Body>().into_response()
}
