//! AWS Lambda adapter (API Gateway proxy events through `lambda_http`).

use std::sync::Arc;
use std::time::Duration;

use lambda_http::{service_fn, Body, Request, RequestExt, Response};

use crate::handler::{Handler, InboundRequest};

/// Serve invocations until the runtime shuts the process down.
pub async fn run(handler: Arc<Handler>) -> anyhow::Result<()> {
    tracing::info!(deployment = %handler.deployment(), "lambda runtime starting");
    lambda_http::run(service_fn(move |event: Request| {
        let handler = Arc::clone(&handler);
        async move { Ok::<_, lambda_http::Error>(respond(&handler, event).await) }
    }))
    .await
    .map_err(|e| anyhow::anyhow!("lambda runtime failed: {e}"))
}

/// Handle one invocation. The notification is sent before returning: the
/// runtime freezes the sandbox as soon as the response is handed back.
pub async fn respond(handler: &Handler, event: Request) -> Response<Body> {
    let deadline = remaining_time(&event);
    let (parts, body) = event.into_parts();
    let request = InboundRequest::from_parts(parts.method.as_str(), &parts.headers, body.to_vec());
    handler.handle_and_notify(request, deadline).await.into_http()
}

/// Time left before the platform kills this invocation.
fn remaining_time(event: &Request) -> Option<Duration> {
    let deadline_ms = event.lambda_context_ref()?.deadline;
    let now_ms = u64::try_from(chrono::Utc::now().timestamp_millis()).ok()?;
    Some(Duration::from_millis(deadline_ms.saturating_sub(now_ms)))
}
