use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, Request, State};
use axum::http::{HeaderMap, HeaderValue, Method};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::AuthGate;
use crate::core::CoreState;
use crate::error::ProxyError;
use crate::forward::ForwardContext;
use crate::resolver::ResolveError;
use crate::transform::{ChatRequest, prepare};
use crate::upstream_client::UpstreamRequest;

pub const REQUEST_ID_HEADER: &str = "x-uniapi-request-id";

/// The only path served under `/v1`.
pub const CHAT_COMPLETIONS_PATH: &str = "chat/completions";

/// Rejects the request before any handler runs unless the gate admits it.
/// The admitted [`crate::auth::Role`] is stored in the request extensions.
pub async fn auth_middleware(
    State(gate): State<Arc<AuthGate>>,
    mut req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();
    match gate.authenticate_headers(req.headers(), &path) {
        Ok(role) => {
            req.extensions_mut().insert(role);
            next.run(req).await
        }
        Err(err) => {
            warn!(path = %path, error = %err, "request rejected by auth gate");
            ProxyError::from(err).into_response()
        }
    }
}

pub async fn proxy_handler(
    State(state): State<Arc<CoreState>>,
    Path(path): Path<String>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let trace_id = Uuid::new_v4().to_string();
    let started_at = Instant::now();
    let mut resp = handle(&state, &trace_id, &path, method, headers, body).await;
    info!(
        event = "downstream_responded",
        trace_id = %trace_id,
        path = %path,
        status = %resp.status().as_u16(),
        elapsed_ms = started_at.elapsed().as_millis()
    );
    if let Ok(value) = HeaderValue::from_str(&trace_id) {
        resp.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    resp
}

async fn handle(
    state: &CoreState,
    trace_id: &str,
    path: &str,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if path != CHAT_COMPLETIONS_PATH {
        return ProxyError::not_found("not found", format!("unsupported path: /v1/{path}"))
            .into_response();
    }

    let request = match ChatRequest::parse(body) {
        Ok(request) => request,
        Err(err) => return err.into_response(),
    };
    info!(
        event = "downstream_received",
        trace_id = %trace_id,
        method = %method,
        path = %path,
        model = %request.model,
        is_stream = request.stream
    );

    let resolution = match state
        .resolver
        .lookup(state.configs.as_ref(), &request.model)
        .await
    {
        Ok(resolution) => resolution,
        Err(ResolveError::NotFound(model)) => {
            warn!(trace_id = %trace_id, model = %model, path = %path, "no config supports model");
            return ProxyError::not_found(
                "model not found",
                format!("no config supports model {model}"),
            )
            .into_response();
        }
        Err(ResolveError::Config(err)) => {
            error!(trace_id = %trace_id, model = %request.model, error = %err, "config provider read failed");
            return ProxyError::internal(err.to_string()).into_response();
        }
    };
    info!(
        event = "model_resolved",
        trace_id = %trace_id,
        model = %request.model,
        actual_model = %resolution.actual_model,
        config_id = %resolution.config.id,
        vendor = %resolution.config.vendor,
        tier = resolution.tier.as_str(),
        candidates = resolution.candidates
    );

    let prepared = match prepare(
        &headers,
        &request,
        &resolution.config,
        &resolution.actual_model,
    ) {
        Ok(prepared) => prepared,
        Err(err) => {
            error!(
                trace_id = %trace_id,
                config_id = %resolution.config.id,
                error = %err.message,
                "failed to build upstream request"
            );
            return err.into_response();
        }
    };

    let upstream = UpstreamRequest {
        method,
        url: prepared.url,
        headers: prepared.headers,
        body: prepared.body,
    };
    let ctx = ForwardContext {
        trace_id: trace_id.to_string(),
        config_id: resolution.config.id.clone(),
        model: request.model.clone(),
    };
    state.forwarder.forward(upstream, request.stream, ctx).await
}
