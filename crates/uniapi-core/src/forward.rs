use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::response::{IntoResponse, Response};
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use http::header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, StatusCode};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use crate::error::ProxyError;
use crate::transform::HOP_BY_HOP_HEADERS;
use crate::upstream_client::{
    UpstreamBody, UpstreamClient, UpstreamFailure, UpstreamRequest, UpstreamResponse,
    UpstreamTransportErrorKind,
};

/// Capacity of the channel between the upstream reader and the response body.
pub const STREAM_CHANNEL_CAPACITY: usize = 16;

/// Identifies the request in forwarder logs.
#[derive(Debug, Clone, Default)]
pub struct ForwardContext {
    pub trace_id: String,
    pub config_id: String,
    pub model: String,
}

#[derive(Clone)]
pub struct Forwarder {
    client: Arc<dyn UpstreamClient>,
    timeout: Duration,
}

impl std::fmt::Debug for Forwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Forwarder")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Forwarder {
    pub fn new(client: Arc<dyn UpstreamClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Issues `req` upstream. The mode is fixed here and never changes mid-request.
    pub async fn forward(
        &self,
        req: UpstreamRequest,
        is_stream: bool,
        ctx: ForwardContext,
    ) -> Response {
        if is_stream {
            self.forward_stream(req, ctx)
        } else {
            self.forward_buffered(req, ctx).await
        }
    }

    async fn forward_buffered(&self, req: UpstreamRequest, ctx: ForwardContext) -> Response {
        let started_at = Instant::now();
        let outcome = tokio::time::timeout(self.timeout, async {
            let UpstreamResponse {
                status,
                headers,
                body,
            } = self.client.send(req).await?;
            let body = collect_body(body).await?;
            Ok::<_, UpstreamFailure>((status, headers, body))
        })
        .await
        .unwrap_or_else(|_| Err(UpstreamFailure::timeout(self.timeout)));

        let (status, headers, body) = match outcome {
            Ok(parts) => parts,
            Err(failure) => return transport_error(&ctx, failure),
        };

        if let Err(err) = serde_json::from_slice::<serde_json::Value>(&body) {
            let failure = UpstreamFailure::new(
                UpstreamTransportErrorKind::Decode,
                format!("upstream returned a non-JSON body: {err}"),
            );
            return transport_error(&ctx, failure);
        }

        info!(
            event = "upstream_sent",
            trace_id = %ctx.trace_id,
            config_id = %ctx.config_id,
            status = %status.as_u16(),
            elapsed_ms = started_at.elapsed().as_millis(),
            is_stream = false
        );

        let mut resp = Response::new(Body::from(body));
        *resp.status_mut() = status;
        *resp.headers_mut() = relay_headers(headers);
        if !resp.headers().contains_key(CONTENT_TYPE) {
            resp.headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        resp
    }

    fn forward_stream(&self, req: UpstreamRequest, ctx: ForwardContext) -> Response {
        let (tx, rx) = mpsc::channel::<Bytes>(STREAM_CHANNEL_CAPACITY);
        tokio::spawn(relay_stream(self.client.clone(), req, self.timeout, tx, ctx));

        let body = ReceiverStream::new(rx).map(Ok::<_, Infallible>);
        let mut resp = Response::new(Body::from_stream(body));
        *resp.status_mut() = StatusCode::OK;
        resp.headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
        resp.headers_mut()
            .insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        resp
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamOutcome {
    Completed,
    UpstreamError,
    Failed,
    ClientGone,
}

impl StreamOutcome {
    fn as_str(self) -> &'static str {
        match self {
            StreamOutcome::Completed => "completed",
            StreamOutcome::UpstreamError => "upstream_error",
            StreamOutcome::Failed => "failed",
            StreamOutcome::ClientGone => "client_gone",
        }
    }
}

async fn relay_stream(
    client: Arc<dyn UpstreamClient>,
    req: UpstreamRequest,
    timeout: Duration,
    tx: mpsc::Sender<Bytes>,
    ctx: ForwardContext,
) {
    let started_at = Instant::now();
    let mut forwarded = 0usize;
    let outcome = relay_stream_inner(client, req, timeout, &tx, &ctx, &mut forwarded).await;
    info!(
        event = "stream_closed",
        trace_id = %ctx.trace_id,
        config_id = %ctx.config_id,
        outcome = outcome.as_str(),
        bytes = forwarded,
        elapsed_ms = started_at.elapsed().as_millis()
    );
}

async fn relay_stream_inner(
    client: Arc<dyn UpstreamClient>,
    req: UpstreamRequest,
    timeout: Duration,
    tx: &mpsc::Sender<Bytes>,
    ctx: &ForwardContext,
    forwarded: &mut usize,
) -> StreamOutcome {
    let sent = tokio::select! {
        _ = tx.closed() => return StreamOutcome::ClientGone,
        sent = tokio::time::timeout(timeout, client.send(req)) => sent,
    };
    let resp = match sent {
        Ok(Ok(resp)) => resp,
        Ok(Err(failure)) => return emit_failure(tx, ctx, failure).await,
        Err(_) => return emit_failure(tx, ctx, UpstreamFailure::timeout(timeout)).await,
    };

    info!(
        event = "upstream_sent",
        trace_id = %ctx.trace_id,
        config_id = %ctx.config_id,
        status = %resp.status.as_u16(),
        is_stream = true
    );

    if !resp.status.is_success() {
        let status = resp.status;
        let collected = tokio::select! {
            _ = tx.closed() => return StreamOutcome::ClientGone,
            collected = tokio::time::timeout(timeout, collect_body(resp.body)) => collected,
        };
        let body = match collected {
            Ok(Ok(body)) => body,
            Ok(Err(failure)) => return emit_failure(tx, ctx, failure).await,
            Err(_) => return emit_failure(tx, ctx, UpstreamFailure::timeout(timeout)).await,
        };
        warn!(
            trace_id = %ctx.trace_id,
            config_id = %ctx.config_id,
            model = %ctx.model,
            status = %status.as_u16(),
            "upstream rejected stream request"
        );
        *forwarded += body.len();
        if !body.is_empty() && tx.send(body).await.is_err() {
            return StreamOutcome::ClientGone;
        }
        return StreamOutcome::UpstreamError;
    }

    let mut body = resp.body;
    loop {
        let next = tokio::select! {
            _ = tx.closed() => return StreamOutcome::ClientGone,
            next = body.next() => next,
        };
        match next {
            None => return StreamOutcome::Completed,
            Some(Ok(chunk)) => {
                if chunk.is_empty() {
                    continue;
                }
                let len = chunk.len();
                if tx.send(chunk).await.is_err() {
                    return StreamOutcome::ClientGone;
                }
                *forwarded += len;
            }
            Some(Err(failure)) => {
                drop(body);
                return emit_failure(tx, ctx, failure).await;
            }
        }
    }
}

async fn emit_failure(
    tx: &mpsc::Sender<Bytes>,
    ctx: &ForwardContext,
    failure: UpstreamFailure,
) -> StreamOutcome {
    warn!(
        trace_id = %ctx.trace_id,
        config_id = %ctx.config_id,
        model = %ctx.model,
        kind = failure.kind.as_str(),
        error = %failure.message,
        "upstream stream failed"
    );
    if tx.send(sse_error_frame(&failure.message)).await.is_err() {
        return StreamOutcome::ClientGone;
    }
    StreamOutcome::Failed
}

/// `data: {"error":"stream error: <message>"}` followed by a blank line.
pub fn sse_error_frame(message: &str) -> Bytes {
    let payload = serde_json::json!({ "error": format!("stream error: {message}") });
    Bytes::from(format!("data: {payload}\n\n"))
}

async fn collect_body(mut body: UpstreamBody) -> Result<Bytes, UpstreamFailure> {
    let mut out = BytesMut::new();
    while let Some(chunk) = body.next().await {
        out.extend_from_slice(&chunk?);
    }
    Ok(out.freeze())
}

fn relay_headers(mut headers: HeaderMap) -> HeaderMap {
    headers.remove(CONTENT_LENGTH);
    for name in HOP_BY_HOP_HEADERS {
        headers.remove(*name);
    }
    headers
}

fn transport_error(ctx: &ForwardContext, failure: UpstreamFailure) -> Response {
    warn!(
        trace_id = %ctx.trace_id,
        config_id = %ctx.config_id,
        model = %ctx.model,
        kind = failure.kind.as_str(),
        error = %failure.message,
        "upstream request failed"
    );
    ProxyError::bad_gateway(format!("upstream {}", failure.kind), failure.message).into_response()
}
