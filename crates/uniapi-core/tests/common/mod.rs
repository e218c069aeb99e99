#![allow(dead_code)]

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::stream;
use futures_util::{Stream, StreamExt};
use http::{HeaderMap, StatusCode};
use tokio::sync::oneshot;
use uniapi_core::{UpstreamBody, UpstreamClient, UpstreamFailure, UpstreamRequest, UpstreamResponse};

pub enum Reply {
    Respond {
        status: StatusCode,
        headers: HeaderMap,
        body: UpstreamBody,
    },
    Fail(UpstreamFailure),
    /// Never answers.
    Hang,
    /// Never answers; the sender fires once the pending call is dropped.
    HangUntilDropped(oneshot::Sender<()>),
}

impl Reply {
    pub fn json(status: StatusCode, body: &'static str) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", "application/json".parse().unwrap());
        Reply::Respond {
            status,
            headers,
            body: body_of(vec![Ok(Bytes::from_static(body.as_bytes()))]),
        }
    }

    pub fn chunks(status: StatusCode, chunks: Vec<Result<Bytes, UpstreamFailure>>) -> Self {
        Reply::Respond {
            status,
            headers: HeaderMap::new(),
            body: body_of(chunks),
        }
    }
}

pub fn body_of(chunks: Vec<Result<Bytes, UpstreamFailure>>) -> UpstreamBody {
    Box::pin(stream::iter(chunks))
}

/// Yields `chunks`, then stays open forever. `dropped` fires when the body is released.
pub fn open_body(chunks: Vec<Bytes>, dropped: oneshot::Sender<()>) -> UpstreamBody {
    let inner = stream::iter(chunks.into_iter().map(Ok))
        .chain(stream::pending::<Result<Bytes, UpstreamFailure>>());
    Box::pin(Guarded {
        inner: Box::pin(inner),
        _signal: DropSignal(Some(dropped)),
    })
}

struct Guarded {
    inner: UpstreamBody,
    _signal: DropSignal,
}

impl Stream for Guarded {
    type Item = Result<Bytes, UpstreamFailure>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

struct DropSignal(Option<oneshot::Sender<()>>);

impl Drop for DropSignal {
    fn drop(&mut self) {
        if let Some(tx) = self.0.take() {
            let _ = tx.send(());
        }
    }
}

/// Answers each call with the next scripted reply and records what it was sent.
#[derive(Default)]
pub struct ScriptedClient {
    replies: Mutex<VecDeque<Reply>>,
    seen: Mutex<Vec<UpstreamRequest>>,
}

impl ScriptedClient {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<UpstreamRequest> {
        self.seen.lock().unwrap().clone()
    }
}

impl UpstreamClient for ScriptedClient {
    fn send<'a>(
        &'a self,
        req: UpstreamRequest,
    ) -> Pin<Box<dyn Future<Output = Result<UpstreamResponse, UpstreamFailure>> + Send + 'a>>
    {
        self.seen.lock().unwrap().push(req);
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Reply::json(StatusCode::OK, r#"{"ok":true}"#));
        Box::pin(async move {
            match reply {
                Reply::Respond {
                    status,
                    headers,
                    body,
                } => Ok(UpstreamResponse {
                    status,
                    headers,
                    body,
                }),
                Reply::Fail(failure) => Err(failure),
                Reply::Hang => std::future::pending().await,
                Reply::HangUntilDropped(dropped) => {
                    let _signal = DropSignal(Some(dropped));
                    std::future::pending().await
                }
            }
        })
    }
}
