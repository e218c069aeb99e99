use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use wreq::{Client, Proxy, redirect};

use uniapi_common::GlobalConfig;

pub type UpstreamBody = Pin<Box<dyn Stream<Item = Result<Bytes, UpstreamFailure>> + Send>>;

pub trait UpstreamClient: Send + Sync {
    /// Resolves once the upstream status line and headers arrive; the body streams after.
    fn send<'a>(
        &'a self,
        req: UpstreamRequest,
    ) -> Pin<Box<dyn Future<Output = Result<UpstreamResponse, UpstreamFailure>> + Send + 'a>>;
}

#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Dropping the body releases the upstream connection.
    pub body: UpstreamBody,
}

impl fmt::Debug for UpstreamResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body", &"<stream>")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamTransportErrorKind {
    Timeout,
    Connect,
    Dns,
    Tls,
    Decode,
    Other,
}

impl UpstreamTransportErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            UpstreamTransportErrorKind::Timeout => "timeout",
            UpstreamTransportErrorKind::Connect => "connect",
            UpstreamTransportErrorKind::Dns => "dns",
            UpstreamTransportErrorKind::Tls => "tls",
            UpstreamTransportErrorKind::Decode => "decode",
            UpstreamTransportErrorKind::Other => "other",
        }
    }
}

impl fmt::Display for UpstreamTransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct UpstreamFailure {
    pub kind: UpstreamTransportErrorKind,
    pub message: String,
}

impl UpstreamFailure {
    pub fn new(kind: UpstreamTransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(
            UpstreamTransportErrorKind::Timeout,
            format!("no upstream response within {:.1}s", after.as_secs_f64()),
        )
    }
}

#[derive(Debug, Clone)]
pub struct UpstreamClientConfig {
    pub proxy: Option<String>,
    pub connect_timeout: Duration,
}

impl UpstreamClientConfig {
    pub fn from_global(global: &GlobalConfig) -> Self {
        Self {
            proxy: global.proxy.clone(),
            connect_timeout: global.timeout(),
        }
    }
}

impl Default for UpstreamClientConfig {
    fn default() -> Self {
        Self {
            proxy: None,
            connect_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Clone)]
pub struct WreqUpstreamClient {
    client: Client,
}

impl fmt::Debug for WreqUpstreamClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WreqUpstreamClient").finish_non_exhaustive()
    }
}

impl WreqUpstreamClient {
    pub fn new(config: UpstreamClientConfig) -> Result<Self, wreq::Error> {
        let proxy = normalize_proxy(config.proxy.clone());
        Ok(Self {
            client: build_client(&config, proxy.as_deref())?,
        })
    }
}

fn normalize_proxy(value: Option<String>) -> Option<String> {
    value
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
}

const MAX_REDIRECTS: usize = 10;

// No client-wide deadline: it would also cut long-lived streams. The forwarder
// bounds the call itself.
fn build_client(config: &UpstreamClientConfig, proxy: Option<&str>) -> Result<Client, wreq::Error> {
    let mut builder = Client::builder()
        .connect_timeout(config.connect_timeout)
        .redirect(redirect::Policy::limited(MAX_REDIRECTS));

    if let Some(proxy) = proxy {
        builder = builder.proxy(Proxy::all(proxy)?);
    }

    builder.build()
}

impl UpstreamClient for WreqUpstreamClient {
    fn send<'a>(
        &'a self,
        req: UpstreamRequest,
    ) -> Pin<Box<dyn Future<Output = Result<UpstreamResponse, UpstreamFailure>> + Send + 'a>>
    {
        Box::pin(async move {
            let method = wreq::Method::from_bytes(req.method.as_str().as_bytes()).map_err(|err| {
                UpstreamFailure::new(UpstreamTransportErrorKind::Other, err.to_string())
            })?;
            let mut builder = self.client.request(method, &req.url);

            for (name, value) in &req.headers {
                builder = builder.header(name.as_str(), value.as_bytes());
            }

            if !req.body.is_empty() {
                builder = builder.body(req.body);
            }

            let resp = builder.send().await.map_err(map_wreq_error)?;
            convert_response(resp)
        })
    }
}

fn convert_response(resp: wreq::Response) -> Result<UpstreamResponse, UpstreamFailure> {
    let status = StatusCode::from_u16(resp.status().as_u16()).map_err(|err| {
        UpstreamFailure::new(UpstreamTransportErrorKind::Decode, err.to_string())
    })?;
    let headers = headers_from_wreq(resp.headers());
    let body = resp
        .bytes_stream()
        .map(|item| item.map_err(map_wreq_error));

    Ok(UpstreamResponse {
        status,
        headers,
        body: Box::pin(body),
    })
}

fn headers_from_wreq(map: &wreq::header::HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(map.len());
    for (k, v) in map {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(k.as_str().as_bytes()),
            HeaderValue::from_bytes(v.as_bytes()),
        ) {
            out.append(name, value);
        }
    }
    out
}

fn map_wreq_error(err: wreq::Error) -> UpstreamFailure {
    let kind = classify_wreq_error(&err);
    UpstreamFailure::new(kind, err.to_string())
}

fn classify_wreq_error(err: &wreq::Error) -> UpstreamTransportErrorKind {
    let message = err.to_string().to_ascii_lowercase();
    if err.is_timeout() {
        return UpstreamTransportErrorKind::Timeout;
    }
    if err.is_connect() {
        if message.contains("dns") || message.contains("resolve") {
            return UpstreamTransportErrorKind::Dns;
        }
        if message.contains("tls") || message.contains("ssl") {
            return UpstreamTransportErrorKind::Tls;
        }
        return UpstreamTransportErrorKind::Connect;
    }
    if err.is_connection_reset() {
        return UpstreamTransportErrorKind::Connect;
    }
    if message.contains("tls") || message.contains("ssl") {
        return UpstreamTransportErrorKind::Tls;
    }
    if message.contains("decode") {
        return UpstreamTransportErrorKind::Decode;
    }
    UpstreamTransportErrorKind::Other
}
