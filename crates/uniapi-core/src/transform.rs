use bytes::Bytes;
use http::header::{ACCEPT_ENCODING, AUTHORIZATION, CONTENT_LENGTH, HOST};
use http::{HeaderMap, HeaderValue};
use serde_json::{Map, Value};
use uniapi_config::VendorConfig;

use crate::error::ProxyError;

/// Hop-by-hop headers, never forwarded in either direction.
pub const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

/// Inbound chat-completion body, parsed once.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    raw: Bytes,
    json: Map<String, Value>,
    pub model: String,
    pub stream: bool,
}

impl ChatRequest {
    pub fn parse(body: Bytes) -> Result<Self, ProxyError> {
        let json = if body.is_empty() {
            Map::new()
        } else {
            match serde_json::from_slice::<Value>(&body) {
                Ok(Value::Object(map)) => map,
                Ok(_) => return Err(ProxyError::bad_request("request body must be a JSON object")),
                Err(err) => {
                    return Err(ProxyError::bad_request(format!(
                        "request body is not valid JSON: {err}"
                    )));
                }
            }
        };

        let model = json
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if model.is_empty() {
            return Err(ProxyError::bad_request("no model specified in request"));
        }
        let stream = json.get("stream").and_then(Value::as_bool).unwrap_or(false);

        Ok(Self {
            raw: body,
            json,
            model,
            stream,
        })
    }

    /// The body to send upstream: untouched when the model already matches.
    pub fn body_for(&self, actual_model: &str) -> Result<Bytes, ProxyError> {
        if self.model == actual_model {
            return Ok(self.raw.clone());
        }
        let mut json = self.json.clone();
        json.insert("model".to_string(), Value::String(actual_model.to_string()));
        serde_json::to_vec(&json)
            .map(Bytes::from)
            .map_err(|err| ProxyError::internal(format!("re-encode request body: {err}")))
    }
}

#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

pub fn prepare(
    inbound_headers: &HeaderMap,
    request: &ChatRequest,
    config: &VendorConfig,
    actual_model: &str,
) -> Result<PreparedRequest, ProxyError> {
    let body = request.body_for(actual_model)?;
    let headers = rewrite_headers(inbound_headers, &body, &config.api_key)?;
    Ok(PreparedRequest {
        url: target_url(&config.base_url),
        headers,
        body,
    })
}

/// Outbound headers: inbound minus host, auth, length and hop-by-hop, plus vendor auth and exact length.
pub fn rewrite_headers(
    inbound: &HeaderMap,
    body: &[u8],
    api_key: &str,
) -> Result<HeaderMap, ProxyError> {
    let mut headers = inbound.clone();
    headers.remove(HOST);
    headers.remove(AUTHORIZATION);
    headers.remove(CONTENT_LENGTH);
    headers.remove(ACCEPT_ENCODING);
    for name in HOP_BY_HOP_HEADERS {
        headers.remove(*name);
    }

    if !body.is_empty() {
        headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
    }
    let mut auth = HeaderValue::from_str(&format!("Bearer {api_key}"))
        .map_err(|_| ProxyError::internal("vendor api key is not a valid header value"))?;
    auth.set_sensitive(true);
    headers.insert(AUTHORIZATION, auth);
    Ok(headers)
}

/// `base#` is used verbatim, `base/` gets `chat/completions`, anything else `/v1/chat/completions`.
pub fn target_url(base_url: &str) -> String {
    if let Some(literal) = base_url.strip_suffix('#') {
        literal.to_string()
    } else if base_url.ends_with('/') {
        format!("{base_url}chat/completions")
    } else {
        format!("{base_url}/v1/chat/completions")
    }
}
