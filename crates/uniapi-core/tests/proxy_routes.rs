mod common;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use http::header::{AUTHORIZATION, CONTENT_LENGTH};
use http::{Method, Request, StatusCode};
use tower::ServiceExt;
use uniapi_config::{ConfigSnapshot, GlobalModelMapping, MemoryConfigProvider, VendorConfig};
use uniapi_core::{AuthGate, AuthKeys, Core, Forwarder, ModelResolver, REQUEST_ID_HEADER};

use common::{Reply, ScriptedClient};

fn vendor(id: &str, vendor: &str, base_url: &str, models: &[&str]) -> VendorConfig {
    VendorConfig {
        id: id.to_string(),
        api_key: format!("sk-{id}"),
        base_url: base_url.to_string(),
        models: models.iter().map(|model| model.to_string()).collect(),
        vendor: vendor.to_string(),
        model_mappings: BTreeMap::new(),
        created_at: "2026-01-01T00:00:00Z".to_string(),
    }
}

struct Harness {
    router: Router,
    client: Arc<ScriptedClient>,
}

fn harness(snapshot: ConfigSnapshot, keys: AuthKeys, replies: Vec<Reply>) -> Harness {
    let client = Arc::new(ScriptedClient::new(replies));
    let core = Core::new(
        Arc::new(MemoryConfigProvider::from_snapshot(snapshot)),
        ModelResolver::default(),
        Forwarder::new(client.clone(), Duration::from_secs(5)),
        Arc::new(AuthGate::new(keys)),
    );
    Harness {
        router: core.router(),
        client,
    }
}

fn keys() -> AuthKeys {
    AuthKeys::new(Some("admin-key".to_string()), ["client-key".to_string()])
}

fn chat(token: Option<&str>, path: &str, body: impl Into<Body>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(path)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(body.into()).unwrap()
}

async fn json(resp: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn no_configured_keys_rejects_before_upstream() {
    let harness = harness(
        ConfigSnapshot {
            configs: vec![vendor("a", "a.example", "https://a.example/", &["gpt-x"])],
            mappings: HashMap::new(),
        },
        AuthKeys::default(),
        vec![],
    );
    let resp = harness
        .router
        .oneshot(chat(Some("anything"), "/v1/chat/completions", r#"{"model":"gpt-x"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(harness.client.requests().is_empty());
}

#[tokio::test]
async fn missing_or_unknown_token_is_unauthorized() {
    for token in [None, Some("wrong")] {
        let harness = harness(ConfigSnapshot::default(), keys(), vec![]);
        let resp = harness
            .router
            .oneshot(chat(token, "/v1/chat/completions", r#"{"model":"gpt-x"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let value = json(resp).await;
        assert_eq!(value["error"], "unauthorized");
        assert!(harness.client.requests().is_empty());
    }
}

#[tokio::test]
async fn direct_match_rewrites_url_and_auth() {
    let harness = harness(
        ConfigSnapshot {
            configs: vec![vendor("a", "a.example", "https://a.example/", &["gpt-x"])],
            mappings: HashMap::new(),
        },
        keys(),
        vec![Reply::json(StatusCode::OK, r#"{"id":"cmpl-1"}"#)],
    );
    let body = r#"{"model":"gpt-x","messages":[]}"#;
    let resp = harness
        .router
        .oneshot(chat(Some("client-key"), "/v1/chat/completions", body))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().contains_key(REQUEST_ID_HEADER));
    assert_eq!(json(resp).await["id"], "cmpl-1");

    let sent = harness.client.requests();
    assert_eq!(sent.len(), 1);
    let sent = &sent[0];
    assert_eq!(sent.method, Method::POST);
    assert_eq!(sent.url, "https://a.example/chat/completions");
    assert_eq!(sent.body, body.as_bytes());
    let auth: Vec<_> = sent.headers.get_all(AUTHORIZATION).iter().collect();
    assert_eq!(auth, vec!["Bearer sk-a"]);
    assert_eq!(sent.headers[CONTENT_LENGTH], body.len().to_string().as_str());
}

#[tokio::test]
async fn global_mapping_rewrites_body_model() {
    let mapping = GlobalModelMapping {
        unified_name: "chat-fast".to_string(),
        vendor_models: [("vendor-b".to_string(), "b-turbo".to_string())].into(),
    };
    let harness = harness(
        ConfigSnapshot {
            configs: vec![vendor("b", "vendor-b", "https://b.example", &["b-turbo"])],
            mappings: [("chat-fast".to_string(), mapping)].into(),
        },
        keys(),
        vec![Reply::json(StatusCode::OK, r#"{"ok":true}"#)],
    );
    let resp = harness
        .router
        .oneshot(chat(
            Some("admin-key"),
            "/v1/chat/completions",
            r#"{"model":"chat-fast","temperature":0.5}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let sent = harness.client.requests();
    assert_eq!(sent[0].url, "https://b.example/v1/chat/completions");
    let value: serde_json::Value = serde_json::from_slice(&sent[0].body).unwrap();
    assert_eq!(value["model"], "b-turbo");
    assert_eq!(value["temperature"], 0.5);
    assert_eq!(
        sent[0].headers[CONTENT_LENGTH],
        sent[0].body.len().to_string().as_str()
    );
}

#[tokio::test]
async fn unknown_model_is_not_found() {
    let harness = harness(ConfigSnapshot::default(), keys(), vec![]);
    let resp = harness
        .router
        .oneshot(chat(Some("client-key"), "/v1/chat/completions", r#"{"model":"nope"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(json(resp).await["error"], "model not found");
    assert!(harness.client.requests().is_empty());
}

#[tokio::test]
async fn missing_model_is_bad_request() {
    for body in ["", r#"{"messages":[]}"#] {
        let harness = harness(ConfigSnapshot::default(), keys(), vec![]);
        let resp = harness
            .router
            .oneshot(chat(Some("client-key"), "/v1/chat/completions", body))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(resp).await["message"], "no model specified in request");
    }
}

#[tokio::test]
async fn other_v1_paths_are_not_found() {
    let harness = harness(ConfigSnapshot::default(), keys(), vec![]);
    let resp = harness
        .router
        .oneshot(chat(Some("client-key"), "/v1/embeddings", r#"{"model":"gpt-x"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert!(harness.client.requests().is_empty());
}

#[tokio::test]
async fn stream_flag_selects_event_stream() {
    let harness = harness(
        ConfigSnapshot {
            configs: vec![vendor("a", "a.example", "https://a.example/", &["gpt-x"])],
            mappings: HashMap::new(),
        },
        keys(),
        vec![Reply::chunks(
            StatusCode::OK,
            vec![Ok(bytes::Bytes::from_static(b"data: [DONE]\n\n"))],
        )],
    );
    let resp = harness
        .router
        .oneshot(chat(
            Some("client-key"),
            "/v1/chat/completions",
            r#"{"model":"gpt-x","stream":true}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["content-type"], "text/event-stream");
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"data: [DONE]\n\n");
}

#[tokio::test]
async fn large_chat_body_reaches_the_vendor() {
    let harness = harness(
        ConfigSnapshot {
            configs: vec![vendor("a", "a.example", "https://a.example/", &["gpt-x"])],
            mappings: HashMap::new(),
        },
        keys(),
        vec![],
    );
    let body = format!(r#"{{"model":"gpt-x","pad":"{}"}}"#, "x".repeat(3 * 1024 * 1024));
    let sent = body.len();
    let resp = harness
        .router
        .oneshot(chat(Some("client-key"), "/v1/chat/completions", body))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let requests = harness.client.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].body.len(), sent);
}
