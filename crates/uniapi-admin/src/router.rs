use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get};
use axum::{Json, Router};
use serde_json::json;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{info, warn};

use uniapi_config::{ConfigError, ConfigStore, GlobalModelMapping, VendorConfigInput};
use uniapi_core::{AuthGate, ModelResolver, ProxyError, ResolveError, auth_middleware};

#[derive(Clone)]
pub struct AdminState {
    pub store: Arc<dyn ConfigStore>,
    pub resolver: ModelResolver,
}

/// `/health` is public; every other route sits behind `auth`.
pub fn router(store: Arc<dyn ConfigStore>, resolver: ModelResolver, auth: Arc<AuthGate>) -> Router {
    let state = AdminState { store, resolver };

    let protected = Router::new()
        .route("/api/configs", get(list_configs).post(create_config))
        .route(
            "/api/configs/{id}",
            get(get_config).put(update_config).delete(delete_config),
        )
        .route("/api/model-mappings", get(list_mappings).post(put_mapping))
        .route("/api/model-mappings/{unified_name}", delete(delete_mapping))
        .route("/api/debug/model-mapping/{model}", get(debug_model_mapping))
        .route_layer(middleware::from_fn_with_state(auth, auth_middleware))
        .with_state(state);

    Router::new().route("/health", get(health)).merge(protected)
}

async fn health() -> impl IntoResponse {
    let now = OffsetDateTime::now_utc();
    let timestamp = now
        .format(&Rfc3339)
        .unwrap_or_else(|_| now.unix_timestamp().to_string());
    (
        StatusCode::OK,
        Json(json!({ "status": "healthy", "timestamp": timestamp })),
    )
}

async fn list_configs(State(state): State<AdminState>) -> Response {
    match state.store.list_configs().await {
        Ok(configs) => {
            let configs: Vec<_> = configs.iter().map(|config| config.masked()).collect();
            Json(json!({ "configs": configs })).into_response()
        }
        Err(err) => config_error(err),
    }
}

async fn get_config(State(state): State<AdminState>, Path(id): Path<String>) -> Response {
    match state.store.get_config(&id).await {
        Ok(Some(config)) => Json(config.masked()).into_response(),
        Ok(None) => config_error(ConfigError::NotFound(id)),
        Err(err) => config_error(err),
    }
}

async fn create_config(
    State(state): State<AdminState>,
    Json(input): Json<VendorConfigInput>,
) -> Response {
    match state.store.create_config(input).await {
        Ok(config) => {
            info!(config_id = %config.id, vendor = %config.vendor, "config created");
            Json(json!({ "message": "config created", "config_id": config.id })).into_response()
        }
        Err(err) => config_error(err),
    }
}

async fn update_config(
    State(state): State<AdminState>,
    Path(id): Path<String>,
    Json(input): Json<VendorConfigInput>,
) -> Response {
    match state.store.update_config(&id, input).await {
        Ok(config) => {
            info!(config_id = %config.id, vendor = %config.vendor, "config updated");
            Json(json!({ "message": "config updated", "config_id": config.id })).into_response()
        }
        Err(err) => config_error(err),
    }
}

async fn delete_config(State(state): State<AdminState>, Path(id): Path<String>) -> Response {
    match state.store.delete_config(&id).await {
        Ok(()) => {
            info!(config_id = %id, "config deleted");
            Json(json!({ "message": "config deleted" })).into_response()
        }
        Err(err) => config_error(err),
    }
}

async fn list_mappings(State(state): State<AdminState>) -> Response {
    match state.store.get_global_mappings().await {
        Ok(mappings) => Json(json!({ "mappings": mappings_view(mappings) })).into_response(),
        Err(err) => config_error(err),
    }
}

fn mappings_view(
    mappings: HashMap<String, GlobalModelMapping>,
) -> BTreeMap<String, BTreeMap<String, String>> {
    mappings
        .into_iter()
        .map(|(name, mapping)| (name, mapping.vendor_models))
        .collect()
}

async fn put_mapping(
    State(state): State<AdminState>,
    Json(mapping): Json<GlobalModelMapping>,
) -> Response {
    if mapping.unified_name.trim().is_empty() {
        return ProxyError::bad_request("unified_name must not be empty").into_response();
    }
    let name = mapping.unified_name.clone();
    match state.store.put_mapping(mapping).await {
        Ok(()) => {
            info!(unified_name = %name, "model mapping stored");
            Json(json!({ "message": format!("model mapping stored: {name}") })).into_response()
        }
        Err(err) => config_error(err),
    }
}

async fn delete_mapping(
    State(state): State<AdminState>,
    Path(unified_name): Path<String>,
) -> Response {
    match state.store.delete_mapping(&unified_name).await {
        Ok(()) => {
            info!(unified_name = %unified_name, "model mapping deleted");
            Json(json!({ "message": format!("model mapping deleted: {unified_name}") }))
                .into_response()
        }
        Err(err) => config_error(err),
    }
}

/// Shows where `model` would route right now without sending anything upstream.
async fn debug_model_mapping(
    State(state): State<AdminState>,
    Path(model): Path<String>,
) -> Response {
    match state.resolver.lookup(state.store.as_ref(), &model).await {
        Ok(resolution) => Json(json!({
            "model": model,
            "mapped_model": resolution.actual_model,
            "tier": resolution.tier,
            "config": {
                "id": resolution.config.id,
                "base_url": resolution.config.base_url,
            },
        }))
        .into_response(),
        Err(ResolveError::NotFound(model)) => {
            warn!(model = %model, "debug lookup found no config");
            ProxyError::not_found("model not found", format!("no config supports model {model}"))
                .into_response()
        }
        Err(ResolveError::Config(err)) => config_error(err),
    }
}

fn config_error(err: ConfigError) -> Response {
    let err = match &err {
        ConfigError::NotFound(id) => {
            ProxyError::not_found("config not found", format!("no config with id {id}"))
        }
        ConfigError::InvalidBaseUrl(_) => ProxyError::bad_request(err.to_string()),
        ConfigError::Backend(_) => {
            warn!(error = %err, "config backend failed");
            ProxyError::internal(err.to_string())
        }
    };
    err.into_response()
}
