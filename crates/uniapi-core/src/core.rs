use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{MethodFilter, on};
use uniapi_config::ConfigProvider;

use crate::auth::AuthGate;
use crate::forward::Forwarder;
use crate::handler::{auth_middleware, proxy_handler};
use crate::resolver::ModelResolver;

pub struct CoreState {
    pub configs: Arc<dyn ConfigProvider>,
    pub resolver: ModelResolver,
    pub forwarder: Forwarder,
}

pub struct Core {
    state: Arc<CoreState>,
    auth: Arc<AuthGate>,
}

impl Core {
    pub fn new(
        configs: Arc<dyn ConfigProvider>,
        resolver: ModelResolver,
        forwarder: Forwarder,
        auth: Arc<AuthGate>,
    ) -> Self {
        Self {
            state: Arc::new(CoreState {
                configs,
                resolver,
                forwarder,
            }),
            auth,
        }
    }

    pub fn router(&self) -> Router {
        let methods = MethodFilter::GET
            .or(MethodFilter::POST)
            .or(MethodFilter::PUT)
            .or(MethodFilter::DELETE);
        Router::new()
            .route("/v1/{*path}", on(methods, proxy_handler))
            // Multimodal chat bodies routinely exceed axum's 2 MB default.
            .layer(DefaultBodyLimit::disable())
            .route_layer(middleware::from_fn_with_state(
                self.auth.clone(),
                auth_middleware,
            ))
            .with_state(self.state.clone())
    }

    pub fn state(&self) -> Arc<CoreState> {
        self.state.clone()
    }

    pub fn auth(&self) -> Arc<AuthGate> {
        self.auth.clone()
    }
}
