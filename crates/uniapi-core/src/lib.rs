pub mod auth;
pub mod core;
pub mod error;
pub mod forward;
pub mod handler;
pub mod resolver;
pub mod select;
pub mod transform;
pub mod upstream_client;

pub use auth::{AuthError, AuthGate, AuthKeys, Role};
pub use core::{Core, CoreState};
pub use error::ProxyError;
pub use forward::{ForwardContext, Forwarder};
pub use handler::{REQUEST_ID_HEADER, auth_middleware};
pub use resolver::{ModelResolver, Resolution, ResolutionTier, ResolveError};
pub use select::{SeededRandom, SelectionStrategy, UniformRandom};
pub use upstream_client::{
    UpstreamBody, UpstreamClient, UpstreamClientConfig, UpstreamFailure, UpstreamRequest,
    UpstreamResponse, UpstreamTransportErrorKind, WreqUpstreamClient,
};
