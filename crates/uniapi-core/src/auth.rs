use std::collections::HashSet;
use std::sync::Arc;

use arc_swap::ArcSwap;
use http::header::AUTHORIZATION;
use http::{HeaderMap, StatusCode};

use crate::error::ProxyError;

/// Paths only the admin key may reach.
pub const ADMIN_PATH_PREFIXES: &[&str] = &["/admin", "/api/configs", "/api/model-mappings"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Client,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("unauthorized: {0}")]
    Unauthorized(&'static str),
    #[error("forbidden: {0}")]
    Forbidden(&'static str),
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden(_) => StatusCode::FORBIDDEN,
        }
    }
}

impl From<AuthError> for ProxyError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Unauthorized(reason) => ProxyError::unauthorized(reason),
            AuthError::Forbidden(reason) => ProxyError::forbidden(reason),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AuthKeys {
    pub admin_key: Option<String>,
    pub api_keys: HashSet<String>,
}

impl AuthKeys {
    pub fn new(admin_key: Option<String>, api_keys: impl IntoIterator<Item = String>) -> Self {
        Self {
            admin_key: admin_key.filter(|key| !key.is_empty()),
            api_keys: api_keys.into_iter().filter(|key| !key.is_empty()).collect(),
        }
    }

    fn is_empty(&self) -> bool {
        self.admin_key.is_none() && self.api_keys.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct AuthGate {
    keys: ArcSwap<AuthKeys>,
}

impl AuthGate {
    pub fn new(keys: AuthKeys) -> Self {
        Self {
            keys: ArcSwap::from_pointee(keys),
        }
    }

    pub fn replace_keys(&self, keys: AuthKeys) {
        self.keys.store(Arc::new(keys));
    }

    pub fn authenticate_headers(&self, headers: &HeaderMap, path: &str) -> Result<Role, AuthError> {
        let authorization = headers
            .get(AUTHORIZATION)
            .map(|value| value.to_str().unwrap_or_default());
        self.authenticate(authorization, path)
    }

    /// Decides access for a raw `Authorization` header value on `path`.
    pub fn authenticate(&self, authorization: Option<&str>, path: &str) -> Result<Role, AuthError> {
        let keys = self.keys.load();
        if keys.is_empty() {
            return Err(AuthError::Unauthorized("no api keys configured"));
        }

        let authorization = authorization.ok_or(AuthError::Unauthorized(
            "missing credentials, expected 'Authorization: Bearer <key>'",
        ))?;
        let token = parse_bearer(authorization).ok_or(AuthError::Unauthorized(
            "malformed credentials, expected 'Authorization: Bearer <key>'",
        ))?;

        if keys.admin_key.as_deref() == Some(token) {
            return Ok(Role::Admin);
        }
        if keys.api_keys.contains(token) {
            if is_admin_path(path) {
                return Err(AuthError::Forbidden("api key cannot access admin endpoints"));
            }
            return Ok(Role::Client);
        }
        Err(AuthError::Unauthorized("invalid api key"))
    }
}

/// Accepts exactly two whitespace-separated parts: a case-insensitive `Bearer` scheme and the token.
pub fn parse_bearer(value: &str) -> Option<&str> {
    let mut parts = value.split_whitespace();
    let scheme = parts.next()?;
    let token = parts.next()?;
    if parts.next().is_some() || !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(token)
}

pub fn is_admin_path(path: &str) -> bool {
    ADMIN_PATH_PREFIXES
        .iter()
        .any(|prefix| path.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> AuthGate {
        AuthGate::new(AuthKeys::new(
            Some("root".to_string()),
            ["client".to_string()],
        ))
    }

    #[test]
    fn fails_closed_without_any_keys() {
        let gate = AuthGate::new(AuthKeys::default());
        assert_eq!(
            gate.authenticate(Some("Bearer anything"), "/v1/chat/completions"),
            Err(AuthError::Unauthorized("no api keys configured"))
        );
    }

    #[test]
    fn admin_key_reaches_every_path() {
        let gate = gate();
        assert_eq!(gate.authenticate(Some("Bearer root"), "/api/configs"), Ok(Role::Admin));
        assert_eq!(
            gate.authenticate(Some("bearer root"), "/v1/chat/completions"),
            Ok(Role::Admin)
        );
    }

    #[test]
    fn client_key_is_forbidden_on_admin_paths() {
        let gate = gate();
        assert_eq!(
            gate.authenticate(Some("Bearer client"), "/v1/chat/completions"),
            Ok(Role::Client)
        );
        for path in ["/admin", "/api/configs/42", "/api/model-mappings"] {
            let err = gate.authenticate(Some("Bearer client"), path).unwrap_err();
            assert_eq!(err.status(), StatusCode::FORBIDDEN);
        }
        assert_eq!(
            gate.authenticate(Some("Bearer client"), "/api/debug/model-mapping/gpt-x"),
            Ok(Role::Client)
        );
    }

    #[test]
    fn rejects_missing_malformed_and_unknown_tokens() {
        let gate = gate();
        for header in [None, Some("root"), Some("Basic root"), Some("Bearer root extra"), Some("Bearer")] {
            let err = gate.authenticate(header, "/v1/chat/completions").unwrap_err();
            assert_eq!(err.status(), StatusCode::UNAUTHORIZED, "header {header:?}");
        }
        assert_eq!(
            gate.authenticate(Some("Bearer nope"), "/v1/chat/completions"),
            Err(AuthError::Unauthorized("invalid api key"))
        );
    }

    #[test]
    fn replaced_keys_take_effect() {
        let gate = gate();
        gate.replace_keys(AuthKeys::new(None, ["fresh".to_string()]));
        assert!(gate.authenticate(Some("Bearer root"), "/v1/chat/completions").is_err());
        assert_eq!(
            gate.authenticate(Some("Bearer fresh"), "/v1/chat/completions"),
            Ok(Role::Client)
        );
    }
}
