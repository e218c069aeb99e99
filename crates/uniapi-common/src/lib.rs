use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_TIMEOUT_SECS: f64 = 60.0;

/// Number of `API_KEY_n` environment slots read into the allow-list.
pub const API_KEY_ENV_SLOTS: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum GlobalConfigError {
    #[error("invalid value for {field}: {value}")]
    InvalidField { field: &'static str, value: String },
}

/// Final, merged global configuration used by the running process.
///
/// Merge order: defaults < ENV < CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalConfig {
    pub host: String,
    pub port: u16,
    /// Key allowed on every path, including the admin surface.
    pub admin_key: Option<String>,
    /// Keys allowed on proxy traffic only.
    pub api_keys: Vec<String>,
    /// Bound on every outbound call (buffered, or until a stream is established).
    pub timeout_secs: f64,
    /// Optional outbound proxy (for upstream egress).
    pub proxy: Option<String>,
    /// JSON file with vendor configs and mappings loaded at startup.
    pub seed_file: Option<String>,
}

impl GlobalConfig {
    /// Saturates for values `into_config` would have rejected.
    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_secs).unwrap_or(Duration::MAX)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Optional layer used for merging global config.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlobalConfigPatch {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub admin_key: Option<String>,
    pub api_keys: Option<Vec<String>>,
    pub timeout_secs: Option<f64>,
    pub proxy: Option<String>,
    pub seed_file: Option<String>,
}

impl GlobalConfigPatch {
    pub fn overlay(&mut self, other: GlobalConfigPatch) {
        if other.host.is_some() {
            self.host = other.host;
        }
        if other.port.is_some() {
            self.port = other.port;
        }
        if other.admin_key.is_some() {
            self.admin_key = other.admin_key;
        }
        if other.api_keys.is_some() {
            self.api_keys = other.api_keys;
        }
        if other.timeout_secs.is_some() {
            self.timeout_secs = other.timeout_secs;
        }
        if other.proxy.is_some() {
            self.proxy = other.proxy;
        }
        if other.seed_file.is_some() {
            self.seed_file = other.seed_file;
        }
    }

    /// Builds the environment layer from `(name, value)` pairs.
    pub fn from_env_vars<I, K, V>(vars: I) -> Result<Self, GlobalConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut patch = GlobalConfigPatch::default();
        let mut slots: Vec<Option<String>> = vec![None; API_KEY_ENV_SLOTS];

        for (name, value) in vars {
            let Some(value) = non_empty(value.into()) else {
                continue;
            };
            match name.as_ref() {
                "ADMIN_API_KEY" => patch.admin_key = Some(value),
                "TIMEOUT_SECONDS" => patch.timeout_secs = Some(parse_timeout(&value)?),
                "UNIAPI_HOST" => patch.host = Some(value),
                "UNIAPI_PORT" => {
                    let port = value.parse::<u16>().map_err(|_| GlobalConfigError::InvalidField {
                        field: "UNIAPI_PORT",
                        value: value.clone(),
                    })?;
                    patch.port = Some(port);
                }
                "UNIAPI_PROXY" => patch.proxy = Some(value),
                "UNIAPI_SEED_FILE" => patch.seed_file = Some(value),
                other => {
                    if let Some(slot) = api_key_slot(other) {
                        slots[slot] = Some(value);
                    }
                }
            }
        }

        let keys: Vec<String> = slots.into_iter().flatten().collect();
        if !keys.is_empty() {
            patch.api_keys = Some(keys);
        }
        Ok(patch)
    }

    pub fn into_config(self) -> Result<GlobalConfig, GlobalConfigError> {
        let timeout_secs = self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        validate_timeout(timeout_secs)?;
        Ok(GlobalConfig {
            host: self
                .host
                .and_then(non_empty)
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: self.port.unwrap_or(DEFAULT_PORT),
            admin_key: self.admin_key.and_then(non_empty),
            api_keys: self
                .api_keys
                .unwrap_or_default()
                .into_iter()
                .filter_map(non_empty)
                .collect(),
            timeout_secs,
            proxy: self.proxy.and_then(non_empty),
            seed_file: self.seed_file.and_then(non_empty),
        })
    }
}

impl From<GlobalConfig> for GlobalConfigPatch {
    fn from(value: GlobalConfig) -> Self {
        Self {
            host: Some(value.host),
            port: Some(value.port),
            admin_key: value.admin_key,
            api_keys: Some(value.api_keys),
            timeout_secs: Some(value.timeout_secs),
            proxy: value.proxy,
            seed_file: value.seed_file,
        }
    }
}

fn api_key_slot(name: &str) -> Option<usize> {
    let index = name.strip_prefix("API_KEY_")?.parse::<usize>().ok()?;
    (1..=API_KEY_ENV_SLOTS).contains(&index).then(|| index - 1)
}

fn parse_timeout(value: &str) -> Result<f64, GlobalConfigError> {
    let secs = value
        .parse::<f64>()
        .map_err(|_| GlobalConfigError::InvalidField {
            field: "TIMEOUT_SECONDS",
            value: value.to_string(),
        })?;
    validate_timeout(secs)?;
    Ok(secs)
}

fn validate_timeout(secs: f64) -> Result<(), GlobalConfigError> {
    if secs > 0.0 && Duration::try_from_secs_f64(secs).is_ok() {
        return Ok(());
    }
    Err(GlobalConfigError::InvalidField {
        field: "timeout_secs",
        value: secs.to_string(),
    })
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
