use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::provider::{ConfigError, ConfigResult};

/// One registered upstream vendor account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorConfig {
    pub id: String,
    pub api_key: String,
    pub base_url: String,
    pub models: BTreeSet<String>,
    pub vendor: String,
    /// Unified name -> actual model name, local to this config.
    #[serde(default)]
    pub model_mappings: BTreeMap<String, String>,
    pub created_at: String,
}

impl VendorConfig {
    pub fn supports(&self, model: &str) -> bool {
        self.models.contains(model)
    }

    /// Copy suitable for display: the api key keeps only its last four characters.
    pub fn masked(&self) -> Self {
        Self {
            api_key: mask_api_key(&self.api_key),
            ..self.clone()
        }
    }
}

/// Write shape for creating or replacing a config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorConfigInput {
    pub api_key: String,
    pub base_url: String,
    pub models: BTreeSet<String>,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub model_mappings: Option<BTreeMap<String, String>>,
}

impl VendorConfigInput {
    pub fn into_new_config(self) -> ConfigResult<VendorConfig> {
        let vendor = match explicit_vendor(self.vendor.as_deref()) {
            Some(vendor) => vendor,
            None => vendor_from_base_url(&self.base_url)?,
        };
        Ok(VendorConfig {
            id: new_config_id(),
            api_key: self.api_key,
            base_url: self.base_url,
            models: self.models,
            vendor,
            model_mappings: self.model_mappings.unwrap_or_default(),
            created_at: now_rfc3339(),
        })
    }

    /// Replaces `existing` field by field; `id` and `created_at` survive.
    pub fn apply_to(self, existing: &VendorConfig) -> ConfigResult<VendorConfig> {
        let vendor = match explicit_vendor(self.vendor.as_deref()) {
            Some(vendor) => vendor,
            None if !existing.vendor.is_empty() => existing.vendor.clone(),
            None => vendor_from_base_url(&self.base_url)?,
        };
        Ok(VendorConfig {
            id: existing.id.clone(),
            api_key: self.api_key,
            base_url: self.base_url,
            models: self.models,
            vendor,
            model_mappings: self.model_mappings.unwrap_or_default(),
            created_at: existing.created_at.clone(),
        })
    }
}

/// System-wide unified name -> per-vendor actual model names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalModelMapping {
    pub unified_name: String,
    /// Vendor id -> actual model name.
    pub vendor_models: BTreeMap<String, String>,
}

/// The `host[:port]` component of a base URL.
pub fn vendor_from_base_url(base_url: &str) -> ConfigResult<String> {
    let parsed =
        url::Url::parse(base_url).map_err(|_| ConfigError::InvalidBaseUrl(base_url.to_string()))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| ConfigError::InvalidBaseUrl(base_url.to_string()))?;
    Ok(match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

pub fn mask_api_key(api_key: &str) -> String {
    let chars: Vec<char> = api_key.chars().collect();
    if chars.len() > 4 {
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("**{tail}")
    } else {
        "****".to_string()
    }
}

pub(crate) fn new_config_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

pub(crate) fn now_rfc3339() -> String {
    let now = OffsetDateTime::now_utc();
    now.format(&Rfc3339)
        .unwrap_or_else(|_| now.unix_timestamp().to_string())
}

pub(crate) fn explicit_vendor(vendor: Option<&str>) -> Option<String> {
    vendor
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
