use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use serde::Deserialize;

use crate::memory::ConfigSnapshot;
use crate::provider::ConfigError;
use crate::types::{
    GlobalModelMapping, VendorConfig, explicit_vendor, new_config_id, now_rfc3339,
    vendor_from_base_url,
};

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("read seed file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parse seed file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("seed config #{index}: {source}")]
    Config {
        index: usize,
        #[source]
        source: ConfigError,
    },
}

/// On-disk layout: the two collections the gateway reads.
#[derive(Debug, Default, Deserialize)]
pub struct SeedDocument {
    #[serde(default)]
    pub api_configs: Vec<SeedConfig>,
    /// Unified name -> (vendor id -> actual model).
    #[serde(default)]
    pub model_mappings: HashMap<String, BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize)]
pub struct SeedConfig {
    #[serde(default)]
    pub id: Option<String>,
    pub api_key: String,
    pub base_url: String,
    pub models: BTreeSet<String>,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub model_mappings: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub created_at: Option<String>,
}

pub async fn load_seed(path: impl AsRef<Path>) -> Result<ConfigSnapshot, SeedError> {
    let path = path.as_ref();
    let display = path.display().to_string();
    let raw = tokio::fs::read(path).await.map_err(|source| SeedError::Io {
        path: display.clone(),
        source,
    })?;
    let document: SeedDocument =
        serde_json::from_slice(&raw).map_err(|source| SeedError::Parse {
            path: display,
            source,
        })?;
    seed_snapshot(document)
}

pub fn seed_snapshot(document: SeedDocument) -> Result<ConfigSnapshot, SeedError> {
    let mut configs = Vec::with_capacity(document.api_configs.len());
    for (index, seed) in document.api_configs.into_iter().enumerate() {
        let vendor = match explicit_vendor(seed.vendor.as_deref()) {
            Some(vendor) => vendor,
            None => vendor_from_base_url(&seed.base_url)
                .map_err(|source| SeedError::Config { index, source })?,
        };
        configs.push(VendorConfig {
            id: seed
                .id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(new_config_id),
            api_key: seed.api_key,
            base_url: seed.base_url,
            models: seed.models,
            vendor,
            model_mappings: seed.model_mappings.unwrap_or_default(),
            created_at: seed.created_at.unwrap_or_else(now_rfc3339),
        });
    }

    let mappings = document
        .model_mappings
        .into_iter()
        .map(|(unified_name, vendor_models)| {
            let mapping = GlobalModelMapping {
                unified_name: unified_name.clone(),
                vendor_models,
            };
            (unified_name, mapping)
        })
        .collect();

    Ok(ConfigSnapshot { configs, mappings })
}
