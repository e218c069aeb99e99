use std::collections::HashMap;

use async_trait::async_trait;

use crate::memory::ConfigSnapshot;
use crate::types::{GlobalModelMapping, VendorConfig, VendorConfigInput};

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("config not found: {0}")]
    NotFound(String),
    #[error("invalid base_url: {0}")]
    InvalidBaseUrl(String),
    #[error("config backend error: {0}")]
    Backend(String),
}

/// Read side consumed by the routing core.
///
/// Implementations own their consistency: a `list_configs` call must return a
/// complete list, never one torn by a concurrent write.
#[async_trait]
pub trait ConfigProvider: Send + Sync {
    async fn list_configs(&self) -> ConfigResult<Vec<VendorConfig>>;
    async fn get_global_mappings(&self) -> ConfigResult<HashMap<String, GlobalModelMapping>>;

    /// Configs and mappings as of one point in time.
    ///
    /// The default issues the two reads back to back, so a write landing between
    /// them can pair old configs with new mappings. Backends that keep both
    /// behind one handle override this with a single read.
    async fn read_snapshot(&self) -> ConfigResult<ConfigSnapshot> {
        let configs = self.list_configs().await?;
        let mappings = self.get_global_mappings().await?;
        Ok(ConfigSnapshot { configs, mappings })
    }
}

/// Write side used by the admin surface only.
#[async_trait]
pub trait ConfigStore: ConfigProvider {
    async fn get_config(&self, id: &str) -> ConfigResult<Option<VendorConfig>>;
    async fn create_config(&self, input: VendorConfigInput) -> ConfigResult<VendorConfig>;
    async fn update_config(&self, id: &str, input: VendorConfigInput)
    -> ConfigResult<VendorConfig>;
    /// Deleting an unknown id is not an error.
    async fn delete_config(&self, id: &str) -> ConfigResult<()>;
    /// Last write wins per unified name.
    async fn put_mapping(&self, mapping: GlobalModelMapping) -> ConfigResult<()>;
    async fn delete_mapping(&self, unified_name: &str) -> ConfigResult<()>;
}
