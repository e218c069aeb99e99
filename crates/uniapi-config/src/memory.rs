use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;

use crate::provider::{ConfigError, ConfigProvider, ConfigResult, ConfigStore};
use crate::types::{GlobalModelMapping, VendorConfig, VendorConfigInput};

/// Everything the routing core reads for one resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigSnapshot {
    pub configs: Vec<VendorConfig>,
    pub mappings: HashMap<String, GlobalModelMapping>,
}

/// In-process store: readers clone the current snapshot, writers swap a new one in.
#[derive(Debug, Default)]
pub struct MemoryConfigProvider {
    snapshot: ArcSwap<ConfigSnapshot>,
}

impl MemoryConfigProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: ConfigSnapshot) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(snapshot),
        }
    }

    pub fn replace_snapshot(&self, snapshot: ConfigSnapshot) {
        self.snapshot.store(Arc::new(snapshot));
    }

    pub fn snapshot(&self) -> Arc<ConfigSnapshot> {
        self.snapshot.load_full()
    }
}

#[async_trait]
impl ConfigProvider for MemoryConfigProvider {
    async fn list_configs(&self) -> ConfigResult<Vec<VendorConfig>> {
        Ok(self.snapshot.load().configs.clone())
    }

    async fn get_global_mappings(&self) -> ConfigResult<HashMap<String, GlobalModelMapping>> {
        Ok(self.snapshot.load().mappings.clone())
    }

    async fn read_snapshot(&self) -> ConfigResult<ConfigSnapshot> {
        Ok(ConfigSnapshot::clone(&self.snapshot.load()))
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigProvider {
    async fn get_config(&self, id: &str) -> ConfigResult<Option<VendorConfig>> {
        Ok(self
            .snapshot
            .load()
            .configs
            .iter()
            .find(|config| config.id == id)
            .cloned())
    }

    async fn create_config(&self, input: VendorConfigInput) -> ConfigResult<VendorConfig> {
        let config = input.into_new_config()?;
        self.snapshot.rcu(|current| {
            let mut next = ConfigSnapshot::clone(current);
            next.configs.push(config.clone());
            Arc::new(next)
        });
        Ok(config)
    }

    async fn update_config(
        &self,
        id: &str,
        input: VendorConfigInput,
    ) -> ConfigResult<VendorConfig> {
        let mut outcome: ConfigResult<VendorConfig> = Err(ConfigError::NotFound(id.to_string()));
        self.snapshot.rcu(|current| {
            let Some(index) = current.configs.iter().position(|config| config.id == id) else {
                outcome = Err(ConfigError::NotFound(id.to_string()));
                return Arc::clone(current);
            };
            match input.clone().apply_to(&current.configs[index]) {
                Ok(updated) => {
                    let mut next = ConfigSnapshot::clone(current);
                    next.configs[index] = updated.clone();
                    outcome = Ok(updated);
                    Arc::new(next)
                }
                Err(err) => {
                    outcome = Err(err);
                    Arc::clone(current)
                }
            }
        });
        outcome
    }

    async fn delete_config(&self, id: &str) -> ConfigResult<()> {
        self.snapshot.rcu(|current| {
            let mut next = ConfigSnapshot::clone(current);
            next.configs.retain(|config| config.id != id);
            Arc::new(next)
        });
        Ok(())
    }

    async fn put_mapping(&self, mapping: GlobalModelMapping) -> ConfigResult<()> {
        self.snapshot.rcu(|current| {
            let mut next = ConfigSnapshot::clone(current);
            next.mappings
                .insert(mapping.unified_name.clone(), mapping.clone());
            Arc::new(next)
        });
        Ok(())
    }

    async fn delete_mapping(&self, unified_name: &str) -> ConfigResult<()> {
        self.snapshot.rcu(|current| {
            let mut next = ConfigSnapshot::clone(current);
            next.mappings.remove(unified_name);
            Arc::new(next)
        });
        Ok(())
    }
}
