use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;
use uniapi_config::{ConfigError, ConfigProvider, GlobalModelMapping, VendorConfig};

use crate::select::{SelectionStrategy, UniformRandom};

/// Which mapping layer produced the candidate set. Earlier tiers shadow later ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionTier {
    ConfigLocal,
    GlobalVendor,
    Direct,
}

impl ResolutionTier {
    pub fn as_str(self) -> &'static str {
        match self {
            ResolutionTier::ConfigLocal => "config_local",
            ResolutionTier::GlobalVendor => "global_vendor",
            ResolutionTier::Direct => "direct",
        }
    }
}

/// One admissible pairing found during resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate<'a> {
    pub config: &'a VendorConfig,
    pub actual_model: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub config: VendorConfig,
    pub actual_model: String,
    pub tier: ResolutionTier,
    /// Size of the tied set the winner was drawn from.
    pub candidates: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("no config supports model {0}")]
    NotFound(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Returns the first non-empty tier for `model`, or `None` when every tier is empty.
pub fn candidates<'a>(
    model: &'a str,
    configs: &'a [VendorConfig],
    mappings: &'a HashMap<String, GlobalModelMapping>,
) -> Option<(ResolutionTier, Vec<Candidate<'a>>)> {
    let local: Vec<Candidate<'a>> = configs
        .iter()
        .filter_map(|config| {
            let actual_model = config.model_mappings.get(model)?;
            // A local mapping onto a model the config does not serve is ignored.
            config.supports(actual_model).then_some(Candidate {
                config,
                actual_model: actual_model.as_str(),
            })
        })
        .collect();
    if !local.is_empty() {
        return Some((ResolutionTier::ConfigLocal, local));
    }

    if let Some(mapping) = mappings.get(model) {
        let global: Vec<Candidate<'a>> = mapping
            .vendor_models
            .iter()
            .flat_map(move |(vendor_id, actual_model)| {
                configs
                    .iter()
                    .filter(move |config| {
                        config.vendor == *vendor_id && config.supports(actual_model)
                    })
                    .map(move |config| Candidate {
                        config,
                        actual_model: actual_model.as_str(),
                    })
            })
            .collect();
        if !global.is_empty() {
            return Some((ResolutionTier::GlobalVendor, global));
        }
    }

    let direct: Vec<Candidate<'a>> = configs
        .iter()
        .filter(|config| config.supports(model))
        .map(|config| Candidate {
            config,
            actual_model: model,
        })
        .collect();
    if !direct.is_empty() {
        return Some((ResolutionTier::Direct, direct));
    }

    None
}

pub fn resolve(
    model: &str,
    configs: &[VendorConfig],
    mappings: &HashMap<String, GlobalModelMapping>,
    strategy: &dyn SelectionStrategy,
) -> Result<Resolution, ResolveError> {
    let Some((tier, found)) = candidates(model, configs, mappings) else {
        return Err(ResolveError::NotFound(model.to_string()));
    };
    let index = strategy.pick(found.len()).min(found.len() - 1);
    let winner = found[index];
    Ok(Resolution {
        config: winner.config.clone(),
        actual_model: winner.actual_model.to_string(),
        tier,
        candidates: found.len(),
    })
}

/// Resolver bound to a selection strategy.
#[derive(Clone)]
pub struct ModelResolver {
    strategy: Arc<dyn SelectionStrategy>,
}

impl Default for ModelResolver {
    fn default() -> Self {
        Self::new(Arc::new(UniformRandom))
    }
}

impl std::fmt::Debug for ModelResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelResolver").finish_non_exhaustive()
    }
}

impl ModelResolver {
    pub fn new(strategy: Arc<dyn SelectionStrategy>) -> Self {
        Self { strategy }
    }

    pub fn resolve(
        &self,
        model: &str,
        configs: &[VendorConfig],
        mappings: &HashMap<String, GlobalModelMapping>,
    ) -> Result<Resolution, ResolveError> {
        resolve(model, configs, mappings, self.strategy.as_ref())
    }

    /// Reads a fresh snapshot from `provider`, then resolves against it.
    pub async fn lookup<P>(&self, provider: &P, model: &str) -> Result<Resolution, ResolveError>
    where
        P: ConfigProvider + ?Sized,
    {
        let snapshot = provider.read_snapshot().await?;
        debug!(
            model = %model,
            configs = snapshot.configs.len(),
            mappings = snapshot.mappings.len(),
            "config snapshot loaded"
        );
        self.resolve(model, &snapshot.configs, &snapshot.mappings)
    }
}
