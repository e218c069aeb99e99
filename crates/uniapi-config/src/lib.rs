//! Vendor configs and model mappings for uniapi.
//!
//! The routing core reads through [`ConfigProvider`] only. Writes go through
//! [`ConfigStore`], which the admin surface uses; the backend is swappable.

pub mod memory;
pub mod provider;
pub mod seed;
pub mod types;

pub use memory::{ConfigSnapshot, MemoryConfigProvider};
pub use provider::{ConfigError, ConfigProvider, ConfigResult, ConfigStore};
pub use seed::{SeedConfig, SeedDocument, SeedError, load_seed, seed_snapshot};
pub use types::{
    GlobalModelMapping, VendorConfig, VendorConfigInput, mask_api_key, vendor_from_base_url,
};
