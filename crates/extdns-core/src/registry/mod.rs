//! Ownership registries
//!
//! A registry wraps a [`Provider`] and decides which of its records belong to
//! this instance.
//!
//! - [`TxtRegistry`]: companion TXT records hold the ownership ledger
//! - [`NoopRegistry`]: no ledger; every in-scope record is managed

pub mod cache;
pub mod format;
pub mod noop;
pub mod txt;

use async_trait::async_trait;
use std::sync::Arc;

use crate::changes::Changes;
use crate::config::RegistryConfig;
use crate::endpoint::{DomainFilter, Endpoint, ZoneIdName};
use crate::plan::OwnershipMode;
use crate::traits::Provider;
use crate::Result;

pub use noop::NoopRegistry;
pub use txt::{TxtRegistry, TxtRegistryOptions};

/// Provider wrapper adding ownership tracking
#[async_trait]
pub trait Registry: Send + Sync {
    /// Current data records, labeled with `owner`/`resource` where owned
    async fn records(&self) -> Result<Vec<Endpoint>>;

    /// Forward a change batch to the provider, adding ownership bookkeeping
    async fn apply_changes(&self, changes: &Changes) -> Result<()>;

    /// Pass-through of [`Provider::adjust_endpoints`]
    async fn adjust_endpoints(&self, endpoints: Vec<Endpoint>) -> Result<Vec<Endpoint>>;

    /// Pass-through of [`Provider::domain_filter`]
    async fn domain_filter(&self) -> Result<DomainFilter>;

    /// Pass-through of [`Provider::zones`]
    async fn zones(&self) -> Result<ZoneIdName>;

    /// Pass-through of [`Provider::provider_specific_ordered`]
    fn provider_specific_ordered(&self) -> bool;

    /// How the plan must decide ownership of records returned by `records`
    fn ownership(&self) -> OwnershipMode;

    fn name(&self) -> &str;
}

/// Build the registry selected by `config` around `provider`
pub fn build(config: &RegistryConfig, provider: Arc<dyn Provider>) -> Result<Box<dyn Registry>> {
    config.validate()?;
    match config {
        RegistryConfig::Txt {
            owner_id,
            prefix,
            suffix,
            wildcard_replacement,
            new_format_only,
            cache_interval,
        } => {
            let options = TxtRegistryOptions {
                owner_id: owner_id.clone(),
                prefix: prefix.clone(),
                suffix: suffix.clone(),
                wildcard_replacement: wildcard_replacement.clone(),
                new_format_only: *new_format_only,
                cache_interval: *cache_interval,
            };
            Ok(Box::new(TxtRegistry::new(provider, options)?))
        }
        RegistryConfig::Noop => Ok(Box::new(NoopRegistry::new(provider))),
    }
}
