// # Provider Trait
//
// Defines the interface for reading and changing records at a DNS backend.
//
// ## Implementations
//
// - In-memory: `extdns_core::provider::InMemoryProvider`
// - Webhook client: `extdns-provider-webhook` crate
//
// ## Usage
//
// ```rust,ignore
// use extdns_core::{Changes, Provider};
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let provider = /* Provider implementation */;
//
//     let current = provider.records().await?;
//     provider.apply_changes(&Changes::default()).await?;
//
//     Ok(())
// }
// ```

use async_trait::async_trait;

use crate::changes::Changes;
use crate::endpoint::{DomainFilter, Endpoint, ZoneIdName};

/// Trait for DNS provider implementations
///
/// Only `records`, `apply_changes` and `name` are required; the remaining
/// methods have neutral defaults.
///
/// # Thread Safety
///
/// Implementations must be thread-safe and usable across async tasks.
///
/// # Trust Level: Untrusted
///
/// Providers perform I/O against the backend and nothing else. They do not
/// track ownership (the registry does), do not retry (the controller re-runs
/// the cycle) and do not filter desired state.
#[async_trait]
pub trait Provider: Send + Sync {
    /// List every record currently held by the provider
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<Endpoint>)`: Current records, labels empty
    /// - `Err(Error)`: If the listing failed
    async fn records(&self) -> Result<Vec<Endpoint>, crate::Error>;

    /// Apply a change batch
    ///
    /// # Parameters
    ///
    /// - `changes`: Records to create, update and delete
    ///
    /// # Returns
    ///
    /// - `Ok(())`: The batch was applied
    /// - `Err(Error)`: If the batch (or part of it) failed
    async fn apply_changes(&self, changes: &Changes) -> Result<(), crate::Error>;

    /// Rewrite desired endpoints into the shape the provider stores them in
    ///
    /// Called once per cycle before planning so that provider-side
    /// normalization (TTL clamping, target canonicalization) does not show up
    /// as a perpetual diff. Default: identity.
    async fn adjust_endpoints(
        &self,
        endpoints: Vec<Endpoint>,
    ) -> Result<Vec<Endpoint>, crate::Error> {
        Ok(endpoints)
    }

    /// Domains this provider is able to serve. Default: everything.
    async fn domain_filter(&self) -> Result<DomainFilter, crate::Error> {
        Ok(DomainFilter::match_all())
    }

    /// Hosted zones (id → name). Default: none known.
    async fn zones(&self) -> Result<ZoneIdName, crate::Error> {
        Ok(ZoneIdName::new())
    }

    /// Whether the order of provider-specific properties is significant
    fn provider_specific_ordered(&self) -> bool {
        false
    }

    /// Human-readable provider name, used in logs and errors
    fn name(&self) -> &str;
}

/// Helper trait for constructing providers from configuration
pub trait ProviderFactory: Send + Sync {
    /// Create a Provider instance from configuration
    ///
    /// # Parameters
    ///
    /// - `config`: Provider-specific configuration
    ///
    /// # Returns
    ///
    /// A boxed Provider trait object
    fn create(
        &self,
        config: &crate::config::ProviderConfig,
    ) -> Result<Box<dyn Provider>, crate::Error>;
}
