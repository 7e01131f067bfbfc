// # In-Memory Provider
//
// Provider implementation holding records in a map protected by a RwLock.
//
// ## Purpose
//
// Useful for tests, dry runs against a synthetic zone and embedding. Nothing
// persists across restarts.
//
// ## Apply Semantics
//
// A change batch is validated as a whole before anything is written: creating
// an existing record, updating or deleting a missing one, or touching a name
// outside every configured zone fails the batch and leaves the store
// untouched.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::changes::Changes;
use crate::config::ProviderConfig;
use crate::endpoint::{DomainFilter, Endpoint, EndpointKey, ZoneIdName};
use crate::traits::{Provider, ProviderFactory};
use crate::{Error, Result};

const PROVIDER_NAME: &str = "inmemory";

/// In-memory provider
///
/// Clones share the same record store.
///
/// # Example
///
/// ```rust,no_run
/// use extdns_core::provider::InMemoryProvider;
/// use extdns_core::{Changes, Endpoint, Provider, RecordType};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let provider = InMemoryProvider::new(["example.com"]);
///
///     let changes = Changes {
///         create: vec![Endpoint::new("a.example.com", RecordType::A, ["1.2.3.4"])],
///         ..Default::default()
///     };
///     provider.apply_changes(&changes).await?;
///
///     assert_eq!(provider.records().await?.len(), 1);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct InMemoryProvider {
    zones: ZoneIdName,
    records: Arc<RwLock<BTreeMap<EndpointKey, Endpoint>>>,
}

impl InMemoryProvider {
    /// Create a provider serving the given zones
    ///
    /// With no zones every name is accepted.
    pub fn new<I, S>(zones: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            zones: zones
                .into_iter()
                .map(|z| (z.as_ref().to_string(), z))
                .collect(),
            records: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Seed the store, bypassing validation
    pub async fn insert(&self, endpoint: Endpoint) {
        let endpoint = endpoint.normalized();
        self.records.write().await.insert(endpoint.key(), endpoint);
    }

    /// Get the number of records in the store
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Clear all records from the store
    pub async fn clear(&self) {
        self.records.write().await.clear();
    }

    fn check_zone(&self, endpoint: &Endpoint) -> Result<()> {
        if self.zones.is_empty() || self.zones.find_zone(&endpoint.dns_name).is_some() {
            Ok(())
        } else {
            Err(Error::not_found(format!(
                "zone not found for {}",
                endpoint.dns_name
            )))
        }
    }

    fn validate(
        &self,
        store: &BTreeMap<EndpointKey, Endpoint>,
        changes: &Changes,
    ) -> Result<()> {
        if changes.update_old.len() != changes.update_new.len() {
            return Err(Error::provider(
                PROVIDER_NAME,
                "update_old and update_new differ in length",
            ));
        }

        let mut seen = HashSet::new();
        let mut claim = |key: EndpointKey| -> Result<()> {
            if seen.insert(key.clone()) {
                Ok(())
            } else {
                Err(Error::provider(
                    PROVIDER_NAME,
                    format!("record {key} appears more than once in the batch"),
                ))
            }
        };

        for ep in &changes.create {
            self.check_zone(ep)?;
            let key = ep.key();
            if store.contains_key(&key) {
                return Err(Error::provider(
                    PROVIDER_NAME,
                    format!("record {key} already exists"),
                ));
            }
            claim(key)?;
        }
        for (old, new) in changes.update_old.iter().zip(&changes.update_new) {
            self.check_zone(new)?;
            let key = old.key();
            if key != new.key() {
                return Err(Error::provider(
                    PROVIDER_NAME,
                    format!("update pair mismatch: {key} vs {}", new.key()),
                ));
            }
            if !store.contains_key(&key) {
                return Err(Error::not_found(format!("record {key}")));
            }
            claim(key)?;
        }
        for ep in &changes.delete {
            self.check_zone(ep)?;
            let key = ep.key();
            if !store.contains_key(&key) {
                return Err(Error::not_found(format!("record {key}")));
            }
            claim(key)?;
        }
        Ok(())
    }
}

impl Default for InMemoryProvider {
    fn default() -> Self {
        Self::new(Vec::<String>::new())
    }
}

#[async_trait]
impl Provider for InMemoryProvider {
    async fn records(&self) -> Result<Vec<Endpoint>> {
        let guard = self.records.read().await;
        Ok(guard.values().cloned().collect())
    }

    async fn apply_changes(&self, changes: &Changes) -> Result<()> {
        let mut guard = self.records.write().await;
        self.validate(&guard, changes)?;

        for ep in &changes.delete {
            guard.remove(&ep.key());
        }
        for ep in changes.create.iter().chain(&changes.update_new) {
            let ep = ep.normalized();
            guard.insert(ep.key(), ep);
        }

        debug!(
            "In-memory provider applied {} create(s), {} update(s), {} delete(s)",
            changes.create.len(),
            changes.update_new.len(),
            changes.delete.len()
        );
        Ok(())
    }

    async fn domain_filter(&self) -> Result<DomainFilter> {
        let zones: Vec<&str> = self.zones.iter().map(|(_, name)| name).collect();
        Ok(DomainFilter::new(zones, Vec::<String>::new()))
    }

    async fn zones(&self) -> Result<ZoneIdName> {
        Ok(self.zones.clone())
    }

    fn name(&self) -> &str {
        PROVIDER_NAME
    }
}

/// Factory for creating in-memory providers
pub struct InMemoryProviderFactory;

impl ProviderFactory for InMemoryProviderFactory {
    fn create(&self, config: &ProviderConfig) -> Result<Box<dyn Provider>> {
        match config {
            ProviderConfig::InMemory { zones } => Ok(Box::new(InMemoryProvider::new(zones))),
            _ => Err(Error::config("Invalid config for in-memory provider")),
        }
    }
}
