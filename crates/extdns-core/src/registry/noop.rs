//! Pass-through registry without an ownership ledger

use async_trait::async_trait;
use std::sync::Arc;

use super::Registry;
use crate::changes::Changes;
use crate::endpoint::{DomainFilter, Endpoint, ZoneIdName};
use crate::plan::OwnershipMode;
use crate::traits::Provider;
use crate::Result;

/// Registry that treats every in-scope record as managed
pub struct NoopRegistry {
    provider: Arc<dyn Provider>,
}

impl NoopRegistry {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Registry for NoopRegistry {
    async fn records(&self) -> Result<Vec<Endpoint>> {
        let records = self.provider.records().await?;
        Ok(records.into_iter().map(|ep| ep.without_labels()).collect())
    }

    async fn apply_changes(&self, changes: &Changes) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let stripped = Changes {
            create: changes.create.iter().map(Endpoint::without_labels).collect(),
            update_old: changes.update_old.iter().map(Endpoint::without_labels).collect(),
            update_new: changes.update_new.iter().map(Endpoint::without_labels).collect(),
            delete: changes.delete.iter().map(Endpoint::without_labels).collect(),
        };
        self.provider.apply_changes(&stripped).await
    }

    async fn adjust_endpoints(&self, endpoints: Vec<Endpoint>) -> Result<Vec<Endpoint>> {
        self.provider.adjust_endpoints(endpoints).await
    }

    async fn domain_filter(&self) -> Result<DomainFilter> {
        self.provider.domain_filter().await
    }

    async fn zones(&self) -> Result<ZoneIdName> {
        self.provider.zones().await
    }

    fn provider_specific_ordered(&self) -> bool {
        self.provider.provider_specific_ordered()
    }

    fn ownership(&self) -> OwnershipMode {
        OwnershipMode::Implicit
    }

    fn name(&self) -> &str {
        "noop"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{OWNER_LABEL, RecordType};
    use crate::provider::InMemoryProvider;

    #[tokio::test]
    async fn passes_records_through_unlabeled() {
        let provider = InMemoryProvider::new(["example.com"]);
        provider
            .insert(
                Endpoint::new("a.example.com", RecordType::A, ["1.2.3.4"])
                    .with_label(OWNER_LABEL, "someone"),
            )
            .await;
        let registry = NoopRegistry::new(Arc::new(provider.clone()));

        let records = registry.records().await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].labels.is_empty());
        assert_eq!(registry.ownership(), OwnershipMode::Implicit);

        registry
            .apply_changes(&Changes {
                delete: records,
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(provider.is_empty().await);
    }
}
