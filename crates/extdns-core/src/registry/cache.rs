//! TTL-bounded cache of the provider listing
//!
//! The cache holds the raw provider records (companions included). Successful
//! applies patch it in place; failed applies drop it so the next read goes to
//! the provider.

use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

use crate::changes::Changes;
use crate::endpoint::{Endpoint, EndpointKey};

#[derive(Debug, Clone)]
struct CacheEntry {
    records: BTreeMap<EndpointKey, Endpoint>,
    refreshed: chrono::DateTime<chrono::Utc>,
}

/// Provider listing cache
#[derive(Debug)]
pub struct RecordCache {
    ttl: chrono::Duration,
    inner: RwLock<Option<CacheEntry>>,
}

impl RecordCache {
    /// Create an empty cache whose entries expire after `ttl`
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX),
            inner: RwLock::new(None),
        }
    }

    /// Cached records, if present and fresh
    pub async fn get(&self) -> Option<Vec<Endpoint>> {
        let guard = self.inner.read().await;
        let entry = guard.as_ref()?;
        if chrono::Utc::now() - entry.refreshed >= self.ttl {
            debug!("Record cache expired");
            return None;
        }
        Some(entry.records.values().cloned().collect())
    }

    /// Replace the cached listing
    pub async fn store(&self, records: &[Endpoint]) {
        let records = records.iter().map(|ep| (ep.key(), ep.clone())).collect();
        *self.inner.write().await = Some(CacheEntry {
            records,
            refreshed: chrono::Utc::now(),
        });
    }

    /// Reflect an applied change batch without refreshing the timestamp
    pub async fn patch(&self, changes: &Changes) {
        let mut guard = self.inner.write().await;
        let Some(entry) = guard.as_mut() else {
            return;
        };
        for ep in changes.delete.iter().chain(&changes.update_old) {
            entry.records.remove(&ep.key());
        }
        for ep in changes.create.iter().chain(&changes.update_new) {
            entry.records.insert(ep.key(), ep.clone());
        }
    }

    /// Drop the cached listing
    pub async fn invalidate(&self) {
        *self.inner.write().await = None;
    }
}
