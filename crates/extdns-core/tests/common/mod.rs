//! Test doubles and common utilities for contract tests
//!
//! The doubles share their counters between clones so a test can keep a
//! handle while the controller owns another.

#![allow(dead_code)]

use async_trait::async_trait;
use extdns_core::endpoint::{OWNER_LABEL, RESOURCE_LABEL};
use extdns_core::error::Result;
use extdns_core::provider::InMemoryProvider;
use extdns_core::registry::{Registry, TxtRegistry, TxtRegistryOptions};
use extdns_core::traits::{EventHandler, Provider, Source};
use extdns_core::{Changes, ControllerConfig, DomainFilter, Endpoint, Error, RecordType, ZoneIdName};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A source returning a settable list of endpoints
#[derive(Clone)]
pub struct StaticSource {
    name: String,
    endpoints: Arc<Mutex<Vec<Endpoint>>>,
    handlers: Arc<Mutex<Vec<EventHandler>>>,
    call_count: Arc<AtomicUsize>,
    delay: Duration,
}

impl StaticSource {
    pub fn new(name: &str, endpoints: Vec<Endpoint>) -> Self {
        Self {
            name: name.to_string(),
            endpoints: Arc::new(Mutex::new(endpoints)),
            handlers: Arc::new(Mutex::new(Vec::new())),
            call_count: Arc::new(AtomicUsize::new(0)),
            delay: Duration::ZERO,
        }
    }

    /// Make every `endpoints()` call take `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set_endpoints(&self, endpoints: Vec<Endpoint>) {
        *self.endpoints.lock().unwrap() = endpoints;
    }

    /// Get the number of times endpoints() was called
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.lock().unwrap().len()
    }

    /// Fire every registered change handler
    pub fn notify(&self) {
        let handlers = self.handlers.lock().unwrap().clone();
        for handler in handlers {
            handler();
        }
    }
}

#[async_trait]
impl Source for StaticSource {
    async fn endpoints(&self) -> Result<Vec<Endpoint>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.endpoints.lock().unwrap().clone())
    }

    fn add_event_handler(&self, _shutdown: CancellationToken, handler: EventHandler) {
        self.handlers.lock().unwrap().push(handler);
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A source that always fails
pub struct FailingSource;

#[async_trait]
impl Source for FailingSource {
    async fn endpoints(&self) -> Result<Vec<Endpoint>> {
        Err(Error::source("failing", "backend unavailable"))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// An in-memory provider that counts calls and can be told to fail applies
/// or to raise TTLs below a minimum while adjusting endpoints
#[derive(Clone)]
pub struct CountingProvider {
    inner: InMemoryProvider,
    records_calls: Arc<AtomicUsize>,
    apply_calls: Arc<AtomicUsize>,
    adjust_calls: Arc<AtomicUsize>,
    batches: Arc<Mutex<Vec<Changes>>>,
    fail_apply: Arc<AtomicBool>,
    min_ttl: Arc<AtomicU32>,
}

impl CountingProvider {
    pub fn new(zones: &[&str]) -> Self {
        Self {
            inner: InMemoryProvider::new(zones.iter().copied()),
            records_calls: Arc::new(AtomicUsize::new(0)),
            apply_calls: Arc::new(AtomicUsize::new(0)),
            adjust_calls: Arc::new(AtomicUsize::new(0)),
            batches: Arc::new(Mutex::new(Vec::new())),
            fail_apply: Arc::new(AtomicBool::new(false)),
            min_ttl: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn store(&self) -> &InMemoryProvider {
        &self.inner
    }

    pub async fn seed(&self, endpoints: Vec<Endpoint>) {
        for ep in endpoints {
            self.inner.insert(ep).await;
        }
    }

    pub fn records_calls(&self) -> usize {
        self.records_calls.load(Ordering::SeqCst)
    }

    pub fn apply_calls(&self) -> usize {
        self.apply_calls.load(Ordering::SeqCst)
    }

    /// Every batch passed to apply_changes, in order
    pub fn batches(&self) -> Vec<Changes> {
        self.batches.lock().unwrap().clone()
    }

    pub fn last_batch(&self) -> Option<Changes> {
        self.batches.lock().unwrap().last().cloned()
    }

    pub fn adjust_calls(&self) -> usize {
        self.adjust_calls.load(Ordering::SeqCst)
    }

    pub fn set_fail_apply(&self, fail: bool) {
        self.fail_apply.store(fail, Ordering::SeqCst);
    }

    /// Raise TTLs below `ttl` in adjust_endpoints; zero disables
    pub fn set_min_ttl(&self, ttl: u32) {
        self.min_ttl.store(ttl, Ordering::SeqCst);
    }

    /// Current records rendered as `name/TYPE=targets`, sorted
    pub async fn dump(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .inner
            .records()
            .await
            .unwrap()
            .into_iter()
            .map(|ep| format!("{}/{}={}", ep.dns_name, ep.record_type, ep.targets.join(";")))
            .collect();
        out.sort();
        out
    }
}

#[async_trait]
impl Provider for CountingProvider {
    async fn records(&self) -> Result<Vec<Endpoint>> {
        self.records_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.records().await
    }

    async fn apply_changes(&self, changes: &Changes) -> Result<()> {
        self.apply_calls.fetch_add(1, Ordering::SeqCst);
        self.batches.lock().unwrap().push(changes.clone());
        if self.fail_apply.load(Ordering::SeqCst) {
            return Err(Error::provider("counting", "injected failure"));
        }
        self.inner.apply_changes(changes).await
    }

    async fn adjust_endpoints(&self, endpoints: Vec<Endpoint>) -> Result<Vec<Endpoint>> {
        self.adjust_calls.fetch_add(1, Ordering::SeqCst);
        let min_ttl = self.min_ttl.load(Ordering::SeqCst);
        Ok(endpoints
            .into_iter()
            .map(|mut ep| {
                if min_ttl > 0 && ep.record_ttl < min_ttl {
                    ep.record_ttl = min_ttl;
                }
                ep
            })
            .collect())
    }

    async fn domain_filter(&self) -> Result<DomainFilter> {
        self.inner.domain_filter().await
    }

    async fn zones(&self) -> Result<ZoneIdName> {
        self.inner.zones().await
    }

    fn name(&self) -> &str {
        "counting"
    }
}

pub fn a(name: &str, target: &str) -> Endpoint {
    Endpoint::new(name, RecordType::A, [target])
}

pub fn cname(name: &str, target: &str) -> Endpoint {
    Endpoint::new(name, RecordType::CNAME, [target])
}

pub fn from_resource(ep: Endpoint, resource: &str) -> Endpoint {
    ep.with_label(RESOURCE_LABEL, resource)
}

pub fn owned_by(ep: Endpoint, owner: &str) -> Endpoint {
    ep.with_label(OWNER_LABEL, owner)
}

/// A companion TXT record in the current format
pub fn companion(name: &str, owner: &str, resource: &str) -> Endpoint {
    Endpoint::new(
        name,
        RecordType::TXT,
        [format!(
            "\"heritage=external-dns,external-dns/owner={owner},external-dns/resource={resource}\""
        )],
    )
}

pub fn txt_registry(provider: &CountingProvider, options: TxtRegistryOptions) -> TxtRegistry {
    TxtRegistry::new(Arc::new(provider.clone()), options).expect("valid registry options")
}

pub fn boxed_txt_registry(provider: &CountingProvider) -> Box<dyn Registry> {
    Box::new(txt_registry(provider, TxtRegistryOptions::default()))
}

/// Controller settings with short timings for tests
pub fn minimal_config() -> ControllerConfig {
    ControllerConfig {
        interval: Duration::from_secs(60),
        min_event_sync_interval: Duration::from_millis(500),
        cycle_timeout: Duration::from_secs(5),
        ..ControllerConfig::default()
    }
}
