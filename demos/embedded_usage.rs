//! Minimal embedding example for extdns-core
//!
//! Runs the controller in-process against the in-memory provider with a
//! custom source whose desired state the application changes at runtime.
//! The controller lifecycle is fully managed by the application.

use extdns_core::endpoint::RESOURCE_LABEL;
use extdns_core::provider::InMemoryProvider;
use extdns_core::registry::{Registry, TxtRegistry, TxtRegistryOptions};
use extdns_core::traits::{EventHandler, Provider, Source};
use extdns_core::{Controller, ControllerConfig, Endpoint, FilterConfig, RecordType, Result};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Source whose endpoints the application sets directly
#[derive(Clone, Default)]
struct AppSource {
    endpoints: Arc<Mutex<Vec<Endpoint>>>,
    handlers: Arc<Mutex<Vec<EventHandler>>>,
}

impl AppSource {
    /// Replace the desired endpoints and ask for a reconciliation
    fn publish(&self, endpoints: Vec<Endpoint>) {
        if let Ok(mut current) = self.endpoints.lock() {
            *current = endpoints;
        }
        let handlers = self.handlers.lock().map(|h| h.clone()).unwrap_or_default();
        for handler in handlers {
            handler();
        }
    }
}

#[async_trait::async_trait]
impl Source for AppSource {
    async fn endpoints(&self) -> Result<Vec<Endpoint>> {
        Ok(self
            .endpoints
            .lock()
            .map(|eps| eps.clone())
            .unwrap_or_default())
    }

    fn add_event_handler(&self, _shutdown: CancellationToken, handler: EventHandler) {
        if let Ok(mut handlers) = self.handlers.lock() {
            handlers.push(handler);
        }
    }

    fn name(&self) -> &str {
        "app"
    }
}

fn web(target: &str) -> Endpoint {
    Endpoint::new("web.example.com", RecordType::A, [target])
        .with_ttl(300)
        .with_label(RESOURCE_LABEL, "app/web")
}

async fn print_zone(provider: &InMemoryProvider) -> Result<()> {
    for ep in provider.records().await? {
        println!("   {} {} {}", ep.dns_name, ep.record_type, ep.targets.join(","));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    println!("=== Embedded extdns-core Example ===\n");

    let provider = InMemoryProvider::new(["example.com"]);
    let registry: Box<dyn Registry> = Box::new(TxtRegistry::new(
        Arc::new(provider.clone()),
        TxtRegistryOptions::new("embedded"),
    )?);
    let source = AppSource::default();
    source.publish(vec![web("192.0.2.10")]);

    let config = ControllerConfig {
        events: true,
        min_event_sync_interval: Duration::from_millis(100),
        ..ControllerConfig::default()
    };

    println!("1. Creating controller...");
    let (controller, mut event_rx) = Controller::new(
        vec![Box::new(source.clone())],
        registry,
        &FilterConfig::default(),
        config,
    )?;
    let controller = Arc::new(controller);

    let event_listener = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            println!("[Event] {:?}", event);
        }
    });

    println!("2. Starting controller in background...");
    let shutdown = CancellationToken::new();
    let handle = {
        let controller = controller.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { controller.run_with_shutdown(shutdown).await })
    };

    tokio::time::sleep(Duration::from_millis(200)).await;
    println!("\n3. Zone after the startup cycle:");
    print_zone(&provider).await?;

    println!("\n4. Application publishes a new target...");
    source.publish(vec![web("192.0.2.20")]);
    tokio::time::sleep(Duration::from_millis(300)).await;
    print_zone(&provider).await?;

    println!("\n5. Stopping controller...");
    shutdown.cancel();
    if let Ok(result) = handle.await {
        result?;
    }
    drop(controller);
    let _ = tokio::time::timeout(Duration::from_millis(100), event_listener).await;

    println!("\n=== Embedding Successful ===");
    println!("Key Points:");
    println!("- Controller lifecycle is fully controlled by the application");
    println!("- No global state");
    println!("- Custom source, library-provided registry and provider");

    Ok(())
}
