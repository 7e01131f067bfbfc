// # Source Trait
//
// Defines the interface for components that declare which DNS records should
// exist.
//
// ## Implementations
//
// - HTTP endpoint feed: `extdns-source-http` crate
//
// ## Usage
//
// ```rust,ignore
// use extdns_core::Source;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let source = /* Source implementation */;
//
//     for endpoint in source.endpoints().await? {
//         println!("{endpoint}");
//     }
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::endpoint::Endpoint;

/// Callback invoked by a source when its desired state may have changed
pub type EventHandler = Arc<dyn Fn() + Send + Sync>;

/// Trait for source implementations
///
/// Implementations must be thread-safe and usable across async tasks.
///
/// # Trust Level: Semi-Trusted
///
/// Sources only describe intent. They never talk to a provider and never
/// decide when a reconciliation cycle runs; the controller owns both.
#[async_trait]
pub trait Source: Send + Sync {
    /// Enumerate the desired endpoints
    ///
    /// Endpoints should carry a `resource` label naming the object that
    /// produced them; the plan uses it to resolve conflicts.
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<Endpoint>)`: The desired endpoints (possibly empty)
    /// - `Err(Error)`: If the source could not be read this cycle
    async fn endpoints(&self) -> Result<Vec<Endpoint>, crate::Error>;

    /// Register a change notification callback
    ///
    /// The source calls `handler` whenever its desired state may have changed.
    /// Any task spawned to watch for changes must stop once `shutdown` is
    /// cancelled. Sources without change detection keep the default no-op.
    fn add_event_handler(&self, shutdown: CancellationToken, handler: EventHandler) {
        let _ = (shutdown, handler);
    }

    /// Human-readable source name, used in logs and errors
    fn name(&self) -> &str;
}

/// Helper trait for constructing sources from configuration
pub trait SourceFactory: Send + Sync {
    /// Create a Source instance from configuration
    ///
    /// # Parameters
    ///
    /// - `config`: Configuration for this source
    ///
    /// # Returns
    ///
    /// A boxed Source trait object
    fn create(
        &self,
        config: &crate::config::SourceConfig,
    ) -> Result<Box<dyn Source>, crate::Error>;
}
