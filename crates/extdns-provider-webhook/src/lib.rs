// # Webhook DNS Provider
//
// Both ends of the webhook provider protocol:
//
// - [`WebhookProvider`]: a `Provider` that forwards every call to a remote
//   webhook server over HTTP
// - [`server`]: an axum router exposing any local `Provider` over the same
//   protocol
//
// ## Protocol
//
// Media type `application/external.dns.webhook+json;version=1`.
//
// | Method | Path               | Body            | Response          |
// |--------|--------------------|-----------------|-------------------|
// | GET    | `/`                |                 | domain filter     |
// | GET    | `/records`         |                 | `[]Endpoint`      |
// | POST   | `/records`         | `Changes`       | 204               |
// | POST   | `/adjustendpoints` | `[]Endpoint`    | `[]Endpoint`      |
// | GET    | `/healthz`         |                 | 200               |
//
// ## Error Mapping
//
// The client never retries. Non-2xx responses become errors the controller
// reports for the cycle: 401/403 authentication, 404 not found, 429 rate
// limited, everything else a provider error.

mod client;
pub mod server;

pub use client::WebhookProvider;

use extdns_core::config::ProviderConfig;
use extdns_core::traits::{Provider, ProviderFactory};
use extdns_core::{Error, Factories, Result};

/// Media type spoken on every webhook request and response
pub const MEDIA_TYPE: &str = "application/external.dns.webhook+json;version=1";

/// Factory for creating webhook providers
pub struct WebhookFactory;

impl ProviderFactory for WebhookFactory {
    fn create(&self, config: &ProviderConfig) -> Result<Box<dyn Provider>> {
        match config {
            ProviderConfig::Webhook {
                url,
                read_timeout,
                write_timeout,
            } => {
                if url.is_empty() {
                    return Err(Error::config("Webhook provider URL is required"));
                }
                Ok(Box::new(WebhookProvider::new(
                    url.clone(),
                    *read_timeout,
                    *write_timeout,
                )?))
            }
            _ => Err(Error::config("Invalid config for webhook provider")),
        }
    }
}

/// Register the webhook provider under `"webhook"`
///
/// # Example
///
/// ```rust
/// use extdns_core::Factories;
///
/// let mut factories = Factories::with_builtin();
/// extdns_provider_webhook::register(&mut factories);
/// assert!(factories.has_provider("webhook"));
/// ```
pub fn register(factories: &mut Factories) {
    factories.register_provider("webhook", Box::new(WebhookFactory));
}
