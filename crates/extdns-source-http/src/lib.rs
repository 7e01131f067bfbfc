// # HTTP Endpoint Source
//
// This crate provides a Source reading desired endpoints from an HTTP feed.
//
// ## Feed Format
//
// `GET <url>` must return a JSON array of endpoints in the webhook wire
// format (`dnsName`, `targets`, `recordType`, `recordTTL`, `labels`, ...).
// Endpoints without a `resource` label are attributed to `http/<url>`, which
// is also the source name reported in errors and cycle reports.
//
// ## Change Notifications
//
// The feed has no push channel, so `add_event_handler` polls it at the
// configured interval and fires the handler whenever the fetched set differs
// from the previous fetch. Polling stops when the shutdown token is cancelled.

use async_trait::async_trait;
use extdns_core::config::SourceConfig;
use extdns_core::endpoint::{RESOURCE_LABEL, sort_endpoints};
use extdns_core::traits::{EventHandler, Source, SourceFactory};
use extdns_core::{Endpoint, Error, Factories, Result};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const SOURCE_NAME: &str = "http";

/// Per-request timeout for feed fetches
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Source reading endpoints from an HTTP JSON feed
#[derive(Debug, Clone)]
pub struct HttpSource {
    url: String,
    /// `http/<url>`
    name: String,
    poll_interval: Duration,
    client: reqwest::Client,
}

impl HttpSource {
    /// Create a new HTTP source
    ///
    /// # Parameters
    ///
    /// - `url`: Feed URL returning a JSON endpoint list
    /// - `poll_interval`: Interval between polls once change notifications
    ///   are requested
    pub fn new(url: impl Into<String>, poll_interval: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        let url = url.into();
        Ok(Self {
            name: format!("{}/{}", SOURCE_NAME, url),
            url,
            poll_interval,
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch the feed and attribute unlabeled endpoints to it
    async fn fetch(&self) -> Result<Vec<Endpoint>> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::source(&self.name, format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::source(
                &self.name,
                format!("HTTP error: {}", response.status()),
            ));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::source(&self.name, format!("Failed to read response: {}", e)))?;
        let mut endpoints: Vec<Endpoint> = serde_json::from_slice(&body)
            .map_err(|e| Error::source(&self.name, format!("Invalid endpoint feed: {}", e)))?;

        for ep in &mut endpoints {
            ep.labels
                .entry(RESOURCE_LABEL.to_string())
                .or_insert_with(|| self.name.clone());
        }
        Ok(endpoints)
    }

    /// Canonical form used to detect feed changes
    fn fingerprint(endpoints: &[Endpoint]) -> Vec<Endpoint> {
        let mut canonical: Vec<Endpoint> = endpoints.iter().map(Endpoint::normalized).collect();
        sort_endpoints(&mut canonical);
        canonical
    }

    async fn poll(self, shutdown: CancellationToken, handler: EventHandler) {
        tracing::info!(
            "Starting HTTP feed polling (url={}, interval={:?})",
            self.url,
            self.poll_interval
        );

        let mut last: Option<Vec<Endpoint>> = None;
        loop {
            match self.fetch().await {
                Ok(endpoints) => {
                    let current = Self::fingerprint(&endpoints);
                    match &last {
                        Some(previous) if *previous != current => {
                            tracing::info!("HTTP feed {} changed", self.url);
                            handler();
                        }
                        _ => {}
                    }
                    last = Some(current);
                }
                Err(e) => {
                    tracing::warn!("HTTP feed poll failed: {}", e);
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
        tracing::debug!("HTTP feed polling for {} stopped", self.url);
    }
}

#[async_trait]
impl Source for HttpSource {
    async fn endpoints(&self) -> Result<Vec<Endpoint>> {
        let endpoints = self.fetch().await?;
        tracing::debug!("HTTP feed {} returned {} endpoint(s)", self.url, endpoints.len());
        Ok(endpoints)
    }

    fn add_event_handler(&self, shutdown: CancellationToken, handler: EventHandler) {
        tokio::spawn(self.clone().poll(shutdown, handler));
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Factory for creating HTTP sources
pub struct HttpFactory;

impl SourceFactory for HttpFactory {
    fn create(&self, config: &SourceConfig) -> Result<Box<dyn Source>> {
        match config {
            SourceConfig::Http { url, interval } => {
                Ok(Box::new(HttpSource::new(url.clone(), *interval)?))
            }
            _ => Err(Error::config("Invalid config for HTTP source")),
        }
    }
}

/// Register the HTTP source under `"http"`
pub fn register(factories: &mut Factories) {
    factories.register_source(SOURCE_NAME, Box::new(HttpFactory));
}

#[cfg(test)]
mod tests {
    use super::*;
    use extdns_core::RecordType;

    #[test]
    fn test_factory_creation() {
        let source = HttpFactory.create(&SourceConfig::http("http://feed.local/endpoints"));
        assert_eq!(source.unwrap().name(), "http/http://feed.local/endpoints");
    }

    #[test]
    fn test_factory_rejects_other_configs() {
        let config = SourceConfig::Custom {
            factory: "other".to_string(),
            config: serde_json::Value::Null,
        };
        assert!(HttpFactory.create(&config).err().unwrap().is_config());
    }

    #[test]
    fn test_fingerprint_ignores_order_and_case() {
        let a = vec![
            Endpoint::new("B.example.com", RecordType::A, ["2.2.2.2", "1.1.1.1"]),
            Endpoint::new("a.example.com.", RecordType::A, ["3.3.3.3"]),
        ];
        let b = vec![
            Endpoint::new("a.example.com", RecordType::A, ["3.3.3.3"]),
            Endpoint::new("b.example.com", RecordType::A, ["1.1.1.1", "2.2.2.2"]),
        ];
        assert_eq!(HttpSource::fingerprint(&a), HttpSource::fingerprint(&b));
    }
}
