use async_trait::async_trait;
use extdns_core::traits::Provider;
use extdns_core::{Changes, DomainFilter, Endpoint, Error, Result};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::sync::OnceCell;

use crate::MEDIA_TYPE;

const PROVIDER_NAME: &str = "webhook";

/// Provider forwarding every call to a remote webhook server
///
/// The domain filter is negotiated once, on first use, and kept for the
/// lifetime of the provider.
pub struct WebhookProvider {
    url: String,
    client: reqwest::Client,
    read_timeout: Duration,
    write_timeout: Duration,
    domain_filter: OnceCell<DomainFilter>,
}

impl std::fmt::Debug for WebhookProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookProvider")
            .field("url", &self.url)
            .field("read_timeout", &self.read_timeout)
            .field("write_timeout", &self.write_timeout)
            .finish()
    }
}

impl WebhookProvider {
    /// Create a new webhook provider client
    ///
    /// # Parameters
    ///
    /// - `url`: Base URL of the webhook server, e.g. `http://localhost:8888`
    /// - `read_timeout`: Deadline for `GET` requests
    /// - `write_timeout`: Deadline for `POST` requests
    pub fn new(
        url: impl Into<String>,
        read_timeout: Duration,
        write_timeout: Duration,
    ) -> Result<Self> {
        let url = url.into().trim_end_matches('/').to_string();
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            url,
            client,
            read_timeout,
            write_timeout,
            domain_filter: OnceCell::new(),
        })
    }

    /// Base URL this client talks to
    pub fn url(&self) -> &str {
        &self.url
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client
            .get(format!("{}{}", self.url, path))
            .header(ACCEPT, MEDIA_TYPE)
            .timeout(self.read_timeout)
    }

    fn post<T: serde::Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<RequestBuilder> {
        Ok(self
            .client
            .post(format!("{}{}", self.url, path))
            .header(ACCEPT, MEDIA_TYPE)
            .header(CONTENT_TYPE, MEDIA_TYPE)
            .body(serde_json::to_vec(body)?)
            .timeout(self.write_timeout))
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::provider(PROVIDER_NAME, format!("{} timed out: {}", what, e))
            } else {
                Error::provider(PROVIDER_NAME, format!("HTTP request failed: {}", e))
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error response".to_string());
        Err(status_error(status, what, &body))
    }

    async fn decode<T: DeserializeOwned>(response: Response, what: &str) -> Result<T> {
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::provider(PROVIDER_NAME, format!("Failed to read {}: {}", what, e)))?;
        serde_json::from_slice(&bytes).map_err(|e| {
            Error::provider(PROVIDER_NAME, format!("Failed to parse {}: {}", what, e))
        })
    }

    async fn negotiate(&self) -> Result<DomainFilter> {
        let response = self.send(self.get("/"), "negotiation").await?;
        let filter: DomainFilter = Self::decode(response, "domain filter").await?;
        tracing::debug!(
            "Negotiated with webhook at {}: include={:?} exclude={:?}",
            self.url,
            filter.include,
            filter.exclude
        );
        Ok(filter)
    }
}

/// Map a non-2xx status onto the error taxonomy
fn status_error(status: StatusCode, what: &str, body: &str) -> Error {
    match status.as_u16() {
        401 | 403 => Error::auth(format!(
            "Webhook rejected {}: status {}",
            what, status
        )),
        404 => Error::not_found(format!("Webhook {} endpoint: status {}", what, status)),
        429 => Error::rate_limited(format!("Webhook throttled {}: status {}", what, status)),
        500..=599 => Error::provider(
            PROVIDER_NAME,
            format!("Webhook server error (transient) on {}: {} - {}", what, status, body),
        ),
        _ => Error::provider(
            PROVIDER_NAME,
            format!("Webhook {} failed: {} - {}", what, status, body),
        ),
    }
}

#[async_trait]
impl Provider for WebhookProvider {
    async fn records(&self) -> Result<Vec<Endpoint>> {
        let response = self.send(self.get("/records"), "records").await?;
        let records: Vec<Endpoint> = Self::decode(response, "records").await?;
        tracing::debug!("Webhook returned {} record(s)", records.len());
        Ok(records)
    }

    async fn apply_changes(&self, changes: &Changes) -> Result<()> {
        tracing::info!(
            "Sending {} change(s) to webhook at {}",
            changes.len(),
            self.url
        );
        self.send(self.post("/records", changes)?, "apply changes")
            .await?;
        Ok(())
    }

    async fn adjust_endpoints(&self, endpoints: Vec<Endpoint>) -> Result<Vec<Endpoint>> {
        let response = self
            .send(self.post("/adjustendpoints", &endpoints)?, "adjust endpoints")
            .await?;
        Self::decode(response, "adjusted endpoints").await
    }

    async fn domain_filter(&self) -> Result<DomainFilter> {
        self.domain_filter
            .get_or_try_init(|| self.negotiate())
            .await
            .cloned()
    }

    fn name(&self) -> &str {
        PROVIDER_NAME
    }
}
