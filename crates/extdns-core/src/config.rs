//! Configuration types for the reconciliation engine
//!
//! Durations are expressed in (possibly fractional) seconds on the wire.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::endpoint::{DomainFilter, RecordType, ZoneIdFilter};
use crate::plan::{Policy, TieBreak};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtDnsConfig {
    /// DNS provider configuration
    pub provider: ProviderConfig,

    /// Sources of desired endpoints
    #[serde(default)]
    pub sources: Vec<SourceConfig>,

    /// Ownership registry configuration
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Domain and zone scoping
    #[serde(default)]
    pub filters: FilterConfig,

    /// Control loop settings
    #[serde(default)]
    pub controller: ControllerConfig,
}

impl ExtDnsConfig {
    /// Create a configuration with defaults for everything but the provider
    pub fn new(provider: ProviderConfig) -> Self {
        Self {
            provider,
            sources: Vec::new(),
            registry: RegistryConfig::default(),
            filters: FilterConfig::default(),
            controller: ControllerConfig::default(),
        }
    }

    pub fn with_source(mut self, source: SourceConfig) -> Self {
        self.sources.push(source);
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.sources.is_empty() {
            return Err(crate::Error::config("No sources configured"));
        }

        self.provider.validate()?;
        for source in &self.sources {
            source.validate()?;
        }
        self.registry.validate()?;
        self.filters.validate()?;
        self.controller.validate()?;

        Ok(())
    }
}

/// DNS provider configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Remote provider reached over the webhook protocol
    Webhook {
        /// Base URL of the webhook server
        url: String,
        /// Timeout for read requests
        #[serde(default = "default_webhook_read_timeout", with = "secs")]
        read_timeout: Duration,
        /// Timeout for write requests
        #[serde(default = "default_webhook_write_timeout", with = "secs")]
        write_timeout: Duration,
    },

    /// In-process provider, records live in memory
    InMemory {
        /// Zone names served by the provider
        #[serde(default)]
        zones: Vec<String>,
    },

    /// Custom provider
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl ProviderConfig {
    /// Webhook provider with default timeouts
    pub fn webhook(url: impl Into<String>) -> Self {
        ProviderConfig::Webhook {
            url: url.into(),
            read_timeout: default_webhook_read_timeout(),
            write_timeout: default_webhook_write_timeout(),
        }
    }

    /// Validate the provider configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            ProviderConfig::Webhook {
                url,
                read_timeout,
                write_timeout,
            } => {
                if url.is_empty() {
                    return Err(crate::Error::config("Webhook provider URL cannot be empty"));
                }
                if read_timeout.is_zero() || write_timeout.is_zero() {
                    return Err(crate::Error::config("Webhook provider timeouts must be > 0"));
                }
                Ok(())
            }
            ProviderConfig::InMemory { .. } => Ok(()),
            ProviderConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(crate::Error::config(
                        "Custom provider factory cannot be empty",
                    ));
                }
                if config.is_null() {
                    return Err(crate::Error::config(
                        "Custom provider config cannot be null",
                    ));
                }
                Ok(())
            }
        }
    }

    /// Get the provider type name, used as the factory key
    pub fn type_name(&self) -> &str {
        match self {
            ProviderConfig::Webhook { .. } => "webhook",
            ProviderConfig::InMemory { .. } => "inmemory",
            ProviderConfig::Custom { factory, .. } => factory,
        }
    }
}

/// Source configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceConfig {
    /// HTTP endpoint feed returning a JSON list of endpoints
    Http {
        /// URL of the feed
        url: String,
        /// Polling interval used for change notifications
        #[serde(default = "default_source_poll_interval", with = "secs")]
        interval: Duration,
    },

    /// Custom source
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl SourceConfig {
    /// HTTP feed source with the default polling interval
    pub fn http(url: impl Into<String>) -> Self {
        SourceConfig::Http {
            url: url.into(),
            interval: default_source_poll_interval(),
        }
    }

    /// Validate the source configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            SourceConfig::Http { url, interval } => {
                if url.is_empty() {
                    return Err(crate::Error::config("HTTP source URL cannot be empty"));
                }
                if interval.is_zero() {
                    return Err(crate::Error::config("HTTP source interval must be > 0"));
                }
                Ok(())
            }
            SourceConfig::Custom { factory, .. } => {
                if factory.is_empty() {
                    return Err(crate::Error::config("Custom source factory cannot be empty"));
                }
                Ok(())
            }
        }
    }

    /// Get the source type name, used as the factory key
    pub fn type_name(&self) -> &str {
        match self {
            SourceConfig::Http { .. } => "http",
            SourceConfig::Custom { factory, .. } => factory,
        }
    }
}

/// Ownership registry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegistryConfig {
    /// Companion TXT records hold the ownership ledger
    Txt {
        /// Identifier written into every companion record
        #[serde(default = "default_owner_id")]
        owner_id: String,
        /// Prefix applied to companion names (exclusive with `suffix`)
        #[serde(default)]
        prefix: String,
        /// Suffix applied to companion names (exclusive with `prefix`)
        #[serde(default)]
        suffix: String,
        /// Replacement for a leading `*` label in companion names
        #[serde(default)]
        wildcard_replacement: String,
        /// Only write current-format companions
        #[serde(default)]
        new_format_only: bool,
        /// How long a provider listing may be served from cache; zero disables
        #[serde(default, with = "secs")]
        cache_interval: Duration,
    },

    /// No ownership tracking, every in-scope record is considered managed
    Noop,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig::Txt {
            owner_id: default_owner_id(),
            prefix: String::new(),
            suffix: String::new(),
            wildcard_replacement: String::new(),
            new_format_only: false,
            cache_interval: Duration::ZERO,
        }
    }
}

impl RegistryConfig {
    /// Validate the registry configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            RegistryConfig::Txt {
                owner_id,
                prefix,
                suffix,
                ..
            } => {
                if owner_id.trim().is_empty() {
                    return Err(crate::Error::config("TXT registry owner id cannot be empty"));
                }
                if !prefix.is_empty() && !suffix.is_empty() {
                    return Err(crate::Error::config(
                        "TXT registry prefix and suffix are mutually exclusive",
                    ));
                }
                Ok(())
            }
            RegistryConfig::Noop => Ok(()),
        }
    }

    pub fn type_name(&self) -> &str {
        match self {
            RegistryConfig::Txt { .. } => "txt",
            RegistryConfig::Noop => "noop",
        }
    }
}

/// Domain and zone scoping
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Domains to manage; empty manages everything
    #[serde(default)]
    pub domain_filter: Vec<String>,
    /// Domains never to touch
    #[serde(default)]
    pub exclude_domains: Vec<String>,
    /// Hosted zone ids to manage; empty manages every zone
    #[serde(default)]
    pub zone_id_filter: Vec<String>,
    /// Regex of domains to manage; overrides the suffix lists when set
    #[serde(default)]
    pub regex_domain_filter: String,
    /// Regex of domains never to touch
    #[serde(default)]
    pub regex_domain_exclusion: String,
}

impl FilterConfig {
    /// Build the domain filter
    ///
    /// # Errors
    ///
    /// `Error::Config` when a regex does not compile.
    pub fn domain_filter(&self) -> Result<DomainFilter, crate::Error> {
        DomainFilter::new(&self.domain_filter, &self.exclude_domains)
            .with_regex(&self.regex_domain_filter, &self.regex_domain_exclusion)
    }

    pub fn validate(&self) -> Result<(), crate::Error> {
        self.domain_filter().map(|_| ())
    }

    pub fn zone_id_filter(&self) -> ZoneIdFilter {
        ZoneIdFilter::new(self.zone_id_filter.iter().cloned())
    }
}

/// Control loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Time between periodic reconciliation cycles
    #[serde(default = "default_interval", with = "secs")]
    pub interval: Duration,

    /// Minimum time between the start of two cycles triggered by events
    #[serde(default = "default_min_event_sync_interval", with = "secs")]
    pub min_event_sync_interval: Duration,

    /// Deadline for a single cycle
    #[serde(default = "default_cycle_timeout", with = "secs")]
    pub cycle_timeout: Duration,

    /// Run a single cycle and exit; any error is fatal
    #[serde(default)]
    pub once: bool,

    /// Compute and log changes without applying them
    #[serde(default)]
    pub dry_run: bool,

    /// Subscribe to source change notifications
    #[serde(default)]
    pub events: bool,

    /// Which kinds of changes may be applied
    #[serde(default)]
    pub policy: Policy,

    /// Record types the controller manages
    #[serde(default = "default_managed_record_types")]
    pub managed_record_types: Vec<RecordType>,

    /// Abort the cycle when any source fails instead of skipping it
    #[serde(default)]
    pub fail_on_source_error: bool,

    /// How conflicting single-target desired endpoints are resolved
    #[serde(default)]
    pub tie_break: TieBreak,

    /// Capacity of the controller event channel
    ///
    /// When full, new events are dropped with a warning log.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            min_event_sync_interval: default_min_event_sync_interval(),
            cycle_timeout: default_cycle_timeout(),
            once: false,
            dry_run: false,
            events: false,
            policy: Policy::default(),
            managed_record_types: default_managed_record_types(),
            fail_on_source_error: false,
            tie_break: TieBreak::default(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

impl ControllerConfig {
    /// Validate the controller configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.interval.is_zero() {
            return Err(crate::Error::config("Controller interval must be > 0"));
        }
        if self.cycle_timeout.is_zero() {
            return Err(crate::Error::config("Controller cycle timeout must be > 0"));
        }
        if self.managed_record_types.is_empty() {
            return Err(crate::Error::config("No managed record types configured"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }
}

fn default_owner_id() -> String {
    "default".to_string()
}

fn default_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_min_event_sync_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_cycle_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_managed_record_types() -> Vec<RecordType> {
    vec![RecordType::A, RecordType::AAAA, RecordType::CNAME]
}

fn default_event_channel_capacity() -> usize {
    1000
}

fn default_webhook_read_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_webhook_write_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_source_poll_interval() -> Duration {
    Duration::from_secs(60)
}

/// Serde helpers for durations written as seconds
mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> ExtDnsConfig {
        ExtDnsConfig::new(ProviderConfig::InMemory {
            zones: vec!["example.com".to_string()],
        })
        .with_source(SourceConfig::http("http://feed.local/endpoints"))
    }

    #[test]
    fn defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.interval, Duration::from_secs(60));
        assert_eq!(config.min_event_sync_interval, Duration::from_secs(5));
        assert_eq!(config.policy, Policy::Sync);
        assert_eq!(
            config.managed_record_types,
            vec![RecordType::A, RecordType::AAAA, RecordType::CNAME]
        );
        assert!(!config.once && !config.dry_run && !config.events);

        match RegistryConfig::default() {
            RegistryConfig::Txt {
                owner_id,
                cache_interval,
                new_format_only,
                ..
            } => {
                assert_eq!(owner_id, "default");
                assert!(cache_interval.is_zero());
                assert!(!new_format_only);
            }
            RegistryConfig::Noop => panic!("default registry should be txt"),
        }
    }

    #[test]
    fn minimal_config_is_valid() {
        assert!(minimal().validate().is_ok());
    }

    #[test]
    fn no_sources_is_fatal() {
        let config = ExtDnsConfig::new(ProviderConfig::InMemory { zones: vec![] });
        assert!(config.validate().unwrap_err().is_config());
    }

    #[test]
    fn prefix_and_suffix_are_exclusive() {
        let mut config = minimal();
        config.registry = RegistryConfig::Txt {
            owner_id: "default".to_string(),
            prefix: "p-".to_string(),
            suffix: "-s".to_string(),
            wildcard_replacement: String::new(),
            new_format_only: false,
            cache_interval: Duration::ZERO,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_owner_id_is_fatal() {
        let registry = RegistryConfig::Txt {
            owner_id: " ".to_string(),
            prefix: String::new(),
            suffix: String::new(),
            wildcard_replacement: String::new(),
            new_format_only: false,
            cache_interval: Duration::ZERO,
        };
        assert!(registry.validate().is_err());
    }

    #[test]
    fn invalid_domain_regex_is_fatal() {
        let mut config = minimal();
        config.filters.regex_domain_filter = "[a-".to_string();
        assert!(config.validate().unwrap_err().is_config());

        config.filters.regex_domain_filter = r"\.example\.org$".to_string();
        let filter = config.filters.domain_filter().unwrap();
        assert!(filter.matches("www.example.org"));
        assert!(!filter.matches("www.example.com"));
    }

    #[test]
    fn zero_interval_is_fatal() {
        let mut config = minimal();
        config.controller.interval = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn deserializes_from_json() {
        let config: ExtDnsConfig = serde_json::from_value(serde_json::json!({
            "provider": {"type": "webhook", "url": "http://localhost:8888"},
            "sources": [{"type": "http", "url": "http://feed", "interval": 0.5}],
            "registry": {"type": "txt", "owner_id": "cluster-a", "prefix": "%{record_type}-"},
            "filters": {"domain_filter": ["example.com"]},
            "controller": {"interval": 30, "policy": "upsert-only", "events": true}
        }))
        .unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(config.provider.type_name(), "webhook");
        match &config.provider {
            ProviderConfig::Webhook {
                read_timeout,
                write_timeout,
                ..
            } => {
                assert_eq!(*read_timeout, Duration::from_secs(5));
                assert_eq!(*write_timeout, Duration::from_secs(10));
            }
            other => panic!("unexpected provider {other:?}"),
        }
        match &config.sources[0] {
            SourceConfig::Http { interval, .. } => {
                assert_eq!(*interval, Duration::from_millis(500))
            }
            other => panic!("unexpected source {other:?}"),
        }
        assert_eq!(config.controller.interval, Duration::from_secs(30));
        assert_eq!(config.controller.policy, Policy::UpsertOnly);
        assert!(config.filters.domain_filter().unwrap().matches("a.example.com"));
    }

    #[test]
    fn negative_duration_is_rejected() {
        let result: Result<ControllerConfig, _> =
            serde_json::from_value(serde_json::json!({"interval": -1}));
        assert!(result.is_err());
    }
}
