//! Daemon settings read from `EXTDNS_*` environment variables

use anyhow::{Context, Result, anyhow, bail};
use extdns_core::config::{ProviderConfig, RegistryConfig, SourceConfig};
use extdns_core::{ExtDnsConfig, Policy, RecordType, TieBreak};
use std::net::SocketAddr;
use std::time::Duration;

const DEFAULT_WEBHOOK_URL: &str = "http://localhost:8888";
const DEFAULT_WEBHOOK_SERVER_ADDR: &str = "127.0.0.1:8888";

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Everything the daemon needs to start
#[derive(Debug, Clone)]
pub struct Settings {
    pub config: ExtDnsConfig,
    pub log_level: String,
    pub log_format: LogFormat,
    /// Serve the configured provider over the webhook protocol on this
    /// address instead of running the controller
    pub webhook_server: Option<SocketAddr>,
}

impl Settings {
    /// Load settings from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through `lookup`, which maps a variable name to its value
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env = Env(&lookup);

        let provider = match env.get("EXTDNS_PROVIDER").as_deref().unwrap_or("webhook") {
            "webhook" => {
                let mut provider = ProviderConfig::webhook(
                    env.get("EXTDNS_WEBHOOK_URL")
                        .unwrap_or_else(|| DEFAULT_WEBHOOK_URL.to_string()),
                );
                if let ProviderConfig::Webhook {
                    read_timeout,
                    write_timeout,
                    ..
                } = &mut provider
                {
                    if let Some(timeout) = env.secs("EXTDNS_WEBHOOK_READ_TIMEOUT")? {
                        *read_timeout = timeout;
                    }
                    if let Some(timeout) = env.secs("EXTDNS_WEBHOOK_WRITE_TIMEOUT")? {
                        *write_timeout = timeout;
                    }
                }
                provider
            }
            "inmemory" => ProviderConfig::InMemory {
                zones: env.list("EXTDNS_INMEMORY_ZONES"),
            },
            other => ProviderConfig::Custom {
                factory: other.to_string(),
                config: serde_json::Value::Null,
            },
        };

        let mut config = ExtDnsConfig::new(provider);

        let source_interval = env.secs("EXTDNS_SOURCE_INTERVAL")?;
        for url in env.list("EXTDNS_SOURCE_URLS") {
            let mut source = SourceConfig::http(url);
            if let (SourceConfig::Http { interval, .. }, Some(every)) = (&mut source, source_interval)
            {
                *interval = every;
            }
            config = config.with_source(source);
        }

        config.registry = match env.get("EXTDNS_REGISTRY").as_deref().unwrap_or("txt") {
            "txt" => RegistryConfig::Txt {
                owner_id: env
                    .get("EXTDNS_TXT_OWNER_ID")
                    .unwrap_or_else(|| "default".to_string()),
                prefix: env.get("EXTDNS_TXT_PREFIX").unwrap_or_default(),
                suffix: env.get("EXTDNS_TXT_SUFFIX").unwrap_or_default(),
                wildcard_replacement: env
                    .get("EXTDNS_TXT_WILDCARD_REPLACEMENT")
                    .unwrap_or_default(),
                new_format_only: env.flag("EXTDNS_TXT_NEW_FORMAT_ONLY")?.unwrap_or(false),
                cache_interval: env
                    .secs("EXTDNS_TXT_CACHE_INTERVAL")?
                    .unwrap_or(Duration::ZERO),
            },
            "noop" => RegistryConfig::Noop,
            other => bail!(
                "EXTDNS_REGISTRY '{}' is not supported. Supported registries: txt, noop",
                other
            ),
        };

        config.filters.domain_filter = env.list("EXTDNS_DOMAIN_FILTER");
        config.filters.exclude_domains = env.list("EXTDNS_EXCLUDE_DOMAINS");
        config.filters.zone_id_filter = env.list("EXTDNS_ZONE_ID_FILTER");
        config.filters.regex_domain_filter = env.get("EXTDNS_REGEX_DOMAIN_FILTER").unwrap_or_default();
        config.filters.regex_domain_exclusion = env
            .get("EXTDNS_REGEX_DOMAIN_EXCLUSION")
            .unwrap_or_default();

        let controller = &mut config.controller;
        if let Some(interval) = env.secs("EXTDNS_INTERVAL")? {
            controller.interval = interval;
        }
        if let Some(interval) = env.secs("EXTDNS_MIN_EVENT_SYNC_INTERVAL")? {
            controller.min_event_sync_interval = interval;
        }
        if let Some(timeout) = env.secs("EXTDNS_CYCLE_TIMEOUT")? {
            controller.cycle_timeout = timeout;
        }
        controller.once = env.flag("EXTDNS_ONCE")?.unwrap_or(false);
        controller.dry_run = env.flag("EXTDNS_DRY_RUN")?.unwrap_or(false);
        controller.events = env.flag("EXTDNS_EVENTS")?.unwrap_or(false);
        controller.fail_on_source_error =
            env.flag("EXTDNS_FAIL_ON_SOURCE_ERROR")?.unwrap_or(false);
        if let Some(policy) = env.get("EXTDNS_POLICY") {
            controller.policy = policy
                .parse::<Policy>()
                .map_err(|e| anyhow!("EXTDNS_POLICY: {}", e))?;
        }
        if let Some(tie_break) = env.get("EXTDNS_TIE_BREAK") {
            controller.tie_break = tie_break
                .parse::<TieBreak>()
                .map_err(|e| anyhow!("EXTDNS_TIE_BREAK: {}", e))?;
        }
        let managed = env.list("EXTDNS_MANAGED_RECORD_TYPES");
        if !managed.is_empty() {
            controller.managed_record_types =
                managed.iter().map(|t| RecordType::from(t.as_str())).collect();
        }

        let log_format = match env.get("EXTDNS_LOG_FORMAT").as_deref().unwrap_or("text") {
            "text" => LogFormat::Text,
            "json" => LogFormat::Json,
            other => bail!(
                "EXTDNS_LOG_FORMAT '{}' is not valid. Valid formats: text, json",
                other
            ),
        };

        let webhook_server = if env.flag("EXTDNS_WEBHOOK_SERVER")?.unwrap_or(false) {
            let addr = env
                .get("EXTDNS_WEBHOOK_SERVER_ADDR")
                .unwrap_or_else(|| DEFAULT_WEBHOOK_SERVER_ADDR.to_string());
            Some(
                addr.parse()
                    .with_context(|| format!("EXTDNS_WEBHOOK_SERVER_ADDR '{}' is not a socket address", addr))?,
            )
        } else {
            None
        };

        Ok(Self {
            config,
            log_level: env.get("EXTDNS_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_format,
            webhook_server,
        })
    }

    /// Validate the settings
    ///
    /// Webhook server mode only needs a valid provider; controller mode
    /// validates the whole configuration.
    pub fn validate(&self) -> Result<()> {
        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => bail!(
                "EXTDNS_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        if self.webhook_server.is_some() {
            self.config.provider.validate()?;
            return Ok(());
        }

        if self.config.sources.is_empty() {
            bail!(
                "EXTDNS_SOURCE_URLS must contain at least one feed URL. \
                Set it via: export EXTDNS_SOURCE_URLS=http://feed.local/endpoints"
            );
        }
        for source in &self.config.sources {
            if let SourceConfig::Http { url, .. } = source
                && !url.starts_with("http://")
                && !url.starts_with("https://")
            {
                bail!("EXTDNS_SOURCE_URLS entries must use HTTP or HTTPS. Got: {}", url);
            }
        }
        self.config.validate()?;
        Ok(())
    }
}

/// Typed access to variables through a lookup function
struct Env<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Env<'_> {
    /// Trimmed value; unset and blank are the same
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// Comma-separated list
    fn list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn flag(&self, key: &str) -> Result<Option<bool>> {
        self.get(key)
            .map(|v| match v.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(anyhow!("{} must be a boolean. Got: {}", key, v)),
            })
            .transpose()
    }

    /// Seconds, fractions allowed
    fn secs(&self, key: &str) -> Result<Option<Duration>> {
        self.get(key)
            .map(|v| {
                v.parse::<f64>()
                    .ok()
                    .and_then(|s| Duration::try_from_secs_f64(s).ok())
                    .ok_or_else(|| anyhow!("{} must be a number of seconds. Got: {}", key, v))
            })
            .transpose()
    }
}
