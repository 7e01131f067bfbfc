//! Name → factory mapping for providers and sources
//!
//! The mapping is built explicitly by the embedding program and handed to
//! [`Controller::build`](crate::Controller::build); there is no process-wide
//! registration.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use extdns_core::Factories;
//!
//! let mut factories = Factories::with_builtin();
//! extdns_provider_webhook::register(&mut factories);
//! extdns_source_http::register(&mut factories);
//!
//! let provider = factories.create_provider(&config.provider)?;
//! ```
//!
//! Adapter crates expose a `register(&mut Factories)` function that inserts
//! their factory under the name their config variant reports through
//! `type_name()`.

use std::collections::HashMap;

use crate::config::{ProviderConfig, SourceConfig};
use crate::error::{Error, Result};
use crate::provider::InMemoryProviderFactory;
use crate::traits::{Provider, ProviderFactory, Source, SourceFactory};

/// Provider and source factories keyed by type name
#[derive(Default)]
pub struct Factories {
    providers: HashMap<String, Box<dyn ProviderFactory>>,
    sources: HashMap<String, Box<dyn SourceFactory>>,
}

impl Factories {
    /// Create an empty mapping
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mapping holding the factories shipped with this crate
    pub fn with_builtin() -> Self {
        let mut factories = Self::new();
        factories.register_provider("inmemory", Box::new(InMemoryProviderFactory));
        factories
    }

    /// Register a provider factory, replacing any previous one of that name
    ///
    /// # Parameters
    ///
    /// - `name`: Provider type name (e.g., "webhook", "inmemory")
    /// - `factory`: Factory object for creating provider instances
    pub fn register_provider(&mut self, name: impl Into<String>, factory: Box<dyn ProviderFactory>) {
        self.providers.insert(name.into(), factory);
    }

    /// Register a source factory, replacing any previous one of that name
    pub fn register_source(&mut self, name: impl Into<String>, factory: Box<dyn SourceFactory>) {
        self.sources.insert(name.into(), factory);
    }

    /// Create a provider from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn Provider>)`: Created provider instance
    /// - `Err(Error::Config)`: If no factory is registered for the type
    pub fn create_provider(&self, config: &ProviderConfig) -> Result<Box<dyn Provider>> {
        let name = config.type_name();
        let factory = self.providers.get(name).ok_or_else(|| {
            Error::config(format!(
                "Unknown provider type: {}. Available: {:?}",
                name,
                self.list_providers()
            ))
        })?;
        factory.create(config)
    }

    /// Create a source from configuration
    pub fn create_source(&self, config: &SourceConfig) -> Result<Box<dyn Source>> {
        let name = config.type_name();
        let factory = self.sources.get(name).ok_or_else(|| {
            Error::config(format!(
                "Unknown source type: {}. Available: {:?}",
                name,
                self.list_sources()
            ))
        })?;
        factory.create(config)
    }

    /// Registered provider type names, sorted
    pub fn list_providers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Registered source type names, sorted
    pub fn list_sources(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sources.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn has_provider(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    pub fn has_source(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }
}
