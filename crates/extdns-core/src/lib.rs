// # extdns-core
//
// Core library of the DNS reconciliation engine.
//
// ## Architecture Overview
//
// This library keeps a DNS provider's records converged toward the records a
// set of sources declare:
// - **Endpoint**: Canonical representation of one DNS record intent
// - **Source**: Trait for components declaring desired endpoints
// - **Provider**: Trait for DNS backends (list records, apply changes)
// - **Registry**: Provider wrapper tracking which records this instance owns
// - **Plan**: Pure diff of current vs desired records under a policy
// - **Controller**: Loop driving Source → Plan → Registry → Provider
// - **Factories**: Explicit name → factory mapping for providers and sources
//
// ## Design Principles
//
// 1. **Ownership Safety**: Records owned by someone else are never touched
// 2. **Idempotency**: Re-running a cycle on converged state changes nothing
// 3. **Determinism**: Plan output does not depend on input order
// 4. **Library-First**: Everything the daemon does is available as a library

pub mod changes;
pub mod config;
pub mod controller;
pub mod endpoint;
pub mod error;
pub mod factory;
pub mod plan;
pub mod provider;
pub mod registry;
pub mod traits;

// Re-export core types for convenience
pub use changes::Changes;
pub use config::{
    ControllerConfig, ExtDnsConfig, FilterConfig, ProviderConfig, RegistryConfig, SourceConfig,
};
pub use controller::{Controller, ControllerEvent, ControllerState, CycleReport, Trigger};
pub use endpoint::{
    DomainFilter, Endpoint, EndpointKey, RecordType, ZoneIdFilter, ZoneIdName,
};
pub use error::{Error, Result};
pub use factory::Factories;
pub use plan::{OwnershipMode, Plan, PlanResult, Policy, TieBreak};
pub use registry::Registry;
pub use traits::{Provider, Source};
