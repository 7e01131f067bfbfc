//! Capability traits at the system's seams
//!
//! - [`Source`]: Produce the desired endpoints
//! - [`Provider`]: List and change records at a DNS backend

pub mod provider;
pub mod source;

pub use provider::{Provider, ProviderFactory};
pub use source::{EventHandler, Source, SourceFactory};
