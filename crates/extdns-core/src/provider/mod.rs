//! Provider implementations shipped with the core crate

pub mod inmemory;

pub use inmemory::{InMemoryProvider, InMemoryProviderFactory};
