//! ParameterStore trait definition.

use async_trait::async_trait;

use crate::core::error::Result;
use crate::params::value::ParamValue;

/// Trait for the reader's configuration parameter registry.
///
/// The engine reads operating parameters (tag-op antenna, access password,
/// timeouts, dedup flags) through this boundary and never caches them
/// beyond what a single operation needs. Implementations validate values
/// per key on `set`.
#[async_trait]
pub trait ParameterStore: Send + Sync {
    /// Read a parameter.
    ///
    /// Unknown keys are a configuration error.
    async fn get(&self, key: &str) -> Result<ParamValue>;

    /// Write a parameter, running the key's validator first.
    async fn set(&self, key: &str, value: ParamValue) -> Result<()>;

    /// All registered keys.
    fn keys(&self) -> Vec<String>;
}
