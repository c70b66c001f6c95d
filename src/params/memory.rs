//! In-memory parameter registry using DashMap.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;

use crate::core::error::{ReaderError, Result};
use crate::params::keys;
use crate::params::traits::ParameterStore;
use crate::params::value::ParamValue;

type Validator = Box<dyn Fn(&ParamValue) -> Result<()> + Send + Sync>;

/// In-memory parameter registry.
///
/// The default backend for standalone use. Values live in a DashMap;
/// validators are fixed at construction, one per key.
pub struct MemoryParams {
    values: DashMap<String, ParamValue>,
    validators: HashMap<String, Validator>,
}

impl MemoryParams {
    /// Empty registry with no keys.
    pub fn new() -> Self {
        Self {
            values: DashMap::new(),
            validators: HashMap::new(),
        }
    }

    /// Registry pre-populated with the engine's operating parameters and
    /// their validators.
    pub fn with_defaults() -> Self {
        let mut params = Self::new();

        params.register(keys::COMMAND_TIMEOUT, 1000.into(), int_range(0, 65_535));
        params.register(keys::TRANSPORT_TIMEOUT, 5000.into(), int_range(0, 65_535));
        params.register(keys::ASYNC_ON_TIME, 250.into(), int_range(0, 65_535));
        params.register(keys::ASYNC_OFF_TIME, 0.into(), int_range(0, 65_535));
        params.register(keys::TAGOP_ANTENNA, 1.into(), int_range(1, 255));
        params.register(keys::TAGOP_PROTOCOL, "GEN2".into(), protocol_token());
        params.register(keys::ACCESS_PASSWORD, 0.into(), int_range(0, u32::MAX as i64));
        params.register(keys::GEN2_SESSION, 0.into(), int_range(0, 3));
        params.register(keys::GEN2_INIT_Q, 4.into(), int_range(0, 15));
        params.register(keys::GEN2_TARGET, "A".into(), one_of(&["A", "B", "AB", "BA"]));
        params.register(keys::READ_FILTER, true.into(), bool_only());
        params.register(keys::UNIQUE_BY_ANTENNA, false.into(), bool_only());
        params.register(keys::RECORD_HIGHEST_RSSI, false.into(), bool_only());

        params
    }

    /// Register a key with its default value and validator.
    pub fn register(&mut self, key: &str, default: ParamValue, validator: Validator) {
        self.values.insert(key.to_string(), default);
        self.validators.insert(key.to_string(), validator);
    }
}

impl Default for MemoryParams {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[async_trait]
impl ParameterStore for MemoryParams {
    async fn get(&self, key: &str) -> Result<ParamValue> {
        self.values
            .get(key)
            .map(|r| r.value().clone())
            .ok_or_else(|| ReaderError::Config(format!("unknown parameter: {}", key)))
    }

    async fn set(&self, key: &str, value: ParamValue) -> Result<()> {
        let validator = self
            .validators
            .get(key)
            .ok_or_else(|| ReaderError::Config(format!("unknown parameter: {}", key)))?;
        validator(&value)?;
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.validators.keys().cloned().collect();
        keys.sort();
        keys
    }
}

fn int_range(min: i64, max: i64) -> Validator {
    Box::new(move |v| match v.as_i64() {
        Some(n) if (min..=max).contains(&n) => Ok(()),
        Some(n) => Err(ReaderError::IllegalArgument(format!(
            "value {} out of range {}..={}",
            n, min, max
        ))),
        None => Err(ReaderError::IllegalArgument("integer value required".into())),
    })
}

fn bool_only() -> Validator {
    Box::new(|v| {
        v.as_bool()
            .map(|_| ())
            .ok_or_else(|| ReaderError::IllegalArgument("boolean value required".into()))
    })
}

fn one_of(allowed: &'static [&'static str]) -> Validator {
    Box::new(move |v| match v.as_str() {
        Some(s) if allowed.contains(&s) => Ok(()),
        _ => Err(ReaderError::IllegalArgument(format!(
            "value must be one of {:?}",
            allowed
        ))),
    })
}

fn protocol_token() -> Validator {
    Box::new(|v| match v.as_str() {
        Some(s) if crate::core::tag::TagProtocol::from_rql_token(s).is_some() => Ok(()),
        _ => Err(ReaderError::IllegalArgument(
            "value must be a protocol token (GEN2, ISO18000-6B, ...)".into(),
        )),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_defaults_present() {
        let params = MemoryParams::with_defaults();
        let v = params.get(keys::COMMAND_TIMEOUT).await.unwrap();
        assert_eq!(v.as_u64(), Some(1000));
    }

    #[tokio::test]
    async fn test_unknown_key() {
        let params = MemoryParams::with_defaults();
        assert!(matches!(
            params.get("/reader/bogus").await,
            Err(ReaderError::Config(_))
        ));
        assert!(matches!(
            params.set("/reader/bogus", 1.into()).await,
            Err(ReaderError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_validation_rejects_out_of_range() {
        let params = MemoryParams::with_defaults();
        assert!(matches!(
            params.set(keys::GEN2_SESSION, 4.into()).await,
            Err(ReaderError::IllegalArgument(_))
        ));
        params.set(keys::GEN2_SESSION, 2.into()).await.unwrap();
        assert_eq!(params.get(keys::GEN2_SESSION).await.unwrap().as_i64(), Some(2));
    }

    #[tokio::test]
    async fn test_target_enum() {
        let params = MemoryParams::with_defaults();
        params.set(keys::GEN2_TARGET, "AB".into()).await.unwrap();
        assert!(params.set(keys::GEN2_TARGET, "C".into()).await.is_err());
    }

    #[tokio::test]
    async fn test_protocol_token_validation() {
        let params = MemoryParams::with_defaults();
        params
            .set(keys::TAGOP_PROTOCOL, "ISO18000-6B".into())
            .await
            .unwrap();
        assert!(params.set(keys::TAGOP_PROTOCOL, "LLRP".into()).await.is_err());
    }
}
