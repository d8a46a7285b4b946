//! Strategy registry: an explicit name → factory table.
//!
//! Registries are plain values passed to whoever needs them; there is no global.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use super::{BuyAndHold, SmaCross, Strategy, StrategyError, StrategyFactory};
use crate::domain::ParamSet;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    #[error("unknown strategy '{name}' (available: {available})")]
    UnknownStrategy { name: String, available: String },

    #[error("strategy '{0}' is already registered")]
    Duplicate(String),

    #[error("failed to build strategy '{name}': {source}")]
    Build {
        name: String,
        #[source]
        source: StrategyError,
    },
}

#[derive(Clone, Default)]
pub struct StrategyRegistry {
    factories: BTreeMap<String, Arc<dyn StrategyFactory>>,
}

impl fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("strategies", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with `buy_and_hold` and `sma_cross`.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.factories.insert(
            "buy_and_hold".to_string(),
            Arc::new(|params: &ParamSet| -> Result<Box<dyn Strategy>, StrategyError> {
                Ok(Box::new(BuyAndHold::from_params(params)?))
            }),
        );
        registry.factories.insert(
            "sma_cross".to_string(),
            Arc::new(|params: &ParamSet| -> Result<Box<dyn Strategy>, StrategyError> {
                Ok(Box::new(SmaCross::from_params(params)?))
            }),
        );
        registry
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        factory: impl StrategyFactory + 'static,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }
        self.factories.insert(name, Arc::new(factory));
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn StrategyFactory>, RegistryError> {
        self.factories
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownStrategy {
                name: name.to_string(),
                available: self.names().collect::<Vec<_>>().join(", "),
            })
    }

    pub fn build(&self, name: &str, params: &ParamSet) -> Result<Box<dyn Strategy>, RegistryError> {
        self.get(name)?
            .build(params)
            .map_err(|source| RegistryError::Build {
                name: name.to_string(),
                source,
            })
    }
}
