//! Name-to-implementation table for forecasters.

use std::collections::HashMap;
use std::sync::Arc;

use ps_types::{config_error, Forecaster, PsResult};

use crate::{LastValue, LinearAutoregression, WindowAverage};

/// Registered forecasters, kept in registration order.
#[derive(Default, Clone)]
pub struct ModelRegistry {
    models: Vec<Arc<dyn Forecaster>>,
    index: HashMap<String, usize>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in forecaster.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let defaults: Vec<Arc<dyn Forecaster>> = vec![
            Arc::new(LastValue),
            Arc::new(WindowAverage),
            Arc::new(LinearAutoregression::one_step()),
            Arc::new(LinearAutoregression::one_step_constant()),
            Arc::new(LinearAutoregression::batch()),
        ];
        for model in defaults {
            registry.models.push(model.clone());
            registry
                .index
                .insert(model.name().to_string(), registry.models.len() - 1);
        }
        registry
    }

    pub fn register(&mut self, model: Arc<dyn Forecaster>) -> PsResult<()> {
        let name = model.name().to_string();
        if self.index.contains_key(&name) {
            return Err(config_error!("model '{}' is already registered", name));
        }
        self.models.push(model);
        self.index.insert(name, self.models.len() - 1);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Forecaster>> {
        self.index.get(name).map(|&i| Arc::clone(&self.models[i]))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.models.iter().map(|m| m.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("models", &self.names())
            .finish()
    }
}
