//! Step handler registry
//!
//! Lookups read an immutable snapshot; registration builds a new map and
//! swaps it in. A run resolves its handler each time it reaches a step, so a
//! replacement is picked up by in-flight pipelines on their next step.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use super::handler::StepHandler;
use crate::error::{Error, Result};

type HandlerMap = HashMap<String, Arc<dyn StepHandler>>;

/// Mapping from step name to handler
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<Arc<HandlerMap>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its step name, replacing any previous one
    pub fn register(&self, handler: Arc<dyn StepHandler>) -> Option<Arc<dyn StepHandler>> {
        let name = handler.step_name().to_string();
        let mut guard = self.handlers.write();
        let mut next = HandlerMap::clone(&guard);
        let previous = next.insert(name.clone(), handler);
        *guard = Arc::new(next);

        if previous.is_some() {
            tracing::info!(step = %name, "Step handler replaced");
        } else {
            tracing::debug!(step = %name, "Step handler registered");
        }
        previous
    }

    /// Register only if no handler owns the step name yet
    pub fn try_register(&self, handler: Arc<dyn StepHandler>) -> bool {
        let mut guard = self.handlers.write();
        if guard.contains_key(handler.step_name()) {
            return false;
        }
        let mut next = HandlerMap::clone(&guard);
        next.insert(handler.step_name().to_string(), handler);
        *guard = Arc::new(next);
        true
    }

    pub fn unregister(&self, step_name: &str) -> Option<Arc<dyn StepHandler>> {
        let mut guard = self.handlers.write();
        if !guard.contains_key(step_name) {
            return None;
        }
        let mut next = HandlerMap::clone(&guard);
        let removed = next.remove(step_name);
        *guard = Arc::new(next);
        removed
    }

    pub fn resolve(&self, step_name: &str) -> Result<Arc<dyn StepHandler>> {
        self.snapshot()
            .get(step_name)
            .cloned()
            .ok_or_else(|| Error::UnknownStep(step_name.to_string()))
    }

    pub fn contains(&self, step_name: &str) -> bool {
        self.snapshot().contains_key(step_name)
    }

    /// Registered step names, sorted
    pub fn step_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.snapshot().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Current immutable view of the registry
    pub fn snapshot(&self) -> Arc<HandlerMap> {
        self.handlers.read().clone()
    }
}
