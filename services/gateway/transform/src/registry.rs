//! Transform lookup by id

use crate::transform::{Transform, TransformId};
use crate::TransformError;
use std::collections::HashMap;
use tracing::debug;

/// Registry of payload codecs keyed by transform id
#[derive(Debug, Clone, Default)]
pub struct TransformRegistry {
    transforms: HashMap<TransformId, Transform>,
}

impl TransformRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding every built-in transform under its default id
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for transform in Transform::BUILTIN {
            registry.register(transform.id(), transform);
        }
        registry
    }

    /// Register a transform, replacing any previous one under `id`
    pub fn register(&mut self, id: TransformId, transform: Transform) {
        debug!("Registering transform {} as id {}", transform, id);
        self.transforms.insert(id, transform);
    }

    /// Look up a transform
    pub fn get(&self, id: TransformId) -> Option<Transform> {
        self.transforms.get(&id).copied()
    }

    /// Look up a transform, failing for unknown ids
    pub fn resolve(&self, id: TransformId) -> Result<Transform, TransformError> {
        self.get(id).ok_or(TransformError::UnknownTransform(id))
    }

    /// Number of registered transforms
    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    /// Whether no transform is registered
    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }
}
