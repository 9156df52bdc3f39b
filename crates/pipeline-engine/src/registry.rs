//! Algorithm registry
//!
//! Maps algorithm type identifiers to factories and their metadata. The
//! persistence layer resolves saved nodes through it, and the editor lists
//! its entries as the node palette.
//!
//! Plugins register themselves at link time:
//!
//! ```ignore
//! inventory::submit!(pipeline_engine::AlgorithmRegistration {
//!     type_id: "first-order-statistics",
//!     create: || Arc::new(FirstOrderStatistics),
//! });
//!
//! let registry = AlgorithmRegistry::with_registered();
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use crate::contract::{Algorithm, AlgorithmCategory, AlgorithmMetadata};
use crate::error::{PipelineError, Result};

/// Factory producing a fresh algorithm instance
pub type AlgorithmFactory = Arc<dyn Fn() -> Arc<dyn Algorithm> + Send + Sync>;

/// Link-time registration of an algorithm type
pub struct AlgorithmRegistration {
    /// Must equal the `type_id` in the algorithm's metadata.
    pub type_id: &'static str,
    pub create: fn() -> Arc<dyn Algorithm>,
}

inventory::collect!(AlgorithmRegistration);

struct RegistryEntry {
    metadata: AlgorithmMetadata,
    factory: AlgorithmFactory,
}

/// Registry of algorithm types with their metadata and factories
pub struct AlgorithmRegistry {
    entries: HashMap<String, RegistryEntry>,
}

impl AlgorithmRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Create a registry holding every algorithm submitted via `inventory`
    pub fn with_registered() -> Self {
        let mut registry = Self::new();
        for registration in inventory::iter::<AlgorithmRegistration> {
            let create = registration.create;
            let metadata = create().metadata();
            if metadata.type_id != registration.type_id {
                log::warn!(
                    "Registration '{}' creates algorithm with type id '{}'",
                    registration.type_id,
                    metadata.type_id
                );
            }
            registry.insert(metadata, Arc::new(create));
        }
        log::debug!("Registered {} algorithm type(s)", registry.len());
        registry
    }

    /// Register an algorithm type; metadata is queried from one instance.
    pub fn register<F>(&mut self, factory: F)
    where
        F: Fn() -> Arc<dyn Algorithm> + Send + Sync + 'static,
    {
        let metadata = factory().metadata();
        self.insert(metadata, Arc::new(factory));
    }

    fn insert(&mut self, metadata: AlgorithmMetadata, factory: AlgorithmFactory) {
        self.entries
            .insert(metadata.type_id.clone(), RegistryEntry { metadata, factory });
    }

    /// Create a new instance of an algorithm type
    pub fn create(&self, type_id: &str) -> Result<Arc<dyn Algorithm>> {
        self.entries
            .get(type_id)
            .map(|e| (e.factory)())
            .ok_or_else(|| PipelineError::UnknownAlgorithm(type_id.to_string()))
    }

    /// Get metadata for an algorithm type
    pub fn get_metadata(&self, type_id: &str) -> Option<&AlgorithmMetadata> {
        self.entries.get(type_id).map(|e| &e.metadata)
    }

    /// Get all registered metadata
    pub fn all_metadata(&self) -> Vec<&AlgorithmMetadata> {
        self.entries.values().map(|e| &e.metadata).collect()
    }

    /// Get metadata grouped by category
    pub fn metadata_by_category(&self) -> HashMap<AlgorithmCategory, Vec<&AlgorithmMetadata>> {
        let mut grouped: HashMap<AlgorithmCategory, Vec<&AlgorithmMetadata>> = HashMap::new();
        for entry in self.entries.values() {
            grouped
                .entry(entry.metadata.category)
                .or_default()
                .push(&entry.metadata);
        }
        grouped
    }

    /// Check if an algorithm type is registered
    pub fn has_type(&self, type_id: &str) -> bool {
        self.entries.contains_key(type_id)
    }

    /// List all registered type ids
    pub fn type_ids(&self) -> Vec<&str> {
        self.entries.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge another registry into this one
    ///
    /// Entries from `other` override entries in `self` if they share the same type id.
    pub fn merge(&mut self, other: AlgorithmRegistry) {
        self.entries.extend(other.entries);
    }
}

impl Default for AlgorithmRegistry {
    fn default() -> Self {
        Self::new()
    }
}
