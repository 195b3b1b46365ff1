//! Per-client entity descriptor registry

use std::collections::HashMap;
use std::sync::Arc;

use mailwire_domain::{catalog, EntityDescriptor, MailwireError, Result};
use parking_lot::RwLock;
use tracing::debug;

/// Descriptors resolved on first use and shared read-only afterwards.
#[derive(Default)]
pub struct EntityRegistry {
    entries: RwLock<HashMap<String, Arc<EntityDescriptor>>>,
}

impl EntityRegistry {
    /// Empty registry; built-in entities load on first lookup.
    pub fn new() -> Self {
        Self::default()
    }

    /// Descriptor for `entity`, resolving built-in entities on first access.
    pub fn get(&self, entity: &str) -> Result<Arc<EntityDescriptor>> {
        let key = entity.to_ascii_lowercase();
        if let Some(descriptor) = self.entries.read().get(&key) {
            return Ok(Arc::clone(descriptor));
        }

        let descriptor = catalog::standard(entity)
            .ok_or_else(|| MailwireError::NotFound(format!("unknown entity type '{entity}'")))?;

        let mut entries = self.entries.write();
        let descriptor = entries.entry(key).or_insert_with(|| {
            debug!(entity = descriptor.name(), "descriptor registered");
            Arc::new(descriptor)
        });
        Ok(Arc::clone(descriptor))
    }

    /// Add or replace a descriptor.
    pub fn register(&self, descriptor: EntityDescriptor) -> Arc<EntityDescriptor> {
        let descriptor = Arc::new(descriptor);
        self.entries
            .write()
            .insert(descriptor.name().to_ascii_lowercase(), Arc::clone(&descriptor));
        descriptor
    }

    /// Number of descriptors resolved so far.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
