use crate::model::EntityValue;
use crate::store::traits::InstanceSource;
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

/// An in-memory instance store keyed by identifier.
///
/// Backs the demo fixture and tests, and holds the transient descriptor
/// projection the assembler feeds to the traversal engine. The lock guards
/// the store's own mutability; the descriptor graph itself is immutable and
/// never lives here.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<Uuid, EntityValue>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, value: EntityValue) {
        self.values.write().insert(value.uuid, value);
    }

    pub fn extend(&self, values: impl IntoIterator<Item = EntityValue>) {
        let mut guard = self.values.write();
        for value in values {
            guard.insert(value.uuid, value);
        }
    }

    pub fn remove(&self, uuid: &Uuid) -> Option<EntityValue> {
        self.values.write().remove(uuid)
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }

    pub fn clear(&self) {
        self.values.write().clear();
    }
}

impl InstanceSource for MemoryStore {
    fn get(&self, uuid: &Uuid) -> Option<EntityValue> {
        self.values.read().get(uuid).cloned()
    }
}
