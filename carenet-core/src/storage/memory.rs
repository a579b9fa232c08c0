use super::Repository;
use crate::error::{CarenetError, Result};
use crate::model::{Entity, EntityKey, ParentKey};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// In-process store, ordered by key.
pub struct MemoryRepository<E: Entity> {
    entries: RwLock<BTreeMap<i64, E>>,
}

impl<E: Entity> MemoryRepository<E> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn with_entities(entities: impl IntoIterator<Item = E>) -> Self {
        let entries = entities
            .into_iter()
            .map(|entity| (entity.key().raw(), entity))
            .collect();
        Self {
            entries: RwLock::new(entries),
        }
    }
}

impl<E: Entity> Default for MemoryRepository<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<E: Entity> Repository<E> for MemoryRepository<E> {
    async fn find_by_key(&self, key: E::Key) -> Result<Option<E>> {
        Ok(self.entries.read().get(&key.raw()).cloned())
    }

    async fn find_all(&self) -> Result<Vec<E>> {
        Ok(self.entries.read().values().cloned().collect())
    }

    async fn find_by_parent(&self, parent: ParentKey) -> Result<Vec<E>> {
        Ok(self
            .entries
            .read()
            .values()
            .filter(|entity| entity.parents().contains(&parent))
            .cloned()
            .collect())
    }

    async fn insert(&self, entity: E) -> Result<E> {
        let mut entries = self.entries.write();
        let key = entity.key();
        if entries.contains_key(&key.raw()) {
            return Err(CarenetError::Conflict(format!("{} {} already exists", E::KIND, key)));
        }
        entries.insert(key.raw(), entity.clone());
        Ok(entity)
    }

    async fn replace(&self, key: E::Key, mut entity: E) -> Result<Option<E>> {
        let mut entries = self.entries.write();
        match entries.get_mut(&key.raw()) {
            Some(slot) => {
                entity.set_key(key);
                *slot = entity.clone();
                Ok(Some(entity))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, key: E::Key) -> Result<bool> {
        Ok(self.entries.write().remove(&key.raw()).is_some())
    }
}
