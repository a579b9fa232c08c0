pub mod db;
pub mod memory;

pub use db::{Database, SqliteRepository};
pub use memory::MemoryRepository;

use crate::error::{CarenetError, Result};
use crate::model::{Entity, ParentKey, Patchable};
use async_trait::async_trait;

/// Local entity store owned by one service.
#[async_trait]
pub trait Repository<E: Entity>: Send + Sync {
    async fn find_by_key(&self, key: E::Key) -> Result<Option<E>>;

    async fn find_all(&self) -> Result<Vec<E>>;

    async fn find_by_parent(&self, parent: ParentKey) -> Result<Vec<E>>;

    /// Fails with `Conflict` when the key is already taken.
    async fn insert(&self, entity: E) -> Result<E>;

    /// Overwrites the stored entity in place; the key never changes.
    /// Returns `None` when nothing is stored under `key`.
    async fn replace(&self, key: E::Key, entity: E) -> Result<Option<E>>;

    async fn delete(&self, key: E::Key) -> Result<bool>;
}

/// Full replacement (PUT). The body must carry the same key as the path and
/// positive foreign keys.
pub async fn replace_entity<E: Entity>(
    repo: &dyn Repository<E>,
    key: E::Key,
    entity: E,
) -> Result<E> {
    if entity.key() != key {
        return Err(CarenetError::InvalidInput(format!(
            "body key {} does not match path key {}",
            entity.key(),
            key
        )));
    }
    entity.validate_keys()?;
    repo.replace(key, entity)
        .await?
        .ok_or_else(|| CarenetError::not_found(E::KIND, key))
}

/// Partial update (PATCH): load, apply the mask, write back. Sequential on purpose.
pub async fn patch_entity<E: Patchable>(
    repo: &dyn Repository<E>,
    key: E::Key,
    patch: E::Patch,
) -> Result<E> {
    let mut entity = repo
        .find_by_key(key)
        .await?
        .ok_or_else(|| CarenetError::not_found(E::KIND, key))?;
    entity.apply_patch(patch)?;
    entity.validate_keys()?;
    repo.replace(key, entity)
        .await?
        .ok_or_else(|| CarenetError::not_found(E::KIND, key))
}
