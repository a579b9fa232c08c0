//! Lookups of child entities owned by another service.
//!
//! A lookup is a single round trip with no retries of its own. Every failure
//! surfaces as `DependencyUnavailable` or `DependencyTimeout`; an empty result
//! set is a normal `Ok(vec![])`.

pub mod http;

pub use http::HttpLookup;

use crate::error::Result;
use crate::model::{Entity, EntityKey, ParentKey};
use crate::storage::Repository;
use async_trait::async_trait;
use std::marker::PhantomData;
use std::sync::Arc;

#[async_trait]
pub trait RemoteLookup: Send + Sync {
    type Parent: EntityKey;
    type Child: Entity;

    /// Name of the dependency, used for breaker state, logs and metrics.
    fn dependency(&self) -> &str;

    async fn fetch_children(&self, parent: Self::Parent) -> Result<Vec<Self::Child>>;
}

/// Serves a lookup from a local repository instead of the network.
pub struct RepositoryLookup<P, C: Entity> {
    name: String,
    repo: Arc<dyn Repository<C>>,
    _parent: PhantomData<fn(P)>,
}

impl<P, C: Entity> RepositoryLookup<P, C> {
    pub fn new(name: impl Into<String>, repo: Arc<dyn Repository<C>>) -> Self {
        Self {
            name: name.into(),
            repo,
            _parent: PhantomData,
        }
    }
}

#[async_trait]
impl<P, C> RemoteLookup for RepositoryLookup<P, C>
where
    P: EntityKey + Into<ParentKey>,
    C: Entity,
{
    type Parent = P;
    type Child = C;

    fn dependency(&self) -> &str {
        &self.name
    }

    async fn fetch_children(&self, parent: P) -> Result<Vec<C>> {
        self.repo.find_by_parent(parent.into()).await
    }
}
