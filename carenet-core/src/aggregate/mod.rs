//! Fan-out of guarded child lookups over a batch of roots.
//!
//! Every distinct root key gets one concurrent call. Results are settled into
//! a map keyed by the parent's identity and reattached by key, so the order in
//! which calls finish has no influence on the output, which always follows the
//! input order. A failed or slow call only empties its own collection.

use crate::model::{Attached, Entity};
use crate::resilience::GuardedLookup;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Children collected per parent key once every call has settled.
#[derive(Debug)]
pub struct Settled<K, C> {
    children: HashMap<K, Vec<C>>,
    degraded: usize,
}

impl<K: Eq + Hash, C: Clone> Settled<K, C> {
    pub fn children_of(&self, key: &K) -> Vec<C> {
        self.children.get(key).cloned().unwrap_or_default()
    }

    pub fn calls(&self) -> usize {
        self.children.len()
    }

    /// Calls that ended in a fallback rather than a real answer.
    pub fn degraded(&self) -> usize {
        self.degraded
    }
}

pub async fn fan_out<P, C>(
    keys: impl IntoIterator<Item = P>,
    lookup: &GuardedLookup<P, C>,
) -> Settled<P, C>
where
    P: crate::model::EntityKey,
    C: Entity,
{
    let mut seen = HashSet::new();
    let mut pending: FuturesUnordered<_> = keys
        .into_iter()
        .filter(|key| seen.insert(*key))
        .map(|key| async move { (key, lookup.children_or_empty(key).await) })
        .collect();

    let mut children = HashMap::with_capacity(pending.len());
    let mut degraded = 0;
    while let Some((key, resolved)) = pending.next().await {
        if resolved.outcome.is_degraded() {
            degraded += 1;
        }
        children.insert(key, resolved.value);
    }

    tracing::debug!(
        dependency = lookup.dependency(),
        calls = children.len(),
        degraded,
        "fan-out settled"
    );

    Settled { children, degraded }
}

/// One level: each root with the children the lookup returns for it.
pub async fn aggregate<R, C>(roots: Vec<R>, lookup: &GuardedLookup<R::Key, C>) -> Vec<Attached<R, C>>
where
    R: Entity,
    C: Entity,
{
    if roots.is_empty() {
        return Vec::new();
    }

    let settled = fan_out(roots.iter().map(|root| root.key()), lookup).await;
    roots
        .into_iter()
        .map(|root| {
            let children = settled.children_of(&root.key());
            Attached::new(root, children)
        })
        .collect()
}

/// Two levels: the first fan-out collects children, the second fans out once
/// over every collected child before grouping grandchildren back under them.
pub async fn aggregate_nested<R, C, G>(
    roots: Vec<R>,
    first: &GuardedLookup<R::Key, C>,
    second: &GuardedLookup<C::Key, G>,
) -> Vec<Attached<R, Attached<C, G>>>
where
    R: Entity,
    C: Entity,
    G: Entity,
{
    let level_one = aggregate(roots, first).await;

    let child_keys: Vec<C::Key> = level_one
        .iter()
        .flat_map(|attached| attached.children.iter().map(|child| child.key()))
        .collect();
    let settled = fan_out(child_keys, second).await;

    level_one
        .into_iter()
        .map(|attached| {
            let children = attached
                .children
                .into_iter()
                .map(|child| {
                    let grandchildren = settled.children_of(&child.key());
                    Attached::new(child, grandchildren)
                })
                .collect();
            Attached::new(attached.root, children)
        })
        .collect()
}
