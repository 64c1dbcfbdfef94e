//! Read-through cache for permission nodes.
//!
//! Concurrent lookups of the same key share a single backend fetch. Every
//! other [`PermissionStore`] read passes straight through.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::OnceCell;

use crate::error::AppError;
use crate::models::channel::Channel;
use crate::models::member::Member;
use crate::models::node::{NodeKey, PermissionNode};
use crate::models::role::Role;
use crate::store::PermissionStore;

type Slot = Arc<OnceCell<Option<PermissionNode>>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

pub struct NodeCache<S> {
    inner: S,
    nodes: DashMap<NodeKey, Slot>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<S: PermissionStore> NodeCache<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            nodes: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// The wrapped store. Writes go here, followed by an invalidation.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Forget one node. A fetch already in flight finishes into a detached
    /// slot and is not observed by later lookups.
    pub fn invalidate(&self, key: &NodeKey) {
        self.nodes.remove(key);
    }

    /// Forget every node attached to a channel, for all roles and kinds.
    pub fn invalidate_target(&self, target_id: i64) {
        self.nodes.retain(|key, _| key.target_id != target_id);
    }

    pub fn clear(&self) {
        self.nodes.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.nodes.len(),
        }
    }

    fn slot(&self, key: NodeKey) -> Slot {
        // Clone out of the map so no shard lock is held across an await.
        self.nodes.entry(key).or_default().value().clone()
    }
}

#[async_trait]
impl<S: PermissionStore> PermissionStore for NodeCache<S> {
    async fn fetch_member(&self, member_id: i64) -> Result<Option<Member>, AppError> {
        self.inner.fetch_member(member_id).await
    }

    async fn fetch_channel(&self, channel_id: i64) -> Result<Option<Channel>, AppError> {
        self.inner.fetch_channel(channel_id).await
    }

    async fn list_channels(&self, planet_id: i64) -> Result<Vec<Channel>, AppError> {
        self.inner.list_channels(planet_id).await
    }

    async fn fetch_owner_id(&self, planet_id: i64) -> Result<i64, AppError> {
        self.inner.fetch_owner_id(planet_id).await
    }

    async fn fetch_roles(&self, member_id: i64) -> Result<Vec<Role>, AppError> {
        self.inner.fetch_roles(member_id).await
    }

    async fn fetch_default_role(&self, planet_id: i64) -> Result<Role, AppError> {
        self.inner.fetch_default_role(planet_id).await
    }

    async fn fetch_parent(&self, channel_id: i64) -> Result<Option<Channel>, AppError> {
        self.inner.fetch_parent(channel_id).await
    }

    async fn fetch_node(&self, key: NodeKey) -> Result<Option<PermissionNode>, AppError> {
        let slot = self.slot(key);
        let mut loaded = false;
        let node = slot
            .get_or_try_init(|| {
                loaded = true;
                self.inner.fetch_node(key)
            })
            .await?;

        if loaded {
            self.misses.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                target_id = key.target_id,
                role_id = key.role_id,
                kind = %key.target_kind,
                found = node.is_some(),
                "node cache miss"
            );
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        Ok(*node)
    }
}
