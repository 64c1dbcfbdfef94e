//! Lookups the resolver needs from the rest of the system.
//!
//! Implementations must hand out a consistent snapshot per call: a node is
//! never observed with `mask` updated but `code` not, and a channel never
//! with a half-written position.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::AppError;
use crate::membership::RoleMembership;
use crate::models::channel::Channel;
use crate::models::member::Member;
use crate::models::node::{NodeKey, PermissionNode};
use crate::models::planet::Planet;
use crate::models::role::{self, Role};

#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn fetch_member(&self, member_id: i64) -> Result<Option<Member>, AppError>;

    async fn fetch_channel(&self, channel_id: i64) -> Result<Option<Channel>, AppError>;

    /// Every channel of a planet, sorted by position.
    async fn list_channels(&self, planet_id: i64) -> Result<Vec<Channel>, AppError>;

    async fn fetch_owner_id(&self, planet_id: i64) -> Result<i64, AppError>;

    /// The member's roles sorted by position ascending (primary role first).
    async fn fetch_roles(&self, member_id: i64) -> Result<Vec<Role>, AppError>;

    async fn fetch_default_role(&self, planet_id: i64) -> Result<Role, AppError>;

    /// `None` means nothing is decided for this key.
    async fn fetch_node(&self, key: NodeKey) -> Result<Option<PermissionNode>, AppError>;

    async fn fetch_parent(&self, channel_id: i64) -> Result<Option<Channel>, AppError> {
        let channel = self
            .fetch_channel(channel_id)
            .await?
            .ok_or_else(|| AppError::NotFound("unknown_channel".to_string()))?;
        match channel.parent_id {
            Some(parent_id) => self.fetch_channel(parent_id).await,
            None => Ok(None),
        }
    }
}

#[async_trait]
impl<S: PermissionStore + ?Sized> PermissionStore for Arc<S> {
    async fn fetch_member(&self, member_id: i64) -> Result<Option<Member>, AppError> {
        (**self).fetch_member(member_id).await
    }

    async fn fetch_channel(&self, channel_id: i64) -> Result<Option<Channel>, AppError> {
        (**self).fetch_channel(channel_id).await
    }

    async fn list_channels(&self, planet_id: i64) -> Result<Vec<Channel>, AppError> {
        (**self).list_channels(planet_id).await
    }

    async fn fetch_owner_id(&self, planet_id: i64) -> Result<i64, AppError> {
        (**self).fetch_owner_id(planet_id).await
    }

    async fn fetch_roles(&self, member_id: i64) -> Result<Vec<Role>, AppError> {
        (**self).fetch_roles(member_id).await
    }

    async fn fetch_default_role(&self, planet_id: i64) -> Result<Role, AppError> {
        (**self).fetch_default_role(planet_id).await
    }

    async fn fetch_node(&self, key: NodeKey) -> Result<Option<PermissionNode>, AppError> {
        (**self).fetch_node(key).await
    }

    async fn fetch_parent(&self, channel_id: i64) -> Result<Option<Channel>, AppError> {
        (**self).fetch_parent(channel_id).await
    }
}

/// Resolve a membership set into roles, highest authority first.
///
/// Indices with no matching role are skipped with a warning; they appear
/// briefly while a role deletion rewrites memberships.
pub fn materialize_roles(
    membership: &RoleMembership,
    planet_roles: &[Role],
    planet_id: i64,
) -> Vec<Role> {
    let mut roles = Vec::with_capacity(membership.role_count() as usize);
    for index in membership.role_ids() {
        match planet_roles.iter().find(|r| r.flag_bit_index == index) {
            Some(role) => roles.push(role.clone()),
            None => {
                tracing::warn!(planet_id, role_index = index, "role not found for role index");
            }
        }
    }
    role::sort_by_authority(&mut roles);
    roles
}

/// Process-local store backed by concurrent maps.
///
/// Used by tests and by callers that already hold a planet in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    planets: DashMap<i64, Planet>,
    roles: DashMap<i64, Role>,
    channels: DashMap<i64, Channel>,
    members: DashMap<i64, Member>,
    nodes: DashMap<NodeKey, PermissionNode>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_planet(&self, planet: Planet) {
        self.planets.insert(planet.id, planet);
    }

    pub fn insert_role(&self, role: Role) {
        self.roles.insert(role.id, role);
    }

    pub fn insert_channel(&self, channel: Channel) {
        self.channels.insert(channel.id, channel);
    }

    pub fn insert_member(&self, member: Member) {
        self.members.insert(member.id, member);
    }

    /// Replaces any node under the same key. An empty node removes it.
    pub fn put_node(&self, node: PermissionNode) {
        if node.is_empty() {
            self.nodes.remove(&node.key());
        } else {
            self.nodes.insert(node.key(), node);
        }
    }

    pub fn remove_node(&self, key: &NodeKey) {
        self.nodes.remove(key);
    }

    fn planet_roles(&self, planet_id: i64) -> Vec<Role> {
        self.roles
            .iter()
            .filter(|r| r.planet_id == planet_id)
            .map(|r| r.value().clone())
            .collect()
    }
}

#[async_trait]
impl PermissionStore for MemoryStore {
    async fn fetch_member(&self, member_id: i64) -> Result<Option<Member>, AppError> {
        Ok(self.members.get(&member_id).map(|m| m.value().clone()))
    }

    async fn fetch_channel(&self, channel_id: i64) -> Result<Option<Channel>, AppError> {
        Ok(self.channels.get(&channel_id).map(|c| c.value().clone()))
    }

    async fn list_channels(&self, planet_id: i64) -> Result<Vec<Channel>, AppError> {
        let mut channels: Vec<Channel> = self
            .channels
            .iter()
            .filter(|c| c.planet_id == planet_id)
            .map(|c| c.value().clone())
            .collect();
        channels.sort_by_key(|c| (c.position, c.id));
        Ok(channels)
    }

    async fn fetch_owner_id(&self, planet_id: i64) -> Result<i64, AppError> {
        self.planets
            .get(&planet_id)
            .map(|p| p.owner_id)
            .ok_or_else(|| AppError::NotFound("unknown_planet".to_string()))
    }

    async fn fetch_roles(&self, member_id: i64) -> Result<Vec<Role>, AppError> {
        let member = self
            .fetch_member(member_id)
            .await?
            .ok_or_else(|| AppError::NotFound("member not found".to_string()))?;
        let planet_roles = self.planet_roles(member.planet_id);
        Ok(materialize_roles(
            &member.role_membership,
            &planet_roles,
            member.planet_id,
        ))
    }

    async fn fetch_default_role(&self, planet_id: i64) -> Result<Role, AppError> {
        self.roles
            .iter()
            .find(|r| r.planet_id == planet_id && r.is_default)
            .map(|r| r.value().clone())
            .ok_or_else(|| AppError::NotFound("planet has no default role".to_string()))
    }

    async fn fetch_node(&self, key: NodeKey) -> Result<Option<PermissionNode>, AppError> {
        Ok(self.nodes.get(&key).map(|n| *n.value()))
    }
}
