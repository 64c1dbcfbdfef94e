//! Effective permission resolution for a member on a channel.
//!
//! Order of evaluation:
//!
//! 1. the planet owner is allowed everything;
//! 2. a member holding an admin role is allowed everything;
//! 3. lookups move to the nearest ancestor that does not inherit;
//! 4. the View bit is resolved first and gates every other bit;
//! 5. the first role, in authority order, whose node decides the bit wins;
//! 6. otherwise the primary role's base bitmask decides.
//!
//! Only the primary role's base bitmask is ever consulted. A lower role's
//! base permissions never grant or deny anything.

use crate::error::AppError;
use crate::models::channel::Channel;
use crate::models::member::Member;
use crate::models::node::{NodeKey, PermissionNode};
use crate::models::permission::{
    has_permission, ChannelKind, ChannelPermission, PermissionState, PlanetPermission,
    FULL_CONTROL, planet,
};
use crate::models::role::Role;
use crate::position::MAX_DEPTH;
use crate::store::PermissionStore;

/// Most parent hops an inheritance walk can take.
const MAX_INHERIT_HOPS: u32 = MAX_DEPTH - 1;

/// A member with everything needed to judge them, loaded once per call.
#[derive(Debug, Clone)]
struct Subject {
    member: Member,
    /// Owner or admin.
    privileged: bool,
    /// Authority order, never empty unless `privileged`.
    roles: Vec<Role>,
}

impl Subject {
    fn primary_role(&self) -> Option<&Role> {
        self.roles.first()
    }
}

pub struct PermissionResolver<S> {
    store: S,
}

impl<S: PermissionStore> PermissionResolver<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Whether the member is granted `permission` on the channel.
    ///
    /// `permission` must belong to the channel's kind.
    pub async fn has_permission(
        &self,
        member_id: i64,
        channel_id: i64,
        permission: ChannelPermission,
    ) -> Result<bool, AppError> {
        let channel = self.channel(channel_id).await?;
        if permission.kind != channel.kind {
            return Err(AppError::BadRequest(format!(
                "{permission} does not apply to {} channel {}",
                channel.kind, channel.id
            )));
        }

        let subject = self.subject(member_id).await?;
        let allowed = self.check(&subject, &channel, permission).await?;
        tracing::debug!(
            member_id,
            channel_id,
            permission = %permission,
            allowed,
            "resolved channel permission"
        );
        Ok(allowed)
    }

    /// Net effective permissions of the member on the channel as a detached
    /// node. Every bit of the channel's kind is decided; undecided bits
    /// resolve to Deny.
    ///
    /// The result carries `role_id = 0` and is never persisted.
    pub async fn flatten_permissions(
        &self,
        member_id: i64,
        channel_id: i64,
    ) -> Result<PermissionNode, AppError> {
        let channel = self.channel(channel_id).await?;
        let subject = self.subject(member_id).await?;
        let key = NodeKey::new(channel.id, 0, channel.kind);

        if subject.member.planet_id != channel.planet_id {
            tracing::debug!(member_id, channel_id, "member is not on the channel's planet");
            return Ok(denied(key));
        }
        if subject.privileged {
            return Ok(PermissionNode::full_control(key));
        }

        let target = self.resolve_target(&channel).await?;
        let mut flattened = denied(key);
        for role in subject.roles.iter().rev() {
            let Some(node) = self
                .store
                .fetch_node(NodeKey::new(target.id, role.id, channel.kind))
                .await?
            else {
                continue;
            };
            for permission in channel.kind.permissions() {
                let state = node.state(*permission);
                if state.is_defined() {
                    flattened.set_state(*permission, state);
                }
            }
        }

        tracing::debug!(
            member_id,
            channel_id,
            target_id = target.id,
            code = flattened.code,
            "flattened channel permissions"
        );
        Ok(flattened)
    }

    /// Planet-wide permission check. Every member may view their planet.
    pub async fn has_planet_permission(
        &self,
        member_id: i64,
        permission: PlanetPermission,
    ) -> Result<bool, AppError> {
        if permission.value == planet::VIEW.value {
            self.member(member_id).await?;
            return Ok(true);
        }

        let subject = self.subject(member_id).await?;
        if subject.privileged {
            return Ok(true);
        }
        Ok(subject
            .primary_role()
            .is_some_and(|role| has_permission(role.permissions, permission.value)))
    }

    /// Authority of a member: `u32::MAX` for the owner, otherwise that of
    /// the primary role. A member without roles has none.
    pub async fn authority(&self, member_id: i64) -> Result<u32, AppError> {
        let member = self.member(member_id).await?;
        let owner_id = self.store.fetch_owner_id(member.planet_id).await?;
        if owner_id == member.user_id {
            return Ok(u32::MAX);
        }
        let roles = self.store.fetch_roles(member.id).await?;
        Ok(roles.first().map_or(0, Role::authority))
    }

    /// Channels of the member's planet the member can view, in channel list
    /// order. The planet's default channel is always included.
    pub async fn accessible_channels(&self, member_id: i64) -> Result<Vec<Channel>, AppError> {
        let subject = self.subject(member_id).await?;
        let channels = self.store.list_channels(subject.member.planet_id).await?;
        if subject.privileged {
            return Ok(channels);
        }

        let mut visible = Vec::with_capacity(channels.len());
        for channel in channels {
            if channel.is_default || self.check(&subject, &channel, channel.kind.view()).await? {
                visible.push(channel);
            }
        }
        Ok(visible)
    }

    /// The channel whose permission nodes govern `channel`.
    ///
    /// Follows parents while the current channel inherits. An inheriting
    /// channel is never governed by its own nodes, so a dangling parent, a
    /// cycle, or a chain deeper than the position encoding allows is a
    /// corrupt hierarchy.
    pub async fn resolve_target(&self, channel: &Channel) -> Result<Channel, AppError> {
        let mut target = channel.clone();
        let mut seen = vec![target.id];
        let mut hops = 0;

        while target.inherits_perms && target.parent_id.is_some() {
            if hops == MAX_INHERIT_HOPS {
                return Err(AppError::CorruptHierarchy(format!(
                    "inheritance chain from channel {} exceeds {MAX_INHERIT_HOPS} hops",
                    channel.id
                )));
            }
            let Some(parent) = self.store.fetch_parent(target.id).await? else {
                tracing::warn!(
                    channel_id = target.id,
                    parent_id = ?target.parent_id,
                    "inheriting channel has a missing parent"
                );
                return Err(AppError::CorruptHierarchy(format!(
                    "channel {} inherits from missing parent {:?}",
                    target.id, target.parent_id
                )));
            };
            if seen.contains(&parent.id) {
                return Err(AppError::CorruptHierarchy(format!(
                    "parent cycle through channel {}",
                    parent.id
                )));
            }
            if parent.planet_id != channel.planet_id {
                return Err(AppError::CorruptHierarchy(format!(
                    "channel {} has a parent on another planet",
                    target.id
                )));
            }
            seen.push(parent.id);
            target = parent;
            hops += 1;
        }
        Ok(target)
    }

    async fn check(
        &self,
        subject: &Subject,
        channel: &Channel,
        permission: ChannelPermission,
    ) -> Result<bool, AppError> {
        if subject.member.planet_id != channel.planet_id {
            return Ok(false);
        }
        if subject.privileged {
            return Ok(true);
        }

        let target = self.resolve_target(channel).await?;
        let view = channel.kind.view();
        if !self.resolve_bit(subject, target.id, channel.kind, view).await? {
            return Ok(false);
        }
        if permission.value == view.value {
            return Ok(true);
        }
        self.resolve_bit(subject, target.id, channel.kind, permission)
            .await
    }

    /// First role whose node decides the bit wins, else the primary role's
    /// base bitmask.
    async fn resolve_bit(
        &self,
        subject: &Subject,
        target_id: i64,
        kind: ChannelKind,
        permission: ChannelPermission,
    ) -> Result<bool, AppError> {
        for role in &subject.roles {
            let node = self
                .store
                .fetch_node(NodeKey::new(target_id, role.id, kind))
                .await?;
            match node.map(|n| n.state(permission)) {
                Some(PermissionState::Allow) => return Ok(true),
                Some(PermissionState::Deny) => return Ok(false),
                Some(PermissionState::Undefined) | None => {}
            }
        }

        let primary = subject.primary_role().ok_or_else(|| {
            AppError::Internal(format!("member {} resolved without roles", subject.member.id))
        })?;
        Ok(has_permission(primary.base_permissions(kind), permission.value))
    }

    async fn subject(&self, member_id: i64) -> Result<Subject, AppError> {
        let member = self.member(member_id).await?;

        let owner_id = self.store.fetch_owner_id(member.planet_id).await?;
        if owner_id == member.user_id {
            return Ok(Subject {
                member,
                privileged: true,
                roles: Vec::new(),
            });
        }

        let mut roles = self.store.fetch_roles(member.id).await?;
        if roles.is_empty() {
            roles.push(self.store.fetch_default_role(member.planet_id).await?);
        }
        let privileged = roles.iter().any(|r| r.is_admin);
        Ok(Subject {
            member,
            privileged,
            roles,
        })
    }

    async fn member(&self, member_id: i64) -> Result<Member, AppError> {
        self.store
            .fetch_member(member_id)
            .await?
            .ok_or_else(|| AppError::NotFound("unknown_member".to_string()))
    }

    async fn channel(&self, channel_id: i64) -> Result<Channel, AppError> {
        self.store
            .fetch_channel(channel_id)
            .await?
            .ok_or_else(|| AppError::NotFound("unknown_channel".to_string()))
    }
}

/// Everything decided and denied.
fn denied(key: NodeKey) -> PermissionNode {
    PermissionNode {
        mask: FULL_CONTROL,
        ..PermissionNode::empty(key)
    }
}
