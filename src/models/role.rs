use serde::{Deserialize, Serialize};

use super::permission::{self, ChannelKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: i64,
    pub planet_id: i64,
    pub name: String,
    /// Lower position = higher authority.
    pub position: u32,
    /// This role's bit in a member's `RoleMembership`. Never reassigned.
    pub flag_bit_index: u8,
    pub is_admin: bool,
    pub is_default: bool,
    pub permissions: i64,
    pub chat_permissions: i64,
    pub category_permissions: i64,
    pub voice_permissions: i64,
}

impl Role {
    /// Base bitmask used when no permission node decides a bit.
    pub const fn base_permissions(&self, kind: ChannelKind) -> i64 {
        match kind {
            ChannelKind::Chat => self.chat_permissions,
            ChannelKind::Category => self.category_permissions,
            ChannelKind::Voice => self.voice_permissions,
        }
    }

    /// Ranking value where bigger means more authority. Planet owners sit
    /// above every role at `u32::MAX`.
    pub const fn authority(&self) -> u32 {
        (u32::MAX - 1).saturating_sub(self.position)
    }
}

/// Sort roles so the highest authority (lowest position) comes first.
pub fn sort_by_authority(roles: &mut [Role]) {
    roles.sort_by_key(|r| (r.position, r.id));
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateRole {
    pub name: String,
    pub position: Option<u32>,
    /// Requested membership slot; the lowest free one is used when absent.
    pub flag_bit_index: Option<i64>,
    pub is_admin: Option<bool>,
    pub permissions: Option<i64>,
    pub chat_permissions: Option<i64>,
    pub category_permissions: Option<i64>,
    pub voice_permissions: Option<i64>,
}

impl CreateRole {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            position: None,
            flag_bit_index: None,
            is_admin: None,
            permissions: None,
            chat_permissions: None,
            category_permissions: None,
            voice_permissions: None,
        }
    }

    pub fn chat_permissions(&self) -> i64 {
        self.chat_permissions.unwrap_or(permission::chat::DEFAULT)
    }

    pub fn category_permissions(&self) -> i64 {
        self.category_permissions.unwrap_or(permission::category::DEFAULT)
    }

    pub fn voice_permissions(&self) -> i64 {
        self.voice_permissions.unwrap_or(permission::voice::DEFAULT)
    }
}

#[derive(Debug, Deserialize)]
pub struct RolePositionUpdate {
    pub id: i64,
    pub position: u32,
}
