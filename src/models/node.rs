use serde::{Deserialize, Serialize};

use super::permission::{ChannelKind, ChannelPermission, PermissionState, FULL_CONTROL};

/// Identity of a permission node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeKey {
    pub target_id: i64,
    pub role_id: i64,
    pub target_kind: ChannelKind,
}

impl NodeKey {
    pub const fn new(target_id: i64, role_id: i64, target_kind: ChannelKind) -> Self {
        Self {
            target_id,
            role_id,
            target_kind,
        }
    }
}

/// Per-(target, role) override of channel permissions.
///
/// `mask` marks the bits an administrator decided on, `code` holds the
/// decision for each of them:
///
/// | mask | code | state     |
/// |------|------|-----------|
/// | 0    | any  | Undefined |
/// | 1    | 0    | Deny      |
/// | 1    | 1    | Allow     |
///
/// Code bits under a zero mask bit carry no meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionNode {
    pub target_id: i64,
    pub role_id: i64,
    pub target_kind: ChannelKind,
    pub code: i64,
    pub mask: i64,
}

impl PermissionNode {
    /// A node with nothing decided.
    pub const fn empty(key: NodeKey) -> Self {
        Self {
            target_id: key.target_id,
            role_id: key.role_id,
            target_kind: key.target_kind,
            code: 0,
            mask: 0,
        }
    }

    /// A node that explicitly allows every bit.
    pub const fn full_control(key: NodeKey) -> Self {
        Self {
            code: FULL_CONTROL,
            mask: FULL_CONTROL,
            ..Self::empty(key)
        }
    }

    pub const fn key(&self) -> NodeKey {
        NodeKey::new(self.target_id, self.role_id, self.target_kind)
    }

    pub fn state(&self, permission: ChannelPermission) -> PermissionState {
        self.state_of(permission.value)
    }

    pub fn state_of(&self, bits: i64) -> PermissionState {
        if self.mask & bits == 0 {
            PermissionState::Undefined
        } else {
            PermissionState::from_bool(self.code & bits != 0)
        }
    }

    pub fn set_state(&mut self, permission: ChannelPermission, state: PermissionState) {
        self.set_state_of(permission.value, state);
    }

    pub fn set_state_of(&mut self, bits: i64, state: PermissionState) {
        match state {
            PermissionState::Undefined => {
                self.mask &= !bits;
                self.code &= !bits;
            }
            PermissionState::Allow => {
                self.mask |= bits;
                self.code |= bits;
            }
            PermissionState::Deny => {
                self.mask |= bits;
                self.code &= !bits;
            }
        }
    }

    /// True when no bit is decided.
    pub fn is_empty(&self) -> bool {
        self.mask == 0
    }

    /// `code` with every undecided bit cleared.
    pub fn effective_code(&self) -> i64 {
        self.code & self.mask
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::permission::chat;

    fn node() -> PermissionNode {
        PermissionNode::empty(NodeKey::new(10, 20, ChannelKind::Chat))
    }

    #[test]
    fn test_missing_bits_are_undefined() {
        let node = node();
        assert_eq!(node.state(chat::VIEW), PermissionState::Undefined);
        assert!(node.is_empty());
    }

    #[test]
    fn test_set_then_get() {
        let mut node = node();
        node.set_state(chat::POST_MESSAGES, PermissionState::Allow);
        node.set_state(chat::EMBED, PermissionState::Deny);
        assert_eq!(node.state(chat::POST_MESSAGES), PermissionState::Allow);
        assert_eq!(node.state(chat::EMBED), PermissionState::Deny);
        assert_eq!(node.state(chat::VIEW), PermissionState::Undefined);
    }

    #[test]
    fn test_undefined_clears_regardless_of_prior_state() {
        for prior in [PermissionState::Allow, PermissionState::Deny, PermissionState::Undefined] {
            let mut node = node();
            node.set_state(chat::ATTACH_CONTENT, prior);
            node.set_state(chat::ATTACH_CONTENT, PermissionState::Undefined);
            assert_eq!(node.state(chat::ATTACH_CONTENT), PermissionState::Undefined);
            assert_eq!(node.mask, 0);
            assert_eq!(node.code, 0);
        }
    }

    #[test]
    fn test_code_without_mask_is_ignored() {
        let mut node = node();
        node.code = chat::VIEW.value;
        assert_eq!(node.state(chat::VIEW), PermissionState::Undefined);
        assert_eq!(node.effective_code(), 0);
    }

    #[test]
    fn test_deny_overwrites_allow() {
        let mut node = node();
        node.set_state(chat::VIEW, PermissionState::Allow);
        node.set_state(chat::VIEW, PermissionState::Deny);
        assert_eq!(node.state(chat::VIEW), PermissionState::Deny);
        assert_eq!(node.mask, chat::VIEW.value);
        assert_eq!(node.code, 0);
    }
}
