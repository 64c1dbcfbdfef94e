use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Every bit set. Granted to planet owners and admin roles.
pub const FULL_CONTROL: i64 = !0;

/// Kind of channel a permission (and a permission node) applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Chat,
    Category,
    Voice,
}

impl ChannelKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            ChannelKind::Chat => "chat",
            ChannelKind::Category => "category",
            ChannelKind::Voice => "voice",
        }
    }

    /// Every permission that can be set on a node of this kind.
    pub const fn permissions(self) -> &'static [ChannelPermission] {
        match self {
            ChannelKind::Chat => chat::ALL,
            ChannelKind::Category => category::ALL,
            ChannelKind::Voice => voice::ALL,
        }
    }

    /// The View permission of this kind; every other permission requires it.
    pub const fn view(self) -> ChannelPermission {
        match self {
            ChannelKind::Chat => chat::VIEW,
            ChannelKind::Category => category::VIEW,
            ChannelKind::Voice => voice::VIEW,
        }
    }

    /// Look up one of this kind's permissions by name (case-insensitive).
    pub fn permission(self, name: &str) -> Option<ChannelPermission> {
        self.permissions()
            .iter()
            .copied()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chat" => Ok(ChannelKind::Chat),
            "category" => Ok(ChannelKind::Category),
            "voice" => Ok(ChannelKind::Voice),
            other => Err(format!("unknown channel kind: {other}")),
        }
    }
}

/// Outcome of reading one bit out of a permission node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    Undefined,
    Allow,
    Deny,
}

impl PermissionState {
    pub const fn from_bool(allowed: bool) -> Self {
        if allowed {
            PermissionState::Allow
        } else {
            PermissionState::Deny
        }
    }

    pub const fn is_defined(self) -> bool {
        !matches!(self, PermissionState::Undefined)
    }
}

/// A single channel permission bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelPermission {
    pub value: i64,
    pub name: &'static str,
    pub description: &'static str,
    pub kind: ChannelKind,
}

impl fmt::Display for ChannelPermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.name)
    }
}

/// A single planet-wide permission bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlanetPermission {
    pub value: i64,
    pub name: &'static str,
    pub description: &'static str,
}

/// Whether a base bitmask grants `bits`. Full control grants everything.
pub fn has_permission(code: i64, bits: i64) -> bool {
    code == FULL_CONTROL || code & bits == bits
}

/// Bits shared by every channel kind.
pub const VIEW_VALUE: i64 = 0x01;
pub const MANAGE_VALUE: i64 = 0x08;
pub const PERMISSIONS_VALUE: i64 = 0x10;

const fn perm(
    kind: ChannelKind,
    value: i64,
    name: &'static str,
    description: &'static str,
) -> ChannelPermission {
    ChannelPermission {
        value,
        name,
        description,
        kind,
    }
}

pub mod chat {
    use super::{perm, ChannelKind::Chat, ChannelPermission};

    pub const VIEW: ChannelPermission = perm(Chat, super::VIEW_VALUE, "view", "View the channel in the channel list");
    pub const VIEW_MESSAGES: ChannelPermission = perm(Chat, 0x02, "view_messages", "Read messages in the channel");
    pub const POST_MESSAGES: ChannelPermission = perm(Chat, 0x04, "post_messages", "Post messages to the channel");
    pub const MANAGE_CHANNEL: ChannelPermission = perm(Chat, super::MANAGE_VALUE, "manage", "Edit the channel's details");
    pub const MANAGE_PERMISSIONS: ChannelPermission = perm(Chat, super::PERMISSIONS_VALUE, "permissions", "Edit the channel's permission nodes");
    pub const EMBED: ChannelPermission = perm(Chat, 0x20, "embed", "Post embedded content");
    pub const ATTACH_CONTENT: ChannelPermission = perm(Chat, 0x40, "attach_content", "Upload files");
    pub const MANAGE_MESSAGES: ChannelPermission = perm(Chat, 0x80, "manage_messages", "Delete and manage other members' messages");
    pub const USE_ECONOMY: ChannelPermission = perm(Chat, 0x100, "use_economy", "Use economy features in the channel");

    pub const ALL: &[ChannelPermission] = &[
        VIEW,
        VIEW_MESSAGES,
        POST_MESSAGES,
        MANAGE_CHANNEL,
        MANAGE_PERMISSIONS,
        EMBED,
        ATTACH_CONTENT,
        MANAGE_MESSAGES,
        USE_ECONOMY,
    ];

    pub const DEFAULT: i64 = VIEW.value | VIEW_MESSAGES.value | POST_MESSAGES.value;
}

pub mod category {
    use super::{perm, ChannelKind::Category, ChannelPermission};

    pub const VIEW: ChannelPermission = perm(Category, super::VIEW_VALUE, "view", "View the category in the channel list");
    pub const MANAGE_CATEGORY: ChannelPermission = perm(Category, super::MANAGE_VALUE, "manage", "Edit the category's details");
    pub const MANAGE_PERMISSIONS: ChannelPermission = perm(Category, super::PERMISSIONS_VALUE, "permissions", "Edit the category's permission nodes");

    pub const ALL: &[ChannelPermission] = &[VIEW, MANAGE_CATEGORY, MANAGE_PERMISSIONS];

    pub const DEFAULT: i64 = VIEW.value;
}

pub mod voice {
    use super::{perm, ChannelKind::Voice, ChannelPermission};

    pub const VIEW: ChannelPermission = perm(Voice, super::VIEW_VALUE, "view", "View the channel in the channel list");
    pub const JOIN: ChannelPermission = perm(Voice, 0x02, "join", "Connect to the voice channel");
    pub const SPEAK: ChannelPermission = perm(Voice, 0x04, "speak", "Speak in the voice channel");
    pub const MANAGE_CHANNEL: ChannelPermission = perm(Voice, super::MANAGE_VALUE, "manage", "Edit the channel's details");
    pub const MANAGE_PERMISSIONS: ChannelPermission = perm(Voice, super::PERMISSIONS_VALUE, "permissions", "Edit the channel's permission nodes");

    pub const ALL: &[ChannelPermission] = &[VIEW, JOIN, SPEAK, MANAGE_CHANNEL, MANAGE_PERMISSIONS];

    pub const DEFAULT: i64 = VIEW.value | JOIN.value | SPEAK.value;
}

pub mod planet {
    use super::PlanetPermission;

    const fn perm(value: i64, name: &'static str, description: &'static str) -> PlanetPermission {
        PlanetPermission {
            value,
            name,
            description,
        }
    }

    /// Implicitly granted to every member.
    pub const VIEW: PlanetPermission = perm(0x01, "view", "View the planet");
    pub const INVITE: PlanetPermission = perm(0x02, "invite", "Send invites to the planet");
    pub const DISPLAY_ROLE: PlanetPermission = perm(0x04, "display_role", "Show the role separately in the member list");
    pub const MANAGE: PlanetPermission = perm(0x08, "manage", "Edit base planet settings");
    pub const KICK: PlanetPermission = perm(0x10, "kick", "Kick members");
    pub const BAN: PlanetPermission = perm(0x20, "ban", "Ban members");
    pub const CREATE_CHANNELS: PlanetPermission = perm(0x40, "create_channels", "Create channels where the parent category allows it");
    pub const MANAGE_ROLES: PlanetPermission = perm(0x80, "manage_roles", "Create, edit and assign roles");
    pub const USE_ECONOMY: PlanetPermission = perm(0x100, "use_economy", "Use the planet's economy");
    pub const MANAGE_CURRENCY: PlanetPermission = perm(0x200, "manage_currency", "Manage the planet's currency");
    pub const MANAGE_ECO_ACCOUNTS: PlanetPermission = perm(0x400, "manage_eco_accounts", "Manage economy accounts");
    pub const FORCE_TRANSACTIONS: PlanetPermission = perm(0x800, "force_transactions", "Force economy transactions");
    pub const MENTION_ALL: PlanetPermission = perm(0x1000, "mention_all", "Mention every role");

    pub const ALL: &[PlanetPermission] = &[
        VIEW,
        INVITE,
        DISPLAY_ROLE,
        MANAGE,
        KICK,
        BAN,
        CREATE_CHANNELS,
        MANAGE_ROLES,
        USE_ECONOMY,
        MANAGE_CURRENCY,
        MANAGE_ECO_ACCOUNTS,
        FORCE_TRANSACTIONS,
        MENTION_ALL,
    ];

    pub const DEFAULT: i64 = VIEW.value | USE_ECONOMY.value;

    pub fn find(name: &str) -> Option<PlanetPermission> {
        ALL.iter().copied().find(|p| p.name.eq_ignore_ascii_case(name))
    }
}
