use serde::{Deserialize, Serialize};

use super::permission::ChannelKind;
use crate::position::ChannelPosition;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: i64,
    pub planet_id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ChannelKind,
    pub position: ChannelPosition,
    pub parent_id: Option<i64>,
    /// Take permission nodes from the nearest non-inheriting ancestor.
    pub inherits_perms: bool,
    /// Visible to every member of the planet.
    pub is_default: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateChannel {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ChannelKind,
    pub parent_id: Option<i64>,
    pub inherits_perms: Option<bool>,
    pub is_default: Option<bool>,
}

impl CreateChannel {
    pub fn new(name: impl Into<String>, kind: ChannelKind) -> Self {
        Self {
            name: name.into(),
            kind,
            parent_id: None,
            inherits_perms: None,
            is_default: None,
        }
    }

    #[must_use]
    pub fn under(mut self, parent_id: i64) -> Self {
        self.parent_id = Some(parent_id);
        self
    }
}

/// Keep only the channels nested below `parent`, assuming `channels` is
/// sorted by position.
pub fn descendants(channels: &[Channel], parent: ChannelPosition) -> &[Channel] {
    let Some((lower, upper)) = parent.descendant_bounds() else {
        return &[];
    };
    let start = channels.partition_point(|c| c.position < lower);
    let end = channels.partition_point(|c| c.position <= upper);
    &channels[start..end.max(start)]
}

/// Direct children of `parent` out of a position-sorted slice.
pub fn direct_children(
    channels: &[Channel],
    parent: ChannelPosition,
) -> impl Iterator<Item = &Channel> {
    let mask = parent.direct_child_mask();
    descendants(channels, parent)
        .iter()
        .filter(move |c| c.position.raw() & mask == 0)
}
