//! Packed hierarchical channel positions.
//!
//! A position stores up to four levels of nesting in one `u32`, one byte per
//! level with the most significant byte holding the shallowest level. A zero
//! byte means "unset"; local positions run from 1 to 250 (251-255 reserved).
//! Sorting positions as plain unsigned integers yields the channel list order.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Deepest nesting level a position can represent.
pub const MAX_DEPTH: u32 = 4;

/// Highest valid local position inside one level.
pub const MAX_LOCAL_POSITION: u32 = 250;

const UPPER_BOUND_FILL: u32 = 0xFAFA_FAFA;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PositionError {
    #[error("position {raw:#010x} is already at the maximum depth of 4")]
    DepthExceeded { raw: u32 },
    #[error("local position {0} is outside 1..=250")]
    InvalidLocalPosition(u32),
    #[error("{0:#010x} is not a valid channel position")]
    Malformed(u32),
}

/// A channel's place in the category tree.
///
/// The raw integer is only reachable through [`ChannelPosition::raw`]; new
/// positions are produced by [`ChannelPosition::append`] or validated with
/// [`ChannelPosition::from_raw`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[derive(Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct ChannelPosition(u32);

impl ChannelPosition {
    /// The planet itself.
    pub const ROOT: Self = Self(0);

    /// Validate a stored raw position.
    ///
    /// Every set byte must be a legal local position and no unset byte may
    /// sit above a set one.
    pub fn from_raw(raw: u32) -> Result<Self, PositionError> {
        let depth = depth_of(raw);
        for level in 1..=MAX_DEPTH {
            let byte = local_at(raw, level);
            if level <= depth {
                if byte == 0 || byte > MAX_LOCAL_POSITION {
                    return Err(PositionError::Malformed(raw));
                }
            } else if byte != 0 {
                return Err(PositionError::Malformed(raw));
            }
        }
        Ok(Self(raw))
    }

    /// Top-level position with the given local slot.
    pub fn top_level(local: u32) -> Result<Self, PositionError> {
        Self::ROOT.append(local)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Nesting depth: 0 for the planet root, 1-4 for channels.
    pub const fn depth(self) -> u32 {
        depth_of(self.0)
    }

    /// This node's order among its siblings.
    pub const fn local_position(self) -> u32 {
        local_at(self.0, self.depth())
    }

    /// Position of a new child `local` slots into this node.
    pub fn append(self, local: u32) -> Result<Self, PositionError> {
        let depth = self.depth();
        if depth >= MAX_DEPTH {
            return Err(PositionError::DepthExceeded { raw: self.0 });
        }
        if local == 0 || local > MAX_LOCAL_POSITION {
            return Err(PositionError::InvalidLocalPosition(local));
        }
        Ok(Self(self.0 | (local << (8 * (MAX_DEPTH - 1 - depth)))))
    }

    /// Position of the enclosing category, or the root for top-level nodes.
    pub const fn parent(self) -> Self {
        let depth = self.depth();
        if depth < 2 {
            return Self::ROOT;
        }
        Self(self.0 & !(u32::MAX >> (8 * (depth - 1))))
    }

    /// Inclusive `(lower, upper)` range holding every descendant of this node.
    ///
    /// Returns `None` at depth 4, where nothing can be nested.
    pub fn descendant_bounds(self) -> Option<(Self, Self)> {
        let lower = self.append(1).ok()?;
        let upper = Self(self.0 | (UPPER_BOUND_FILL >> (8 * self.depth())));
        Some((lower, upper))
    }

    /// Bits that only differ between deeper descendants of this node's
    /// direct children. A descendant is a direct child when none of them
    /// are set.
    pub const fn direct_child_mask(self) -> u32 {
        direct_child_mask(self.depth())
    }

    pub fn is_descendant_of(self, ancestor: Self) -> bool {
        match ancestor.descendant_bounds() {
            Some((lower, upper)) => lower <= self && self <= upper,
            None => false,
        }
    }

    pub fn is_direct_child_of(self, parent: Self) -> bool {
        self.is_descendant_of(parent) && self.0 & parent.direct_child_mask() == 0
    }

    /// Ancestor positions from the immediate parent up to the top level.
    pub fn ancestors(self) -> impl Iterator<Item = Self> {
        let mut current = self;
        std::iter::from_fn(move || {
            if current.depth() <= 1 {
                return None;
            }
            current = current.parent();
            Some(current)
        })
    }

    /// Same tree location under a different ancestor prefix.
    ///
    /// `from` must be an ancestor (or equal) of `self`; the bytes below it
    /// are moved under `to`. Used when a category is moved together with
    /// everything nested inside it.
    pub fn rebase(self, from: Self, to: Self) -> Result<Self, PositionError> {
        let from_depth = from.depth();
        let to_depth = to.depth();
        let extra = self.depth().saturating_sub(from_depth);
        if to_depth + extra > MAX_DEPTH {
            return Err(PositionError::DepthExceeded { raw: to.0 });
        }

        let mut rebased = to;
        for level in (from_depth + 1)..=(from_depth + extra) {
            rebased = rebased.append(local_at(self.0, level))?;
        }
        Ok(rebased)
    }
}

/// Depth from the number of trailing zero bytes.
pub const fn depth_of(raw: u32) -> u32 {
    if raw == 0 {
        return 0;
    }
    MAX_DEPTH - raw.trailing_zeros() / 8
}

/// Byte of `raw` that belongs to `depth`.
pub const fn local_at(raw: u32, depth: u32) -> u32 {
    if depth == 0 || depth > MAX_DEPTH {
        return 0;
    }
    (raw >> (8 * (MAX_DEPTH - depth))) & 0xFF
}

pub const fn direct_child_mask(depth: u32) -> u32 {
    match u32::MAX.checked_shr((depth + 1) * 8) {
        Some(mask) => mask,
        None => 0,
    }
}

impl TryFrom<u32> for ChannelPosition {
    type Error = PositionError;

    fn try_from(raw: u32) -> Result<Self, Self::Error> {
        Self::from_raw(raw)
    }
}

impl From<ChannelPosition> for u32 {
    fn from(position: ChannelPosition) -> Self {
        position.0
    }
}

impl fmt::Display for ChannelPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let depth = self.depth();
        if depth == 0 {
            return f.write_str("root");
        }
        let path: Vec<String> = (1..=depth)
            .map(|level| local_at(self.0, level).to_string())
            .collect();
        write!(f, "{}", path.join("."))
    }
}
