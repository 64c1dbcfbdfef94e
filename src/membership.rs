//! Fixed 256-slot role membership set.
//!
//! Bit `n` is set when the member holds the role whose `flag_bit_index` is
//! `n`. Indices are `u8`, so the 256-role ceiling is enforced by the type.

use serde::{Deserialize, Serialize};

/// Number of role slots per planet.
pub const ROLE_SLOTS: u32 = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RoleMembership([u64; 4]);

impl RoleMembership {
    pub const EMPTY: Self = Self([0; 4]);

    /// Membership holding only the default role (index 0).
    pub const DEFAULT: Self = Self([1, 0, 0, 0]);

    /// Rebuild from the four signed columns the database stores.
    pub const fn from_columns(columns: [i64; 4]) -> Self {
        Self([
            columns[0] as u64,
            columns[1] as u64,
            columns[2] as u64,
            columns[3] as u64,
        ])
    }

    pub const fn to_columns(&self) -> [i64; 4] {
        [
            self.0[0] as i64,
            self.0[1] as i64,
            self.0[2] as i64,
            self.0[3] as i64,
        ]
    }

    pub fn from_role_ids(ids: impl IntoIterator<Item = u8>) -> Self {
        let mut membership = Self::EMPTY;
        for id in ids {
            membership.insert(id);
        }
        membership
    }

    /// Out-of-range indices are never held.
    pub fn has_role(&self, index: u32) -> bool {
        if index >= ROLE_SLOTS {
            return false;
        }
        let (block, offset) = split(index);
        self.0[block] & (1 << offset) != 0
    }

    pub fn insert(&mut self, index: u8) {
        let (block, offset) = split(u32::from(index));
        self.0[block] |= 1 << offset;
    }

    pub fn role_count(&self) -> u32 {
        self.0.iter().map(|word| word.count_ones()).sum()
    }

    /// Held role indices in ascending order.
    pub fn role_ids(&self) -> RoleIds {
        RoleIds {
            words: self.0,
            block: 0,
        }
    }
}

const fn split(index: u32) -> (usize, u32) {
    ((index >> 6) as usize, index & 63)
}

/// Iterator over the set bits of a [`RoleMembership`].
///
/// Works on its own copy of the words; calling [`RoleMembership::role_ids`]
/// again starts a fresh pass.
#[derive(Debug, Clone)]
pub struct RoleIds {
    words: [u64; 4],
    block: usize,
}

impl Iterator for RoleIds {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        while self.block < 4 {
            let bits = self.words[self.block];
            if bits != 0 {
                let tz = bits.trailing_zeros();
                self.words[self.block] = bits & (bits - 1);
                return Some(((self.block as u32) << 6 | tz) as u8);
            }
            self.block += 1;
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining: u32 = self.words[self.block.min(4)..]
            .iter()
            .map(|word| word.count_ones())
            .sum();
        (remaining as usize, Some(remaining as usize))
    }
}

impl ExactSizeIterator for RoleIds {}

impl FromIterator<u8> for RoleMembership {
    fn from_iter<T: IntoIterator<Item = u8>>(iter: T) -> Self {
        Self::from_role_ids(iter)
    }
}
