//! Wire representation of per-column change flags.

use std::fmt;
use std::ops::BitOr;

use serde::{Deserialize, Serialize};

/// Change flag bitmask as exchanged with callers and journals.
///
/// `Added=1, Modified=2, Deleted=4, Renamed=8`. Internally the compiler
/// works on [`ColumnChange`](super::ColumnChange); this type only exists at
/// the boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeFlags(u8);

impl ChangeFlags {
    pub const NONE: ChangeFlags = ChangeFlags(0);
    pub const ADDED: ChangeFlags = ChangeFlags(1);
    pub const MODIFIED: ChangeFlags = ChangeFlags(2);
    pub const DELETED: ChangeFlags = ChangeFlags(4);
    pub const RENAMED: ChangeFlags = ChangeFlags(8);

    const ALL_BITS: u8 = 1 | 2 | 4 | 8;

    pub const fn bits(&self) -> u8 {
        self.0
    }

    /// Build from raw bits, rejecting unknown bits.
    pub fn from_bits(bits: u8) -> Option<Self> {
        if bits & !Self::ALL_BITS != 0 {
            None
        } else {
            Some(Self(bits))
        }
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub const fn contains(&self, other: ChangeFlags) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    /// Check the combination is one a column can actually undergo.
    ///
    /// Only `Modified` and `Renamed` combine; `Added` and `Deleted` stand
    /// alone.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.0 & !Self::ALL_BITS != 0 {
            return Err(format!("unknown change flag bits {:#x}", self.0));
        }
        let exclusive = [ChangeFlags::ADDED, ChangeFlags::DELETED];
        for flag in exclusive {
            if self.contains(flag) && self.0 != flag.0 {
                return Err(format!("{} cannot be combined with other flags", flag));
            }
        }
        Ok(())
    }
}

impl BitOr for ChangeFlags {
    type Output = ChangeFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        ChangeFlags(self.0 | rhs.0)
    }
}

impl fmt::Display for ChangeFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("Unchanged");
        }
        let names = [
            (ChangeFlags::ADDED, "Added"),
            (ChangeFlags::MODIFIED, "Modified"),
            (ChangeFlags::DELETED, "Deleted"),
            (ChangeFlags::RENAMED, "Renamed"),
        ];
        let parts: Vec<&str> = names
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        f.write_str(&parts.join("|"))
    }
}
