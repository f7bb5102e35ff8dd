//! File lock levels.

use std::fmt;

/// The lock a connection holds on a file.
///
/// Levels are strictly ordered: None < Shared < Reserved < Pending < Exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(i32)]
pub enum LockLevel {
    /// No lock held.
    #[default]
    None = 0,
    /// Shared lock (reading).
    Shared = 1,
    /// Reserved lock (intending to write).
    Reserved = 2,
    /// Pending lock (waiting for shared locks to clear).
    Pending = 3,
    /// Exclusive lock (writing).
    Exclusive = 4,
}

impl LockLevel {
    /// All levels in ascending order.
    pub const ALL: [Self; 5] = [
        Self::None,
        Self::Shared,
        Self::Reserved,
        Self::Pending,
        Self::Exclusive,
    ];
}

impl TryFrom<i32> for LockLevel {
    type Error = i32;

    fn try_from(raw: i32) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|level| *level as i32 == raw)
            .ok_or(raw)
    }
}

impl From<LockLevel> for i32 {
    fn from(level: LockLevel) -> Self {
        level as i32
    }
}

impl fmt::Display for LockLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Shared => "shared",
            Self::Reserved => "reserved",
            Self::Pending => "pending",
            Self::Exclusive => "exclusive",
        };
        f.write_str(name)
    }
}
