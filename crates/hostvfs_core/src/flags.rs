//! Open, sync, access and device-capability flags.

bitflags::bitflags! {
    /// Flags passed to [`Vfs::open`](crate::Vfs::open).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpenFlags: u32 {
        /// Open for reading only.
        const READONLY = 0x0000_0001;
        /// Open for reading and writing.
        const READWRITE = 0x0000_0002;
        /// Create the file if it does not exist.
        const CREATE = 0x0000_0004;
        /// Delete the file when it is closed.
        const DELETEONCLOSE = 0x0000_0008;
        /// Fail if the file already exists.
        const EXCLUSIVE = 0x0000_0010;
        /// Filename is a URI.
        const URI = 0x0000_0040;
        /// In-memory database.
        const MEMORY = 0x0000_0080;
        /// Main database file.
        const MAIN_DB = 0x0000_0100;
        /// Temporary database file.
        const TEMP_DB = 0x0000_0200;
        /// Transient database file.
        const TRANSIENT_DB = 0x0000_0400;
        /// Rollback journal of the main database.
        const MAIN_JOURNAL = 0x0000_0800;
        /// Rollback journal of a temporary database.
        const TEMP_JOURNAL = 0x0000_1000;
        /// Statement sub-journal.
        const SUBJOURNAL = 0x0000_2000;
        /// Super-journal for multi-database commits.
        const SUPER_JOURNAL = 0x0000_4000;
        /// Connection uses no mutexes.
        const NOMUTEX = 0x0000_8000;
        /// Connection is fully serialized.
        const FULLMUTEX = 0x0001_0000;
        /// Write-ahead log.
        const WAL = 0x0008_0000;
    }
}

bitflags::bitflags! {
    /// Flags passed to [`IoMethods::sync`](crate::IoMethods::sync).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SyncFlags: u32 {
        /// Ordinary sync.
        const NORMAL = 0x02;
        /// Full sync (data and metadata).
        const FULL = 0x03;
        /// Only file contents need to be synced.
        const DATAONLY = 0x10;
    }
}

impl SyncFlags {
    /// Returns true if this is a durability-critical full sync.
    #[must_use]
    pub fn is_full(self) -> bool {
        (self.bits() & 0x0F) == Self::FULL.bits()
    }
}

bitflags::bitflags! {
    /// Device capability flags reported by
    /// [`IoMethods::device_characteristics`](crate::IoMethods::device_characteristics).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DeviceCharacteristics: u32 {
        /// Writes of one sector are atomic.
        const ATOMIC = 0x0000_0001;
        /// Data is appended before the size grows.
        const SAFE_APPEND = 0x0000_0200;
        /// Writes complete in the order issued.
        const SEQUENTIAL = 0x0000_0400;
        /// The file cannot be deleted while it is open.
        const UNDELETABLE_WHEN_OPEN = 0x0000_0800;
        /// The file never changes once written.
        const IMMUTABLE = 0x0000_2000;
    }
}

/// The check requested by [`Vfs::access`](crate::Vfs::access).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum AccessMode {
    /// Does the path exist?
    Exists = 0,
    /// Does the path exist and accept writes?
    ReadWrite = 1,
    /// Does the path exist and accept reads?
    Read = 2,
}

impl TryFrom<i32> for AccessMode {
    type Error = i32;

    fn try_from(raw: i32) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(Self::Exists),
            1 => Ok(Self::ReadWrite),
            2 => Ok(Self::Read),
            other => Err(other),
        }
    }
}
