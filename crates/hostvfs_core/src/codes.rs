//! Result codes returned across the engine boundary.

/// Engine result codes.
///
/// These match the numeric values of the engine's own header. Extended
/// I/O codes carry the primary code in the low byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ResultCode {
    /// Successful result.
    Ok = 0,
    /// Generic error.
    Error = 1,
    /// Internal logic error.
    Internal = 2,
    /// The resource is busy.
    Busy = 5,
    /// Out of memory.
    NoMem = 7,
    /// Attempt to write a read-only file.
    ReadOnly = 8,
    /// Disk I/O error.
    IoErr = 10,
    /// Unknown file-control opcode.
    NotFound = 12,
    /// Unable to open a file.
    CantOpen = 14,
    /// Library used incorrectly.
    Misuse = 21,
    /// Read failed.
    IoErrRead = 10 | (1 << 8),
    /// Read reached end of file before filling the buffer.
    IoErrShortRead = 10 | (2 << 8),
    /// Write failed.
    IoErrWrite = 10 | (3 << 8),
    /// Sync failed.
    IoErrFsync = 10 | (4 << 8),
    /// Directory sync failed.
    IoErrDirFsync = 10 | (5 << 8),
    /// Truncate failed.
    IoErrTruncate = 10 | (6 << 8),
    /// File size query failed.
    IoErrFstat = 10 | (7 << 8),
    /// Unlock rejected.
    IoErrUnlock = 10 | (8 << 8),
    /// Delete failed.
    IoErrDelete = 10 | (10 << 8),
    /// Access check failed.
    IoErrAccess = 10 | (13 << 8),
    /// Lock rejected.
    IoErrLock = 10 | (15 << 8),
    /// Close failed.
    IoErrClose = 10 | (16 << 8),
    /// Seek failed.
    IoErrSeek = 10 | (22 << 8),
}

impl ResultCode {
    const ALL: [Self; 23] = [
        Self::Ok,
        Self::Error,
        Self::Internal,
        Self::Busy,
        Self::NoMem,
        Self::ReadOnly,
        Self::IoErr,
        Self::NotFound,
        Self::CantOpen,
        Self::Misuse,
        Self::IoErrRead,
        Self::IoErrShortRead,
        Self::IoErrWrite,
        Self::IoErrFsync,
        Self::IoErrDirFsync,
        Self::IoErrTruncate,
        Self::IoErrFstat,
        Self::IoErrUnlock,
        Self::IoErrDelete,
        Self::IoErrAccess,
        Self::IoErrLock,
        Self::IoErrClose,
        Self::IoErrSeek,
    ];

    /// Returns the raw integer value.
    #[must_use]
    pub const fn raw(self) -> i32 {
        self as i32
    }

    /// Returns the primary code with the extended byte stripped.
    #[must_use]
    pub fn primary(self) -> Self {
        Self::from(self.raw() & 0xFF)
    }

    /// Returns true for `Ok`.
    #[must_use]
    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }

    /// Returns true for any code other than `Ok`.
    #[must_use]
    pub fn is_err(self) -> bool {
        self != Self::Ok
    }
}

impl From<ResultCode> for i32 {
    fn from(code: ResultCode) -> Self {
        code as i32
    }
}

impl From<i32> for ResultCode {
    fn from(raw: i32) -> Self {
        Self::ALL
            .into_iter()
            .find(|code| code.raw() == raw)
            .unwrap_or(Self::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_codes_match_engine_header() {
        assert_eq!(ResultCode::Ok.raw(), 0);
        assert_eq!(ResultCode::Busy.raw(), 5);
        assert_eq!(ResultCode::NoMem.raw(), 7);
        assert_eq!(ResultCode::IoErr.raw(), 10);
        assert_eq!(ResultCode::NotFound.raw(), 12);
        assert_eq!(ResultCode::CantOpen.raw(), 14);
        assert_eq!(ResultCode::Misuse.raw(), 21);
    }

    #[test]
    fn extended_io_codes_match_engine_header() {
        assert_eq!(ResultCode::IoErrRead.raw(), 266);
        assert_eq!(ResultCode::IoErrShortRead.raw(), 522);
        assert_eq!(ResultCode::IoErrWrite.raw(), 778);
        assert_eq!(ResultCode::IoErrFsync.raw(), 1034);
        assert_eq!(ResultCode::IoErrDirFsync.raw(), 1290);
        assert_eq!(ResultCode::IoErrTruncate.raw(), 1546);
        assert_eq!(ResultCode::IoErrFstat.raw(), 1802);
        assert_eq!(ResultCode::IoErrUnlock.raw(), 2058);
        assert_eq!(ResultCode::IoErrDelete.raw(), 2570);
        assert_eq!(ResultCode::IoErrAccess.raw(), 3338);
        assert_eq!(ResultCode::IoErrLock.raw(), 3850);
        assert_eq!(ResultCode::IoErrClose.raw(), 4106);
        assert_eq!(ResultCode::IoErrSeek.raw(), 5642);
    }

    #[test]
    fn extended_codes_reduce_to_ioerr() {
        for code in ResultCode::ALL.iter().filter(|c| c.raw() > 0xFF) {
            assert_eq!(code.primary(), ResultCode::IoErr);
        }
    }

    #[test]
    fn raw_conversion() {
        let raw: i32 = ResultCode::IoErrShortRead.into();
        assert_eq!(ResultCode::from(raw), ResultCode::IoErrShortRead);
        assert_eq!(ResultCode::from(9999), ResultCode::Error);
    }
}
