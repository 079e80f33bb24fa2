//! The write-ahead log format shared by per-memtable `.log` files and `MANIFEST-*` files:
//! 32 KiB physical blocks, a 7-byte header per physical record, and
//! `{Full, First, Middle, Last}` fragmentation so a logical record can span blocks.

pub mod reader;
pub mod writer;

pub use reader::{LogReadError, WriteLogReader};
pub use writer::{LogWriteError, WriteLogWriter};

/// Fixed physical block size for both WAL segments and the manifest log.
pub const WRITE_LOG_BLOCK_SIZE: usize = 1 << 15;

/// Header is `checksum:u32 · length:u16 · type:u8`.
pub const HEADER_SIZE: usize = 4 + 2 + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    Zero = 0,
    Full = 1,
    First = 2,
    Middle = 3,
    Last = 4,
}

impl RecordType {
    #[must_use]
    pub fn for_fragment(is_first: bool, is_last: bool) -> Self {
        match (is_first, is_last) {
            (true, true) => Self::Full,
            (true, false) => Self::First,
            (false, true) => Self::Last,
            (false, false) => Self::Middle,
        }
    }
}

impl TryFrom<u8> for RecordType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Zero),
            1 => Ok(Self::Full),
            2 => Ok(Self::First),
            3 => Ok(Self::Middle),
            4 => Ok(Self::Last),
            _ => Err(()),
        }
    }
}

impl From<RecordType> for u8 {
    fn from(value: RecordType) -> Self {
        value as u8
    }
}
