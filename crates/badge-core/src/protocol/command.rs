//! Command tag parsing and matching.
//!
//! Every packet carries a four character ASCII tag. On the wire it is a
//! little-endian `u32`, so the first character is the least significant byte.

use std::fmt;

use super::constants::*;

/// Four byte command tag.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Command([u8; 4]);

impl Command {
    pub const SYNC: Self = Self(CMD_SYNC);
    pub const PING: Self = Self(CMD_PING);
    pub const FS_LIST: Self = Self(CMD_FS_LIST);
    pub const FS_EXISTS: Self = Self(CMD_FS_EXISTS);
    pub const FS_MKDIR: Self = Self(CMD_FS_MKDIR);
    pub const FS_REMOVE: Self = Self(CMD_FS_REMOVE);
    pub const FS_FILE_WRITE: Self = Self(CMD_FS_FILE_WRITE);
    pub const FS_FILE_READ: Self = Self(CMD_FS_FILE_READ);
    pub const FS_FILE_CLOSE: Self = Self(CMD_FS_FILE_CLOSE);
    pub const CHUNK: Self = Self(CMD_CHUNK);
    pub const APP_LIST: Self = Self(CMD_APP_LIST);
    pub const NVS_LIST: Self = Self(CMD_NVS_LIST);
    pub const ERR_DIR_OPEN: Self = Self(ERR_DIR_OPEN);

    pub const fn new(tag: [u8; 4]) -> Self {
        Self(tag)
    }

    /// Interpret a wire value (little-endian) as a tag.
    pub const fn from_u32(v: u32) -> Self {
        Self(v.to_le_bytes())
    }

    /// Wire value of this tag.
    pub const fn to_u32(self) -> u32 {
        u32::from_le_bytes(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// Get ASCII representation, non-printable bytes shown as `.`.
    pub fn as_ascii(&self) -> String {
        self.0
            .iter()
            .map(|&b| {
                if b.is_ascii_graphic() || b == b' ' {
                    b as char
                } else {
                    '.'
                }
            })
            .collect()
    }

    /// Device error replies use the `ERRx` family in place of the expected tag.
    pub fn is_error(&self) -> bool {
        self.0.starts_with(b"ERR")
    }
}

impl From<[u8; 4]> for Command {
    fn from(tag: [u8; 4]) -> Self {
        Self(tag)
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Command({:08X} '{}')", self.to_u32(), self.as_ascii())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_ascii())
    }
}
