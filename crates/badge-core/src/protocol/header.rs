//! Packet header (20 bytes, little-endian).

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use std::io::Cursor;
use thiserror::Error;

use super::command::Command;
use super::constants::{HEADER_SIZE, PACKET_MAGIC};

#[derive(Error, Debug)]
pub enum HeaderError {
    #[error("Buffer too small: expected {expected}, got {actual}")]
    BufferTooSmall { expected: usize, actual: usize },
    #[error("Invalid magic: expected 0x{expected:08X}, got 0x{actual:08X}")]
    InvalidMagic { expected: u32, actual: u32 },
    #[error("Payload of {0} bytes does not fit the length field")]
    PayloadTooLarge(usize),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Frame header preceding every payload.
///
/// ```text
/// magic:u32 | identifier:u32 | command:u32 | payload_length:u32 | payload_crc32:u32
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub magic: u32,
    /// Reserved for multiplexing, always zero today.
    pub identifier: u32,
    pub command: Command,
    pub payload_length: u32,
    pub payload_crc32: u32,
}

impl PacketHeader {
    pub const SIZE: usize = HEADER_SIZE;

    pub fn new(command: Command, payload_length: u32, payload_crc32: u32) -> Self {
        Self {
            magic: PACKET_MAGIC,
            identifier: 0,
            command,
            payload_length,
            payload_crc32,
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        LittleEndian::write_u32(&mut buf[0..4], self.magic);
        LittleEndian::write_u32(&mut buf[4..8], self.identifier);
        LittleEndian::write_u32(&mut buf[8..12], self.command.to_u32());
        LittleEndian::write_u32(&mut buf[12..16], self.payload_length);
        LittleEndian::write_u32(&mut buf[16..20], self.payload_crc32);
        buf
    }

    /// Parse a header, rejecting anything that does not start with the magic.
    pub fn from_bytes(data: &[u8]) -> Result<Self, HeaderError> {
        if data.len() < Self::SIZE {
            return Err(HeaderError::BufferTooSmall {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }
        let mut cursor = Cursor::new(data);
        let magic = cursor.read_u32::<LittleEndian>()?;
        if magic != PACKET_MAGIC {
            return Err(HeaderError::InvalidMagic {
                expected: PACKET_MAGIC,
                actual: magic,
            });
        }
        Ok(Self {
            magic,
            identifier: cursor.read_u32::<LittleEndian>()?,
            command: Command::from_u32(cursor.read_u32::<LittleEndian>()?),
            payload_length: cursor.read_u32::<LittleEndian>()?,
            payload_crc32: cursor.read_u32::<LittleEndian>()?,
        })
    }

    /// Cheap check used during resync.
    pub fn starts_with_magic(data: &[u8]) -> bool {
        data.len() >= 4 && LittleEndian::read_u32(&data[..4]) == PACKET_MAGIC
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let header = PacketHeader::new(Command::FS_LIST, 9, 0xDEADBEEF);
        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), PacketHeader::SIZE);
        assert_eq!(&bytes[0..4], &[0x0D, 0xF0, 0xED, 0xFE]);
        assert_eq!(&bytes[4..8], &[0, 0, 0, 0]);
        assert_eq!(&bytes[8..12], b"FSLS");
        assert_eq!(&bytes[12..16], &[9, 0, 0, 0]);

        let parsed = PacketHeader::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn test_header_rejects_bad_magic() {
        let mut bytes = PacketHeader::new(Command::SYNC, 0, 0).to_bytes();
        bytes[0] ^= 0xFF;
        assert!(matches!(
            PacketHeader::from_bytes(&bytes),
            Err(HeaderError::InvalidMagic { .. })
        ));
        assert!(!PacketHeader::starts_with_magic(&bytes));
    }

    #[test]
    fn test_header_too_short() {
        let bytes = PacketHeader::new(Command::SYNC, 0, 0).to_bytes();
        assert!(matches!(
            PacketHeader::from_bytes(&bytes[..12]),
            Err(HeaderError::BufferTooSmall {
                expected: 20,
                actual: 12
            })
        ));
    }
}
