//! Frame codec.
//!
//! Encodes `(command, payload)` pairs and carves complete packets out of an
//! accumulating byte stream. Framing is recovered by dropping one byte at a
//! time until the magic lines up again.

use std::fmt;

use super::command::Command;
use super::constants::{HEADER_SIZE, PACKET_MAGIC};
use super::header::{HeaderError, PacketHeader};

/// CRC-32 (zlib/PNG polynomial) over the payload.
pub fn checksum(data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// A decoded packet.
#[derive(Clone, PartialEq, Eq)]
pub struct Packet {
    pub identifier: u32,
    pub command: Command,
    pub payload: Vec<u8>,
    /// False when the payload did not match the header CRC. The packet is
    /// still delivered; callers decide what to do with it.
    pub crc_ok: bool,
}

impl Packet {
    pub fn new(command: Command, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            identifier: 0,
            command,
            payload: payload.into(),
            crc_ok: true,
        }
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("command", &self.command)
            .field("identifier", &self.identifier)
            .field("len", &self.payload.len())
            .field("crc_ok", &self.crc_ok)
            .finish()
    }
}

/// Header length field for a payload of `len` bytes.
fn payload_length(len: usize) -> Result<u32, HeaderError> {
    u32::try_from(len).map_err(|_| HeaderError::PayloadTooLarge(len))
}

/// Encode header and payload into one buffer ready to write.
pub fn encode(command: Command, payload: &[u8]) -> Result<Vec<u8>, HeaderError> {
    let header = PacketHeader::new(command, payload_length(payload.len())?, checksum(payload));
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&header.to_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Output of a single decode pass.
#[derive(Debug, Default)]
pub struct Decoded {
    pub packets: Vec<Packet>,
    /// Bytes dropped while hunting for a frame start.
    pub garbage: Vec<u8>,
    /// Bytes of the input taken by packets and garbage. Everything after this
    /// offset is an incomplete frame to be retried once more data arrives.
    pub consumed: usize,
}

impl Decoded {
    /// Number of packets whose CRC did not match.
    pub fn crc_failures(&self) -> usize {
        self.packets.iter().filter(|p| !p.crc_ok).count()
    }
}

/// Decode as many complete packets as `buffer` holds.
pub fn decode(buffer: &[u8]) -> Decoded {
    let mut out = Decoded::default();
    let mut pos = 0;

    while buffer.len() - pos >= HEADER_SIZE {
        let rest = &buffer[pos..];

        let header = match PacketHeader::from_bytes(rest) {
            Ok(header) => header,
            Err(_) => {
                out.garbage.push(rest[0]);
                pos += 1;
                continue;
            }
        };

        let payload_length = header.payload_length as usize;
        if rest.len() - HEADER_SIZE < payload_length {
            break;
        }

        let payload = rest[HEADER_SIZE..HEADER_SIZE + payload_length].to_vec();
        pos += HEADER_SIZE + payload_length;

        let crc_ok = checksum(&payload) == header.payload_crc32;
        out.packets.push(Packet {
            identifier: header.identifier,
            command: header.command,
            payload,
            crc_ok,
        });
    }

    // Leftover bytes that cannot grow into a frame start are garbage too.
    while pos < buffer.len() && !could_start_frame(&buffer[pos..]) {
        out.garbage.push(buffer[pos]);
        pos += 1;
    }

    out.consumed = pos;
    out
}

fn could_start_frame(rest: &[u8]) -> bool {
    let magic = PACKET_MAGIC.to_le_bytes();
    let n = rest.len().min(magic.len());
    rest[..n] == magic[..n]
}

/// Streaming decoder owning the receive buffer.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append freshly read bytes and decode whatever is now complete.
    pub fn push(&mut self, data: &[u8]) -> Decoded {
        self.buffer.extend_from_slice(data);
        let decoded = decode(&self.buffer);
        self.buffer.drain(..decoded.consumed);
        decoded
    }

    /// Bytes held back waiting for the rest of a frame.
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
