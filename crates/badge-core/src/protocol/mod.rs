//! Protocol module - wire format of the badge WebUSB link.

pub mod codec;
pub mod command;
pub mod constants;
pub mod header;

pub use codec::{Decoded, FrameDecoder, Packet, checksum, decode, encode};
pub use command::Command;
pub use constants::*;
pub use header::{HeaderError, PacketHeader};
