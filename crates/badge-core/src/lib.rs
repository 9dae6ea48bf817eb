//! Badge-Core: host side of the MCH2022 badge WebUSB protocol.
//!
//! The badge exposes a vendor interface carrying length-prefixed, CRC-checked
//! packets plus a few control requests for switching the ESP32 between its
//! normal firmware and WebUSB mode. This crate frames and deframes those
//! packets, runs the connection handshake and layers file transfer and
//! listings on top.
//!
//! # Architecture
//!
//! - **Protocol**: Constants, command tags, header, frame codec
//! - **Transport**: USB communication abstraction (nusb, mock)
//! - **Control**: Boot mode switching and resets
//! - **Session**: Packet exchange and connection establishment
//! - **Commands / Transfer**: Filesystem, AppFS and chunked file transfer
//! - **Listing**: Directory and app record decoding
//! - **Events**: Observer pattern for UI decoupling
//!
//! # Example
//!
//! ```no_run
//! use badge_core::{BadgeSession, NusbTransport, SessionConfig};
//!
//! let transport = NusbTransport::open().expect("no badge");
//! let mut session = BadgeSession::new(transport, SessionConfig::default());
//! if session.establish_connection().expect("usb error") {
//!     let entries = session.list_directory("/internal").expect("usb error");
//!     println!("{:?}", entries);
//! }
//! ```

pub mod commands;
pub mod config;
pub mod control;
pub mod events;
pub mod listing;
pub mod protocol;
pub mod session;
pub mod state;
pub mod transfer;
pub mod transport;

// Re-exports for convenience
pub use config::SessionConfig;
pub use control::{BootMode, Control};
pub use events::{BadgeEvent, BadgeObserver, LogLevel, NullObserver, TracingObserver};
pub use listing::{AppEntry, DirEntry, EntryKind, EntryStat, ListingError};
pub use protocol::{Command, FrameDecoder, Packet};
pub use session::{BadgeSession, SessionError};
pub use state::{ConnectionState, ReadPolicy};
pub use transport::{
    DeviceSelector, MockTransport, NusbTransport, TransportError, UsbTransport,
};
