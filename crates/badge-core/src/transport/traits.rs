//! Transport seam between the session and the badge's vendor interface.
//!
//! `NusbTransport` drives real hardware, `MockTransport` plays the badge in
//! tests.

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Device not found: VID={vid:04X} PID={pid:04X}")]
    DeviceNotFound { vid: u16, pid: u16 },

    #[error("Failed to open device: {0}")]
    OpenFailed(String),

    #[error("Failed to claim interface {interface}: {message}")]
    ClaimInterfaceFailed { interface: u8, message: String },

    #[error("Endpoint not found: type={ep_type}, direction={direction}")]
    EndpointNotFound { ep_type: String, direction: String },

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Control transfer 0x{request:02X} failed: {message}")]
    ControlFailed { request: u8, message: String },

    #[error("Device disconnected")]
    Disconnected,

    #[error("Timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Abstract USB transport interface.
///
/// The session only needs a bulk pipe in each direction plus vendor control
/// transfers addressed to the claimed interface.
pub trait UsbTransport: Send + Sync {
    /// Write raw bytes to the OUT endpoint.
    fn write(&self, data: &[u8]) -> Result<usize, TransportError>;

    /// Read up to `max_len` bytes from the IN endpoint, waiting at most
    /// `timeout`. An empty vector means nothing arrived.
    fn read(&self, max_len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError>;

    /// Class/interface OUT control transfer without data stage.
    fn control_out(&self, request: u8, value: u16) -> Result<(), TransportError>;

    /// Class/interface IN control transfer returning a single byte.
    fn control_in(&self, request: u8, value: u16) -> Result<u8, TransportError>;

    /// Size of one bulk IN packet, used as the per-read length.
    fn max_packet_size(&self) -> usize;
}
