//! Mock USB transport for testing.
//!
//! Acts as a scripted device: every write pops one queued reply (or silence)
//! and makes its bytes available to subsequent reads, `max_len` at a time.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::traits::{TransportError, UsbTransport};
use crate::protocol::constants::*;
use crate::protocol::{Command, Packet, decode, encode};

/// A recorded control transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlCall {
    pub request: u8,
    pub value: u16,
}

/// Mock transport for unit testing session logic.
#[derive(Clone)]
pub struct MockTransport {
    /// One entry per expected write; `None` keeps the device silent.
    replies: Arc<Mutex<VecDeque<Option<Vec<u8>>>>>,
    /// Bytes waiting to be read by the host.
    rx: Arc<Mutex<VecDeque<u8>>>,
    /// Captured writes.
    write_log: Arc<Mutex<Vec<Vec<u8>>>>,
    /// Captured control transfers, in and out.
    control_log: Arc<Mutex<Vec<ControlCall>>>,
    boot_mode: Arc<Mutex<u8>>,
    fw_version: u8,
    max_packet_size: Arc<Mutex<usize>>,
    /// Whether device is "connected".
    connected: Arc<Mutex<bool>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            replies: Arc::new(Mutex::new(VecDeque::new())),
            rx: Arc::new(Mutex::new(VecDeque::new())),
            write_log: Arc::new(Mutex::new(Vec::new())),
            control_log: Arc::new(Mutex::new(Vec::new())),
            boot_mode: Arc::new(Mutex::new(0)),
            fw_version: 1,
            max_packet_size: Arc::new(Mutex::new(DEFAULT_MAX_PACKET_SIZE)),
            connected: Arc::new(Mutex::new(true)),
        }
    }

    /// Queue raw bytes released by the next write.
    pub fn queue_reply(&self, bytes: &[u8]) {
        self.replies.lock().unwrap().push_back(Some(bytes.to_vec()));
    }

    /// Queue an encoded packet released by the next write.
    pub fn queue_packet(&self, command: Command, payload: &[u8]) {
        let frame = encode(command, payload).expect("reply payload fits in a frame");
        self.queue_reply(&frame);
    }

    /// Next write gets no answer.
    pub fn queue_silence(&self) {
        self.replies.lock().unwrap().push_back(None);
    }

    /// Make bytes readable immediately, independent of writes.
    pub fn inject(&self, bytes: &[u8]) {
        self.rx.lock().unwrap().extend(bytes.iter().copied());
    }

    /// Get all captured writes.
    pub fn get_writes(&self) -> Vec<Vec<u8>> {
        self.write_log.lock().unwrap().clone()
    }

    /// Decode everything the host has written so far.
    pub fn sent_packets(&self) -> Vec<Packet> {
        let stream: Vec<u8> = self.get_writes().concat();
        decode(&stream).packets
    }

    /// Commands of everything the host has written so far.
    pub fn sent_commands(&self) -> Vec<Command> {
        self.sent_packets().iter().map(|p| p.command).collect()
    }

    pub fn control_calls(&self) -> Vec<ControlCall> {
        self.control_log.lock().unwrap().clone()
    }

    pub fn set_boot_mode(&self, mode: u8) {
        *self.boot_mode.lock().unwrap() = mode;
    }

    pub fn boot_mode(&self) -> u8 {
        *self.boot_mode.lock().unwrap()
    }

    /// Set the bulk packet size reads are split into.
    pub fn set_max_packet_size(&self, size: usize) {
        *self.max_packet_size.lock().unwrap() = size;
    }

    /// Simulate device disconnect.
    pub fn disconnect(&self) {
        *self.connected.lock().unwrap() = false;
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl UsbTransport for MockTransport {
    fn write(&self, data: &[u8]) -> Result<usize, TransportError> {
        if !*self.connected.lock().unwrap() {
            return Err(TransportError::Disconnected);
        }
        self.write_log.lock().unwrap().push(data.to_vec());
        if let Some(Some(reply)) = self.replies.lock().unwrap().pop_front() {
            self.rx.lock().unwrap().extend(reply);
        }
        Ok(data.len())
    }

    fn read(&self, max_len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        if !*self.connected.lock().unwrap() {
            return Err(TransportError::Disconnected);
        }
        let mut rx = self.rx.lock().unwrap();
        if rx.is_empty() {
            return Err(TransportError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            });
        }
        let n = max_len.min(rx.len());
        Ok(rx.drain(..n).collect())
    }

    fn control_out(&self, request: u8, value: u16) -> Result<(), TransportError> {
        self.control_log
            .lock()
            .unwrap()
            .push(ControlCall { request, value });
        if request == REQUEST_MODE {
            *self.boot_mode.lock().unwrap() = value as u8;
        }
        Ok(())
    }

    fn control_in(&self, request: u8, value: u16) -> Result<u8, TransportError> {
        self.control_log
            .lock()
            .unwrap()
            .push(ControlCall { request, value });
        match request {
            REQUEST_MODE_GET => Ok(*self.boot_mode.lock().unwrap()),
            REQUEST_FW_VERSION_GET => Ok(self.fw_version),
            _ => Err(TransportError::ControlFailed {
                request,
                message: "stalled".into(),
            }),
        }
    }

    fn max_packet_size(&self) -> usize {
        *self.max_packet_size.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_WAIT: Duration = Duration::from_millis(0);

    #[test]
    fn test_mock_reply_per_write() {
        let mock = MockTransport::new();
        mock.queue_silence();
        mock.queue_reply(b"pong");

        mock.write(b"first").unwrap();
        assert!(mock.read(64, NO_WAIT).is_err());

        mock.write(b"second").unwrap();
        assert_eq!(mock.read(64, NO_WAIT).unwrap(), b"pong");
        assert!(mock.read(64, NO_WAIT).is_err());
    }

    #[test]
    fn test_mock_reads_are_split() {
        let mock = MockTransport::new();
        mock.inject(&[7u8; 100]);
        assert_eq!(mock.read(64, NO_WAIT).unwrap().len(), 64);
        assert_eq!(mock.read(64, NO_WAIT).unwrap().len(), 36);
    }

    #[test]
    fn test_mock_write_capture() {
        let mock = MockTransport::new();
        mock.write(&encode(Command::SYNC, &[]).unwrap()).unwrap();
        mock.write(&encode(Command::PING, b"x").unwrap()).unwrap();

        assert_eq!(mock.get_writes().len(), 2);
        assert_eq!(mock.sent_commands(), vec![Command::SYNC, Command::PING]);
    }

    #[test]
    fn test_mock_boot_mode_control() {
        let mock = MockTransport::new();
        assert_eq!(mock.control_in(REQUEST_MODE_GET, 0).unwrap(), 0);
        mock.control_out(REQUEST_MODE, 3).unwrap();
        assert_eq!(mock.control_in(REQUEST_MODE_GET, 0).unwrap(), 3);
        assert_eq!(mock.control_calls().len(), 3);
    }

    #[test]
    fn test_mock_disconnect() {
        let mock = MockTransport::new();
        mock.inject(b"late");
        mock.disconnect();
        assert!(matches!(mock.write(b"test"), Err(TransportError::Disconnected)));
        assert!(matches!(mock.read(64, NO_WAIT), Err(TransportError::Disconnected)));
    }

    #[test]
    fn test_mock_packet_size_shared_with_clones() {
        let mock = MockTransport::new();
        let session_side = mock.clone();
        mock.set_max_packet_size(7);
        assert_eq!(session_side.max_packet_size(), 7);
    }
}
