//! Badge session - owns the link to one badge.
//!
//! A session wraps an already opened transport together with the receive
//! buffer and the queue of decoded packets that nobody has claimed yet. Only
//! one exchange may be in flight; `&mut self` on every operation enforces it.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;

use thiserror::Error;
use tracing::{debug, info, instrument, trace, warn};

use crate::config::SessionConfig;
use crate::control::Control;
use crate::events::{BadgeEvent, BadgeObserver, LogLevel, PacketDirection, TracingObserver};
use crate::protocol::{Command, FrameDecoder, HeaderError, Packet, encode};
use crate::state::{ConnectionState, ReadBudget, ReadPolicy};
use crate::transport::{TransportError, UsbTransport};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Frame error: {0}")]
    Frame(#[from] HeaderError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),
}

/// Badge session - packet exchange, handshake and mode switching.
pub struct BadgeSession<T: UsbTransport, O: BadgeObserver = TracingObserver> {
    transport: T,
    observer: Arc<O>,
    config: SessionConfig,
    decoder: FrameDecoder,
    pending: VecDeque<Packet>,
    state: ConnectionState,
}

impl<T: UsbTransport> BadgeSession<T, TracingObserver> {
    /// Create a new session with default tracing observer.
    pub fn new(transport: T, config: SessionConfig) -> Self {
        Self::with_observer(transport, config, Arc::new(TracingObserver))
    }
}

impl<T: UsbTransport, O: BadgeObserver> BadgeSession<T, O> {
    /// Create a new session with a custom observer.
    pub fn with_observer(transport: T, config: SessionConfig, observer: Arc<O>) -> Self {
        Self {
            transport,
            observer,
            config,
            decoder: FrameDecoder::new(),
            pending: VecDeque::new(),
            state: ConnectionState::Disconnected,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub(crate) fn emit(&self, event: BadgeEvent) {
        self.observer.on_event(&event);
    }

    pub(crate) fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.emit(BadgeEvent::Log {
            level,
            message: message.into(),
        });
    }

    fn goto_state(&mut self, to: ConnectionState) {
        if self.state != to {
            let from = self.state;
            self.state = to;
            self.emit(BadgeEvent::StateChanged { from, to });
        }
    }

    // ------------------------------------------------------------------------
    // Packet exchange
    // ------------------------------------------------------------------------

    /// Encode and write one packet without waiting for an answer.
    pub fn send(&mut self, command: Command, payload: &[u8]) -> Result<(), SessionError> {
        let frame = encode(command, payload)?;
        self.transport.write(&frame)?;
        self.emit(BadgeEvent::Packet {
            direction: PacketDirection::Tx,
            command: command.as_ascii(),
            length: payload.len(),
        });
        Ok(())
    }

    /// Send a packet and wait for the next one to arrive, using the
    /// configured read policy.
    pub fn request(
        &mut self,
        command: Command,
        payload: &[u8],
    ) -> Result<Option<Packet>, SessionError> {
        let policy = self.config.read_policy();
        self.request_with(command, payload, &policy)
    }

    /// Send a packet and wait for the next one under an explicit policy.
    ///
    /// The first available packet is returned whatever its command; checking
    /// it against `command` is up to the caller.
    pub fn request_with(
        &mut self,
        command: Command,
        payload: &[u8],
        policy: &ReadPolicy,
    ) -> Result<Option<Packet>, SessionError> {
        self.send(command, payload)?;
        self.fill_queue(policy);
        Ok(self.pending.pop_front())
    }

    /// Pop the oldest unclaimed packet, reading from the wire if none is queued.
    pub fn receive_packet(&mut self) -> Option<Packet> {
        let policy = self.config.read_policy();
        self.fill_queue(&policy);
        self.pending.pop_front()
    }

    /// Look at the oldest unclaimed packet without removing it.
    pub fn peek_packet(&mut self) -> Option<&Packet> {
        let policy = self.config.read_policy();
        self.fill_queue(&policy);
        self.pending.front()
    }

    /// Number of decoded packets nobody has claimed yet.
    pub fn pending_packets(&self) -> usize {
        self.pending.len()
    }

    /// Poll the IN endpoint until a packet is queued or the budget runs out.
    fn fill_queue(&mut self, policy: &ReadPolicy) {
        let mut budget = ReadBudget::new(policy);
        while self.pending.is_empty() {
            let received = self.read_once(policy);
            if !budget.record(received) {
                trace!("Read budget exhausted");
                break;
            }
        }
    }

    /// One bulk read. Failures count as an empty read.
    fn read_once(&mut self, policy: &ReadPolicy) -> usize {
        let max_len = self.transport.max_packet_size();
        match self.transport.read(max_len, policy.read_timeout) {
            Ok(data) => {
                if !data.is_empty() {
                    self.ingest(&data);
                }
                data.len()
            }
            Err(TransportError::Timeout { .. }) => 0,
            Err(e) => {
                trace!(error = %e, "Read failed");
                0
            }
        }
    }

    fn ingest(&mut self, data: &[u8]) {
        let decoded = self.decoder.push(data);

        if !decoded.garbage.is_empty() {
            debug!(garbage = ?decoded.garbage, "Garbage");
            self.emit(BadgeEvent::Garbage {
                length: decoded.garbage.len(),
            });
        }

        for packet in decoded.packets {
            self.emit(BadgeEvent::Packet {
                direction: PacketDirection::Rx,
                command: packet.command.as_ascii(),
                length: packet.payload.len(),
            });
            if !packet.crc_ok {
                self.emit(BadgeEvent::CrcMismatch {
                    command: packet.command.as_ascii(),
                });
            }
            self.pending.push_back(packet);
        }
    }

    /// Drain whatever is already waiting on the wire into the queue.
    fn flush_input(&mut self) {
        let policy = self.config.read_policy();
        while self.read_once(&policy) > 0 {}
    }

    /// Request/response template shared by the simple commands: the reply
    /// must exist and carry the same command tag.
    pub fn exchange(
        &mut self,
        command: Command,
        payload: &[u8],
    ) -> Result<Option<Packet>, SessionError> {
        let Some(response) = self.request(command, payload)? else {
            warn!(command = %command, "No response");
            return Ok(None);
        };
        if response.command != command {
            warn!(expected = %command, got = %response.command, "Unexpected response");
            return Ok(None);
        }
        Ok(Some(response))
    }

    /// Exchange for commands answered by a single boolean byte.
    pub(crate) fn exchange_flag(
        &mut self,
        command: Command,
        payload: &[u8],
    ) -> Result<bool, SessionError> {
        let Some(response) = self.exchange(command, payload)? else {
            return Ok(false);
        };
        match response.payload.as_slice() {
            [flag] => Ok(*flag != 0),
            other => {
                warn!(command = %command, len = other.len(), "Wrong payload length");
                Ok(false)
            }
        }
    }

    // ------------------------------------------------------------------------
    // Connection establishment
    // ------------------------------------------------------------------------

    /// Resynchronize with the badge: discard anything queued and expect
    /// `SYNC` back as the very next packet.
    #[instrument(skip(self))]
    pub fn sync(&mut self) -> Result<bool, SessionError> {
        self.goto_state(ConnectionState::Syncing);
        self.flush_input();
        self.pending.clear();
        // Bytes still buffered predate the SYNC and would swallow its reply.
        if !self.decoder.buffered().is_empty() {
            debug!(bytes = self.decoder.buffered().len(), "Dropping partial frame");
            self.decoder.clear();
        }

        let response = match self.request(Command::SYNC, &[]) {
            Ok(response) => response,
            Err(SessionError::Transport(e)) => {
                warn!(error = %e, "SYNC could not be sent");
                None
            }
            Err(e) => return Err(e),
        };

        match response {
            Some(packet) if packet.command == Command::SYNC => {
                self.goto_state(ConnectionState::Connected);
                Ok(true)
            }
            Some(packet) => {
                warn!(got = %packet.command, "Unexpected reply to SYNC");
                self.goto_state(ConnectionState::Disconnected);
                Ok(false)
            }
            None => {
                debug!("No response to SYNC");
                self.goto_state(ConnectionState::Disconnected);
                Ok(false)
            }
        }
    }

    /// Full handshake: plain sync, then sync after switching the badge into
    /// WebUSB mode, then sync after a hard reset. Returns false when all
    /// three attempts fail.
    #[instrument(skip(self))]
    pub fn establish_connection(&mut self) -> Result<bool, SessionError> {
        if self.sync()? {
            info!("Connected");
            return Ok(true);
        }

        self.log(LogLevel::Info, "Connecting...");
        Control::new(&self.transport).start_webusb()?;
        self.wait_for_reenumeration();
        if self.sync()? {
            info!("Connected after mode switch");
            return Ok(true);
        }

        self.log(LogLevel::Info, "Reset...");
        let control = Control::new(&self.transport);
        control.reset_to_normal()?;
        control.start_webusb()?;
        self.wait_for_reenumeration();
        if self.sync()? {
            info!("Connected after reset");
            return Ok(true);
        }

        self.log(LogLevel::Error, "Failed to connect to the badge");
        Ok(false)
    }

    fn wait_for_reenumeration(&self) {
        let delay = self.config.reenumerate_delay();
        if !delay.is_zero() {
            debug!(delay_ms = delay.as_millis() as u64, "Waiting for badge to restart");
            thread::sleep(delay);
        }
    }

    /// Reboot the badge into its normal firmware. The link is gone afterwards.
    pub fn reset(&mut self) -> Result<(), SessionError> {
        Control::new(&self.transport).reset_to_normal()?;
        self.pending.clear();
        self.decoder.clear();
        self.goto_state(ConnectionState::Disconnected);
        Ok(())
    }

    /// Firmware version of the USB co-processor.
    pub fn firmware_version(&self) -> Result<u8, SessionError> {
        Ok(Control::new(&self.transport).firmware_version()?)
    }
}
