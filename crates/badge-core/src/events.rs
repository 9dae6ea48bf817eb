//! Event system for UI decoupling.
//!
//! Allows the CLI (or any other front end) to subscribe to session events
//! without tight coupling to the core logic.

use std::fmt;

use crate::state::ConnectionState;

/// Log level for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Events emitted by a badge session.
#[derive(Debug, Clone)]
pub enum BadgeEvent {
    /// Connection state changed.
    StateChanged {
        from: ConnectionState,
        to: ConnectionState,
    },
    /// Bytes discarded while resynchronizing the stream.
    Garbage { length: usize },
    /// Packet delivered although its payload CRC did not match.
    CrcMismatch { command: String },
    /// Progress update for a file transfer. `total` is zero when unknown.
    Progress {
        operation: String,
        current: u64,
        total: u64,
    },
    /// Log message.
    Log { level: LogLevel, message: String },
    /// Framed packet sent/received.
    Packet {
        direction: PacketDirection,
        command: String,
        length: usize,
    },
}

/// USB packet direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketDirection {
    Tx, // Transmit (Host -> Device)
    Rx, // Receive (Device -> Host)
}

impl fmt::Display for PacketDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketDirection::Tx => write!(f, "TX"),
            PacketDirection::Rx => write!(f, "RX"),
        }
    }
}

/// Observer trait for receiving badge events.
pub trait BadgeObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &BadgeEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl BadgeObserver for NullObserver {
    fn on_event(&self, _event: &BadgeEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl BadgeObserver for TracingObserver {
    fn on_event(&self, event: &BadgeEvent) {
        match event {
            BadgeEvent::StateChanged { from, to } => {
                tracing::info!(from = %from, to = %to, "Connection state changed");
            }
            BadgeEvent::Garbage { length } => {
                tracing::warn!(length, "Discarded garbage bytes");
            }
            BadgeEvent::CrcMismatch { command } => {
                tracing::warn!(command = %command, "Payload CRC mismatch");
            }
            BadgeEvent::Progress {
                operation,
                current,
                total,
            } => {
                if *total > 0 {
                    let pct = (*current * 100) / *total;
                    tracing::debug!(operation = %operation, progress = %format!("{}%", pct), "Progress");
                } else {
                    tracing::debug!(operation = %operation, bytes = current, "Progress");
                }
            }
            BadgeEvent::Log { level, message } => match level {
                LogLevel::Trace => tracing::trace!("{}", message),
                LogLevel::Debug => tracing::debug!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Warn => tracing::warn!("{}", message),
                LogLevel::Error => tracing::error!("{}", message),
            },
            BadgeEvent::Packet {
                direction,
                command,
                length,
            } => {
                tracing::trace!(dir = %direction, command = %command, len = length, "Packet");
            }
        }
    }
}
