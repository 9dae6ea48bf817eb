//! Connection state and read retry policy.

use std::fmt;
use std::time::Duration;

use crate::protocol::constants::{READ_ATTEMPTS, READ_TIMEOUT_MS};

/// Link state as seen by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No successful `SYNC` yet.
    #[default]
    Disconnected,
    /// Handshake in progress, re-entered after a mode switch or reset.
    Syncing,
    /// Device answered `SYNC`.
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "DISCONNECTED"),
            ConnectionState::Syncing => write!(f, "SYNCING"),
            ConnectionState::Connected => write!(f, "CONNECTED"),
        }
    }
}

/// How long to keep polling the IN endpoint for a response.
///
/// Each read waits at most `read_timeout`. A request gives up after
/// `max_attempts` consecutive reads returned nothing; any received byte
/// restores the full budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadPolicy {
    pub max_attempts: u32,
    pub read_timeout: Duration,
}

impl Default for ReadPolicy {
    fn default() -> Self {
        Self {
            max_attempts: READ_ATTEMPTS,
            read_timeout: Duration::from_millis(READ_TIMEOUT_MS),
        }
    }
}

/// Attempt counter implementing [`ReadPolicy`].
#[derive(Debug)]
pub struct ReadBudget {
    max_attempts: u32,
    remaining: u32,
}

impl ReadBudget {
    pub fn new(policy: &ReadPolicy) -> Self {
        Self {
            max_attempts: policy.max_attempts,
            remaining: policy.max_attempts,
        }
    }

    /// Record one read. Returns false once the budget is spent.
    pub fn record(&mut self, received: usize) -> bool {
        if received > 0 {
            self.remaining = self.max_attempts;
        } else {
            self.remaining = self.remaining.saturating_sub(1);
        }
        self.remaining > 0
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_exhausts_without_data() {
        let policy = ReadPolicy {
            max_attempts: 3,
            read_timeout: Duration::ZERO,
        };
        let mut budget = ReadBudget::new(&policy);
        assert!(budget.record(0));
        assert!(budget.record(0));
        assert!(!budget.record(0));
    }

    #[test]
    fn test_budget_resets_on_progress() {
        let policy = ReadPolicy {
            max_attempts: 3,
            read_timeout: Duration::ZERO,
        };
        let mut budget = ReadBudget::new(&policy);
        budget.record(0);
        budget.record(0);
        assert_eq!(budget.remaining(), 1);
        assert!(budget.record(12));
        assert_eq!(budget.remaining(), 3);
    }

    #[test]
    fn test_default_policy() {
        let policy = ReadPolicy::default();
        assert_eq!(policy.max_attempts, 200);
        assert_eq!(policy.read_timeout, Duration::from_millis(5));
    }
}
