//! Realtime push channel
//!
//! Persistent connection delivering order deltas, reconnecting with
//! jittered exponential backoff for as long as its session lives.

mod backoff;
mod channel;
mod transport;

pub use backoff::Backoff;
pub use channel::{ChannelHandle, RealtimeChannel};
pub use transport::{Connection, Connector, MemoryConnector, WsConnector};

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Realtime channel configuration
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// First reconnect delay
    pub reconnect_delay: Duration,
    /// Reconnect delay cap
    pub max_reconnect_delay: Duration,
    /// Connected time after which the backoff starts over
    pub stable_period: Duration,
    /// Upper bound of the random extra delay, as a share of the base delay
    pub jitter_ratio: f64,
    /// Consecutive failures before connectivity is reported degraded
    pub degraded_after: u32,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(30),
            stable_period: Duration::from_secs(60),
            jitter_ratio: 0.2,
            degraded_after: 3,
        }
    }
}

impl RealtimeConfig {
    /// Shortest reconnect delay accepted
    pub const MIN_RECONNECT_DELAY: Duration = Duration::from_millis(10);

    /// Raise the reconnect delays to the floor and keep the cap at or
    /// above the initial delay
    pub fn normalized(mut self) -> Self {
        if self.reconnect_delay < Self::MIN_RECONNECT_DELAY {
            tracing::warn!(
                delay = ?self.reconnect_delay,
                "Reconnect delay too short, using {:?}",
                Self::MIN_RECONNECT_DELAY
            );
            self.reconnect_delay = Self::MIN_RECONNECT_DELAY;
        }
        if self.max_reconnect_delay < self.reconnect_delay {
            tracing::warn!(
                max = ?self.max_reconnect_delay,
                "Reconnect cap below initial delay, using {:?}",
                self.reconnect_delay
            );
            self.max_reconnect_delay = self.reconnect_delay;
        }
        self
    }

    pub fn with_reconnect_delay(mut self, initial: Duration, max: Duration) -> Self {
        self.reconnect_delay = initial;
        self.max_reconnect_delay = max;
        self
    }

    pub fn with_stable_period(mut self, period: Duration) -> Self {
        self.stable_period = period;
        self
    }

    pub fn with_jitter_ratio(mut self, ratio: f64) -> Self {
        self.jitter_ratio = ratio;
        self
    }

    pub fn with_degraded_after(mut self, failures: u32) -> Self {
        self.degraded_after = failures;
        self
    }
}

/// Channel state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelState::Disconnected => write!(f, "disconnected"),
            ChannelState::Connecting => write!(f, "connecting"),
            ChannelState::Connected => write!(f, "connected"),
        }
    }
}

/// Realtime transport failure
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ChannelError {
    #[error("Connect failed: {0}")]
    Connect(String),

    /// Close frame or end of stream
    #[error("Connection closed")]
    Closed,

    #[error("Protocol error: {0}")]
    Protocol(String),
}
