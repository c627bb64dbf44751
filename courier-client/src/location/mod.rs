//! Location reporting
//!
//! Periodic position reports scoped to the active session, gated by an
//! explicit permission state machine.

mod permission;
mod reporter;
mod source;

pub use permission::Permission;
pub use reporter::{LocationReporter, ReporterHandle};
pub use source::{FixedPositionSource, PositionSource};

use chrono::{DateTime, Utc};
use shared::{LocationReport, OrderId};
use std::time::Duration;
use thiserror::Error;

/// Location reporter configuration
#[derive(Debug, Clone)]
pub struct LocationConfig {
    /// Time between reports
    pub interval: Duration,
    /// Bound on acquiring one position sample
    pub sample_timeout: Duration,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15),
            sample_timeout: Duration::from_secs(5),
        }
    }
}

impl LocationConfig {
    /// Shortest report interval accepted
    pub const MIN_INTERVAL: Duration = Duration::from_secs(1);
    /// Shortest sample bound accepted
    pub const MIN_SAMPLE_TIMEOUT: Duration = Duration::from_millis(100);

    /// Raise durations below their floor to the floor
    pub fn normalized(mut self) -> Self {
        if self.interval < Self::MIN_INTERVAL {
            tracing::warn!(
                interval = ?self.interval,
                "Location interval too short, using {:?}",
                Self::MIN_INTERVAL
            );
            self.interval = Self::MIN_INTERVAL;
        }
        if self.sample_timeout < Self::MIN_SAMPLE_TIMEOUT {
            tracing::warn!(
                timeout = ?self.sample_timeout,
                "Sample timeout too short, using {:?}",
                Self::MIN_SAMPLE_TIMEOUT
            );
            self.sample_timeout = Self::MIN_SAMPLE_TIMEOUT;
        }
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_sample_timeout(mut self, timeout: Duration) -> Self {
        self.sample_timeout = timeout;
        self
    }
}

/// Sensor failure
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SensorError {
    /// Persistent; tracking stays off
    #[error("Location permission denied")]
    PermissionDenied,

    /// No fix within the sample bound; this tick is skipped
    #[error("Position sample timed out after {0:?}")]
    Timeout(Duration),

    #[error("Position unavailable: {0}")]
    Unavailable(String),
}

/// One position fix, tagged with the order in focus at capture time
#[derive(Debug, Clone, PartialEq)]
pub struct LocationSample {
    pub latitude: f64,
    pub longitude: f64,
    pub captured_at: DateTime<Utc>,
    pub order_id: Option<OrderId>,
}

impl LocationSample {
    pub fn new(latitude: f64, longitude: f64, order_id: Option<OrderId>) -> Self {
        Self {
            latitude,
            longitude,
            captured_at: Utc::now(),
            order_id,
        }
    }

    /// Wire body for `POST /delivery-location`
    pub fn to_report(&self) -> LocationReport {
        LocationReport {
            latitude: self.latitude,
            longitude: self.longitude,
            order_id: self.order_id,
        }
    }
}
