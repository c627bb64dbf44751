//! Panel events
//!
//! Everything the UI layer needs to react to, delivered over a broadcast
//! channel. Sending with no subscriber is fine.

use shared::{DeliveryStatus, OrderId};
use tokio::sync::broadcast;

use crate::realtime::ChannelState;
use crate::session::ClearReason;

/// Event published to the UI boundary
#[derive(Debug, Clone, PartialEq)]
pub enum PanelEvent {
    /// A snapshot was merged into the store
    OrdersReplaced { count: usize },
    /// One order changed status (delta, optimistic apply or rollback)
    OrderUpdated {
        order_id: OrderId,
        status: DeliveryStatus,
    },
    /// Realtime channel state machine moved
    ChannelState(ChannelState),
    /// Reconnects keep failing; REST snapshots are the fallback source
    ConnectivityDegraded { failures: u32 },
    /// The channel reconnected after being degraded
    ConnectivityRestored,
    /// Location permission is denied; tracking is off
    LocationPermissionDenied,
    /// The session ended; the UI should show the login screen
    SessionCleared { reason: ClearReason },
}

/// Broadcast bus for [`PanelEvent`]
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PanelEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: PanelEvent) {
        if let Err(e) = self.tx.send(event) {
            tracing::trace!("No subscribers for panel event: {:?}", e.0);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PanelEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
