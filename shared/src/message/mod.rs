//! Realtime push messages
//!
//! Inbound frames are JSON objects with a `type` discriminator:
//!
//! ```json
//! { "type": "order_status_update", "order_id": 2, "new_status": "on-the-way" }
//! { "type": "new_order_assigned" }
//! { "type": "order_available" }
//! ```
//!
//! Unknown types decode to [`RealtimeEvent::Unknown`]; frames that are not
//! JSON, lack `type`, or carry a bad status fail with [`MessageParseError`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::{DeliveryStatus, OrderId};
use crate::util::id_from_str_or_number;

/// Typed realtime event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RealtimeEvent {
    /// The server moved an order to a new status
    OrderStatusUpdate {
        #[serde(deserialize_with = "id_from_str_or_number")]
        order_id: OrderId,
        new_status: DeliveryStatus,
    },
    /// An order was assigned to this partner (no payload, resync required)
    NewOrderAssigned {},
    /// An order became available for pickup (no payload, resync required)
    OrderAvailable {},
    /// Any other `type`
    #[serde(other)]
    Unknown,
}

impl RealtimeEvent {
    /// Decode a text frame
    pub fn parse(text: &str) -> Result<Self, MessageParseError> {
        serde_json::from_str(text).map_err(|e| MessageParseError(e.to_string()))
    }

    /// Whether the event carries no data and requires a full snapshot fetch
    pub fn requires_resync(&self) -> bool {
        matches!(
            self,
            RealtimeEvent::NewOrderAssigned {} | RealtimeEvent::OrderAvailable {}
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RealtimeEvent::OrderStatusUpdate { .. } => "order_status_update",
            RealtimeEvent::NewOrderAssigned {} => "new_order_assigned",
            RealtimeEvent::OrderAvailable {} => "order_available",
            RealtimeEvent::Unknown => "unknown",
        }
    }
}

impl fmt::Display for RealtimeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RealtimeEvent::OrderStatusUpdate {
                order_id,
                new_status,
            } => write!(f, "order_status_update({order_id} -> {new_status})"),
            other => f.write_str(other.kind()),
        }
    }
}

/// Malformed realtime payload
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed realtime message: {0}")]
pub struct MessageParseError(pub String);
