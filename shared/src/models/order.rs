//! Delivery order model
//!
//! Mirrors the `/delivery-orders` payload. The only field not on the wire is
//! `revision`, a local counter the client bumps on every accepted mutation.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::util::{id_from_str_or_number, opt_f64_from_str_or_number, string_from_str_or_number};

/// Order identifier as assigned by the shop backend
pub type OrderId = u64;

/// Delivery status
///
/// Advances strictly along `assigned → picked-up → on-the-way → delivered`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum DeliveryStatus {
    #[default]
    Assigned,
    PickedUp,
    OnTheWay,
    Delivered,
}

impl DeliveryStatus {
    /// All statuses in delivery order
    pub const SEQUENCE: [DeliveryStatus; 4] = [
        DeliveryStatus::Assigned,
        DeliveryStatus::PickedUp,
        DeliveryStatus::OnTheWay,
        DeliveryStatus::Delivered,
    ];

    /// Position in the delivery sequence (0-based)
    pub fn rank(self) -> u8 {
        match self {
            DeliveryStatus::Assigned => 0,
            DeliveryStatus::PickedUp => 1,
            DeliveryStatus::OnTheWay => 2,
            DeliveryStatus::Delivered => 3,
        }
    }

    /// The single legal successor, `None` once delivered
    pub fn next(self) -> Option<DeliveryStatus> {
        match self {
            DeliveryStatus::Assigned => Some(DeliveryStatus::PickedUp),
            DeliveryStatus::PickedUp => Some(DeliveryStatus::OnTheWay),
            DeliveryStatus::OnTheWay => Some(DeliveryStatus::Delivered),
            DeliveryStatus::Delivered => None,
        }
    }

    /// Whether a partner may move an order from `self` to `target`
    pub fn can_transition_to(self, target: DeliveryStatus) -> bool {
        self.next() == Some(target)
    }

    /// Whether `target` lies behind `self` in the sequence
    pub fn is_regression_to(self, target: DeliveryStatus) -> bool {
        target.rank() < self.rank()
    }

    pub fn is_terminal(self) -> bool {
        self == DeliveryStatus::Delivered
    }

    /// Wire representation (`picked-up`)
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryStatus::Assigned => "assigned",
            DeliveryStatus::PickedUp => "picked-up",
            DeliveryStatus::OnTheWay => "on-the-way",
            DeliveryStatus::Delivered => "delivered",
        }
    }

    /// Human readable form (`picked up`)
    pub fn label(self) -> String {
        self.as_str().replace('-', " ")
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown status string
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown delivery status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for DeliveryStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DeliveryStatus::SEQUENCE
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// Customer delivery address
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CustomerAddress {
    #[serde(default)]
    pub address_1: String,
    #[serde(default)]
    pub address_2: Option<String>,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default, deserialize_with = "string_from_str_or_number")]
    pub postcode: String,
    #[serde(default, deserialize_with = "opt_f64_from_str_or_number")]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "opt_f64_from_str_or_number")]
    pub longitude: Option<f64>,
}

impl CustomerAddress {
    /// Coordinates if both are known
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.latitude.zip(self.longitude)
    }

    /// Single-line form: `address_1, [address_2, ]city, state - postcode`
    pub fn one_line(&self) -> String {
        let mut line = self.address_1.clone();
        if let Some(extra) = self.address_2.as_deref().filter(|s| !s.is_empty()) {
            line.push_str(", ");
            line.push_str(extra);
        }
        format!("{}, {}, {} - {}", line, self.city, self.state, self.postcode)
    }
}

/// Pickup point
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Restaurant {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default, deserialize_with = "opt_f64_from_str_or_number")]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "opt_f64_from_str_or_number")]
    pub longitude: Option<f64>,
}

impl Restaurant {
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.latitude.zip(self.longitude)
    }

    /// Maps directions link to the restaurant, if coordinates are known
    pub fn directions_url(&self) -> Option<String> {
        self.coordinates().map(|(lat, lon)| directions_url(lat, lon))
    }
}

/// Ordered line item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderItem {
    pub name: String,
    pub quantity: u32,
    /// Line total
    pub total: Decimal,
}

/// Delivery order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeliveryOrder {
    #[serde(deserialize_with = "id_from_str_or_number")]
    pub id: OrderId,
    #[serde(deserialize_with = "string_from_str_or_number")]
    pub order_number: String,
    pub delivery_status: DeliveryStatus,
    #[serde(default)]
    pub customer_name: String,
    #[serde(default)]
    pub customer_phone: String,
    #[serde(default)]
    pub customer_address: CustomerAddress,
    #[serde(default)]
    pub customer_notes: Option<String>,
    #[serde(default)]
    pub restaurant: Restaurant,
    #[serde(default)]
    pub order_items: Vec<OrderItem>,
    pub total: Decimal,
    #[serde(default)]
    pub payment_method: String,
    /// Local revision marker, never sent or received
    #[serde(skip)]
    pub revision: u64,
}

impl DeliveryOrder {
    /// Maps directions link to the customer, if coordinates are known
    pub fn customer_directions_url(&self) -> Option<String> {
        self.customer_address
            .coordinates()
            .map(|(lat, lon)| directions_url(lat, lon))
    }

    /// Same order content, ignoring the local revision
    pub fn same_content(&self, other: &DeliveryOrder) -> bool {
        DeliveryOrder {
            revision: other.revision,
            ..self.clone()
        } == *other
    }
}

/// Order list element that failed to decode
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedOrder {
    /// The element's `id`, when it carried a readable one
    pub id: Option<serde_json::Value>,
    pub reason: String,
}

/// Decode an order list element by element
///
/// One bad element (a status outside the delivery sequence such as
/// `cancelled`, a missing id) is rejected on its own instead of failing
/// the whole list.
pub fn decode_orders(values: Vec<serde_json::Value>) -> (Vec<DeliveryOrder>, Vec<RejectedOrder>) {
    let mut orders = Vec::with_capacity(values.len());
    let mut rejected = Vec::new();
    for value in values {
        let id = value.get("id").cloned();
        match serde_json::from_value::<DeliveryOrder>(value) {
            Ok(order) => orders.push(order),
            Err(e) => rejected.push(RejectedOrder {
                id,
                reason: e.to_string(),
            }),
        }
    }
    (orders, rejected)
}

fn directions_url(lat: f64, lon: f64) -> String {
    format!("https://www.google.com/maps/dir/?api=1&destination={lat},{lon}")
}
