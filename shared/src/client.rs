//! Client-related types shared between the courier client and backends
//!
//! Request/response DTOs for the delivery REST endpoints.

use serde::{Deserialize, Serialize};

use crate::models::{DeliveryStatus, OrderId};
use crate::util::{opt_id_from_str_or_number, string_from_str_or_number};

// Re-export the response envelope
pub use crate::response::ApiResponse;

// =============================================================================
// Auth API DTOs
// =============================================================================

/// Login request (`POST /delivery-login`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Login response
///
/// `status == "success"` marks a successful login; failures carry `message`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default, deserialize_with = "opt_id_from_str_or_number")]
    pub user_id: Option<u64>,
    #[serde(default, deserialize_with = "string_from_str_or_number")]
    pub username: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub redirect_to: Option<String>,
}

impl LoginResponse {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

/// Persisted session record: token plus partner identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub partner: PartnerIdentity,
}

/// Delivery partner identity
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PartnerIdentity {
    #[serde(default)]
    pub user_id: Option<u64>,
    pub username: String,
    #[serde(default)]
    pub full_name: Option<String>,
}

impl PartnerIdentity {
    /// Name to greet the partner with
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.username)
    }
}

impl Session {
    pub fn new(token: impl Into<String>, partner: PartnerIdentity) -> Self {
        Self {
            token: token.into(),
            partner,
        }
    }

    /// Build a session from a successful login response
    pub fn from_login(response: &LoginResponse) -> Option<Self> {
        if !response.is_success() {
            return None;
        }
        let token = response.token.as_deref().filter(|t| !t.is_empty())?;
        Some(Self::new(
            token,
            PartnerIdentity {
                user_id: response.user_id,
                username: response.username.clone(),
                full_name: response.full_name.clone(),
            },
        ))
    }
}

// =============================================================================
// Delivery API DTOs
// =============================================================================

/// Status change (`POST /delivery-order-status`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdateRequest {
    pub order_id: OrderId,
    pub status: DeliveryStatus,
}

/// Position report (`POST /delivery-location`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationReport {
    pub latitude: f64,
    pub longitude: f64,
    /// Selected order at capture time, `null` when none
    pub order_id: Option<OrderId>,
}

/// Error body returned with non-2xx responses
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}
