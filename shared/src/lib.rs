//! Shared types for the courier client
//!
//! Order model, realtime messages and REST DTOs used by the client and by
//! in-process backends.

pub mod client;
pub mod message;
pub mod models;
pub mod response;
pub mod util;

// Re-exports
pub use serde::{Deserialize, Serialize};

pub use client::{LocationReport, LoginRequest, LoginResponse, PartnerIdentity, Session, StatusUpdateRequest};
pub use message::{MessageParseError, RealtimeEvent};
pub use models::{DeliveryOrder, DeliveryStatus, OrderId};
pub use response::ApiResponse;
