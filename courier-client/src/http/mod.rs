//! Delivery REST API
//!
//! [`DeliveryApi`] is the request/response boundary to the shop backend.
//! [`NetworkDeliveryApi`] talks HTTP; [`InMemoryDeliveryApi`] serves the
//! same contract in-process.

mod memory;
mod network;

pub use memory::{ApiCall, InMemoryDeliveryApi};
pub use network::NetworkDeliveryApi;

use async_trait::async_trait;
use shared::{DeliveryOrder, LocationReport, LoginRequest, LoginResponse, StatusUpdateRequest};

use crate::error::ClientResult;

/// Endpoint paths below the REST root
pub mod paths {
    pub const LOGIN: &str = "delivery-login";
    pub const ORDERS: &str = "delivery-orders";
    pub const ORDER_STATUS: &str = "delivery-order-status";
    pub const LOCATION: &str = "delivery-location";
}

/// Delivery REST API
///
/// No call retries on its own; retry policy belongs to the caller.
#[async_trait]
pub trait DeliveryApi: Send + Sync + std::fmt::Debug {
    /// `POST /delivery-login`
    async fn login(&self, request: &LoginRequest) -> ClientResult<LoginResponse>;

    /// `GET /delivery-orders`
    async fn fetch_orders(&self, token: &str) -> ClientResult<Vec<DeliveryOrder>>;

    /// `POST /delivery-order-status`
    async fn post_status(&self, token: &str, request: &StatusUpdateRequest) -> ClientResult<()>;

    /// `POST /delivery-location`
    async fn post_location(&self, token: &str, report: &LocationReport) -> ClientResult<()>;
}
