//! In-process delivery backend
//!
//! Scriptable stand-in for the REST API: holds orders and one account,
//! records every call and can be told to fail.

use async_trait::async_trait;
use parking_lot::Mutex;
use shared::{
    DeliveryOrder, DeliveryStatus, LocationReport, LoginRequest, LoginResponse, OrderId,
    StatusUpdateRequest,
};
use std::sync::Arc;
use std::time::Duration;

use super::DeliveryApi;
use crate::error::{ClientError, ClientResult};

/// A call received by [`InMemoryDeliveryApi`]
#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    Login { username: String },
    FetchOrders,
    PostStatus {
        order_id: OrderId,
        status: DeliveryStatus,
    },
    PostLocation(LocationReport),
}

#[derive(Debug, Clone)]
enum Failure {
    Auth(String),
    Network(String),
}

impl Failure {
    fn into_error(self) -> ClientError {
        match self {
            Failure::Auth(m) => ClientError::Auth(m),
            Failure::Network(m) => ClientError::Network(m),
        }
    }
}

#[derive(Debug)]
struct Backend {
    username: String,
    password: String,
    token: String,
    full_name: Option<String>,
    orders: Vec<DeliveryOrder>,
    calls: Vec<ApiCall>,
    /// Every authenticated call fails with 401
    revoked: bool,
    fetch_failure: Option<Failure>,
    status_failures: Vec<Failure>,
    status_delay: Option<Duration>,
}

/// Scripted in-process delivery API
#[derive(Debug, Clone)]
pub struct InMemoryDeliveryApi {
    backend: Arc<Mutex<Backend>>,
}

impl InMemoryDeliveryApi {
    /// Backend with one partner account and no orders
    pub fn new(username: &str, password: &str, token: &str) -> Self {
        Self {
            backend: Arc::new(Mutex::new(Backend {
                username: username.to_string(),
                password: password.to_string(),
                token: token.to_string(),
                full_name: None,
                orders: Vec::new(),
                calls: Vec::new(),
                revoked: false,
                fetch_failure: None,
                status_failures: Vec::new(),
                status_delay: None,
            })),
        }
    }

    pub fn with_full_name(self, name: &str) -> Self {
        self.backend.lock().full_name = Some(name.to_string());
        self
    }

    pub fn with_orders(self, orders: Vec<DeliveryOrder>) -> Self {
        self.set_orders(orders);
        self
    }

    /// Replace the assigned orders
    pub fn set_orders(&self, orders: Vec<DeliveryOrder>) {
        self.backend.lock().orders = orders;
    }

    /// Change one held order's status, as another actor would
    pub fn set_status(&self, order_id: OrderId, status: DeliveryStatus) {
        let mut backend = self.backend.lock();
        if let Some(order) = backend.orders.iter_mut().find(|o| o.id == order_id) {
            order.delivery_status = status;
        }
    }

    pub fn orders(&self) -> Vec<DeliveryOrder> {
        self.backend.lock().orders.clone()
    }

    /// Calls received so far, oldest first
    pub fn calls(&self) -> Vec<ApiCall> {
        self.backend.lock().calls.clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.count(|c| matches!(c, ApiCall::FetchOrders))
    }

    pub fn status_posts(&self) -> Vec<(OrderId, DeliveryStatus)> {
        self.backend
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                ApiCall::PostStatus { order_id, status } => Some((*order_id, *status)),
                _ => None,
            })
            .collect()
    }

    pub fn location_reports(&self) -> Vec<LocationReport> {
        self.backend
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                ApiCall::PostLocation(report) => Some(report.clone()),
                _ => None,
            })
            .collect()
    }

    /// Reject the session token on every authenticated call from now on
    pub fn revoke_token(&self) {
        self.backend.lock().revoked = true;
    }

    /// Make order fetches fail with a network error until cleared
    pub fn fail_fetches(&self, message: Option<&str>) {
        self.backend.lock().fetch_failure = message.map(|m| Failure::Network(m.to_string()));
    }

    /// Fail the next status update with a network error
    pub fn fail_next_status(&self, message: &str) {
        self.backend
            .lock()
            .status_failures
            .push(Failure::Network(message.to_string()));
    }

    /// Fail the next status update with 401
    pub fn reject_next_status(&self) {
        self.backend
            .lock()
            .status_failures
            .push(Failure::Auth("Invalid token".to_string()));
    }

    /// Hold status updates for `delay` before answering
    pub fn delay_status(&self, delay: Option<Duration>) {
        self.backend.lock().status_delay = delay;
    }

    fn count(&self, f: impl Fn(&ApiCall) -> bool) -> usize {
        self.backend.lock().calls.iter().filter(|c| f(c)).count()
    }

    /// Record the call and check the token
    fn authorize(&self, token: &str, call: ApiCall) -> ClientResult<()> {
        let mut backend = self.backend.lock();
        backend.calls.push(call);
        if backend.revoked || token != backend.token {
            return Err(ClientError::Auth("Invalid token".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DeliveryApi for InMemoryDeliveryApi {
    async fn login(&self, request: &LoginRequest) -> ClientResult<LoginResponse> {
        let mut backend = self.backend.lock();
        backend.calls.push(ApiCall::Login {
            username: request.username.clone(),
        });

        if request.username != backend.username || request.password != backend.password {
            return Err(ClientError::LoginFailed(
                "Invalid username or password.".to_string(),
            ));
        }

        Ok(LoginResponse {
            status: "success".to_string(),
            message: None,
            token: Some(backend.token.clone()),
            user_id: Some(1),
            username: backend.username.clone(),
            full_name: backend.full_name.clone(),
            redirect_to: None,
        })
    }

    async fn fetch_orders(&self, token: &str) -> ClientResult<Vec<DeliveryOrder>> {
        self.authorize(token, ApiCall::FetchOrders)?;
        let backend = self.backend.lock();
        if let Some(failure) = backend.fetch_failure.clone() {
            return Err(failure.into_error());
        }
        Ok(backend.orders.clone())
    }

    async fn post_status(&self, token: &str, request: &StatusUpdateRequest) -> ClientResult<()> {
        self.authorize(
            token,
            ApiCall::PostStatus {
                order_id: request.order_id,
                status: request.status,
            },
        )?;

        let delay = self.backend.lock().status_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut backend = self.backend.lock();
        if !backend.status_failures.is_empty() {
            return Err(backend.status_failures.remove(0).into_error());
        }
        let Some(order) = backend.orders.iter_mut().find(|o| o.id == request.order_id) else {
            return Err(ClientError::Network("Order not found.".to_string()));
        };
        order.delivery_status = request.status;
        Ok(())
    }

    async fn post_location(&self, token: &str, report: &LocationReport) -> ClientResult<()> {
        self.authorize(token, ApiCall::PostLocation(report.clone()))
    }
}
