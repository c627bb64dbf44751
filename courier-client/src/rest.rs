//! RestSyncClient - request/response sync with the delivery API
//!
//! No implicit retries: a failed snapshot waits for the partner to retry,
//! a failed location report waits for the next tick. Any 401/403 clears
//! the session it was issued under.

use shared::{DeliveryStatus, LoginRequest, OrderId, Session, StatusUpdateRequest};
use std::sync::Arc;

use crate::error::{ClientError, ClientResult};
use crate::http::DeliveryApi;
use crate::location::LocationSample;
use crate::session::{ClearReason, SessionGuard};
use crate::store::{OrderStore, SnapshotOutcome};

/// REST side of the order sync
#[derive(Debug, Clone)]
pub struct RestSyncClient {
    api: Arc<dyn DeliveryApi>,
    guard: SessionGuard,
    store: OrderStore,
}

impl RestSyncClient {
    pub fn new(api: Arc<dyn DeliveryApi>, guard: SessionGuard, store: OrderStore) -> Self {
        Self { api, guard, store }
    }

    /// Exchange credentials for a session (not yet established)
    pub async fn login(&self, username: &str, password: &str) -> ClientResult<Session> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(ClientError::Validation(
                "Username and password are required".into(),
            ));
        }

        let request = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        let response = self.api.login(&request).await?;
        Session::from_login(&response)
            .ok_or_else(|| ClientError::InvalidResponse("Login response carries no token".into()))
    }

    /// Fetch the full order listing and merge it into the store
    pub async fn fetch_snapshot(&self) -> ClientResult<SnapshotOutcome> {
        let (token, epoch) = self.credentials()?;
        tracing::debug!("Fetching order snapshot");

        let orders = self
            .api
            .fetch_orders(&token)
            .await
            .map_err(|e| self.on_error(epoch, e))?;

        let count = orders.len();
        match self
            .guard
            .apply_if_current(epoch, || self.store.replace_all(orders))
        {
            Some(outcome) => Ok(outcome),
            None => {
                tracing::debug!(count, "Snapshot arrived after its session ended, discarded");
                Err(ClientError::NotAuthenticated)
            }
        }
    }

    /// Persist a status change
    pub async fn post_status(&self, order_id: OrderId, status: DeliveryStatus) -> ClientResult<()> {
        let (token, epoch) = self.credentials()?;
        let request = StatusUpdateRequest { order_id, status };
        self.api
            .post_status(&token, &request)
            .await
            .map_err(|e| self.on_error(epoch, e))?;
        tracing::debug!(order_id, status = %status, "Status update accepted");
        Ok(())
    }

    /// Report one position sample
    pub async fn post_location(&self, sample: &LocationSample) -> ClientResult<()> {
        let (token, epoch) = self.credentials()?;
        self.api
            .post_location(&token, &sample.to_report())
            .await
            .map_err(|e| self.on_error(epoch, e))
    }

    fn credentials(&self) -> ClientResult<(String, u64)> {
        self.guard
            .credentials()
            .ok_or(ClientError::NotAuthenticated)
    }

    fn on_error(&self, epoch: u64, error: ClientError) -> ClientError {
        if error.is_auth() {
            self.guard.clear_if_current(epoch, ClearReason::Unauthorized);
        }
        error
    }
}
