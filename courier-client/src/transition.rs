//! StatusTransitionController - partner-driven status changes
//!
//! Two-phase apply: the store takes the new status tentatively, the REST
//! call decides between confirm and rollback.

use shared::{DeliveryStatus, OrderId};

use crate::error::{ClientError, ClientResult};
use crate::rest::RestSyncClient;
use crate::session::SessionGuard;
use crate::store::{OrderStore, RollbackOutcome};

/// Applies partner status changes with optimistic update and rollback
#[derive(Debug, Clone)]
pub struct StatusTransitionController {
    rest: RestSyncClient,
    guard: SessionGuard,
    store: OrderStore,
}

impl StatusTransitionController {
    pub fn new(rest: RestSyncClient, guard: SessionGuard, store: OrderStore) -> Self {
        Self { rest, guard, store }
    }

    /// Move `order_id` to `target`
    ///
    /// Unknown orders, a transition already in flight and any target other
    /// than the next stage are rejected before any request.
    pub async fn request_transition(
        &self,
        order_id: OrderId,
        target: DeliveryStatus,
    ) -> ClientResult<()> {
        let scope = self.guard.scope().ok_or(ClientError::NotAuthenticated)?;
        let pending = self.store.begin_transition(order_id, target)?;
        tracing::info!(
            order_id,
            from = %pending.previous,
            to = %target,
            "Status transition requested"
        );

        let mut in_flight = InFlight {
            guard: &self.guard,
            store: &self.store,
            epoch: scope.epoch(),
            order_id,
            previous: pending.previous,
            settled: false,
        };
        let result = self.rest.post_status(order_id, target).await;
        in_flight.settled = true;

        // The session may have ended (or been replaced) while the request
        // was in flight; its store entries are gone then
        let resolved = self.guard.apply_if_current(scope.epoch(), || match &result {
            Ok(()) => {
                self.store.confirm_transition(order_id);
                None
            }
            Err(_) => Some(self.store.rollback_transition(order_id, pending.previous)),
        });

        match (&result, resolved) {
            (Ok(()), _) => tracing::info!(order_id, status = %target, "Status transition confirmed"),
            (Err(e), Some(Some(RollbackOutcome::Superseded))) => {
                tracing::warn!(order_id, "Status transition failed, newer pushed state kept: {e}")
            }
            (Err(e), _) => tracing::warn!(order_id, "Status transition failed: {e}"),
        }
        result
    }
}

/// Pending transition whose request has not returned yet
///
/// Dropped unsettled when the caller abandons the request future; the
/// order is rolled back then so it does not stay pending for the rest of
/// the session.
struct InFlight<'a> {
    guard: &'a SessionGuard,
    store: &'a OrderStore,
    epoch: u64,
    order_id: OrderId,
    previous: DeliveryStatus,
    settled: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let rolled_back = self.guard.apply_if_current(self.epoch, || {
            self.store.rollback_transition(self.order_id, self.previous)
        });
        if rolled_back.is_some() {
            tracing::warn!(
                order_id = self.order_id,
                "Status transition abandoned before the server answered"
            );
        }
    }
}
