//! OrderStore - in-memory order table
//!
//! Single source of truth for the panel. Every mutation runs under one
//! write lock and never spans an `.await`, so readers never observe a
//! half-applied order.
//!
//! Merge policy:
//! - `replace_all` overwrites an order unless a transition is pending for
//!   it; pending orders keep their local state until the transition resolves.
//! - `apply_delta` wins immediately unless it would move the status backward.
//! - both are idempotent; only accepted local mutations bump `revision`.

use parking_lot::RwLock;
use shared::{DeliveryOrder, DeliveryStatus, OrderId};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{ClientError, ClientResult};
use crate::events::{EventBus, PanelEvent};

/// Incremental update to one order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OrderPatch {
    pub delivery_status: Option<DeliveryStatus>,
}

impl OrderPatch {
    pub fn status(status: DeliveryStatus) -> Self {
        Self {
            delivery_status: Some(status),
        }
    }
}

/// Result of [`OrderStore::apply_delta`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaOutcome {
    /// The order changed
    Applied,
    /// The patch matched the current state
    Unchanged,
    /// The patch would move the status backward; dropped
    Regression {
        current: DeliveryStatus,
        proposed: DeliveryStatus,
    },
    /// No such order in the store
    UnknownOrder,
}

/// Result of [`OrderStore::replace_all`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SnapshotOutcome {
    pub inserted: usize,
    pub updated: usize,
    /// Snapshot copies discarded in favor of a pending transition
    pub kept_pending: usize,
    pub removed: usize,
}

/// Optimistic transition awaiting server confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTransition {
    pub previous: DeliveryStatus,
    pub target: DeliveryStatus,
    /// Order revision right after the optimistic apply
    pub revision: u64,
}

/// Result of [`OrderStore::rollback_transition`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackOutcome {
    /// Status restored to the previous value
    Restored,
    /// A newer delta landed meanwhile; its state was kept
    Superseded,
    /// Nothing was pending for this order
    NotPending,
}

/// Orders grouped the way the panel lists them
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderBoard {
    /// `assigned`
    pub new: Vec<DeliveryOrder>,
    /// `picked-up` and `on-the-way`
    pub active: Vec<DeliveryOrder>,
    /// `delivered`
    pub completed: Vec<DeliveryOrder>,
}

#[derive(Debug)]
struct Entry {
    order: DeliveryOrder,
    pending: Option<PendingTransition>,
}

#[derive(Debug, Default)]
struct StoreInner {
    orders: HashMap<OrderId, Entry>,
    /// Listing order of the last snapshot
    sequence: Vec<OrderId>,
    selected: Option<OrderId>,
}

/// Shared order table
#[derive(Debug, Clone)]
pub struct OrderStore {
    inner: Arc<RwLock<StoreInner>>,
    events: EventBus,
}

impl OrderStore {
    pub fn new(events: EventBus) -> Self {
        Self {
            inner: Arc::new(RwLock::new(StoreInner::default())),
            events,
        }
    }

    // ========== Reads ==========

    pub fn get(&self, order_id: OrderId) -> Option<DeliveryOrder> {
        self.inner
            .read()
            .orders
            .get(&order_id)
            .map(|e| e.order.clone())
    }

    /// All orders in listing order
    pub fn orders(&self) -> Vec<DeliveryOrder> {
        let inner = self.inner.read();
        inner
            .sequence
            .iter()
            .filter_map(|id| inner.orders.get(id))
            .map(|e| e.order.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().orders.is_empty()
    }

    pub fn is_pending(&self, order_id: OrderId) -> bool {
        self.pending(order_id).is_some()
    }

    pub fn pending(&self, order_id: OrderId) -> Option<PendingTransition> {
        self.inner
            .read()
            .orders
            .get(&order_id)
            .and_then(|e| e.pending)
    }

    /// Orders grouped into new / active / completed
    pub fn board(&self) -> OrderBoard {
        let mut board = OrderBoard::default();
        for order in self.orders() {
            match order.delivery_status {
                DeliveryStatus::Assigned => board.new.push(order),
                DeliveryStatus::PickedUp | DeliveryStatus::OnTheWay => board.active.push(order),
                DeliveryStatus::Delivered => board.completed.push(order),
            }
        }
        board
    }

    // ========== Selection ==========

    /// Focus an order (or clear focus with `None`)
    ///
    /// Returns `false` when the id is not in the store; the selection is
    /// left unchanged in that case.
    pub fn select_order(&self, order_id: Option<OrderId>) -> bool {
        let mut inner = self.inner.write();
        match order_id {
            Some(id) if !inner.orders.contains_key(&id) => false,
            other => {
                inner.selected = other;
                true
            }
        }
    }

    /// Selected order id, if that order is still present
    pub fn selected_order_id(&self) -> Option<OrderId> {
        let inner = self.inner.read();
        inner.selected.filter(|id| inner.orders.contains_key(id))
    }

    pub fn selected_order(&self) -> Option<DeliveryOrder> {
        let inner = self.inner.read();
        inner
            .selected
            .and_then(|id| inner.orders.get(&id))
            .map(|e| e.order.clone())
    }

    // ========== Merges ==========

    /// Merge a full snapshot
    pub fn replace_all(&self, orders: Vec<DeliveryOrder>) -> SnapshotOutcome {
        let mut outcome = SnapshotOutcome::default();
        let count = {
            let mut inner = self.inner.write();
            let mut sequence = Vec::with_capacity(orders.len());
            let mut next: HashMap<OrderId, Entry> = HashMap::with_capacity(orders.len());

            for mut incoming in orders {
                let id = incoming.id;
                if next.contains_key(&id) {
                    tracing::warn!(order_id = id, "Duplicate order in snapshot, keeping first");
                    continue;
                }
                sequence.push(id);

                let entry = match inner.orders.remove(&id) {
                    Some(existing) if existing.pending.is_some() => {
                        tracing::debug!(
                            order_id = id,
                            "Snapshot copy discarded, transition pending"
                        );
                        outcome.kept_pending += 1;
                        existing
                    }
                    Some(existing) => {
                        incoming.revision = existing.order.revision;
                        if !existing.order.same_content(&incoming) {
                            outcome.updated += 1;
                        }
                        Entry {
                            order: incoming,
                            pending: None,
                        }
                    }
                    None => {
                        incoming.revision = 0;
                        outcome.inserted += 1;
                        Entry {
                            order: incoming,
                            pending: None,
                        }
                    }
                };
                next.insert(id, entry);
            }

            // Orders missing from the snapshot go, unless a transition is in flight
            let leftovers: Vec<OrderId> = inner.orders.keys().copied().collect();
            for id in leftovers {
                if let Some(entry) = inner.orders.remove(&id) {
                    if entry.pending.is_some() {
                        tracing::debug!(order_id = id, "Order absent from snapshot kept, transition pending");
                        sequence.push(id);
                        next.insert(id, entry);
                        outcome.kept_pending += 1;
                    } else {
                        outcome.removed += 1;
                    }
                }
            }

            inner.orders = next;
            inner.sequence = sequence;
            inner.orders.len()
        };

        tracing::debug!(
            inserted = outcome.inserted,
            updated = outcome.updated,
            kept_pending = outcome.kept_pending,
            removed = outcome.removed,
            "Snapshot merged"
        );
        self.events.publish(PanelEvent::OrdersReplaced { count });
        outcome
    }

    /// Apply an incremental update to one order
    pub fn apply_delta(&self, order_id: OrderId, patch: OrderPatch) -> DeltaOutcome {
        let outcome = {
            let mut inner = self.inner.write();
            let Some(entry) = inner.orders.get_mut(&order_id) else {
                return DeltaOutcome::UnknownOrder;
            };

            match patch.delivery_status {
                None => DeltaOutcome::Unchanged,
                Some(proposed) if proposed == entry.order.delivery_status => {
                    DeltaOutcome::Unchanged
                }
                Some(proposed) if entry.order.delivery_status.is_regression_to(proposed) => {
                    DeltaOutcome::Regression {
                        current: entry.order.delivery_status,
                        proposed,
                    }
                }
                Some(proposed) => {
                    entry.order.delivery_status = proposed;
                    entry.order.revision += 1;
                    DeltaOutcome::Applied
                }
            }
        };

        match outcome {
            DeltaOutcome::Applied => {
                if let Some(status) = patch.delivery_status {
                    tracing::info!(order_id, status = %status, "Order status updated by push");
                    self.events
                        .publish(PanelEvent::OrderUpdated { order_id, status });
                }
            }
            DeltaOutcome::Regression { current, proposed } => {
                tracing::warn!(
                    order_id,
                    current = %current,
                    proposed = %proposed,
                    "Ignoring status regression delta"
                );
            }
            _ => {}
        }
        outcome
    }

    // ========== Two-phase transitions ==========

    /// Tentatively move an order to `target`
    ///
    /// Fails without side effects if the order is unknown, already has a
    /// pending transition, or `target` is not the next stage.
    pub fn begin_transition(
        &self,
        order_id: OrderId,
        target: DeliveryStatus,
    ) -> ClientResult<PendingTransition> {
        let pending = {
            let mut inner = self.inner.write();
            let entry = inner
                .orders
                .get_mut(&order_id)
                .ok_or(ClientError::OrderNotFound(order_id))?;

            if entry.pending.is_some() {
                return Err(ClientError::TransitionPending(order_id));
            }
            let current = entry.order.delivery_status;
            if !current.can_transition_to(target) {
                return Err(ClientError::Validation(format!(
                    "order {order_id} cannot move from {current} to {target}"
                )));
            }

            entry.order.delivery_status = target;
            entry.order.revision += 1;
            let pending = PendingTransition {
                previous: current,
                target,
                revision: entry.order.revision,
            };
            entry.pending = Some(pending);
            pending
        };

        self.events.publish(PanelEvent::OrderUpdated {
            order_id,
            status: target,
        });
        Ok(pending)
    }

    /// Server accepted the transition; the local state already matches
    pub fn confirm_transition(&self, order_id: OrderId) -> bool {
        let mut inner = self.inner.write();
        inner
            .orders
            .get_mut(&order_id)
            .and_then(|e| e.pending.take())
            .is_some()
    }

    /// Server rejected the transition; restore `previous`
    ///
    /// Restores only if the order has not been changed since the
    /// optimistic apply. The pending flag is cleared in every case.
    pub fn rollback_transition(
        &self,
        order_id: OrderId,
        previous: DeliveryStatus,
    ) -> RollbackOutcome {
        let outcome = {
            let mut inner = self.inner.write();
            let Some(entry) = inner.orders.get_mut(&order_id) else {
                return RollbackOutcome::NotPending;
            };
            let Some(pending) = entry.pending.take() else {
                return RollbackOutcome::NotPending;
            };

            if entry.order.revision == pending.revision {
                entry.order.delivery_status = previous;
                entry.order.revision += 1;
                RollbackOutcome::Restored
            } else {
                RollbackOutcome::Superseded
            }
        };

        match outcome {
            RollbackOutcome::Restored => {
                tracing::info!(order_id, status = %previous, "Optimistic status rolled back");
                self.events.publish(PanelEvent::OrderUpdated {
                    order_id,
                    status: previous,
                });
            }
            RollbackOutcome::Superseded => {
                tracing::info!(order_id, "Rollback skipped, newer pushed state kept");
            }
            RollbackOutcome::NotPending => {}
        }
        outcome
    }

    /// Drop every order and the selection
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.orders.clear();
        inner.sequence.clear();
        inner.selected = None;
    }
}

impl Default for OrderStore {
    fn default() -> Self {
        Self::new(EventBus::default())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use shared::models::{CustomerAddress, Restaurant};

    pub(crate) fn order(id: OrderId, status: DeliveryStatus) -> DeliveryOrder {
        DeliveryOrder {
            id,
            order_number: format!("{}", 1000 + id),
            delivery_status: status,
            customer_name: format!("Customer {id}"),
            customer_phone: "555-0100".into(),
            customer_address: CustomerAddress {
                city: "Pune".into(),
                ..Default::default()
            },
            customer_notes: None,
            restaurant: Restaurant {
                name: "Spice Hub".into(),
                ..Default::default()
            },
            order_items: vec![],
            total: Decimal::new(25000, 2),
            payment_method: "cod".into(),
            revision: 0,
        }
    }

    fn three_orders() -> Vec<DeliveryOrder> {
        vec![
            order(1, DeliveryStatus::Assigned),
            order(2, DeliveryStatus::PickedUp),
            order(3, DeliveryStatus::Delivered),
        ]
    }

    fn status_of(store: &OrderStore, id: OrderId) -> DeliveryStatus {
        store.get(id).unwrap().delivery_status
    }

    #[test]
    fn test_replace_all_keeps_listing_order() {
        let store = OrderStore::default();
        let outcome = store.replace_all(three_orders());

        assert_eq!(outcome.inserted, 3);
        let ids: Vec<_> = store.orders().iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_replace_all_removes_missing_orders() {
        let store = OrderStore::default();
        store.replace_all(three_orders());

        let outcome = store.replace_all(vec![order(2, DeliveryStatus::PickedUp)]);
        assert_eq!(outcome.removed, 2);
        assert_eq!(store.len(), 1);
        assert!(store.get(1).is_none());
    }

    #[test]
    fn test_replace_all_is_idempotent() {
        let store = OrderStore::default();
        store.replace_all(three_orders());
        store.apply_delta(2, OrderPatch::status(DeliveryStatus::OnTheWay));
        let first = store.orders();

        let outcome = store.replace_all(first.clone());
        assert_eq!(outcome.updated, 0);
        store.replace_all(first.clone());
        assert_eq!(store.orders(), first);
    }

    #[test]
    fn test_scenario_delta_touches_only_target_order() {
        let store = OrderStore::default();
        store.replace_all(three_orders());

        let outcome = store.apply_delta(2, OrderPatch::status(DeliveryStatus::OnTheWay));

        assert_eq!(outcome, DeltaOutcome::Applied);
        assert_eq!(status_of(&store, 1), DeliveryStatus::Assigned);
        assert_eq!(status_of(&store, 2), DeliveryStatus::OnTheWay);
        assert_eq!(status_of(&store, 3), DeliveryStatus::Delivered);
        assert_eq!(store.get(1).unwrap().revision, 0);
        assert_eq!(store.get(3).unwrap().revision, 0);
    }

    #[test]
    fn test_delta_is_idempotent() {
        let store = OrderStore::default();
        store.replace_all(three_orders());

        store.apply_delta(2, OrderPatch::status(DeliveryStatus::OnTheWay));
        let once = store.orders();
        let outcome = store.apply_delta(2, OrderPatch::status(DeliveryStatus::OnTheWay));

        assert_eq!(outcome, DeltaOutcome::Unchanged);
        assert_eq!(store.orders(), once);
    }

    #[test]
    fn test_delta_regression_is_dropped() {
        let store = OrderStore::default();
        store.replace_all(three_orders());

        let outcome = store.apply_delta(3, OrderPatch::status(DeliveryStatus::PickedUp));

        assert_eq!(
            outcome,
            DeltaOutcome::Regression {
                current: DeliveryStatus::Delivered,
                proposed: DeliveryStatus::PickedUp,
            }
        );
        assert_eq!(status_of(&store, 3), DeliveryStatus::Delivered);
        assert_eq!(store.get(3).unwrap().revision, 0);
    }

    #[test]
    fn test_delta_may_skip_forward() {
        let store = OrderStore::default();
        store.replace_all(three_orders());

        let outcome = store.apply_delta(1, OrderPatch::status(DeliveryStatus::Delivered));
        assert_eq!(outcome, DeltaOutcome::Applied);
        assert_eq!(status_of(&store, 1), DeliveryStatus::Delivered);
    }

    #[test]
    fn test_delta_for_unknown_order() {
        let store = OrderStore::default();
        store.replace_all(three_orders());
        assert_eq!(
            store.apply_delta(99, OrderPatch::status(DeliveryStatus::Delivered)),
            DeltaOutcome::UnknownOrder
        );
    }

    #[test]
    fn test_snapshot_does_not_clobber_pending_transition() {
        let store = OrderStore::default();
        store.replace_all(three_orders());
        store
            .begin_transition(2, DeliveryStatus::OnTheWay)
            .unwrap();

        // Stale snapshot still lists order 2 as picked-up
        let outcome = store.replace_all(three_orders());

        assert_eq!(outcome.kept_pending, 1);
        assert_eq!(status_of(&store, 2), DeliveryStatus::OnTheWay);
        assert!(store.is_pending(2));

        // Once resolved, the next snapshot applies again
        store.confirm_transition(2);
        store.replace_all(vec![order(2, DeliveryStatus::OnTheWay)]);
        assert_eq!(status_of(&store, 2), DeliveryStatus::OnTheWay);
        assert!(!store.is_pending(2));
    }

    #[test]
    fn test_pending_order_survives_snapshot_without_it() {
        let store = OrderStore::default();
        store.replace_all(three_orders());
        store.begin_transition(1, DeliveryStatus::PickedUp).unwrap();

        store.replace_all(vec![order(3, DeliveryStatus::Delivered)]);

        assert_eq!(status_of(&store, 1), DeliveryStatus::PickedUp);
        assert!(store.get(2).is_none());
    }

    #[test]
    fn test_begin_transition_rejects_illegal_targets() {
        let store = OrderStore::default();
        store.replace_all(three_orders());

        for target in [
            DeliveryStatus::Assigned,
            DeliveryStatus::OnTheWay,
            DeliveryStatus::Delivered,
        ] {
            let err = store.begin_transition(1, target).unwrap_err();
            assert!(matches!(err, ClientError::Validation(_)));
        }
        assert!(matches!(
            store.begin_transition(3, DeliveryStatus::Delivered),
            Err(ClientError::Validation(_))
        ));
        assert!(matches!(
            store.begin_transition(42, DeliveryStatus::PickedUp),
            Err(ClientError::OrderNotFound(42))
        ));
        assert_eq!(status_of(&store, 1), DeliveryStatus::Assigned);
        assert!(!store.is_pending(1));
    }

    #[test]
    fn test_second_transition_blocked_while_pending() {
        let store = OrderStore::default();
        store.replace_all(three_orders());
        store.begin_transition(1, DeliveryStatus::PickedUp).unwrap();

        let err = store
            .begin_transition(1, DeliveryStatus::OnTheWay)
            .unwrap_err();
        assert!(matches!(err, ClientError::TransitionPending(1)));
    }

    #[test]
    fn test_rollback_restores_previous_status() {
        let store = OrderStore::default();
        store.replace_all(three_orders());
        let before = status_of(&store, 2);

        let pending = store.begin_transition(2, DeliveryStatus::OnTheWay).unwrap();
        assert_eq!(status_of(&store, 2), DeliveryStatus::OnTheWay);

        let outcome = store.rollback_transition(2, pending.previous);
        assert_eq!(outcome, RollbackOutcome::Restored);
        assert_eq!(status_of(&store, 2), before);
        assert!(!store.is_pending(2));
    }

    #[test]
    fn test_rollback_keeps_newer_pushed_state() {
        let store = OrderStore::default();
        store.replace_all(three_orders());

        let pending = store.begin_transition(2, DeliveryStatus::OnTheWay).unwrap();
        store.apply_delta(2, OrderPatch::status(DeliveryStatus::Delivered));

        let outcome = store.rollback_transition(2, pending.previous);
        assert_eq!(outcome, RollbackOutcome::Superseded);
        assert_eq!(status_of(&store, 2), DeliveryStatus::Delivered);
        assert!(!store.is_pending(2));
    }

    #[test]
    fn test_selection_is_weak() {
        let store = OrderStore::default();
        store.replace_all(three_orders());

        assert!(!store.select_order(Some(42)));
        assert!(store.select_order(Some(2)));
        assert_eq!(store.selected_order_id(), Some(2));

        store.apply_delta(2, OrderPatch::status(DeliveryStatus::OnTheWay));
        assert_eq!(
            store.selected_order().unwrap().delivery_status,
            DeliveryStatus::OnTheWay
        );

        store.replace_all(vec![order(1, DeliveryStatus::Assigned)]);
        assert_eq!(store.selected_order_id(), None);
        assert!(store.selected_order().is_none());

        assert!(store.select_order(None));
    }

    #[test]
    fn test_board_partitions_by_status() {
        let store = OrderStore::default();
        let mut orders = three_orders();
        orders.push(order(4, DeliveryStatus::OnTheWay));
        store.replace_all(orders);

        let board = store.board();
        assert_eq!(board.new.iter().map(|o| o.id).collect::<Vec<_>>(), vec![1]);
        assert_eq!(board.active.iter().map(|o| o.id).collect::<Vec<_>>(), vec![2, 4]);
        assert_eq!(board.completed.iter().map(|o| o.id).collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn test_clear_empties_store() {
        let store = OrderStore::default();
        store.replace_all(three_orders());
        store.select_order(Some(1));

        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.selected_order_id(), None);
    }

    #[tokio::test]
    async fn test_events_published() {
        let events = EventBus::default();
        let mut rx = events.subscribe();
        let store = OrderStore::new(events);

        store.replace_all(three_orders());
        store.apply_delta(2, OrderPatch::status(DeliveryStatus::OnTheWay));

        assert_eq!(rx.recv().await.unwrap(), PanelEvent::OrdersReplaced { count: 3 });
        assert_eq!(
            rx.recv().await.unwrap(),
            PanelEvent::OrderUpdated {
                order_id: 2,
                status: DeliveryStatus::OnTheWay,
            }
        );
    }
}
