//! DeliveryPanel - composition root
//!
//! Wires the session guard, order store, REST sync, realtime channel,
//! transition controller and location reporter together and owns the
//! handles of the session-scoped background tasks.

use parking_lot::Mutex;
use shared::{DeliveryOrder, DeliveryStatus, OrderId, PartnerIdentity};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::events::{EventBus, PanelEvent};
use crate::http::DeliveryApi;
use crate::location::{LocationReporter, PositionSource, ReporterHandle};
use crate::realtime::{ChannelHandle, ChannelState, Connector, RealtimeChannel};
use crate::rest::RestSyncClient;
use crate::session::{ClearReason, SessionGuard, SessionStorage};
use crate::store::{OrderBoard, OrderStore, SnapshotOutcome};
use crate::transition::StatusTransitionController;

/// Delivery partner panel
#[derive(Debug)]
pub struct DeliveryPanel {
    config: ClientConfig,
    events: EventBus,
    store: OrderStore,
    guard: SessionGuard,
    rest: RestSyncClient,
    transitions: StatusTransitionController,
    connector: Arc<dyn Connector>,
    source: Arc<dyn PositionSource>,
    channel: Mutex<Option<ChannelHandle>>,
    reporter: Mutex<Option<ReporterHandle>>,
}

impl DeliveryPanel {
    pub fn new(
        config: ClientConfig,
        api: Arc<dyn DeliveryApi>,
        connector: Arc<dyn Connector>,
        source: Arc<dyn PositionSource>,
    ) -> Self {
        let events = EventBus::default();
        let store = OrderStore::new(events.clone());
        let storage = SessionStorage::at_path(&config.session_path);
        let guard = SessionGuard::new(store.clone(), events.clone(), Some(storage));
        let rest = RestSyncClient::new(api, guard.clone(), store.clone());
        let transitions = StatusTransitionController::new(rest.clone(), guard.clone(), store.clone());

        Self {
            config,
            events,
            store,
            guard,
            rest,
            transitions,
            connector,
            source,
            channel: Mutex::new(None),
            reporter: Mutex::new(None),
        }
    }

    // ========== Session ==========

    /// Pick up the persisted session, if any
    pub fn restore(&self) -> bool {
        self.guard.restore().is_some()
    }

    /// Log in and persist the session
    pub async fn login(&self, username: &str, password: &str) -> ClientResult<PartnerIdentity> {
        let session = self.rest.login(username, password).await?;
        let partner = session.partner.clone();
        self.stop_background();
        self.guard.establish(session)?;
        Ok(partner)
    }

    pub fn is_authenticated(&self) -> bool {
        self.guard.is_authenticated()
    }

    pub fn partner(&self) -> Option<PartnerIdentity> {
        self.guard.session().map(|s| s.partner)
    }

    /// End the session: background tasks stop, orders and the persisted
    /// record are dropped
    pub fn logout(&self) -> bool {
        self.stop_background();
        self.guard.clear(ClearReason::Logout)
    }

    // ========== Sync ==========

    /// Seed the store, then run the channel and reporter for this session
    ///
    /// A failed initial fetch is returned after the background tasks are
    /// started, except for an auth failure, which has already ended the
    /// session.
    pub async fn start(&self) -> ClientResult<SnapshotOutcome> {
        let scope = self.guard.scope().ok_or(ClientError::NotAuthenticated)?;
        self.stop_background();

        let fetched = self.rest.fetch_snapshot().await;
        if let Err(e) = &fetched {
            if e.is_auth() || scope.is_cancelled() {
                return fetched;
            }
            tracing::warn!("Initial order fetch failed: {e}");
        }

        let channel = RealtimeChannel::new(
            self.config.realtime.clone(),
            self.connector.clone(),
            self.rest.clone(),
            self.guard.clone(),
            self.store.clone(),
            self.events.clone(),
        )
        .spawn(&scope);
        *self.channel.lock() = Some(channel);

        let reporter = LocationReporter::new(
            self.config.location.clone(),
            self.source.clone(),
            self.rest.clone(),
            self.store.clone(),
            self.events.clone(),
        );
        match reporter.start(&scope).await {
            Ok(handle) => *self.reporter.lock() = Some(handle),
            Err(e) => tracing::info!("Location tracking not started: {e}"),
        }

        fetched
    }

    /// Manual snapshot retry
    pub async fn retry_fetch(&self) -> ClientResult<SnapshotOutcome> {
        self.rest.fetch_snapshot().await
    }

    // ========== Orders ==========

    pub fn orders(&self) -> Vec<DeliveryOrder> {
        self.store.orders()
    }

    pub fn board(&self) -> OrderBoard {
        self.store.board()
    }

    /// Focus an order (or none); tags subsequent location reports
    pub fn select_order(&self, order_id: Option<OrderId>) -> bool {
        self.store.select_order(order_id)
    }

    pub fn selected_order(&self) -> Option<DeliveryOrder> {
        self.store.selected_order()
    }

    pub async fn request_transition(
        &self,
        order_id: OrderId,
        target: DeliveryStatus,
    ) -> ClientResult<()> {
        self.transitions.request_transition(order_id, target).await
    }

    /// Advance an order to its next stage
    pub async fn advance(&self, order_id: OrderId) -> ClientResult<DeliveryStatus> {
        let order = self
            .store
            .get(order_id)
            .ok_or(ClientError::OrderNotFound(order_id))?;
        let next = order.delivery_status.next().ok_or_else(|| {
            ClientError::Validation(format!("order {order_id} is already delivered"))
        })?;
        self.request_transition(order_id, next).await?;
        Ok(next)
    }

    // ========== Background tasks ==========

    /// Stop location reporting (navigation away from tracking)
    pub fn stop_tracking(&self) {
        if let Some(handle) = self.reporter.lock().take() {
            handle.cancel();
            tracing::info!("Location tracking stopped by partner");
        }
    }

    pub fn is_tracking(&self) -> bool {
        self.reporter
            .lock()
            .as_ref()
            .is_some_and(ReporterHandle::is_active)
    }

    /// Realtime channel state, if the channel is running
    pub fn channel_state(&self) -> Option<ChannelState> {
        self.channel
            .lock()
            .as_ref()
            .filter(|h| h.is_running())
            .map(|h| *h.state().borrow())
    }

    /// Stop the background tasks but keep the session (process exit)
    pub async fn shutdown(&self) {
        let reporter = self.reporter.lock().take();
        if let Some(handle) = reporter {
            handle.shutdown().await;
        }
        let channel = self.channel.lock().take();
        if let Some(handle) = channel {
            handle.close().await;
        }
    }

    fn stop_background(&self) {
        // Dropping a handle cancels its task
        self.reporter.lock().take();
        self.channel.lock().take();
    }

    // ========== UI boundary ==========

    pub fn subscribe(&self) -> broadcast::Receiver<PanelEvent> {
        self.events.subscribe()
    }

    pub fn store(&self) -> &OrderStore {
        &self.store
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}
