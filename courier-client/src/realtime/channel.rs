//! RealtimeChannel - connection loop and event dispatch
//!
//! `Disconnected -> Connecting -> Connected -> Disconnected`, then
//! `Connecting` again after a backoff delay. The loop runs under a child
//! token of the session scope; cancelling it (close, drop of the handle,
//! session clear) ends the loop, pending reconnect wait included.

use shared::RealtimeEvent;
use std::sync::Arc;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{Backoff, ChannelError, ChannelState, Connection, Connector, RealtimeConfig};
use crate::events::{EventBus, PanelEvent};
use crate::rest::RestSyncClient;
use crate::session::{SessionGuard, SessionScope};
use crate::store::{DeltaOutcome, OrderPatch, OrderStore};

/// Realtime channel, ready to be spawned for one session
#[derive(Debug, Clone)]
pub struct RealtimeChannel {
    config: RealtimeConfig,
    connector: Arc<dyn Connector>,
    rest: RestSyncClient,
    guard: SessionGuard,
    store: OrderStore,
    events: EventBus,
}

/// Owner of a running channel
///
/// Dropping the handle stops the channel.
#[derive(Debug)]
pub struct ChannelHandle {
    token: CancellationToken,
    state: watch::Receiver<ChannelState>,
    task: Option<JoinHandle<()>>,
}

impl ChannelHandle {
    /// Current state, updated as the loop moves
    pub fn state(&self) -> watch::Receiver<ChannelState> {
        self.state.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled() && self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the channel and wait for the loop to exit
    pub async fn close(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            tracing::error!("Realtime channel task failed: {e}");
        }
    }
}

impl Drop for ChannelHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl RealtimeChannel {
    pub fn new(
        config: RealtimeConfig,
        connector: Arc<dyn Connector>,
        rest: RestSyncClient,
        guard: SessionGuard,
        store: OrderStore,
        events: EventBus,
    ) -> Self {
        Self {
            config: config.normalized(),
            connector,
            rest,
            guard,
            store,
            events,
        }
    }

    /// Start the connection loop for `scope`
    pub fn spawn(self, scope: &SessionScope) -> ChannelHandle {
        let token = scope.child_token();
        let (state_tx, state_rx) = watch::channel(ChannelState::Disconnected);
        let resync = Arc::new(Notify::new());

        tokio::spawn(resync_worker(
            self.rest.clone(),
            resync.clone(),
            token.clone(),
        ));

        let worker = ChannelWorker {
            channel: self,
            epoch: scope.epoch(),
            token: token.clone(),
            state: state_tx,
            resync,
        };
        let task = tokio::spawn(worker.run());

        ChannelHandle {
            token,
            state: state_rx,
            task: Some(task),
        }
    }
}

/// Snapshot fetches requested by push events
///
/// `Notify` keeps at most one permit, so bursts of events collapse into one
/// follow-up fetch.
async fn resync_worker(rest: RestSyncClient, resync: Arc<Notify>, token: CancellationToken) {
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = resync.notified() => {}
        }
        tokio::select! {
            _ = token.cancelled() => break,
            result = rest.fetch_snapshot() => {
                if let Err(e) = result {
                    tracing::warn!("Push-triggered resync failed: {e}");
                }
            }
        }
    }
}

enum SessionEnd {
    Cancelled,
    /// Connection lost; `stable` when it outlived the stable period
    Dropped { error: ChannelError, stable: bool },
}

struct ChannelWorker {
    channel: RealtimeChannel,
    epoch: u64,
    token: CancellationToken,
    state: watch::Sender<ChannelState>,
    resync: Arc<Notify>,
}

impl ChannelWorker {
    async fn run(self) {
        tracing::info!("Realtime channel started");
        let config = self.channel.config.clone();
        let mut backoff = Backoff::from_config(&config);
        let mut failures: u32 = 0;
        let mut degraded = false;

        loop {
            if self.token.is_cancelled() {
                break;
            }

            self.set_state(ChannelState::Connecting);
            let connected = tokio::select! {
                _ = self.token.cancelled() => break,
                result = self.channel.connector.connect() => result,
            };

            // Refused connects and connections lost before the stable
            // period both count as failures
            match connected {
                Ok(conn) => {
                    if degraded {
                        degraded = false;
                        tracing::info!("Realtime connectivity restored");
                        self.channel.events.publish(PanelEvent::ConnectivityRestored);
                    }
                    self.set_state(ChannelState::Connected);
                    tracing::info!("Realtime channel connected");

                    match self.run_connection(conn, &mut backoff).await {
                        SessionEnd::Cancelled => break,
                        SessionEnd::Dropped { error, stable: true } => {
                            failures = 0;
                            tracing::info!("Realtime connection lost: {error}");
                        }
                        SessionEnd::Dropped { error, stable: false } => {
                            failures += 1;
                            tracing::warn!(failures, "Realtime connection lost early: {error}");
                        }
                    }
                }
                Err(e) => {
                    failures += 1;
                    tracing::warn!(failures, "Realtime connect failed: {e}");
                }
            }
            self.set_state(ChannelState::Disconnected);

            if failures >= config.degraded_after {
                if !degraded {
                    degraded = true;
                    tracing::warn!(failures, "Realtime connectivity degraded, polling snapshots");
                    self.channel
                        .events
                        .publish(PanelEvent::ConnectivityDegraded { failures });
                }
                // REST fallback before waiting
                tokio::select! {
                    _ = self.token.cancelled() => break,
                    result = self.channel.rest.fetch_snapshot() => {
                        if let Err(e) = result {
                            tracing::warn!("Fallback snapshot fetch failed: {e}");
                        }
                    }
                }
            }

            let delay = backoff.next_delay();
            tracing::info!(
                attempt = backoff.attempt(),
                delay_ms = delay.as_millis() as u64,
                "Realtime reconnect scheduled"
            );
            tokio::select! {
                _ = self.token.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.set_state(ChannelState::Disconnected);
        tracing::info!("Realtime channel stopped");
    }

    /// Read one connection until it drops or the channel is cancelled
    async fn run_connection(
        &self,
        mut conn: Box<dyn Connection>,
        backoff: &mut Backoff,
    ) -> SessionEnd {
        let stable = tokio::time::sleep(self.channel.config.stable_period);
        tokio::pin!(stable);
        let mut stable_reached = false;

        loop {
            tokio::select! {
                _ = self.token.cancelled() => {
                    conn.close().await;
                    return SessionEnd::Cancelled;
                }

                _ = &mut stable, if !stable_reached => {
                    stable_reached = true;
                    backoff.reset();
                    tracing::debug!("Realtime connection stable, backoff reset");
                }

                received = conn.recv() => match received {
                    Ok(text) => self.handle_message(&text),
                    Err(error) => {
                        return SessionEnd::Dropped {
                            error,
                            stable: stable_reached,
                        };
                    }
                }
            }
        }
    }

    fn handle_message(&self, text: &str) {
        let event = match RealtimeEvent::parse(text) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!("Dropping malformed realtime payload: {e}");
                return;
            }
        };
        tracing::debug!(kind = event.kind(), "Realtime event received");

        match event {
            RealtimeEvent::OrderStatusUpdate {
                order_id,
                new_status,
            } => {
                let store = &self.channel.store;
                let outcome = self.channel.guard.apply_if_current(self.epoch, || {
                    store.apply_delta(order_id, OrderPatch::status(new_status))
                });
                if outcome == Some(DeltaOutcome::UnknownOrder) {
                    tracing::info!(order_id, "Delta for unknown order, resyncing");
                    self.resync.notify_one();
                }
            }
            event if event.requires_resync() => self.resync.notify_one(),
            _ => {}
        }
    }

    fn set_state(&self, state: ChannelState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::debug!(from = %previous, to = %state, "Realtime channel state");
            self.channel.events.publish(PanelEvent::ChannelState(state));
        }
    }
}
