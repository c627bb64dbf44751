//! LocationReporter - periodic position reports

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::{LocationConfig, LocationSample, Permission, PositionSource, SensorError};
use crate::events::{EventBus, PanelEvent};
use crate::rest::RestSyncClient;
use crate::session::SessionScope;
use crate::store::OrderStore;

/// Samples the device position on a fixed interval and reports it,
/// tagged with the selected order
#[derive(Debug, Clone)]
pub struct LocationReporter {
    config: LocationConfig,
    source: Arc<dyn PositionSource>,
    rest: RestSyncClient,
    store: OrderStore,
    events: EventBus,
}

/// Owner of a running reporter
///
/// `cancel()` or dropping the handle stops the loop; so does clearing the
/// session it was started under.
#[derive(Debug)]
pub struct ReporterHandle {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ReporterHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Not cancelled and the loop is still running
    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled() && self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Cancel and wait for the loop to exit
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            tracing::error!("Location reporter task failed: {e}");
        }
    }
}

impl Drop for ReporterHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl LocationReporter {
    pub fn new(
        config: LocationConfig,
        source: Arc<dyn PositionSource>,
        rest: RestSyncClient,
        store: OrderStore,
        events: EventBus,
    ) -> Self {
        Self {
            config: config.normalized(),
            source,
            rest,
            store,
            events,
        }
    }

    /// Walk the permission state machine to a final answer
    pub async fn resolve_permission(&self) -> Permission {
        let mut permission = Permission::Unknown;
        let queried = self.source.query_permission().await;
        if queried != Permission::Unknown {
            permission = permission.advance(queried);
        }

        if !permission.is_resolved() {
            permission = permission.advance(Permission::Prompt);
            let answer = self.source.request_permission().await;
            permission = permission.advance(answer);
        }

        tracing::debug!(permission = %permission, "Location permission resolved");
        permission
    }

    /// Resolve permission and, if granted, arm the reporting timer
    pub async fn start(self, scope: &SessionScope) -> Result<ReporterHandle, SensorError> {
        if !self.resolve_permission().await.is_granted() {
            tracing::warn!("Location permission denied, tracking disabled");
            self.events.publish(PanelEvent::LocationPermissionDenied);
            return Err(SensorError::PermissionDenied);
        }

        let token = scope.child_token();
        tracing::info!(
            interval_secs = self.config.interval.as_secs(),
            "Location tracking started"
        );
        let task = tokio::spawn(self.run(token.clone()));
        Ok(ReporterHandle {
            token,
            task: Some(task),
        })
    }

    async fn run(self, token: CancellationToken) {
        let interval = self.config.interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = self.tick() => {}
                    }
                }
            }
        }
        tracing::info!("Location tracking stopped");
    }

    /// One report; failures skip this tick only
    async fn tick(&self) {
        let position =
            tokio::time::timeout(self.config.sample_timeout, self.source.current_position()).await;

        let (latitude, longitude) = match position {
            Ok(Ok(fix)) => fix,
            Ok(Err(e)) => {
                tracing::warn!("Position sample failed, skipping tick: {e}");
                return;
            }
            Err(_) => {
                let e = SensorError::Timeout(self.config.sample_timeout);
                tracing::warn!("{e}, skipping tick");
                return;
            }
        };

        let sample = LocationSample::new(latitude, longitude, self.store.selected_order_id());
        match self.rest.post_location(&sample).await {
            Ok(()) => tracing::debug!(order_id = ?sample.order_id, "Location reported"),
            Err(e) => tracing::warn!("Location report failed: {e}"),
        }
    }
}
