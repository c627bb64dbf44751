//! SessionGuard - owner of the auth token and its lifecycle
//!
//! Every established session gets a scope: an epoch number plus a
//! cancellation token. Scoped resources (realtime channel, location
//! reporter, background resyncs) run under child tokens of that scope, so
//! [`SessionGuard::clear`] is the single release path for all of them.

mod storage;

pub use storage::SessionStorage;

use parking_lot::Mutex;
use shared::Session;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::ClientResult;
use crate::events::{EventBus, PanelEvent};
use crate::store::OrderStore;

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearReason {
    /// The partner logged out
    Logout,
    /// A request came back 401/403
    Unauthorized,
}

/// Lifetime handle of one session
#[derive(Debug, Clone)]
pub struct SessionScope {
    epoch: u64,
    token: CancellationToken,
}

impl SessionScope {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Token cancelled when the session is cleared
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Token for a resource that must not outlive the session
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[derive(Debug)]
struct GuardState {
    session: Option<Session>,
    epoch: u64,
    scope: CancellationToken,
}

/// Auth token owner; gates every other component
#[derive(Debug, Clone)]
pub struct SessionGuard {
    state: Arc<Mutex<GuardState>>,
    store: OrderStore,
    storage: Option<SessionStorage>,
    events: EventBus,
}

impl SessionGuard {
    pub fn new(store: OrderStore, events: EventBus, storage: Option<SessionStorage>) -> Self {
        let scope = CancellationToken::new();
        scope.cancel();
        Self {
            state: Arc::new(Mutex::new(GuardState {
                session: None,
                epoch: 0,
                scope,
            })),
            store,
            storage,
            events,
        }
    }

    /// Re-establish a session from the persisted record, if any
    pub fn restore(&self) -> Option<SessionScope> {
        let session = self.storage.as_ref()?.load()?;
        tracing::info!(username = %session.partner.username, "Session restored");
        Some(self.install(session))
    }

    /// Start a new session and persist it
    pub fn establish(&self, session: Session) -> ClientResult<SessionScope> {
        if let Some(storage) = &self.storage {
            storage.save(&session)?;
        }
        tracing::info!(username = %session.partner.username, "Session established");
        Ok(self.install(session))
    }

    fn install(&self, session: Session) -> SessionScope {
        let mut state = self.state.lock();
        if state.session.is_some() {
            // Replacing a live session: its resources and orders go with it
            state.scope.cancel();
            self.store.clear();
        }
        state.epoch += 1;
        state.scope = CancellationToken::new();
        state.session = Some(session);
        SessionScope {
            epoch: state.epoch,
            token: state.scope.clone(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.lock().session.is_some()
    }

    pub fn token(&self) -> Option<String> {
        self.state.lock().session.as_ref().map(|s| s.token.clone())
    }

    pub fn session(&self) -> Option<Session> {
        self.state.lock().session.clone()
    }

    /// Scope of the live session
    pub fn scope(&self) -> Option<SessionScope> {
        let state = self.state.lock();
        state.session.as_ref().map(|_| SessionScope {
            epoch: state.epoch,
            token: state.scope.clone(),
        })
    }

    /// Token and epoch of the live session, read atomically
    pub fn credentials(&self) -> Option<(String, u64)> {
        let state = self.state.lock();
        state.session.as_ref().map(|s| (s.token.clone(), state.epoch))
    }

    pub fn is_current(&self, epoch: u64) -> bool {
        let state = self.state.lock();
        state.session.is_some() && state.epoch == epoch
    }

    /// Run `f` only if the session of `epoch` is still live
    ///
    /// Holds the guard lock while `f` runs, so a concurrent `clear()` either
    /// happens before (and `f` is skipped) or after (and wipes its result).
    pub fn apply_if_current<R>(&self, epoch: u64, f: impl FnOnce() -> R) -> Option<R> {
        let state = self.state.lock();
        if state.session.is_some() && state.epoch == epoch {
            Some(f())
        } else {
            None
        }
    }

    /// End the session
    ///
    /// Cancels the scope (closing the realtime channel and stopping the
    /// location reporter), clears the order store, removes the persisted
    /// record and signals the UI. Idempotent; returns `true` only for the
    /// call that actually ended a live session.
    pub fn clear(&self, reason: ClearReason) -> bool {
        self.clear_matching(reason, None)
    }

    /// End the session only if it is still the one of `epoch`
    ///
    /// A 401 for a request issued under an older session must not tear
    /// down the session that replaced it.
    pub fn clear_if_current(&self, epoch: u64, reason: ClearReason) -> bool {
        self.clear_matching(reason, Some(epoch))
    }

    fn clear_matching(&self, reason: ClearReason, epoch: Option<u64>) -> bool {
        {
            let mut state = self.state.lock();
            if epoch.is_some_and(|e| e != state.epoch) {
                return false;
            }
            if state.session.take().is_none() {
                return false;
            }
            state.epoch += 1;
            state.scope.cancel();
            self.store.clear();
        }

        if let Some(storage) = &self.storage
            && let Err(e) = storage.delete()
        {
            tracing::error!(path = %storage.path().display(), "Failed to remove session record: {e}");
        }

        match reason {
            ClearReason::Logout => tracing::info!("Session cleared (logout)"),
            ClearReason::Unauthorized => {
                tracing::warn!("Session cleared (authorization rejected)")
            }
        }
        self.events.publish(PanelEvent::SessionCleared { reason });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::order;
    use shared::{DeliveryStatus, PartnerIdentity};
    use tempfile::TempDir;

    fn session(token: &str) -> Session {
        Session::new(
            token,
            PartnerIdentity {
                user_id: Some(1),
                username: "ravi".into(),
                full_name: None,
            },
        )
    }

    fn guard_with_storage(dir: &TempDir) -> (SessionGuard, OrderStore, EventBus) {
        let events = EventBus::default();
        let store = OrderStore::new(events.clone());
        let storage = SessionStorage::new(dir.path(), "session.json");
        let guard = SessionGuard::new(store.clone(), events.clone(), Some(storage));
        (guard, store, events)
    }

    #[test]
    fn test_starts_unauthenticated() {
        let guard = SessionGuard::new(OrderStore::default(), EventBus::default(), None);
        assert!(!guard.is_authenticated());
        assert!(guard.token().is_none());
        assert!(guard.scope().is_none());
        assert!(!guard.clear(ClearReason::Logout));
    }

    #[test]
    fn test_establish_persists_and_restore_reads_back() {
        let dir = TempDir::new().unwrap();
        let (guard, _, _) = guard_with_storage(&dir);
        guard.establish(session("t-1")).unwrap();
        assert_eq!(guard.token().as_deref(), Some("t-1"));

        let (restored, _, _) = guard_with_storage(&dir);
        let scope = restored.restore().unwrap();
        assert!(!scope.is_cancelled());
        assert_eq!(restored.token().as_deref(), Some("t-1"));
    }

    #[tokio::test]
    async fn test_clear_cascades() {
        let dir = TempDir::new().unwrap();
        let (guard, store, events) = guard_with_storage(&dir);
        let mut rx = events.subscribe();

        let scope = guard.establish(session("t-1")).unwrap();
        let child = scope.child_token();
        store.replace_all(vec![order(1, DeliveryStatus::Assigned)]);

        assert!(guard.clear(ClearReason::Unauthorized));

        assert!(!guard.is_authenticated());
        assert!(scope.is_cancelled());
        assert!(child.is_cancelled());
        assert!(store.is_empty());
        assert!(SessionStorage::new(dir.path(), "session.json").load().is_none());

        // OrdersReplaced from the seed, then the redirect signal
        let _ = rx.recv().await.unwrap();
        assert_eq!(
            rx.recv().await.unwrap(),
            PanelEvent::SessionCleared {
                reason: ClearReason::Unauthorized
            }
        );
    }

    #[test]
    fn test_clear_is_idempotent() {
        let guard = SessionGuard::new(OrderStore::default(), EventBus::default(), None);
        guard.establish(session("t-1")).unwrap();

        assert!(guard.clear(ClearReason::Logout));
        assert!(!guard.clear(ClearReason::Logout));
        assert!(!guard.clear(ClearReason::Unauthorized));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_clear_tears_down_once() {
        let events = EventBus::default();
        let mut rx = events.subscribe();
        let guard = SessionGuard::new(OrderStore::new(events.clone()), events, None);
        guard.establish(session("t-1")).unwrap();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let guard = guard.clone();
                tokio::spawn(async move { guard.clear(ClearReason::Unauthorized) })
            })
            .collect();

        let mut cleared = 0;
        for handle in handles {
            if handle.await.unwrap() {
                cleared += 1;
            }
        }
        assert_eq!(cleared, 1);
        assert!(matches!(
            rx.try_recv().unwrap(),
            PanelEvent::SessionCleared { .. }
        ));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_stale_epoch_results_are_discarded() {
        let guard = SessionGuard::new(OrderStore::default(), EventBus::default(), None);
        let scope = guard.establish(session("t-1")).unwrap();
        assert_eq!(guard.apply_if_current(scope.epoch(), || 1), Some(1));

        guard.clear(ClearReason::Logout);
        assert_eq!(guard.apply_if_current(scope.epoch(), || 1), None);

        let next = guard.establish(session("t-2")).unwrap();
        assert_ne!(next.epoch(), scope.epoch());
        assert!(!guard.is_current(scope.epoch()));
        assert!(guard.is_current(next.epoch()));
    }

    #[test]
    fn test_clear_if_current_ignores_old_epoch() {
        let guard = SessionGuard::new(OrderStore::default(), EventBus::default(), None);
        let first = guard.establish(session("t-1")).unwrap();
        let second = guard.establish(session("t-2")).unwrap();

        assert!(!guard.clear_if_current(first.epoch(), ClearReason::Unauthorized));
        assert!(guard.is_authenticated());
        assert!(guard.clear_if_current(second.epoch(), ClearReason::Unauthorized));
    }

    #[test]
    fn test_replacing_session_cancels_old_scope() {
        let store = OrderStore::default();
        let guard = SessionGuard::new(store.clone(), EventBus::default(), None);
        let first = guard.establish(session("t-1")).unwrap();
        store.replace_all(vec![order(1, DeliveryStatus::Assigned)]);

        let second = guard.establish(session("t-2")).unwrap();
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
        assert!(store.is_empty());
    }
}
