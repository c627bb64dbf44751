// courier-client/tests/panel_flow.rs
// DeliveryPanel end to end with the in-process backend, connector and
// position source

use courier_client::{
    ChannelState, ClearReason, ClientConfig, ClientError, DeliveryPanel, DeliveryStatus,
    FixedPositionSource, InMemoryDeliveryApi, MemoryConnector, PanelEvent, RealtimeConfig,
    SessionStorage,
};
use rust_decimal::Decimal;
use shared::models::{CustomerAddress, DeliveryOrder, Restaurant};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct Harness {
    _dir: TempDir,
    session_path: std::path::PathBuf,
    api: InMemoryDeliveryApi,
    connector: MemoryConnector,
    source: FixedPositionSource,
    panel: DeliveryPanel,
}

fn order(id: u64, status: DeliveryStatus) -> DeliveryOrder {
    DeliveryOrder {
        id,
        order_number: format!("{}", 2000 + id),
        delivery_status: status,
        customer_name: format!("Customer {id}"),
        customer_phone: "555-0100".into(),
        customer_address: CustomerAddress {
            address_1: "12 MG Road".into(),
            city: "Pune".into(),
            latitude: Some(18.52),
            longitude: Some(73.85),
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

fn config(session_path: &std::path::Path) -> ClientConfig {
    ClientConfig::new("http://unused.invalid")
        .with_session_path(session_path)
        .with_realtime(RealtimeConfig::default().with_jitter_ratio(0.0))
}

fn harness(source: FixedPositionSource) -> Harness {
    let dir = TempDir::new().unwrap();
    let session_path = dir.path().join("session.json");
    let api = InMemoryDeliveryApi::new("ravi", "secret", "t-1")
        .with_full_name("Ravi Kumar")
        .with_orders(vec![
            order(1, DeliveryStatus::Assigned),
            order(2, DeliveryStatus::PickedUp),
            order(3, DeliveryStatus::Delivered),
        ]);
    let connector = MemoryConnector::new();
    let panel = DeliveryPanel::new(
        config(&session_path),
        Arc::new(api.clone()),
        Arc::new(connector.clone()),
        Arc::new(source.clone()),
    );
    Harness {
        _dir: dir,
        session_path,
        api,
        connector,
        source,
        panel,
    }
}

async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..3000 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

fn status_of(panel: &DeliveryPanel, id: u64) -> DeliveryStatus {
    panel.store().get(id).unwrap().delivery_status
}

#[tokio::test(start_paused = true)]
async fn test_login_start_track_and_transition() {
    let h = harness(FixedPositionSource::granted(18.52, 73.85));

    let partner = h.panel.login("ravi", "secret").await.unwrap();
    assert_eq!(partner.display_name(), "Ravi Kumar");
    assert!(SessionStorage::at_path(&h.session_path).exists());

    let outcome = h.panel.start().await.unwrap();
    assert_eq!(outcome.inserted, 3);
    let board = h.panel.board();
    assert_eq!(board.new.len(), 1);
    assert_eq!(board.active.len(), 1);
    assert_eq!(board.completed.len(), 1);

    eventually(|| h.connector.is_connected()).await;
    assert_eq!(h.panel.channel_state(), Some(ChannelState::Connected));
    assert!(h.panel.is_tracking());

    h.panel.select_order(Some(2));
    tokio::time::sleep(Duration::from_secs(16)).await;
    let reports = h.api.location_reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].order_id, Some(2));

    assert_eq!(h.panel.advance(1).await.unwrap(), DeliveryStatus::PickedUp);
    assert_eq!(status_of(&h.panel, 1), DeliveryStatus::PickedUp);
    assert_eq!(h.api.status_posts(), vec![(1, DeliveryStatus::PickedUp)]);

    h.connector
        .push(r#"{"type":"order_status_update","order_id":2,"new_status":"on-the-way"}"#);
    eventually(|| status_of(&h.panel, 2) == DeliveryStatus::OnTheWay).await;
    assert_eq!(h.panel.selected_order().unwrap().id, 2);
}

#[tokio::test(start_paused = true)]
async fn test_illegal_transition_is_rejected_locally() {
    let h = harness(FixedPositionSource::denied());
    h.panel.login("ravi", "secret").await.unwrap();
    h.panel.start().await.unwrap();

    let err = h
        .panel
        .request_transition(1, DeliveryStatus::Delivered)
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Validation(_)));
    assert!(h.panel.advance(3).await.is_err());
    assert!(h.api.status_posts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_restore_uses_persisted_session() {
    let h = harness(FixedPositionSource::denied());
    h.panel.login("ravi", "secret").await.unwrap();

    let second = DeliveryPanel::new(
        config(&h.session_path),
        Arc::new(h.api.clone()),
        Arc::new(MemoryConnector::new()),
        Arc::new(FixedPositionSource::denied()),
    );
    assert!(second.restore());
    assert_eq!(second.partner().unwrap().username, "ravi");
    second.start().await.unwrap();
    assert_eq!(second.orders().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_auth_failure_tears_everything_down() {
    let h = harness(FixedPositionSource::granted(1.0, 2.0));
    h.panel.login("ravi", "secret").await.unwrap();
    h.panel.start().await.unwrap();
    eventually(|| h.connector.is_connected()).await;
    let mut events = h.panel.subscribe();

    h.api.revoke_token();
    h.connector.push(r#"{"type":"new_order_assigned"}"#);
    eventually(|| !h.panel.is_authenticated()).await;

    loop {
        match events.recv().await.unwrap() {
            PanelEvent::SessionCleared { reason } => {
                assert_eq!(reason, ClearReason::Unauthorized);
                break;
            }
            _ => continue,
        }
    }
    assert!(h.panel.orders().is_empty());
    assert!(!SessionStorage::at_path(&h.session_path).exists());
    eventually(|| !h.connector.is_connected()).await;

    let attempts = h.connector.attempts().len();
    let reports = h.api.location_reports().len();
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(h.connector.attempts().len(), attempts);
    assert_eq!(h.api.location_reports().len(), reports);
    assert!(!h.panel.is_tracking());
}

#[tokio::test(start_paused = true)]
async fn test_logout_stops_background_work() {
    let h = harness(FixedPositionSource::granted(1.0, 2.0));
    h.panel.login("ravi", "secret").await.unwrap();
    h.panel.start().await.unwrap();
    eventually(|| h.connector.is_connected()).await;

    assert!(h.panel.logout());
    assert!(!h.panel.logout());
    assert!(h.panel.channel_state().is_none());

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(h.api.location_reports().is_empty());
    assert!(!h.connector.is_connected());
    assert!(!SessionStorage::at_path(&h.session_path).exists());
}

#[tokio::test(start_paused = true)]
async fn test_failed_initial_fetch_still_starts_channel() {
    let h = harness(FixedPositionSource::denied());
    h.panel.login("ravi", "secret").await.unwrap();
    h.api.fail_fetches(Some("Database unavailable"));

    let err = h.panel.start().await.unwrap_err();
    assert!(matches!(err, ClientError::Network(_)));
    eventually(|| h.connector.is_connected()).await;
    assert!(h.panel.is_authenticated());

    h.api.fail_fetches(None);
    h.panel.retry_fetch().await.unwrap();
    assert_eq!(h.panel.orders().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_denied_permission_is_reported() {
    let h = harness(FixedPositionSource::denied());
    let mut events = h.panel.subscribe();
    h.panel.login("ravi", "secret").await.unwrap();
    h.panel.start().await.unwrap();

    let mut denied = false;
    while let Ok(event) = events.try_recv() {
        denied |= event == PanelEvent::LocationPermissionDenied;
    }
    assert!(denied);
    assert!(!h.panel.is_tracking());
    assert_eq!(h.source.samples(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stop_tracking_keeps_session_and_channel() {
    let h = harness(FixedPositionSource::granted(1.0, 2.0));
    h.panel.login("ravi", "secret").await.unwrap();
    h.panel.start().await.unwrap();
    eventually(|| h.connector.is_connected()).await;

    h.panel.stop_tracking();
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert!(h.api.location_reports().is_empty());
    assert!(h.panel.is_authenticated());
    assert!(h.connector.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_keeps_persisted_session() {
    let h = harness(FixedPositionSource::granted(1.0, 2.0));
    h.panel.login("ravi", "secret").await.unwrap();
    h.panel.start().await.unwrap();
    eventually(|| h.connector.is_connected()).await;

    h.panel.shutdown().await;
    assert!(!h.connector.is_connected());
    assert!(SessionStorage::at_path(&h.session_path).exists());
}
