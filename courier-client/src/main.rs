use anyhow::Context;
use courier_client::{
    ClientConfig, DeliveryPanel, FixedPositionSource, NetworkDeliveryApi, PanelEvent, WsConnector,
    logger,
};
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Environment and logging
    dotenv::dotenv().ok();
    let level = std::env::var("COURIER_LOG_LEVEL").unwrap_or_else(|_| "info".into());
    let json = std::env::var("COURIER_LOG_JSON").is_ok_and(|v| v == "1" || v == "true");
    let log_dir = std::env::var("COURIER_LOG_DIR").ok().map(PathBuf::from);
    logger::init_logger(&level, json, log_dir.as_deref()).context("logger init")?;

    // 2. Configuration
    let config = ClientConfig::from_env();
    tracing::info!(api_root = %config.api_root, realtime_url = %config.realtime_url, "Courier panel starting");

    let api = NetworkDeliveryApi::new(&config)?;
    let connector = WsConnector::new(config.realtime_url.clone());
    let source = match std::env::var("COURIER_FIXED_POSITION") {
        Ok(value) => {
            let (lat, lon) = parse_position(&value)
                .with_context(|| format!("COURIER_FIXED_POSITION is not \"lat,lon\": {value}"))?;
            FixedPositionSource::granted(lat, lon)
        }
        Err(_) => FixedPositionSource::denied(),
    };

    let panel = DeliveryPanel::new(config, Arc::new(api), Arc::new(connector), Arc::new(source));

    // 3. Session
    if panel.restore() {
        tracing::info!("Using persisted session");
    } else {
        let username = std::env::var("COURIER_USERNAME").context("no session; set COURIER_USERNAME")?;
        let password = std::env::var("COURIER_PASSWORD").context("no session; set COURIER_PASSWORD")?;
        let partner = panel.login(&username, &password).await?;
        tracing::info!(partner = partner.display_name(), "Logged in");
    }

    // 4. Run until Ctrl-C or the session ends
    let mut events = panel.subscribe();
    if let Err(e) = panel.start().await {
        if e.is_auth() {
            anyhow::bail!("session rejected: {e}");
        }
        tracing::warn!("Starting without orders: {e}");
    }
    log_board(&panel);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl-C received, shutting down");
                break;
            }
            event = events.recv() => match event {
                Ok(PanelEvent::SessionCleared { reason }) => {
                    tracing::warn!(?reason, "Session ended, log in again");
                    break;
                }
                Ok(PanelEvent::OrdersReplaced { .. }) => log_board(&panel),
                Ok(event) => tracing::info!(?event, "Panel event"),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Missed {n} panel events");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    panel.shutdown().await;
    tracing::info!("Courier panel stopped");
    Ok(())
}

fn parse_position(value: &str) -> Option<(f64, f64)> {
    let (lat, lon) = value.split_once(',')?;
    Some((lat.trim().parse().ok()?, lon.trim().parse().ok()?))
}

fn log_board(panel: &DeliveryPanel) {
    let board = panel.board();
    tracing::info!(
        new = board.new.len(),
        active = board.active.len(),
        completed = board.completed.len(),
        "Orders"
    );
    for order in board.new.iter().chain(&board.active) {
        tracing::info!(
            order_id = order.id,
            number = %order.order_number,
            status = %order.delivery_status.label(),
            customer = %order.customer_name,
            address = %order.customer_address.one_line(),
            "Order"
        );
    }
}
