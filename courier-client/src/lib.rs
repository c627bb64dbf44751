//! Courier Client - delivery partner panel core
//!
//! Keeps the partner's orders consistent across REST snapshots, realtime
//! push deltas and optimistic status transitions, and reports the device
//! position while a session is live.

pub mod config;
pub mod error;
pub mod events;
pub mod http;
pub mod location;
pub mod logger;
pub mod panel;
pub mod realtime;
pub mod rest;
pub mod session;
pub mod store;
pub mod transition;

pub use config::{AuthHeader, ClientConfig};
pub use error::{ClientError, ClientResult};
pub use events::{EventBus, PanelEvent};
pub use http::{ApiCall, DeliveryApi, InMemoryDeliveryApi, NetworkDeliveryApi};
pub use location::{
    FixedPositionSource, LocationConfig, LocationReporter, LocationSample, Permission,
    PositionSource, ReporterHandle, SensorError,
};
pub use panel::DeliveryPanel;
pub use realtime::{
    ChannelError, ChannelHandle, ChannelState, MemoryConnector, RealtimeChannel, RealtimeConfig,
    WsConnector,
};
pub use rest::RestSyncClient;
pub use session::{ClearReason, SessionGuard, SessionScope, SessionStorage};
pub use store::{DeltaOutcome, OrderBoard, OrderPatch, OrderStore, RollbackOutcome, SnapshotOutcome};
pub use transition::StatusTransitionController;

// Re-export shared types for convenience
pub use shared::{
    DeliveryOrder, DeliveryStatus, LocationReport, OrderId, PartnerIdentity, RealtimeEvent, Session,
};
