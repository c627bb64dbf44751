//! Domain models

pub mod order;

pub use order::{
    CustomerAddress, DeliveryOrder, DeliveryStatus, OrderId, OrderItem, RejectedOrder, Restaurant,
    UnknownStatus, decode_orders,
};
