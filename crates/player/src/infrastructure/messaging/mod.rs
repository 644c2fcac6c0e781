//! Event buses and connection state.
//!
//! - `EventBus`: push-based subscription for `GameEvent`s; the distributor owns one
//!   bus per side (UI and Engine) and dispatches into them
//! - `ConnectionState`: lifecycle of a transport adapter, published through a
//!   `tokio::sync::watch` channel by every adapter

pub mod connection;
pub mod event_bus;

pub use connection::ConnectionState;
pub use event_bus::{EventBus, SubscriptionId};
