//! Application layer: the services between the transports and the UI event buses.

pub mod error;
pub mod services;

pub use error::{BridgeError, ManagerError};
