pub mod messaging;
pub mod transport;

pub use messaging::{ConnectionState, EventBus};
