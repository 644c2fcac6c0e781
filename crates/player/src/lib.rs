//! ReelNexus Player - the slot client runtime.
//!
//! - `infrastructure::transport`: the four transport adapters (local, HTTP poll,
//!   WebSocket, worker process) behind one `TransportAdapter` trait
//! - `infrastructure::messaging`: event buses and connection state
//! - `application::services`: bridge, manager, event distributor, ledger and the
//!   spin orchestrator (`SlotNexus`)
//! - `runner`: composition root (`AppContext`)
//! - `console`: headless command-line front-end

pub mod application;
pub mod config;
pub mod console;
pub mod infrastructure;
pub mod runner;

pub use runner::AppContext;
