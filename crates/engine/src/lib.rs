//! ReelNexus Engine - the game authority.
//!
//! - `authority`: the [`GameAuthority`] port every transport ultimately talks to
//! - `slot_engine`: a reference 5x3 video slot implementing the port in memory
//! - `paytable`: symbols, paylines and win evaluation used by the slot engine
//! - `worker_host`: serves the envelope protocol over line-delimited JSON, so the
//!   engine can run as an isolated worker process

pub mod authority;
pub mod error;
pub mod paytable;
pub mod slot_engine;
pub mod worker_host;

pub use authority::GameAuthority;
#[cfg(any(test, feature = "testing"))]
pub use authority::MockGameAuthority;
pub use error::{AuthorityError, WorkerHostError};
pub use slot_engine::SlotEngine;
pub use worker_host::serve;
