//! Transport adapters between the client and the game authority.
//!
//! Four interchangeable adapters implement [`TransportAdapter`]:
//! - `local`: in-process `GameAuthority`, no network
//! - `poll`: HTTP requests plus a fixed-interval event pull
//! - `socket`: one persistent websocket with correlated requests
//! - `worker`: a child process speaking line-delimited JSON envelopes
//!
//! Socket and worker share the correlation, timeout and reconnection machinery
//! in `core`; they only differ in how a session is established and framed.

pub mod core;
pub mod local;
pub mod poll;
pub mod socket;
pub mod worker;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

use reelnexus_domain::{PlayerId, TransportError};
use reelnexus_shared::{BalanceResponse, GameStateResponse, PushEvent, SpinRequest, SpinResponse};

use crate::config::TransportKind;
use crate::infrastructure::messaging::ConnectionState;

pub use self::core::{BackoffState, Correlator, PendingRequests, Subscribers};
pub use local::LocalAdapter;
pub use poll::PollAdapter;
pub use socket::SocketAdapter;
pub use worker::{ProcessLauncher, WorkerAdapter, WorkerIo, WorkerLauncher};

/// Something an adapter observed on its channel outside of a request/reply pair.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Unsolicited event pushed by the authority
    Push(PushEvent),
    /// Terminal server notice; the session is over and will not be retried
    Fault { code: String, message: String },
}

pub type TransportCallback = Arc<dyn Fn(TransportEvent) + Send + Sync>;

/// Uniform contract over every transport.
///
/// Request methods never fail: channel errors come back as structured
/// `success: false` / `error` results.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransportAdapter: Send + Sync {
    fn kind(&self) -> TransportKind;

    fn state(&self) -> ConnectionState;

    fn watch_state(&self) -> watch::Receiver<ConnectionState>;

    /// Resolve once the channel is ready, or fail with a connection error.
    async fn connect(&self) -> Result<(), TransportError>;

    /// Idempotent. Clears subscriptions; outstanding requests fail with `Disconnected`.
    async fn disconnect(&self);

    async fn request_spin(&self, request: SpinRequest) -> SpinResponse;

    async fn request_balance(&self, player_id: &PlayerId) -> BalanceResponse;

    async fn request_game_state(&self, player_id: &PlayerId) -> GameStateResponse;

    fn subscribe(&self, callback: TransportCallback);
}
