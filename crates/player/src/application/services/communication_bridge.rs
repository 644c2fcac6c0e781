//! Communication bridge: the one place requests to the authority go through.
//!
//! Holds zero or one transport adapter. Every spin also produces fire-and-forget
//! lifecycle events on a broadcast channel; the same channel carries connection
//! state changes and transport pushes so observers need a single subscription.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;

use reelnexus_domain::{Credits, PlayerId, SpinId};
use reelnexus_shared::{BalanceResponse, GameStateResponse, SpinRequest, SpinResponse};

use crate::application::error::BridgeError;
use crate::config::TransportKind;
use crate::infrastructure::messaging::ConnectionState;
use crate::infrastructure::transport::{TransportAdapter, TransportEvent};

const LIFECYCLE_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub enum BridgeEvent {
    SpinRequest { spin_id: SpinId, bet_amount: Credits },
    SpinResponse { spin_id: SpinId, response: SpinResponse },
    SpinError { spin_id: SpinId, error: String },
    Connection {
        kind: TransportKind,
        state: ConnectionState,
    },
    Transport(TransportEvent),
}

impl BridgeEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            BridgeEvent::SpinRequest { .. } => "spin-request",
            BridgeEvent::SpinResponse { .. } => "spin-response",
            BridgeEvent::SpinError { .. } => "spin-error",
            BridgeEvent::Connection { .. } => "connection",
            BridgeEvent::Transport(_) => "transport",
        }
    }
}

pub struct CommunicationBridge {
    adapter: RwLock<Option<Arc<dyn TransportAdapter>>>,
    lifecycle: broadcast::Sender<BridgeEvent>,
}

impl Default for CommunicationBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl CommunicationBridge {
    pub fn new() -> Self {
        let (lifecycle, _) = broadcast::channel(LIFECYCLE_CAPACITY);
        Self {
            adapter: RwLock::new(None),
            lifecycle,
        }
    }

    /// Install `adapter`, returning the one it replaces.
    ///
    /// The previous adapter is not disconnected; that is the caller's decision.
    pub fn set_adapter(&self, adapter: Arc<dyn TransportAdapter>) -> Option<Arc<dyn TransportAdapter>> {
        tracing::debug!(transport = %adapter.kind(), "Transport adapter installed");
        self.adapter.write().replace(adapter)
    }

    pub fn clear_adapter(&self) -> Option<Arc<dyn TransportAdapter>> {
        self.adapter.write().take()
    }

    pub fn adapter(&self) -> Option<Arc<dyn TransportAdapter>> {
        self.adapter.read().clone()
    }

    fn current(&self) -> Result<Arc<dyn TransportAdapter>, BridgeError> {
        self.adapter().ok_or(BridgeError::NoAdapterConfigured)
    }

    pub async fn request_spin(&self, request: SpinRequest) -> Result<SpinResponse, BridgeError> {
        let adapter = self.current()?;
        let spin_id = request.context.spin_id;
        self.publish(BridgeEvent::SpinRequest {
            spin_id,
            bet_amount: request.bet_amount,
        });

        let response = adapter.request_spin(request).await;
        if response.success {
            self.publish(BridgeEvent::SpinResponse {
                spin_id,
                response: response.clone(),
            });
        } else {
            self.publish(BridgeEvent::SpinError {
                spin_id,
                error: response
                    .error
                    .clone()
                    .unwrap_or_else(|| "spin failed".to_string()),
            });
        }
        Ok(response)
    }

    pub async fn request_balance(&self, player_id: &PlayerId) -> Result<BalanceResponse, BridgeError> {
        let adapter = self.current()?;
        Ok(adapter.request_balance(player_id).await)
    }

    pub async fn request_game_state(
        &self,
        player_id: &PlayerId,
    ) -> Result<GameStateResponse, BridgeError> {
        let adapter = self.current()?;
        Ok(adapter.request_game_state(player_id).await)
    }

    pub fn subscribe_lifecycle(&self) -> broadcast::Receiver<BridgeEvent> {
        self.lifecycle.subscribe()
    }

    /// Never blocks; with no listeners the event is dropped.
    pub fn publish(&self, event: BridgeEvent) {
        let _ = self.lifecycle.send(event);
    }
}
