//! In-process adapter: calls a `GameAuthority` directly.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::watch;

use reelnexus_domain::{PlayerId, TransportError};
use reelnexus_engine::GameAuthority;
use reelnexus_shared::{BalanceResponse, GameStateResponse, SpinRequest, SpinResponse};

use super::core::{set_state, Subscribers};
use super::{TransportAdapter, TransportCallback};
use crate::config::TransportKind;
use crate::infrastructure::messaging::ConnectionState;

pub struct LocalAdapter {
    authority: Arc<dyn GameAuthority>,
    state: watch::Sender<ConnectionState>,
    subscribers: Subscribers,
}

impl LocalAdapter {
    pub fn new(authority: Arc<dyn GameAuthority>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            authority,
            state,
            subscribers: Subscribers::default(),
        }
    }

    fn ensure_connected(&self) -> Result<(), TransportError> {
        if self.state.borrow().is_connected() {
            Ok(())
        } else {
            Err(TransportError::NotConnected)
        }
    }
}

#[async_trait]
impl TransportAdapter for LocalAdapter {
    fn kind(&self) -> TransportKind {
        TransportKind::Local
    }

    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    async fn connect(&self) -> Result<(), TransportError> {
        set_state(&self.state, TransportKind::Local, ConnectionState::Connected);
        tracing::info!("Local authority attached");
        Ok(())
    }

    async fn disconnect(&self) {
        self.subscribers.clear();
        set_state(&self.state, TransportKind::Local, ConnectionState::Disconnected);
    }

    async fn request_spin(&self, request: SpinRequest) -> SpinResponse {
        if let Err(e) = self.ensure_connected() {
            return SpinResponse::failure(e.to_string());
        }
        match self.authority.spin(&request).await {
            Ok(result) => SpinResponse::ok(result),
            Err(e) => {
                tracing::warn!(spin_id = %request.context.spin_id, error = %e, "Spin rejected");
                SpinResponse::failure(e.to_string())
            }
        }
    }

    async fn request_balance(&self, player_id: &PlayerId) -> BalanceResponse {
        if self.ensure_connected().is_err() {
            return BalanceResponse::failure();
        }
        match self.authority.balance(player_id).await {
            Ok(balance) => BalanceResponse::ok(balance),
            Err(e) => {
                tracing::warn!(player_id = %player_id, error = %e, "Balance query failed");
                BalanceResponse::failure()
            }
        }
    }

    async fn request_game_state(&self, player_id: &PlayerId) -> GameStateResponse {
        if let Err(e) = self.ensure_connected() {
            return GameStateResponse::error(e.to_string());
        }
        match self.authority.game_state(player_id).await {
            Ok(state) if state.is_object() => GameStateResponse::State(state),
            Ok(state) => GameStateResponse::State(json!({ "state": state })),
            Err(e) => GameStateResponse::error(e.to_string()),
        }
    }

    fn subscribe(&self, callback: TransportCallback) {
        self.subscribers.add(callback);
    }
}
