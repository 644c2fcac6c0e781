//! Communication manager: turns transport settings into a live, connected adapter.
//!
//! Configuration is validated before anything is torn down, so a bad mode switch
//! leaves the current transport untouched. A successful switch disconnects the
//! previous adapter (its pending requests fail with `Disconnected`), installs
//! the new one in the bridge and wires its state and pushes into the bridge's
//! lifecycle channel.

use std::sync::{Arc, Weak};

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use reelnexus_engine::GameAuthority;

use super::communication_bridge::{BridgeEvent, CommunicationBridge};
use crate::application::error::ManagerError;
use crate::config::{TransportConfig, TransportKind, TransportSettings};
use crate::infrastructure::messaging::ConnectionState;
use crate::infrastructure::transport::{
    LocalAdapter, PollAdapter, SocketAdapter, TransportAdapter, WorkerAdapter,
};

struct ActiveTransport {
    config: TransportConfig,
    adapter: Arc<dyn TransportAdapter>,
    watcher: JoinHandle<()>,
}

pub struct CommunicationManager {
    bridge: Arc<CommunicationBridge>,
    authority: Option<Arc<dyn GameAuthority>>,
    active: Mutex<Option<ActiveTransport>>,
}

impl CommunicationManager {
    /// `authority` backs local mode; without it `local` cannot be selected.
    pub fn new(bridge: Arc<CommunicationBridge>, authority: Option<Arc<dyn GameAuthority>>) -> Self {
        Self {
            bridge,
            authority,
            active: Mutex::new(None),
        }
    }

    fn build_adapter(&self, config: &TransportConfig) -> Result<Arc<dyn TransportAdapter>, ManagerError> {
        let adapter: Arc<dyn TransportAdapter> = match config {
            TransportConfig::Local => {
                let authority = self
                    .authority
                    .clone()
                    .ok_or(ManagerError::NoLocalAuthority)?;
                Arc::new(LocalAdapter::new(authority))
            }
            TransportConfig::Http {
                base_url,
                api_key,
                poll_interval,
            } => Arc::new(PollAdapter::new(base_url, api_key.clone(), *poll_interval)),
            TransportConfig::WebSocket { socket_url, token } => {
                Arc::new(SocketAdapter::for_url(socket_url.clone(), token.clone()))
            }
            TransportConfig::WebWorker { worker_path, args } => {
                Arc::new(WorkerAdapter::for_process(worker_path.clone(), args.clone()))
            }
        };
        Ok(adapter)
    }

    /// Validate `settings`, swap in the adapter they describe and connect it.
    pub async fn configure(&self, settings: &TransportSettings) -> Result<TransportKind, ManagerError> {
        let config = TransportConfig::from_settings(settings)?;
        let kind = config.kind();
        let adapter = self.build_adapter(&config)?;
        self.install(config, adapter).await?;
        Ok(kind)
    }

    /// Install a pre-built adapter. The adapter is kept even if connecting
    /// fails, so `reconnect()` can retry it.
    pub async fn install(
        &self,
        config: TransportConfig,
        adapter: Arc<dyn TransportAdapter>,
    ) -> Result<(), ManagerError> {
        let kind = adapter.kind();
        let mut active = self.active.lock().await;

        if let Some(previous) = active.take() {
            previous.watcher.abort();
            previous.adapter.disconnect().await;
            tracing::info!(
                from = %previous.config.kind(),
                to = %kind,
                "Previous transport torn down"
            );
        }

        self.bridge.set_adapter(Arc::clone(&adapter));
        let bridge = Arc::downgrade(&self.bridge);
        adapter.subscribe(Arc::new(move |event| {
            if let Some(bridge) = bridge.upgrade() {
                bridge.publish(BridgeEvent::Transport(event));
            }
        }));
        let watcher = forward_state(kind, adapter.watch_state(), Arc::downgrade(&self.bridge));

        *active = Some(ActiveTransport {
            config,
            adapter: Arc::clone(&adapter),
            watcher,
        });

        tracing::info!(transport = %kind, "Connecting transport");
        adapter
            .connect()
            .await
            .map_err(|source| ManagerError::Connect { kind, source })
    }

    /// Connect the active adapter again, e.g. after it gave up reconnecting.
    pub async fn reconnect(&self) -> Result<(), ManagerError> {
        let active = self.active.lock().await;
        let current = active.as_ref().ok_or(ManagerError::NotConfigured)?;
        let kind = current.config.kind();
        tracing::info!(transport = %kind, "Manual reconnect requested");
        current
            .adapter
            .connect()
            .await
            .map_err(|source| ManagerError::Connect { kind, source })
    }

    pub async fn active_config(&self) -> Option<TransportConfig> {
        self.active.lock().await.as_ref().map(|a| a.config.clone())
    }

    pub async fn active_kind(&self) -> Option<TransportKind> {
        self.active.lock().await.as_ref().map(|a| a.config.kind())
    }

    pub async fn shutdown(&self) {
        let previous = self.active.lock().await.take();
        if let Some(previous) = previous {
            previous.watcher.abort();
            previous.adapter.disconnect().await;
        }
        self.bridge.clear_adapter();
    }
}

fn forward_state(
    kind: TransportKind,
    mut states: watch::Receiver<ConnectionState>,
    bridge: Weak<CommunicationBridge>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = *states.borrow_and_update();
            let Some(bridge) = bridge.upgrade() else {
                break;
            };
            tracing::debug!(transport = %kind, %state, "Transport state");
            bridge.publish(BridgeEvent::Connection { kind, state });
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;
    use crate::infrastructure::transport::MockTransportAdapter;
    use reelnexus_domain::{PlayerId, TransportError};
    use reelnexus_engine::SlotEngine;

    fn manager() -> (Arc<CommunicationBridge>, CommunicationManager) {
        let bridge = Arc::new(CommunicationBridge::new());
        let authority: Arc<dyn GameAuthority> = Arc::new(SlotEngine::seeded(300, 9));
        let manager = CommunicationManager::new(Arc::clone(&bridge), Some(authority));
        (bridge, manager)
    }

    #[tokio::test]
    async fn local_mode_installs_connected_adapter() {
        let (bridge, manager) = manager();
        let mut lifecycle = bridge.subscribe_lifecycle();

        let kind = manager.configure(&TransportSettings::default()).await.unwrap();
        assert_eq!(kind, TransportKind::Local);
        assert_eq!(manager.active_kind().await, Some(TransportKind::Local));

        let balance = bridge.request_balance(&PlayerId::new("p1")).await.unwrap();
        assert_eq!(balance.balance, 300);

        match lifecycle.recv().await.unwrap() {
            BridgeEvent::Connection { kind, state } => {
                assert_eq!(kind, TransportKind::Local);
                assert_eq!(state, ConnectionState::Connected);
            }
            other => panic!("unexpected {}", other.as_str()),
        }
    }

    #[tokio::test]
    async fn invalid_settings_keep_current_transport() {
        let (bridge, manager) = manager();
        manager.configure(&TransportSettings::default()).await.unwrap();
        let current = bridge.adapter().unwrap();

        let broken = TransportSettings {
            mode: TransportKind::WebSocket,
            ..TransportSettings::default()
        };
        let err = manager.configure(&broken).await.unwrap_err();
        assert!(matches!(
            err,
            ManagerError::Config(ConfigError::Missing {
                setting: "socket_url",
                ..
            })
        ));

        assert_eq!(manager.active_kind().await, Some(TransportKind::Local));
        assert_eq!(current.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn switching_disconnects_previous_adapter() {
        let (bridge, manager) = manager();
        manager.configure(&TransportSettings::default()).await.unwrap();
        let first = bridge.adapter().unwrap();

        manager.configure(&TransportSettings::default()).await.unwrap();
        let second = bridge.adapter().unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(first.state(), ConnectionState::Disconnected);
        assert_eq!(second.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn local_mode_needs_an_authority() {
        let bridge = Arc::new(CommunicationBridge::new());
        let manager = CommunicationManager::new(bridge, None);
        assert!(matches!(
            manager.configure(&TransportSettings::default()).await,
            Err(ManagerError::NoLocalAuthority)
        ));
    }

    #[tokio::test]
    async fn failed_connect_keeps_adapter_for_retry() {
        let (bridge, manager) = manager();
        let (_state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let mut adapter = MockTransportAdapter::new();
        adapter.expect_kind().return_const(TransportKind::WebSocket);
        adapter.expect_watch_state().return_const(state_rx);
        adapter.expect_subscribe().times(1).return_const(());
        let mut attempts = mockall::Sequence::new();
        adapter
            .expect_connect()
            .times(1)
            .in_sequence(&mut attempts)
            .returning(|| Err(TransportError::connection("refused")));
        adapter
            .expect_connect()
            .times(1)
            .in_sequence(&mut attempts)
            .returning(|| Ok(()));
        adapter.expect_disconnect().times(1).return_const(());

        let config = TransportConfig::WebSocket {
            socket_url: "ws://127.0.0.1:1/socket".parse().unwrap(),
            token: "t".into(),
        };
        let err = manager
            .install(config, Arc::new(adapter))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ManagerError::Connect {
                kind: TransportKind::WebSocket,
                ..
            }
        ));
        assert!(bridge.adapter().is_some());
        assert_eq!(manager.active_kind().await, Some(TransportKind::WebSocket));

        manager.reconnect().await.unwrap();
        manager.shutdown().await;
        assert!(bridge.adapter().is_none());
    }

    #[tokio::test]
    async fn reconnect_requires_configuration() {
        let (_bridge, manager) = manager();
        assert!(matches!(
            manager.reconnect().await,
            Err(ManagerError::NotConfigured)
        ));

        manager.configure(&TransportSettings::default()).await.unwrap();
        manager.reconnect().await.unwrap();

        manager.shutdown().await;
        assert!(manager.active_kind().await.is_none());
    }
}
