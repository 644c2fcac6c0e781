//! Composition root: builds every player service from an `AppConfig` and owns
//! their lifetimes.

use std::sync::Arc;

use tokio::task::JoinHandle;

use reelnexus_domain::{EventContext, GameEvent, GamePayload, PlayerId, RoutingError, SessionId};
use reelnexus_engine::GameAuthority;

use crate::application::services::{
    CommunicationBridge, CommunicationManager, EventDistributor, NexusSettings, SlotNexus,
};
use crate::application::ManagerError;
use crate::config::{AppConfig, TransportKind};
use crate::infrastructure::messaging::EventBus;

pub struct AppContext {
    pub config: AppConfig,
    pub bridge: Arc<CommunicationBridge>,
    pub manager: CommunicationManager,
    pub distributor: Arc<EventDistributor>,
    pub nexus: Arc<SlotNexus>,
    watcher: JoinHandle<()>,
}

impl AppContext {
    /// Wire the services together. Nothing connects until `start()`.
    ///
    /// `authority` backs `local` mode; pass `None` for remote-only clients.
    pub fn build(config: AppConfig, authority: Option<Arc<dyn GameAuthority>>) -> Self {
        let bridge = Arc::new(CommunicationBridge::new());
        let manager = CommunicationManager::new(Arc::clone(&bridge), authority);
        let distributor = Arc::new(EventDistributor::new(
            EventBus::new(),
            EventBus::new(),
            config.settle_window(),
        ));

        let nexus = Arc::new(SlotNexus::new(
            Arc::clone(&bridge),
            Arc::clone(&distributor),
            NexusSettings {
                player_id: PlayerId::new(config.session.player_id.clone()),
                session_id: session_id(config.session.session_id.as_deref()),
                bet: config.betting.bet_config(),
                autoplay_delay: config.autoplay_delay(),
                opening_balance: 0,
            },
        ));
        nexus.attach();
        let watcher = nexus.watch_connection();

        Self {
            config,
            bridge,
            manager,
            distributor,
            nexus,
            watcher,
        }
    }

    /// Connect the configured transport and bootstrap the game session.
    pub async fn start(&self) -> Result<TransportKind, ManagerError> {
        let kind = self
            .manager
            .configure(&self.config.transport_settings())
            .await?;
        self.nexus.initialize().await?;
        tracing::info!(transport = %kind, player_id = %self.nexus.player_id(), "Player started");
        Ok(kind)
    }

    /// Switch to another transport mode, keeping every other setting.
    pub async fn switch_mode(&self, mode: TransportKind) -> Result<TransportKind, ManagerError> {
        let mut settings = self.config.transport_settings();
        settings.mode = mode;
        let kind = self.manager.configure(&settings).await?;
        self.nexus.sync_balance().await;
        Ok(kind)
    }

    /// Reconnect the current transport after it gave up.
    pub async fn retry(&self) -> Result<(), ManagerError> {
        self.manager.reconnect().await
    }

    pub fn ui_bus(&self) -> &EventBus {
        self.distributor.ui_bus()
    }

    pub fn ui_context(&self) -> EventContext {
        self.nexus.event_context()
    }

    /// Emit `payload` as if the UI had raised it.
    pub async fn emit_from_ui(&self, payload: GamePayload) -> Result<(), RoutingError> {
        self.distributor
            .emit_from_ui(GameEvent::new(payload, self.ui_context()))
            .await
    }

    pub async fn shutdown(self) {
        self.watcher.abort();
        self.nexus.stop_autoplay().await;
        self.manager.shutdown().await;
        tracing::info!("Player stopped");
    }
}

fn session_id(configured: Option<&str>) -> SessionId {
    match configured.map(uuid::Uuid::parse_str) {
        Some(Ok(uuid)) => SessionId::from_uuid(uuid),
        Some(Err(e)) => {
            tracing::warn!(error = %e, "Configured session id is not a UUID, starting a new session");
            SessionId::new()
        }
        None => SessionId::new(),
    }
}
