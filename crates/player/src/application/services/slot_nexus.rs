//! Slot nexus: spin orchestration on top of the transaction ledger.
//!
//! Per spin: eligibility check, bet de-escalation if the stake no longer fits the
//! balance, ledger deduction, authority request, then completion or full refund.
//! Only one spin is ever in flight.
//!
//! State is mutated under one async mutex that is never held across a transport
//! call or an event emission. Each operation collects the UI events it produces
//! and emits them after releasing the lock.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use reelnexus_domain::{
    BetAdjustment, BetConfig, ComponentId, ComponentState, Credits, EventContext, GameEvent,
    GamePayload, LedgerError, PaytableEntry, PlayerId, SessionId, SpinId, SpinSpeed,
    SpinTransaction, ToastKind, TransactionId,
};
use reelnexus_shared::{SpinContext, SpinRequest, SpinResponse, SpinResult};

use super::communication_bridge::{BridgeEvent, CommunicationBridge};
use super::event_distributor::EventDistributor;
use super::transaction_ledger::{LedgerEntry, TransactionLedger};
use crate::application::error::BridgeError;
use crate::infrastructure::messaging::{ConnectionState, SubscriptionId};
use crate::infrastructure::transport::TransportEvent;

const ALL_CONTROLS: [ComponentId; 6] = [
    ComponentId::SpinButton,
    ComponentId::StopButton,
    ComponentId::BetSelector,
    ComponentId::LineSelector,
    ComponentId::AutoPlayButton,
    ComponentId::SettingsButton,
];

/// Why a spin request was ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpinRejection {
    SpinInFlight,
    WinPresentation,
    WinCounter,
    ConnectionLost,
    InsufficientBalance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpinOutcome {
    Settled,
    Failed,
    /// The bet was lowered to fit the balance; no spin was played
    Adjusted(BetAdjustment),
    Rejected(SpinRejection),
}

#[derive(Debug, Clone)]
pub struct NexusSettings {
    pub player_id: PlayerId,
    pub session_id: SessionId,
    pub bet: BetConfig,
    pub autoplay_delay: Duration,
    /// Balance until the first sync with the authority.
    pub opening_balance: Credits,
}

/// Point-in-time view of the nexus state.
#[derive(Debug, Clone, PartialEq)]
pub struct NexusSnapshot {
    pub balance: Credits,
    pub bet_level: Credits,
    pub bet_level_index: usize,
    pub lines: u32,
    pub total_bet: Credits,
    pub free_spins: u32,
    pub autoplay_remaining: Option<u32>,
    pub spin_in_flight: bool,
    pub win_presentation: bool,
    pub connection_locked: bool,
    pub volume: f32,
    pub spin_speed: SpinSpeed,
}

#[derive(Debug, Clone)]
struct InFlightSpin {
    transaction_id: TransactionId,
    free_spin: bool,
}

#[derive(Debug)]
struct Autoplay {
    remaining: u32,
    cancel: CancellationToken,
}

struct NexusState {
    ledger: TransactionLedger,
    bet: BetConfig,
    in_flight: Option<InFlightSpin>,
    win_presentation: bool,
    win_counter_animating: bool,
    autoplay: Option<Autoplay>,
    free_spins: u32,
    connection_locked: bool,
    volume: f32,
    spin_speed: SpinSpeed,
    paytable: Vec<PaytableEntry>,
}

impl NexusState {
    fn ineligibility(&self) -> Option<SpinRejection> {
        if self.connection_locked {
            Some(SpinRejection::ConnectionLost)
        } else if self.in_flight.is_some() {
            Some(SpinRejection::SpinInFlight)
        } else if self.win_counter_animating {
            Some(SpinRejection::WinCounter)
        } else if self.win_presentation {
            Some(SpinRejection::WinPresentation)
        } else {
            None
        }
    }

    fn stop_autoplay(&mut self) -> bool {
        match self.autoplay.take() {
            Some(autoplay) => {
                autoplay.cancel.cancel();
                tracing::info!(remaining = autoplay.remaining, "Autoplay stopped");
                true
            }
            None => false,
        }
    }

    /// Re-enable wager controls if nothing holds them locked.
    fn release_controls(&self) -> Option<GamePayload> {
        let idle = self.in_flight.is_none()
            && self.autoplay.is_none()
            && self.free_spins == 0
            && !self.connection_locked;
        idle.then(|| wager_controls(true))
    }

    fn bet_locked(&self) -> bool {
        self.in_flight.is_some() || self.autoplay.is_some() || self.free_spins > 0
    }
}

fn wager_controls(enabled: bool) -> GamePayload {
    GamePayload::SetBatchComponentState {
        components: ComponentId::WAGER_CONTROLS
            .iter()
            .map(|id| ComponentState::enabled(*id, enabled))
            .collect(),
    }
}

fn all_controls(enabled: bool) -> GamePayload {
    GamePayload::SetBatchComponentState {
        components: ALL_CONTROLS
            .iter()
            .map(|id| ComponentState::enabled(*id, enabled))
            .collect(),
    }
}

pub struct SlotNexus {
    bridge: Arc<CommunicationBridge>,
    distributor: Arc<EventDistributor>,
    player_id: PlayerId,
    session_id: SessionId,
    autoplay_delay: Duration,
    state: Mutex<NexusState>,
}

impl SlotNexus {
    pub fn new(
        bridge: Arc<CommunicationBridge>,
        distributor: Arc<EventDistributor>,
        settings: NexusSettings,
    ) -> Self {
        Self {
            bridge,
            distributor,
            player_id: settings.player_id,
            session_id: settings.session_id,
            autoplay_delay: settings.autoplay_delay,
            state: Mutex::new(NexusState {
                ledger: TransactionLedger::new(settings.opening_balance),
                bet: settings.bet,
                in_flight: None,
                win_presentation: false,
                win_counter_animating: false,
                autoplay: None,
                free_spins: 0,
                connection_locked: false,
                volume: 1.0,
                spin_speed: SpinSpeed::default(),
                paytable: Vec::new(),
            }),
        }
    }

    pub fn player_id(&self) -> &PlayerId {
        &self.player_id
    }

    pub fn event_context(&self) -> EventContext {
        EventContext::now(self.player_id.clone(), self.session_id)
    }

    async fn emit(&self, payload: GamePayload) {
        // Routing failures are already logged by the distributor.
        let _ = self
            .distributor
            .emit_from_engine(GameEvent::new(payload, self.event_context()))
            .await;
    }

    async fn emit_all(&self, outbox: Vec<GamePayload>) {
        for payload in outbox {
            self.emit(payload).await;
        }
    }

    pub async fn snapshot(&self) -> NexusSnapshot {
        let state = self.state.lock().await;
        NexusSnapshot {
            balance: state.ledger.balance(),
            bet_level: state.bet.level(),
            bet_level_index: state.bet.level_index(),
            lines: state.bet.lines(),
            total_bet: state.bet.total_bet(),
            free_spins: state.free_spins,
            autoplay_remaining: state.autoplay.as_ref().map(|a| a.remaining),
            spin_in_flight: state.in_flight.is_some(),
            win_presentation: state.win_presentation,
            connection_locked: state.connection_locked,
            volume: state.volume,
            spin_speed: state.spin_speed,
        }
    }

    pub async fn balance(&self) -> Credits {
        self.state.lock().await.ledger.balance()
    }

    pub async fn history(&self, limit: usize) -> Vec<SpinTransaction> {
        self.state
            .lock()
            .await
            .ledger
            .transactions_for(&self.player_id, limit)
    }

    pub async fn journal(&self) -> Vec<LedgerEntry> {
        self.state.lock().await.ledger.journal().to_vec()
    }

    pub async fn paytable(&self) -> Vec<PaytableEntry> {
        self.state.lock().await.paytable.clone()
    }

    /// Sync balance and game state with the authority and bring the UI up.
    pub async fn initialize(&self) -> Result<(), BridgeError> {
        let balance = self.bridge.request_balance(&self.player_id).await?;
        let game_state = self.bridge.request_game_state(&self.player_id).await?;

        let mut state = self.state.lock().await;
        if balance.success {
            state.ledger.reconcile(balance.balance);
        } else {
            tracing::warn!(player_id = %self.player_id, "Balance unavailable, keeping local balance");
        }

        match game_state.state() {
            Some(restored) => {
                if let Some(free_spins) = restored.get("freeSpinsRemaining").and_then(|v| v.as_u64()) {
                    state.free_spins = u32::try_from(free_spins).unwrap_or(u32::MAX);
                }
                if let Some(paytable) = restored.get("paytable") {
                    match serde_json::from_value::<Vec<PaytableEntry>>(paytable.clone()) {
                        Ok(entries) => state.paytable = entries,
                        Err(e) => tracing::warn!(error = %e, "Ignoring malformed paytable"),
                    }
                }
            }
            None => tracing::warn!(?game_state, "Game state unavailable"),
        }

        let mut outbox = vec![
            GamePayload::SetBetValues {
                values: state.bet.levels().to_vec(),
                selected: state.bet.level_index(),
            },
            GamePayload::SetMaxLine {
                lines: state.bet.max_lines(),
            },
            GamePayload::SetLine {
                lines: state.bet.lines(),
            },
            GamePayload::SetPaytable {
                entries: state.paytable.clone(),
            },
            GamePayload::SetBalance {
                balance: state.ledger.balance(),
            },
            GamePayload::CloseWrapperLoading,
            GamePayload::ShowUi,
        ];
        if state.free_spins > 0 {
            outbox.push(wager_controls(false));
            outbox.push(GamePayload::toast(
                ToastKind::Info,
                format!("{} free spins remaining", state.free_spins),
            ));
        }
        tracing::info!(
            balance = state.ledger.balance(),
            free_spins = state.free_spins,
            "Session initialized"
        );
        drop(state);

        self.emit_all(outbox).await;
        Ok(())
    }

    /// Try to play one spin.
    pub async fn start_spin(&self) -> SpinOutcome {
        let (request, transaction_id, outbox) = {
            let mut state = self.state.lock().await;
            if let Some(rejection) = state.ineligibility() {
                tracing::debug!(?rejection, "Spin request ignored");
                return SpinOutcome::Rejected(rejection);
            }

            let free_spin = state.free_spins > 0;
            let bet_amount = if free_spin { 0 } else { state.bet.total_bet() };
            let balance = state.ledger.balance();

            if bet_amount > balance {
                let (outcome, outbox) = Self::de_escalate(&mut state, balance);
                drop(state);
                self.emit_all(outbox).await;
                return outcome;
            }

            let spin_id = SpinId::new();
            let transaction_id = match state.ledger.open(spin_id, self.player_id.clone(), bet_amount) {
                Ok(id) => id,
                Err(e) => {
                    tracing::warn!(error = %e, "Could not open transaction");
                    return SpinOutcome::Rejected(SpinRejection::InsufficientBalance);
                }
            };
            if free_spin {
                state.free_spins -= 1;
            }
            state.in_flight = Some(InFlightSpin {
                transaction_id: transaction_id.clone(),
                free_spin,
            });

            let request = SpinRequest {
                bet_amount,
                context: SpinContext {
                    player_id: self.player_id.clone(),
                    session_id: self.session_id,
                    spin_id,
                    bet_level: state.bet.level(),
                    lines: state.bet.lines(),
                    free_spin,
                },
            };
            tracing::info!(
                spin_id = %spin_id,
                transaction_id = %transaction_id,
                bet = bet_amount,
                free_spin,
                "Spin accepted"
            );
            let outbox = vec![
                GamePayload::SetBalance {
                    balance: state.ledger.balance(),
                },
                wager_controls(false),
            ];
            (request, transaction_id, outbox)
        };
        self.emit_all(outbox).await;

        let response = self
            .bridge
            .request_spin(request)
            .await
            .unwrap_or_else(|e| SpinResponse::failure(e.to_string()));

        match response.into_result() {
            Ok(result) => match self.complete_spin_transaction(&transaction_id, result).await {
                Ok(_) => SpinOutcome::Settled,
                Err(e) => {
                    // The result could not be applied; refund and release the spin.
                    let _ = self.fail_spin_transaction(&transaction_id, &e.to_string()).await;
                    SpinOutcome::Failed
                }
            },
            Err(error) => {
                let _ = self.fail_spin_transaction(&transaction_id, &error).await;
                SpinOutcome::Failed
            }
        }
    }

    fn de_escalate(state: &mut NexusState, balance: Credits) -> (SpinOutcome, Vec<GamePayload>) {
        let stopped_autoplay = state.stop_autoplay();
        let mut outbox = Vec::new();

        let outcome = match state.bet.fit_to_balance(balance) {
            Some(adjustment) => {
                state.bet.apply(adjustment);
                tracing::info!(
                    level = state.bet.level(),
                    lines = state.bet.lines(),
                    balance,
                    "Bet lowered to fit balance"
                );
                outbox.push(GamePayload::SetLine {
                    lines: adjustment.lines,
                });
                outbox.push(GamePayload::SetBetValueIndex {
                    index: adjustment.level_index,
                });
                outbox.push(GamePayload::toast(
                    ToastKind::Warning,
                    format!(
                        "Bet adjusted to {} x {} lines to fit your balance",
                        state.bet.level(),
                        state.bet.lines()
                    ),
                ));
                SpinOutcome::Adjusted(adjustment)
            }
            None => {
                tracing::info!(balance, "Balance below the smallest bet");
                outbox.push(GamePayload::toast(ToastKind::Error, "Insufficient balance"));
                SpinOutcome::Rejected(SpinRejection::InsufficientBalance)
            }
        };

        if stopped_autoplay {
            outbox.extend(state.release_controls());
        }
        outbox.push(GamePayload::SpinCompleted { success: false });
        (outcome, outbox)
    }

    /// Settle a pending spin. An unknown or already settled transaction is
    /// left untouched and reported as an error.
    pub async fn complete_spin_transaction(
        &self,
        transaction_id: &TransactionId,
        result: SpinResult,
    ) -> Result<SpinTransaction, LedgerError> {
        let mut state = self.state.lock().await;
        let transaction = state
            .ledger
            .complete(transaction_id, result.win_amount)
            .inspect_err(|e| {
                tracing::warn!(transaction_id = %transaction_id, error = %e, "Completion ignored")
            })?;
        if state
            .in_flight
            .as_ref()
            .is_some_and(|spin| &spin.transaction_id == transaction_id)
        {
            state.in_flight = None;
        }

        if let Some(authoritative) = result.balance {
            state.ledger.reconcile(authoritative);
        }

        let mut outbox = Vec::new();
        if result.win_amount > 0 {
            state.win_presentation = true;
            state.win_counter_animating = true;
            outbox.push(GamePayload::OnWin {
                amount: result.win_amount,
                lines: result.line_wins.clone(),
            });
            outbox.push(GamePayload::SetWinBox {
                amount: result.win_amount,
            });
        }
        if result.free_spins_awarded > 0 {
            state.free_spins = state.free_spins.saturating_add(result.free_spins_awarded);
            outbox.push(GamePayload::toast(
                ToastKind::Info,
                format!("{} free spins awarded", result.free_spins_awarded),
            ));
        }
        outbox.push(GamePayload::SetBalance {
            balance: state.ledger.balance(),
        });
        outbox.extend(state.release_controls());
        outbox.push(GamePayload::SpinCompleted { success: true });

        tracing::info!(
            transaction_id = %transaction_id,
            spin_id = %transaction.spin_id,
            bet = transaction.bet_amount,
            win = result.win_amount,
            balance = state.ledger.balance(),
            "Spin completed"
        );
        drop(state);

        self.emit_all(outbox).await;
        Ok(transaction)
    }

    /// Fail a pending spin and refund its bet in full.
    pub async fn fail_spin_transaction(
        &self,
        transaction_id: &TransactionId,
        error: &str,
    ) -> Result<SpinTransaction, LedgerError> {
        let mut state = self.state.lock().await;
        let transaction = state.ledger.fail(transaction_id).inspect_err(|e| {
            tracing::warn!(transaction_id = %transaction_id, error = %e, "Failure ignored")
        })?;
        if let Some(spin) = state.in_flight.take_if(|spin| &spin.transaction_id == transaction_id) {
            if spin.free_spin {
                state.free_spins += 1;
            }
        }
        state.stop_autoplay();

        let mut outbox = vec![
            GamePayload::SetBalance {
                balance: state.ledger.balance(),
            },
            GamePayload::toast(ToastKind::Error, format!("Spin failed: {error}")),
        ];
        outbox.extend(state.release_controls());
        outbox.push(GamePayload::SpinCompleted { success: false });

        tracing::warn!(
            transaction_id = %transaction_id,
            spin_id = %transaction.spin_id,
            refund = transaction.bet_amount,
            error,
            "Spin failed, bet refunded"
        );
        drop(state);

        self.emit_all(outbox).await;
        Ok(transaction)
    }

    /// Play `spins` paid spins in a row. Free spins won along the way are
    /// played too without counting against `spins`.
    pub async fn start_autoplay(self: &Arc<Self>, spins: u32) -> bool {
        if spins == 0 {
            return false;
        }
        let cancel = CancellationToken::new();
        {
            let mut state = self.state.lock().await;
            if state.autoplay.is_some() || state.connection_locked {
                return false;
            }
            state.autoplay = Some(Autoplay {
                remaining: spins,
                cancel: cancel.clone(),
            });
        }
        tracing::info!(spins, "Autoplay started");
        self.emit(wager_controls(false)).await;

        let nexus = Arc::clone(self);
        tokio::spawn(async move { nexus.run_autoplay(cancel).await });
        true
    }

    async fn run_autoplay(&self, cancel: CancellationToken) {
        loop {
            let free_spin = {
                let mut state = self.state.lock().await;
                if cancel.is_cancelled() || state.autoplay.is_none() {
                    break;
                }
                state.win_presentation = false;
                state.win_counter_animating = false;
                state.free_spins > 0
            };

            match self.start_spin().await {
                SpinOutcome::Settled => {
                    let mut guard = self.state.lock().await;
                    let state = &mut *guard;
                    if let Some(autoplay) = state.autoplay.as_mut() {
                        if !free_spin {
                            autoplay.remaining = autoplay.remaining.saturating_sub(1);
                        }
                        if autoplay.remaining == 0 && state.free_spins == 0 {
                            break;
                        }
                    }
                }
                SpinOutcome::Rejected(SpinRejection::SpinInFlight) => {}
                outcome => {
                    tracing::info!(?outcome, "Autoplay interrupted");
                    break;
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.autoplay_delay) => {}
            }
        }

        // A cancelled token means whoever stopped this run already released
        // the controls, and any autoplay now in the state belongs to a newer run.
        let outbox = {
            let mut state = self.state.lock().await;
            if cancel.is_cancelled() || state.autoplay.is_none() {
                None
            } else {
                state.autoplay = None;
                tracing::info!("Autoplay finished");
                state.release_controls()
            }
        };
        self.emit_all(outbox.into_iter().collect()).await;
    }

    pub async fn stop_autoplay(&self) -> bool {
        let outbox = {
            let mut state = self.state.lock().await;
            if !state.stop_autoplay() {
                return false;
            }
            state.release_controls()
        };
        self.emit_all(outbox.into_iter().collect()).await;
        true
    }

    /// First press stops the win counter, second dismisses the presentation.
    pub async fn skip_win(&self) {
        let mut state = self.state.lock().await;
        if state.win_counter_animating {
            state.win_counter_animating = false;
        } else if state.win_presentation {
            state.win_presentation = false;
            drop(state);
            self.emit(GamePayload::SetWinBox { amount: 0 }).await;
        }
    }

    pub async fn dismiss_win(&self) {
        let mut state = self.state.lock().await;
        let was_presenting = state.win_presentation || state.win_counter_animating;
        state.win_presentation = false;
        state.win_counter_animating = false;
        drop(state);
        if was_presenting {
            self.emit(GamePayload::SetWinBox { amount: 0 }).await;
        }
    }

    pub async fn select_bet_level(&self, index: usize) -> bool {
        let mut state = self.state.lock().await;
        if !state.bet_locked() && state.bet.select_level(index) {
            tracing::debug!(index, level = state.bet.level(), "Bet level selected");
            return true;
        }
        let current = state.bet.level_index();
        drop(state);
        tracing::debug!(index, current, "Bet level change refused");
        self.emit(GamePayload::SetBetValueIndex { index: current }).await;
        false
    }

    pub async fn select_lines(&self, lines: u32) -> bool {
        let mut state = self.state.lock().await;
        if !state.bet_locked() && state.bet.select_lines(lines) {
            tracing::debug!(lines, "Line count selected");
            return true;
        }
        let current = state.bet.lines();
        drop(state);
        tracing::debug!(lines, current, "Line count change refused");
        self.emit(GamePayload::SetLine { lines: current }).await;
        false
    }

    pub async fn set_volume(&self, volume: f32) {
        self.state.lock().await.volume = volume.clamp(0.0, 1.0);
    }

    pub async fn set_spin_speed(&self, speed: SpinSpeed) {
        self.state.lock().await.spin_speed = speed;
    }

    /// Adopt the authority's balance. Skipped while a spin is in flight, since
    /// the authority may not have seen the pending deduction yet.
    pub async fn sync_balance(&self) -> bool {
        if self.state.lock().await.in_flight.is_some() {
            tracing::debug!("Balance sync skipped, spin in flight");
            return false;
        }
        let response = match self.bridge.request_balance(&self.player_id).await {
            Ok(response) if response.success => response,
            Ok(_) => {
                tracing::warn!("Balance sync failed");
                return false;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Balance sync failed");
                return false;
            }
        };
        self.adopt_balance(response.balance).await
    }

    async fn adopt_balance(&self, authoritative: Credits) -> bool {
        let balance = {
            let mut state = self.state.lock().await;
            if state.in_flight.is_some() {
                return false;
            }
            state.ledger.reconcile(authoritative);
            state.ledger.balance()
        };
        self.emit(GamePayload::SetBalance { balance }).await;
        true
    }

    /// Handle everything the Engine bus delivers.
    pub async fn handle_engine_event(self: Arc<Self>, event: GameEvent) {
        match event.payload {
            GamePayload::StartSpin => {
                let nexus = Arc::clone(&self);
                tokio::spawn(async move { nexus.start_spin().await });
            }
            GamePayload::StopSpin => tracing::debug!("Quick stop requested"),
            GamePayload::StartAutoPlay { spins } => {
                self.start_autoplay(spins).await;
            }
            GamePayload::StopAutoPlay => {
                self.stop_autoplay().await;
            }
            GamePayload::SetSpinSpeed { speed } => self.set_spin_speed(speed).await,
            GamePayload::SkipWin => self.skip_win().await,
            GamePayload::OnScreenClick => self.dismiss_win().await,
            GamePayload::SetVolume { volume } => self.set_volume(volume).await,
            GamePayload::SetBetValueIndex { index } => {
                self.select_bet_level(index).await;
            }
            GamePayload::SetLine { lines } => {
                self.select_lines(lines).await;
            }
            GamePayload::SetBalance { .. } | GamePayload::SyncBalance => {
                self.sync_balance().await;
            }
            other => tracing::debug!(event = %other.name(), "Unhandled engine event"),
        }
    }

    /// Subscribe to the Engine bus.
    pub fn attach(self: &Arc<Self>) -> SubscriptionId {
        let nexus: Weak<Self> = Arc::downgrade(self);
        self.distributor.engine_bus().subscribe_async(move |event| {
            let nexus = nexus.clone();
            async move {
                if let Some(nexus) = nexus.upgrade() {
                    nexus.handle_engine_event(event).await;
                }
            }
        })
    }

    /// Follow connection state and transport pushes from the bridge.
    pub fn watch_connection(self: &Arc<Self>) -> JoinHandle<()> {
        let nexus = Arc::downgrade(self);
        let mut lifecycle = self.bridge.subscribe_lifecycle();
        tokio::spawn(async move {
            loop {
                let event = match lifecycle.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Lifecycle events dropped");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                let Some(nexus) = nexus.upgrade() else {
                    break;
                };
                nexus.on_bridge_event(event).await;
            }
        })
    }

    async fn on_bridge_event(&self, event: BridgeEvent) {
        match event {
            BridgeEvent::Connection { state, .. } => match state {
                ConnectionState::Reconnecting | ConnectionState::Failed => {
                    self.lock_out(state).await
                }
                ConnectionState::Connected => self.restore_connection().await,
                ConnectionState::Connecting | ConnectionState::Disconnected => {}
            },
            BridgeEvent::Transport(TransportEvent::Fault { code, message }) => {
                self.on_fault(code, message).await
            }
            BridgeEvent::Transport(TransportEvent::Push(push)) => match push.to_payload() {
                Ok(GamePayload::SetBalance { balance }) => {
                    self.adopt_balance(balance).await;
                }
                Ok(payload) => self.emit(payload).await,
                Err(e) => tracing::debug!(event = %push.name, error = %e, "Ignoring unknown push"),
            },
            BridgeEvent::SpinRequest { .. }
            | BridgeEvent::SpinResponse { .. }
            | BridgeEvent::SpinError { .. } => {}
        }
    }

    async fn lock_out(&self, connection: ConnectionState) {
        let first_notice = {
            let mut state = self.state.lock().await;
            let first = !state.connection_locked;
            state.connection_locked = true;
            if first {
                state.stop_autoplay();
            }
            first
        };
        if !first_notice && connection != ConnectionState::Failed {
            return;
        }

        let (code, message) = match connection {
            ConnectionState::Failed => (
                "connection_failed",
                "Unable to reach the game server. Retry to continue.",
            ),
            _ => ("connection_lost", "Connection lost. Reconnecting..."),
        };
        tracing::warn!(%connection, "Locking UI until the connection recovers");
        self.emit_all(vec![
            GamePayload::ShowErrorPopup {
                code: code.to_string(),
                message: message.to_string(),
                blocking: true,
            },
            all_controls(false),
        ])
        .await;
    }

    async fn restore_connection(&self) {
        let outbox = {
            let mut state = self.state.lock().await;
            if !state.connection_locked {
                return;
            }
            state.connection_locked = false;
            let mut outbox = vec![GamePayload::SetComponentState(ComponentState::enabled(
                ComponentId::SpinButton,
                true,
            ))];
            outbox.extend(state.release_controls());
            outbox.push(GamePayload::toast(ToastKind::Info, "Connection restored"));
            outbox.push(GamePayload::SyncBalance);
            outbox
        };
        tracing::info!("Connection restored, unlocking UI");
        self.emit_all(outbox).await;
    }

    async fn on_fault(&self, code: String, message: String) {
        {
            let mut state = self.state.lock().await;
            state.connection_locked = true;
            state.stop_autoplay();
        }
        tracing::error!(%code, %message, "Session ended by server");
        self.emit_all(vec![
            GamePayload::ShowErrorPopup {
                code,
                message,
                blocking: true,
            },
            GamePayload::HideUi,
        ])
        .await;
    }
}
