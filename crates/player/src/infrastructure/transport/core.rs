//! Shared machinery for the correlated transports (socket and worker).
//!
//! - `PendingRequests` / `Correlator`: request ids, reply routing and deadlines
//! - `BackoffState`: reconnection delay schedule
//! - `Channel` / `ChannelSession`: how a concrete transport establishes and frames
//!   a session
//! - `ChannelAdapter`: the `TransportAdapter` built on top of a `Channel`, owning
//!   one supervisor task per `connect()` that pumps the session and reconnects
//!   after an unexpected close

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use reelnexus_domain::{Credits, PlayerId, TransportError};
use reelnexus_shared::{
    BalanceResponse, GameStateResponse, PlayerQuery, PushEvent, ReplyEnvelope, RequestEnvelope,
    RequestPayload, ServerFault, SpinRequest, SpinResponse, SpinResult,
};

use super::{TransportAdapter, TransportCallback, TransportEvent};
use crate::config::TransportKind;
use crate::infrastructure::messaging::ConnectionState;

/// Deadline for every correlated request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Deadline for a channel to announce readiness after opening.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);

// Reconnection schedule: 1s, 2s, 4s, 8s, 16s, then give up
pub const INITIAL_RETRY_DELAY_MS: u64 = 1_000;
pub const MAX_RETRY_DELAY_MS: u64 = 16_000;
pub const MAX_RETRY_ATTEMPTS: u32 = 5;
pub const BACKOFF_MULTIPLIER: f64 = 2.0;
/// A session that stayed up this long earns a fresh retry budget when it drops.
pub const STABLE_SESSION: Duration = Duration::from_secs(60);

const OUTBOUND_CAPACITY: usize = 32;

pub type ReplyResult = Result<ReplyEnvelope, TransportError>;

/// Tracks outstanding requests keyed by request id.
///
/// Every entry leaves the table exactly once: by reply, by timeout, or by
/// rejection on teardown. Removal of an absent id is a no-op.
#[derive(Default)]
pub struct PendingRequests {
    inner: HashMap<u64, oneshot::Sender<ReplyResult>>,
}

impl PendingRequests {
    pub fn insert(&mut self, request_id: u64, tx: oneshot::Sender<ReplyResult>) {
        self.inner.insert(request_id, tx);
    }

    pub fn contains(&self, request_id: u64) -> bool {
        self.inner.contains_key(&request_id)
    }

    pub fn remove(&mut self, request_id: u64) -> bool {
        self.inner.remove(&request_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Resolve and remove a pending request.
    ///
    /// Returns true if a pending request was found.
    pub fn resolve(&mut self, request_id: u64, result: ReplyResult) -> bool {
        if let Some(tx) = self.inner.remove(&request_id) {
            // The caller may have given up already; nothing to do then.
            let _ = tx.send(result);
            true
        } else {
            false
        }
    }

    /// Fail every pending request with `error`, returning how many there were.
    pub fn reject_all(&mut self, error: TransportError) -> usize {
        let count = self.inner.len();
        for (_, tx) in self.inner.drain() {
            let _ = tx.send(Err(error.clone()));
        }
        count
    }
}

/// Exponential backoff state shared by reconnect logic.
#[derive(Debug, Clone, Copy)]
pub struct BackoffState {
    attempts: u32,
    delay_ms: u64,
}

impl Default for BackoffState {
    fn default() -> Self {
        Self {
            attempts: 0,
            delay_ms: INITIAL_RETRY_DELAY_MS,
        }
    }
}

impl BackoffState {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn delay_ms(&self) -> u64 {
        self.delay_ms
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= MAX_RETRY_ATTEMPTS
    }

    /// Advance to the next attempt, updating the delay for the subsequent attempt.
    ///
    /// Returns the delay to wait *before* performing this attempt.
    pub fn next_delay_and_advance(&mut self) -> Option<u64> {
        if self.is_exhausted() {
            return None;
        }

        let current_delay = self.delay_ms;
        self.attempts += 1;
        self.delay_ms =
            ((self.delay_ms as f64) * BACKOFF_MULTIPLIER).min(MAX_RETRY_DELAY_MS as f64) as u64;
        Some(current_delay)
    }
}

/// A registered request waiting for its reply.
pub struct Ticket {
    pub request_id: u64,
    rx: oneshot::Receiver<ReplyResult>,
    deadline: Instant,
}

/// Request id allocation and reply correlation for one adapter.
#[derive(Clone)]
pub struct Correlator {
    next_id: Arc<AtomicU64>,
    pending: Arc<Mutex<PendingRequests>>,
    timeout: Duration,
}

impl Correlator {
    pub fn new(timeout: Duration) -> Self {
        Self {
            next_id: Arc::new(AtomicU64::new(1)),
            pending: Arc::new(Mutex::new(PendingRequests::default())),
            timeout,
        }
    }

    /// Monotonically increasing, starting at 1.
    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn register(&self, request_id: u64) -> Ticket {
        let (tx, rx) = oneshot::channel();
        let deadline = Instant::now() + self.timeout;
        self.pending.lock().insert(request_id, tx);
        Ticket {
            request_id,
            rx,
            deadline,
        }
    }

    /// Wait for the reply or the deadline, whichever comes first.
    pub async fn wait(&self, ticket: Ticket) -> ReplyResult {
        let Ticket {
            request_id,
            rx,
            deadline,
        } = ticket;

        match tokio::time::timeout_at(deadline, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(TransportError::Disconnected),
            Err(_) => {
                self.pending.lock().remove(request_id);
                tracing::warn!(request_id, "Request timed out");
                Err(TransportError::RequestTimeout {
                    request_id,
                    timeout_ms: self.timeout.as_millis() as u64,
                })
            }
        }
    }

    pub fn resolve(&self, reply: ReplyEnvelope) -> bool {
        let request_id = reply.id;
        self.pending.lock().resolve(request_id, Ok(reply))
    }

    pub fn fail(&self, request_id: u64, error: TransportError) -> bool {
        self.pending.lock().resolve(request_id, Err(error))
    }

    pub fn reject_all(&self, error: TransportError) -> usize {
        self.pending.lock().reject_all(error)
    }

    pub fn is_pending(&self, request_id: u64) -> bool {
        self.pending.lock().contains(request_id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

/// Push-event subscribers of one adapter.
#[derive(Clone, Default)]
pub struct Subscribers {
    inner: Arc<RwLock<Vec<TransportCallback>>>,
}

impl Subscribers {
    pub fn add(&self, callback: TransportCallback) {
        self.inner.write().push(callback);
    }

    pub fn publish(&self, event: TransportEvent) {
        let callbacks: Vec<TransportCallback> = self.inner.read().iter().cloned().collect();
        for callback in callbacks {
            callback(event.clone());
        }
    }

    pub fn clear(&self) -> usize {
        let mut inner = self.inner.write();
        let count = inner.len();
        inner.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

/// Publish-on-change wrapper around the adapter's state channel.
pub fn set_state(state: &watch::Sender<ConnectionState>, kind: TransportKind, new: ConnectionState) {
    let changed = state.send_if_modified(|current| {
        if *current == new {
            false
        } else {
            *current = new;
            true
        }
    });
    if changed {
        tracing::debug!(transport = %kind, state = %new, "Connection state changed");
    }
}

#[derive(Deserialize)]
struct BalanceData {
    balance: Credits,
}

fn reply_data(outcome: ReplyResult) -> Result<serde_json::Value, String> {
    outcome
        .map_err(|e| e.to_string())
        .and_then(ReplyEnvelope::into_result)
}

/// Interpret a spin reply, folding every failure into `success: false`.
pub fn spin_response(outcome: ReplyResult) -> SpinResponse {
    let data = match reply_data(outcome) {
        Ok(data) => data,
        Err(error) => {
            tracing::warn!(%error, "Spin request failed");
            return SpinResponse::failure(error);
        }
    };
    match serde_json::from_value::<SpinResult>(data) {
        Ok(result) => SpinResponse::ok(result),
        Err(e) => SpinResponse::failure(
            TransportError::protocol(format!("malformed spin result: {e}")).to_string(),
        ),
    }
}

pub fn balance_response(outcome: ReplyResult) -> BalanceResponse {
    match reply_data(outcome).map(serde_json::from_value::<BalanceData>) {
        Ok(Ok(data)) => BalanceResponse::ok(data.balance),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Malformed balance reply");
            BalanceResponse::failure()
        }
        Err(error) => {
            tracing::warn!(%error, "Balance request failed");
            BalanceResponse::failure()
        }
    }
}

pub fn game_state_response(outcome: ReplyResult) -> GameStateResponse {
    match reply_data(outcome) {
        Ok(state) => GameStateResponse::State(state),
        Err(error) => GameStateResponse::error(error),
    }
}

/// What a session produced besides nothing.
#[derive(Debug)]
pub enum Inbound {
    Reply(ReplyEnvelope),
    Push(PushEvent),
    /// The server ended the session for good
    Terminal(ServerFault),
    /// The server is closing the session; reconnecting is allowed
    Closed,
}

#[derive(Debug)]
pub enum EstablishError {
    Transport(TransportError),
    /// The server refused the session; retrying will not help
    Rejected(ServerFault),
}

impl From<TransportError> for EstablishError {
    fn from(error: TransportError) -> Self {
        EstablishError::Transport(error)
    }
}

/// Opens sessions for a `ChannelAdapter`.
#[async_trait]
pub trait Channel: Send + Sync + 'static {
    type Session: ChannelSession;

    /// Open the channel and complete its readiness handshake.
    async fn establish(&self) -> Result<Self::Session, EstablishError>;
}

/// One established session.
#[async_trait]
pub trait ChannelSession: Send + 'static {
    async fn send(&mut self, envelope: RequestEnvelope) -> Result<(), TransportError>;

    /// Next inbound message; `None` once the stream has ended.
    async fn recv(&mut self) -> Option<Inbound>;

    async fn heartbeat(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

enum SessionEnd {
    Cancelled,
    Lost,
    Terminal(ServerFault),
}

struct Shared<C: Channel> {
    kind: TransportKind,
    channel: C,
    correlator: Correlator,
    subscribers: Subscribers,
    state: watch::Sender<ConnectionState>,
    outbound: Mutex<Option<mpsc::Sender<RequestEnvelope>>>,
}

impl<C: Channel> Shared<C> {
    fn set_state(&self, new: ConnectionState) {
        set_state(&self.state, self.kind, new);
    }

    fn open_outbound(&self) -> mpsc::Receiver<RequestEnvelope> {
        let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);
        *self.outbound.lock() = Some(tx);
        rx
    }

    fn close_outbound(&self) {
        *self.outbound.lock() = None;
    }

    fn reject(&self, fault: ServerFault) {
        tracing::error!(transport = %self.kind, code = %fault.code, message = %fault.message, "Session rejected by server");
        self.close_outbound();
        let rejected = self.correlator.reject_all(TransportError::Disconnected);
        if rejected > 0 {
            tracing::debug!(rejected, "Rejected pending requests after terminal fault");
        }
        self.subscribers.publish(TransportEvent::Fault {
            code: fault.code,
            message: fault.message,
        });
        self.set_state(ConnectionState::Failed);
    }

    /// Owns a session until it is cancelled or can no longer be recovered.
    async fn supervise(
        self: Arc<Self>,
        mut session: C::Session,
        mut outbound: mpsc::Receiver<RequestEnvelope>,
        cancel: CancellationToken,
    ) {
        let mut backoff = BackoffState::default();
        loop {
            let connected_at = Instant::now();
            match self.pump(&mut session, &mut outbound, &cancel).await {
                SessionEnd::Cancelled => return,
                SessionEnd::Terminal(fault) => {
                    self.reject(fault);
                    return;
                }
                SessionEnd::Lost => {
                    self.close_outbound();
                    drop(session);
                    tracing::info!(transport = %self.kind, "Connection closed unexpectedly, initiating reconnection");
                    if connected_at.elapsed() >= STABLE_SESSION {
                        backoff.reset();
                    }
                    let Some(next) = self.reconnect(&mut backoff, &cancel).await else {
                        return;
                    };
                    session = next;
                    outbound = self.open_outbound();
                    self.set_state(ConnectionState::Connected);
                }
            }
        }
    }

    async fn pump(
        &self,
        session: &mut C::Session,
        outbound: &mut mpsc::Receiver<RequestEnvelope>,
        cancel: &CancellationToken,
    ) -> SessionEnd {
        let mut heartbeat =
            tokio::time::interval_at(Instant::now() + HEARTBEAT_INTERVAL, HEARTBEAT_INTERVAL);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return SessionEnd::Cancelled,
                Some(envelope) = outbound.recv() => {
                    let request_id = envelope.id;
                    if let Err(e) = session.send(envelope).await {
                        tracing::warn!(request_id, error = %e, "Failed to send request");
                        self.correlator.fail(request_id, e);
                        return SessionEnd::Lost;
                    }
                }
                _ = heartbeat.tick() => {
                    if let Err(e) = session.heartbeat().await {
                        tracing::warn!(error = %e, "Heartbeat failed");
                        return SessionEnd::Lost;
                    }
                }
                inbound = session.recv() => match inbound {
                    Some(Inbound::Reply(reply)) => {
                        let request_id = reply.id;
                        if !self.correlator.resolve(reply) {
                            tracing::debug!(request_id, "Reply for unknown or expired request");
                        }
                    }
                    Some(Inbound::Push(event)) => {
                        self.subscribers.publish(TransportEvent::Push(event));
                    }
                    Some(Inbound::Terminal(fault)) => return SessionEnd::Terminal(fault),
                    Some(Inbound::Closed) | None => return SessionEnd::Lost,
                },
            }
        }
    }

    /// Attempt to reconnect with exponential backoff
    async fn reconnect(
        &self,
        backoff: &mut BackoffState,
        cancel: &CancellationToken,
    ) -> Option<C::Session> {
        loop {
            if cancel.is_cancelled() {
                return None;
            }
            self.set_state(ConnectionState::Reconnecting);
            let Some(delay) = backoff.next_delay_and_advance() else {
                tracing::error!(transport = %self.kind, "Max reconnection attempts reached, giving up");
                self.set_state(ConnectionState::Failed);
                return None;
            };
            tracing::info!(
                transport = %self.kind,
                attempt = backoff.attempts(),
                max_attempts = MAX_RETRY_ATTEMPTS,
                delay_ms = delay,
                "Scheduling reconnection attempt"
            );

            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = tokio::time::sleep(Duration::from_millis(delay)) => {}
            }

            let attempt = tokio::select! {
                _ = cancel.cancelled() => return None,
                attempt = self.channel.establish() => attempt,
            };
            match attempt {
                Ok(session) => {
                    tracing::info!(transport = %self.kind, attempt = backoff.attempts(), "Reconnected");
                    return Some(session);
                }
                Err(EstablishError::Rejected(fault)) => {
                    self.reject(fault);
                    return None;
                }
                Err(EstablishError::Transport(e)) => {
                    tracing::warn!(attempt = backoff.attempts(), error = %e, "Reconnection attempt failed");
                }
            }
        }
    }
}

/// `TransportAdapter` over any correlated `Channel`.
pub struct ChannelAdapter<C: Channel> {
    shared: Arc<Shared<C>>,
    session_cancel: Mutex<Option<CancellationToken>>,
}

impl<C: Channel> ChannelAdapter<C> {
    pub fn new(kind: TransportKind, channel: C) -> Self {
        Self::with_timeout(kind, channel, REQUEST_TIMEOUT)
    }

    pub fn with_timeout(kind: TransportKind, channel: C, timeout: Duration) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            shared: Arc::new(Shared {
                kind,
                channel,
                correlator: Correlator::new(timeout),
                subscribers: Subscribers::default(),
                state,
                outbound: Mutex::new(None),
            }),
            session_cancel: Mutex::new(None),
        }
    }

    pub fn pending_requests(&self) -> usize {
        self.shared.correlator.pending_count()
    }

    fn stop_session(&self) {
        let cancel = self.session_cancel.lock().take();
        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        self.shared.close_outbound();
    }

    async fn call(&self, payload: RequestPayload) -> ReplyResult {
        let outbound = self
            .shared
            .outbound
            .lock()
            .clone()
            .ok_or(TransportError::NotConnected)?;

        let correlator = &self.shared.correlator;
        let request_id = correlator.next_id();
        let envelope = payload
            .into_envelope(request_id)
            .map_err(|e| TransportError::protocol(e.to_string()))?;
        let ticket = correlator.register(request_id);
        tracing::debug!(
            request_id,
            kind = envelope.kind.as_str(),
            transport = %self.shared.kind,
            "Sending request"
        );

        if outbound.send(envelope).await.is_err() {
            correlator.fail(request_id, TransportError::NotConnected);
        }
        correlator.wait(ticket).await
    }
}

#[async_trait]
impl<C: Channel> TransportAdapter for ChannelAdapter<C> {
    fn kind(&self) -> TransportKind {
        self.shared.kind
    }

    fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    async fn connect(&self) -> Result<(), TransportError> {
        self.stop_session();
        self.shared.correlator.reject_all(TransportError::Disconnected);
        self.shared.set_state(ConnectionState::Connecting);

        match self.shared.channel.establish().await {
            Ok(session) => {
                let cancel = CancellationToken::new();
                *self.session_cancel.lock() = Some(cancel.clone());
                let outbound = self.shared.open_outbound();
                self.shared.set_state(ConnectionState::Connected);
                tracing::info!(transport = %self.shared.kind, "Connected");
                tokio::spawn(Arc::clone(&self.shared).supervise(session, outbound, cancel));
                Ok(())
            }
            Err(EstablishError::Transport(e)) => {
                tracing::error!(transport = %self.shared.kind, error = %e, "Failed to connect");
                self.shared.set_state(ConnectionState::Failed);
                Err(e)
            }
            Err(EstablishError::Rejected(fault)) => {
                let error = TransportError::connection(format!("{}: {}", fault.code, fault.message));
                self.shared.reject(fault);
                Err(error)
            }
        }
    }

    async fn disconnect(&self) {
        self.stop_session();
        let rejected = self.shared.correlator.reject_all(TransportError::Disconnected);
        if rejected > 0 {
            tracing::debug!(rejected, "Cleared pending requests on disconnect");
        }
        self.shared.subscribers.clear();
        self.shared.set_state(ConnectionState::Disconnected);
    }

    async fn request_spin(&self, request: SpinRequest) -> SpinResponse {
        spin_response(self.call(RequestPayload::Spin(request)).await)
    }

    async fn request_balance(&self, player_id: &PlayerId) -> BalanceResponse {
        let query = PlayerQuery {
            player_id: player_id.clone(),
        };
        balance_response(self.call(RequestPayload::Balance(query)).await)
    }

    async fn request_game_state(&self, player_id: &PlayerId) -> GameStateResponse {
        let query = PlayerQuery {
            player_id: player_id.clone(),
        };
        game_state_response(self.call(RequestPayload::GameState(query)).await)
    }

    fn subscribe(&self, callback: TransportCallback) {
        self.shared.subscribers.add(callback);
    }
}
