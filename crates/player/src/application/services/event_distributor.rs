//! Event distributor: routes events between the UI bus and the Engine bus.
//!
//! Every event name has one registered route saying which way it may travel.
//! An emission is keyed by `DIRECTION:eventName`; while a key is in flight a
//! second emission with the same key is rejected as circular. The key is held
//! until every subscriber has finished handling the event. UI-originated keys
//! are additionally held for the settle window, measured from emission, which
//! debounces rapid duplicate input.
//!
//! Routing failures are logged, recorded in the audit log and returned; they
//! never affect other events.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::time::Instant;

use reelnexus_domain::{EventName, GameEvent, GamePayload, RoutingError};

use crate::config::DEFAULT_SETTLE_WINDOW_MS;
use crate::infrastructure::messaging::EventBus;

/// Audit entries kept per event name.
pub const AUDIT_LOG_CAPACITY: usize = 100;

pub const ENGINE_TARGET: &str = "slotEngine";
pub const UI_TARGET: &str = "gameUi";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteDirection {
    UiToEngine,
    EngineToUi,
    BiDirectional,
    Internal,
}

impl RouteDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            RouteDirection::UiToEngine => "UI_TO_ENGINE",
            RouteDirection::EngineToUi => "ENGINE_TO_UI",
            RouteDirection::BiDirectional => "BI_DIRECTIONAL",
            RouteDirection::Internal => "INTERNAL",
        }
    }

    fn accepts(self, source: EventSource) -> bool {
        match self {
            RouteDirection::UiToEngine => source == EventSource::Ui,
            RouteDirection::EngineToUi | RouteDirection::Internal => source == EventSource::Engine,
            RouteDirection::BiDirectional => true,
        }
    }
}

impl fmt::Display for RouteDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which domain emitted an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventSource {
    Ui,
    Engine,
}

impl EventSource {
    /// The direction an emission from this source travels.
    pub fn direction(self) -> RouteDirection {
        match self {
            EventSource::Ui => RouteDirection::UiToEngine,
            EventSource::Engine => RouteDirection::EngineToUi,
        }
    }
}

pub type RouteTransform = Arc<dyn Fn(GamePayload) -> GamePayload + Send + Sync>;

#[derive(Clone)]
pub struct EventRoute {
    pub direction: RouteDirection,
    pub target: String,
    pub transform: Option<RouteTransform>,
}

impl EventRoute {
    pub fn new(direction: RouteDirection, target: impl Into<String>) -> Self {
        Self {
            direction,
            target: target.into(),
            transform: None,
        }
    }

    /// The transform must return a payload for the same event.
    pub fn with_transform(
        mut self,
        transform: impl Fn(GamePayload) -> GamePayload + Send + Sync + 'static,
    ) -> Self {
        self.transform = Some(Arc::new(transform));
        self
    }
}

impl fmt::Debug for EventRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRoute")
            .field("direction", &self.direction)
            .field("target", &self.target)
            .field("transform", &self.transform.is_some())
            .finish()
    }
}

/// One audit log record.
#[derive(Debug, Clone, PartialEq)]
pub struct EventMetadata {
    pub event: EventName,
    pub direction: RouteDirection,
    pub source: EventSource,
    pub target: String,
    pub timestamp: DateTime<Utc>,
    pub validated: bool,
    pub rejection: Option<String>,
}

/// The slot game's routing table.
pub fn default_routes() -> Vec<(EventName, EventRoute)> {
    use EventName::*;

    let ui_to_engine = [
        StartSpin,
        StopSpin,
        StartAutoPlay,
        StopAutoPlay,
        SetSpinSpeed,
        SkipWin,
        OnScreenClick,
    ];
    let bi_directional = [SetVolume, SetBetValueIndex, SetBalance, SetLine];
    let engine_to_ui = [
        SetBetValues,
        ShowErrorPopup,
        SetBatchComponentState,
        SetComponentState,
        SetMessageBox,
        SetWinBox,
        OnWin,
        SetPaytable,
        SetMaxLine,
        CloseWrapperLoading,
        ShowUi,
        HideUi,
        ShowToast,
        SpinCompleted,
    ];

    ui_to_engine
        .into_iter()
        .map(|name| (name, EventRoute::new(RouteDirection::UiToEngine, ENGINE_TARGET)))
        .chain(bi_directional.into_iter().map(|name| {
            (
                name,
                EventRoute::new(
                    RouteDirection::BiDirectional,
                    format!("{ENGINE_TARGET}|{UI_TARGET}"),
                ),
            )
        }))
        .chain(
            engine_to_ui
                .into_iter()
                .map(|name| (name, EventRoute::new(RouteDirection::EngineToUi, UI_TARGET))),
        )
        .chain(std::iter::once((
            SyncBalance,
            EventRoute::new(RouteDirection::Internal, ENGINE_TARGET),
        )))
        .collect()
}

#[derive(Debug, Clone, Copy)]
enum Flight {
    Dispatching,
    /// Delivered, but still inside the settle window
    Settling(Instant),
}

/// Releases an in-flight key when dropped.
struct FlightGuard<'a> {
    in_flight: &'a Mutex<HashMap<String, Flight>>,
    key: String,
    settle_until: Option<Instant>,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.in_flight.lock();
        match self.settle_until {
            Some(until) if until > Instant::now() => {
                in_flight.insert(self.key.clone(), Flight::Settling(until));
            }
            _ => {
                in_flight.remove(&self.key);
            }
        }
    }
}

pub struct EventDistributor {
    routes: RwLock<HashMap<EventName, EventRoute>>,
    in_flight: Mutex<HashMap<String, Flight>>,
    audit: Mutex<HashMap<EventName, VecDeque<EventMetadata>>>,
    ui_bus: EventBus,
    engine_bus: EventBus,
    settle_window: Duration,
}

impl Default for EventDistributor {
    fn default() -> Self {
        Self::new(
            EventBus::new(),
            EventBus::new(),
            Duration::from_millis(DEFAULT_SETTLE_WINDOW_MS),
        )
    }
}

impl EventDistributor {
    /// Distributor with the default routing table.
    pub fn new(ui_bus: EventBus, engine_bus: EventBus, settle_window: Duration) -> Self {
        Self {
            routes: RwLock::new(default_routes().into_iter().collect()),
            in_flight: Mutex::new(HashMap::new()),
            audit: Mutex::new(HashMap::new()),
            ui_bus,
            engine_bus,
            settle_window,
        }
    }

    pub fn ui_bus(&self) -> &EventBus {
        &self.ui_bus
    }

    pub fn engine_bus(&self) -> &EventBus {
        &self.engine_bus
    }

    /// Register or replace a route; applies to events emitted afterwards.
    pub fn register_route(&self, event: EventName, route: EventRoute) -> Option<EventRoute> {
        tracing::debug!(%event, direction = %route.direction, target = %route.target, "Route registered");
        self.routes.write().insert(event, route)
    }

    pub fn unregister_route(&self, event: EventName) -> Option<EventRoute> {
        self.routes.write().remove(&event)
    }

    pub fn route_for(&self, event: EventName) -> Option<EventRoute> {
        self.routes.read().get(&event).cloned()
    }

    pub async fn emit_from_ui(&self, event: GameEvent) -> Result<(), RoutingError> {
        self.route(EventSource::Ui, event).await
    }

    pub async fn emit_from_engine(&self, event: GameEvent) -> Result<(), RoutingError> {
        self.route(EventSource::Engine, event).await
    }

    /// Audit records for `event`, oldest first.
    pub fn audit_log(&self, event: EventName) -> Vec<EventMetadata> {
        self.audit
            .lock()
            .get(&event)
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    async fn route(&self, source: EventSource, event: GameEvent) -> Result<(), RoutingError> {
        let name = event.name();
        let direction = source.direction();

        let Some(route) = self.route_for(name) else {
            tracing::warn!(event = %name, %direction, "No route registered, dropping event");
            return Err(RoutingError::Unregistered(name));
        };

        if !route.direction.accepts(source) {
            let error = RoutingError::DirectionMismatch {
                event: name,
                attempted: direction.as_str(),
            };
            return Err(self.reject(name, direction, source, &route, error));
        }

        let key = format!("{}:{}", direction.as_str(), name);
        let settle_until = match source {
            EventSource::Ui => Some(Instant::now() + self.settle_window),
            EventSource::Engine => None,
        };
        let Some(_guard) = self.begin(&key, settle_until) else {
            let error = RoutingError::Circular { key };
            return Err(self.reject(name, direction, source, &route, error));
        };

        let event = match &route.transform {
            Some(transform) => {
                let GameEvent { payload, context } = event;
                let payload = transform(payload);
                if payload.name() != name {
                    let error = RoutingError::TransformShape {
                        expected: name,
                        produced: payload.name(),
                    };
                    return Err(self.reject(name, direction, source, &route, error));
                }
                GameEvent::new(payload, context)
            }
            None => event,
        };

        self.record(EventMetadata {
            event: name,
            direction,
            source,
            target: route.target.clone(),
            timestamp: Utc::now(),
            validated: true,
            rejection: None,
        });

        let bus = match (route.direction, source) {
            (RouteDirection::UiToEngine | RouteDirection::Internal, _) => &self.engine_bus,
            (RouteDirection::EngineToUi, _) => &self.ui_bus,
            (RouteDirection::BiDirectional, EventSource::Ui) => &self.engine_bus,
            (RouteDirection::BiDirectional, EventSource::Engine) => &self.ui_bus,
        };
        tracing::debug!(event = %name, %direction, target = %route.target, "Routing event");
        bus.dispatch(event).await;
        Ok(())
    }

    fn begin(&self, key: &str, settle_until: Option<Instant>) -> Option<FlightGuard<'_>> {
        let mut in_flight = self.in_flight.lock();
        let busy = match in_flight.get(key) {
            Some(Flight::Dispatching) => true,
            Some(Flight::Settling(until)) => *until > Instant::now(),
            None => false,
        };
        if busy {
            return None;
        }
        in_flight.insert(key.to_string(), Flight::Dispatching);
        Some(FlightGuard {
            in_flight: &self.in_flight,
            key: key.to_string(),
            settle_until,
        })
    }

    fn reject(
        &self,
        event: EventName,
        direction: RouteDirection,
        source: EventSource,
        route: &EventRoute,
        error: RoutingError,
    ) -> RoutingError {
        tracing::warn!(%event, %direction, error = %error, "Event rejected");
        self.record(EventMetadata {
            event,
            direction,
            source,
            target: route.target.clone(),
            timestamp: Utc::now(),
            validated: false,
            rejection: Some(error.to_string()),
        });
        error
    }

    fn record(&self, metadata: EventMetadata) {
        let mut audit = self.audit.lock();
        let entries = audit.entry(metadata.event).or_default();
        if entries.len() == AUDIT_LOG_CAPACITY {
            entries.pop_front();
        }
        entries.push_back(metadata);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use reelnexus_domain::{EventContext, PlayerId, SessionId};

    fn event(payload: GamePayload) -> GameEvent {
        GameEvent::new(payload, EventContext::now(PlayerId::new("p1"), SessionId::new()))
    }

    fn capture(bus: &EventBus) -> Arc<Mutex<Vec<GameEvent>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.subscribe(move |event| sink.lock().push(event));
        seen
    }

    #[tokio::test]
    async fn ui_event_reaches_engine_unchanged() {
        let distributor = EventDistributor::default();
        let engine_seen = capture(distributor.engine_bus());
        let ui_seen = capture(distributor.ui_bus());

        let sent = event(GamePayload::StartAutoPlay { spins: 25 });
        distributor.emit_from_ui(sent.clone()).await.unwrap();

        assert_eq!(*engine_seen.lock(), vec![sent]);
        assert!(ui_seen.lock().is_empty());

        let log = distributor.audit_log(EventName::StartAutoPlay);
        assert_eq!(log.len(), 1);
        assert!(log[0].validated);
        assert_eq!(log[0].target, ENGINE_TARGET);
    }

    #[tokio::test]
    async fn bi_directional_goes_to_the_other_side() {
        let distributor = EventDistributor::default();
        let engine_seen = capture(distributor.engine_bus());
        let ui_seen = capture(distributor.ui_bus());

        distributor
            .emit_from_ui(event(GamePayload::SetVolume { volume: 0.5 }))
            .await
            .unwrap();
        distributor
            .emit_from_engine(event(GamePayload::SetVolume { volume: 0.25 }))
            .await
            .unwrap();

        assert_eq!(engine_seen.lock().len(), 1);
        assert_eq!(
            ui_seen.lock()[0].payload,
            GamePayload::SetVolume { volume: 0.25 }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_ui_emission_within_settle_window_is_dropped() {
        let distributor = EventDistributor::default();
        let delivered = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&delivered);
        distributor.engine_bus().subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        distributor.emit_from_ui(event(GamePayload::StartSpin)).await.unwrap();
        tokio::time::advance(Duration::from_millis(40)).await;
        let err = distributor
            .emit_from_ui(event(GamePayload::StartSpin))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RoutingError::Circular {
                key: "UI_TO_ENGINE:startSpin".to_string()
            }
        );
        assert_eq!(delivered.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_millis(61)).await;
        distributor.emit_from_ui(event(GamePayload::StartSpin)).await.unwrap();
        assert_eq!(delivered.load(Ordering::SeqCst), 2);

        let log = distributor.audit_log(EventName::StartSpin);
        assert_eq!(log.iter().filter(|m| !m.validated).count(), 1);
    }

    #[tokio::test]
    async fn re_entrant_emission_is_rejected_while_dispatching() {
        let distributor = Arc::new(EventDistributor::default());
        let reentry = Arc::new(Mutex::new(None));

        let inner = Arc::clone(&distributor);
        let result = Arc::clone(&reentry);
        distributor.ui_bus().subscribe_async(move |event| {
            let inner = Arc::clone(&inner);
            let result = Arc::clone(&result);
            async move {
                let outcome = inner.emit_from_engine(event).await;
                *result.lock() = Some(outcome);
            }
        });

        distributor
            .emit_from_engine(event(GamePayload::SetWinBox { amount: 40 }))
            .await
            .unwrap();

        assert!(matches!(
            reentry.lock().take(),
            Some(Err(RoutingError::Circular { .. }))
        ));
    }

    #[tokio::test]
    async fn consecutive_engine_emissions_are_not_debounced() {
        let distributor = EventDistributor::default();
        let ui_seen = capture(distributor.ui_bus());

        distributor
            .emit_from_engine(event(GamePayload::SetBalance { balance: 90 }))
            .await
            .unwrap();
        distributor
            .emit_from_engine(event(GamePayload::SetBalance { balance: 130 }))
            .await
            .unwrap();

        assert_eq!(ui_seen.lock().len(), 2);
    }

    #[tokio::test]
    async fn wrong_direction_and_unregistered_are_rejected() {
        let distributor = EventDistributor::default();

        let err = distributor
            .emit_from_ui(event(GamePayload::OnWin {
                amount: 1,
                lines: Vec::new(),
            }))
            .await
            .unwrap_err();
        assert!(matches!(err, RoutingError::DirectionMismatch { .. }));

        let err = distributor
            .emit_from_ui(event(GamePayload::SyncBalance))
            .await
            .unwrap_err();
        assert!(matches!(err, RoutingError::DirectionMismatch { .. }));

        distributor.unregister_route(EventName::SkipWin);
        assert_eq!(
            distributor
                .emit_from_ui(event(GamePayload::SkipWin))
                .await
                .unwrap_err(),
            RoutingError::Unregistered(EventName::SkipWin)
        );
    }

    #[tokio::test]
    async fn transforms_apply_and_must_keep_the_event_name() {
        let distributor = EventDistributor::default();
        let engine_seen = capture(distributor.engine_bus());

        distributor.register_route(
            EventName::SetVolume,
            EventRoute::new(RouteDirection::BiDirectional, ENGINE_TARGET).with_transform(
                |payload| match payload {
                    GamePayload::SetVolume { volume } => GamePayload::SetVolume {
                        volume: volume.clamp(0.0, 1.0),
                    },
                    other => other,
                },
            ),
        );
        distributor
            .emit_from_ui(event(GamePayload::SetVolume { volume: 3.0 }))
            .await
            .unwrap();
        assert_eq!(
            engine_seen.lock()[0].payload,
            GamePayload::SetVolume { volume: 1.0 }
        );

        distributor.register_route(
            EventName::StopSpin,
            EventRoute::new(RouteDirection::UiToEngine, ENGINE_TARGET)
                .with_transform(|_| GamePayload::StartSpin),
        );
        assert!(matches!(
            distributor.emit_from_ui(event(GamePayload::StopSpin)).await,
            Err(RoutingError::TransformShape { .. })
        ));
        assert_eq!(engine_seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn audit_log_is_bounded() {
        let distributor = EventDistributor::default();
        for balance in 0..(AUDIT_LOG_CAPACITY as u64 + 20) {
            distributor
                .emit_from_engine(event(GamePayload::SetBalance { balance }))
                .await
                .unwrap();
        }
        assert_eq!(
            distributor.audit_log(EventName::SetBalance).len(),
            AUDIT_LOG_CAPACITY
        );
    }
}
