//! HTTP adapter: plain request/response calls plus a fixed-interval event pull.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use url::Url;

use reelnexus_domain::{PlayerId, TransportError};
use reelnexus_shared::{
    BalanceResponse, EventsPage, GameStateResponse, SpinRequest, SpinResponse,
};

use super::core::{set_state, Subscribers, REQUEST_TIMEOUT};
use super::{TransportAdapter, TransportCallback, TransportEvent};
use crate::config::TransportKind;
use crate::infrastructure::messaging::ConnectionState;

const API_KEY_HEADER: &str = "x-api-key";

pub struct PollAdapter {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    poll_interval: Duration,
    state: watch::Sender<ConnectionState>,
    subscribers: Subscribers,
    poller: Mutex<Option<CancellationToken>>,
    /// Last event cursor seen; survives reconnects so events are not replayed.
    cursor: Arc<AtomicU64>,
}

impl PollAdapter {
    pub fn new(base_url: &Url, api_key: Option<String>, poll_interval: Duration) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        let (state, _) = watch::channel(ConnectionState::Disconnected);

        Self {
            client,
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
            api_key,
            poll_interval,
            state,
            subscribers: Subscribers::default(),
            poller: Mutex::new(None),
            cursor: Arc::new(AtomicU64::new(0)),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header(API_KEY_HEADER, key),
            None => builder,
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, TransportError> {
        fetch(self.authorize(builder)).await
    }

    fn stop_polling(&self) {
        let poller = self.poller.lock().take();
        if let Some(cancel) = poller {
            cancel.cancel();
        }
    }

    fn start_polling(&self) {
        let cancel = CancellationToken::new();
        let poller = Poller {
            client: self.client.clone(),
            events_url: self.url("events"),
            api_key: self.api_key.clone(),
            interval: self.poll_interval,
            subscribers: self.subscribers.clone(),
            cursor: Arc::clone(&self.cursor),
        };
        tokio::spawn(poller.run(cancel.clone()));
        *self.poller.lock() = Some(cancel);
    }
}

async fn fetch<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T, TransportError> {
    let response = builder
        .send()
        .await
        .map_err(|e| TransportError::connection(e.to_string()))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(TransportError::protocol(format!("HTTP {status}: {body}")));
    }

    response
        .json()
        .await
        .map_err(|e| TransportError::protocol(e.to_string()))
}

/// The event pull loop. Owns clones of everything it touches so it can outlive
/// the borrow of the adapter that spawned it.
struct Poller {
    client: Client,
    events_url: String,
    api_key: Option<String>,
    interval: Duration,
    subscribers: Subscribers,
    cursor: Arc<AtomicU64>,
}

impl Poller {
    async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let cursor = self.cursor.load(Ordering::Acquire);
            let mut request = self
                .client
                .get(&self.events_url)
                .query(&[("since", cursor)]);
            if let Some(key) = &self.api_key {
                request = request.header(API_KEY_HEADER, key);
            }

            match fetch::<EventsPage>(request).await {
                Ok(page) => {
                    if page.cursor < cursor {
                        tracing::debug!(cursor, reported = page.cursor, "Event cursor moved backwards, keeping ours");
                    } else {
                        self.cursor.store(page.cursor, Ordering::Release);
                    }
                    for event in page.events {
                        self.subscribers.publish(TransportEvent::Push(event));
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Event poll failed"),
            }
        }
        tracing::debug!("Event poll stopped");
    }
}

#[async_trait]
impl TransportAdapter for PollAdapter {
    fn kind(&self) -> TransportKind {
        TransportKind::Http
    }

    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    async fn connect(&self) -> Result<(), TransportError> {
        self.stop_polling();
        set_state(&self.state, TransportKind::Http, ConnectionState::Connecting);

        let probe = self
            .authorize(self.client.get(self.url("health")))
            .send()
            .await
            .map_err(|e| TransportError::connection(e.to_string()))
            .and_then(|response| {
                if response.status().is_success() {
                    Ok(())
                } else {
                    Err(TransportError::connection(format!(
                        "health check returned {}",
                        response.status()
                    )))
                }
            });

        if let Err(e) = probe {
            tracing::error!(base_url = %self.base_url, error = %e, "Failed to reach game server");
            set_state(&self.state, TransportKind::Http, ConnectionState::Failed);
            return Err(e);
        }

        self.start_polling();
        set_state(&self.state, TransportKind::Http, ConnectionState::Connected);
        tracing::info!(base_url = %self.base_url, "Connected");
        Ok(())
    }

    async fn disconnect(&self) {
        self.stop_polling();
        self.subscribers.clear();
        set_state(&self.state, TransportKind::Http, ConnectionState::Disconnected);
    }

    async fn request_spin(&self, request: SpinRequest) -> SpinResponse {
        let builder = self.client.post(self.url("spin")).json(&request);
        match self.fetch::<SpinResponse>(builder).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(spin_id = %request.context.spin_id, error = %e, "Spin request failed");
                SpinResponse::failure(e.to_string())
            }
        }
    }

    async fn request_balance(&self, player_id: &PlayerId) -> BalanceResponse {
        let builder = self
            .client
            .get(self.url("balance"))
            .query(&[("playerId", player_id.as_str())]);
        self.fetch::<BalanceResponse>(builder)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Balance request failed");
                BalanceResponse::failure()
            })
    }

    async fn request_game_state(&self, player_id: &PlayerId) -> GameStateResponse {
        let builder = self
            .client
            .get(self.url("state"))
            .query(&[("playerId", player_id.as_str())]);
        self.fetch::<GameStateResponse>(builder)
            .await
            .unwrap_or_else(|e| GameStateResponse::error(e.to_string()))
    }

    fn subscribe(&self, callback: TransportCallback) {
        self.subscribers.add(callback);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use axum::extract::Query;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use tokio::sync::mpsc;

    use reelnexus_shared::PushEvent;

    async fn serve(router: Router) -> Url {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        Url::parse(&format!("http://{addr}/api/")).unwrap()
    }

    async fn events(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
        let since: u64 = params.get("since").and_then(|s| s.parse().ok()).unwrap_or(0);
        if since == 0 {
            Json(json!({
                "events": [{"name": "setBalance", "data": {"balance": 900}}],
                "cursor": 1
            }))
        } else {
            Json(json!({"events": [], "cursor": since}))
        }
    }

    #[tokio::test]
    async fn health_probe_then_polled_events_reach_subscribers() {
        let router = Router::new()
            .route("/api/health", get(|| async { StatusCode::OK }))
            .route("/api/events", get(events));
        let base = serve(router).await;

        let adapter = PollAdapter::new(&base, None, Duration::from_millis(20));
        let (tx, mut rx) = mpsc::unbounded_channel();
        adapter.subscribe(Arc::new(move |event| {
            let _ = tx.send(event);
        }));

        adapter.connect().await.unwrap();
        assert_eq!(adapter.state(), ConnectionState::Connected);

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            TransportEvent::Push(PushEvent::new("setBalance", json!({"balance": 900})))
        );

        // The cursor advanced, so the same event is not delivered twice.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());

        // Nor after a reconnect restarts the poll loop.
        adapter.connect().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());

        adapter.disconnect().await;
        assert_eq!(adapter.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn balance_carries_player_and_api_key() {
        let router = Router::new().route(
            "/api/balance",
            get(
                |headers: HeaderMap, Query(params): Query<HashMap<String, String>>| async move {
                    let key_ok = headers.get("x-api-key").map(|v| v == "secret").unwrap_or(false);
                    if key_ok && params.get("playerId").map(String::as_str) == Some("p7") {
                        (StatusCode::OK, Json(json!({"balance": 4200, "success": true})))
                    } else {
                        (StatusCode::UNAUTHORIZED, Json(json!({})))
                    }
                },
            ),
        );
        let base = serve(router).await;

        let adapter = PollAdapter::new(&base, Some("secret".into()), Duration::from_secs(1));
        assert_eq!(
            adapter.request_balance(&PlayerId::new("p7")).await,
            BalanceResponse::ok(4200)
        );

        let anonymous = PollAdapter::new(&base, None, Duration::from_secs(1));
        assert!(!anonymous.request_balance(&PlayerId::new("p7")).await.success);
    }

    #[tokio::test]
    async fn unreachable_server_fails_connect() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let base = Url::parse(&format!("http://{addr}/")).unwrap();
        let adapter = PollAdapter::new(&base, None, Duration::from_secs(1));

        let err = adapter.connect().await.unwrap_err();
        assert!(matches!(err, TransportError::Connection(_)));
        assert_eq!(adapter.state(), ConnectionState::Failed);
    }

    #[tokio::test]
    async fn http_error_becomes_failed_spin() {
        let router = Router::new().route(
            "/api/spin",
            axum::routing::post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let base = serve(router).await;
        let adapter = PollAdapter::new(&base, None, Duration::from_secs(1));

        let request = SpinRequest {
            bet_amount: 10,
            context: reelnexus_shared::SpinContext {
                player_id: PlayerId::new("p1"),
                session_id: reelnexus_domain::SessionId::new(),
                spin_id: reelnexus_domain::SpinId::new(),
                bet_level: 1,
                lines: 10,
                free_spin: false,
            },
        };
        let response = adapter.request_spin(request).await;
        assert!(!response.success);
        assert!(response.error.unwrap().contains("500"));
    }
}
