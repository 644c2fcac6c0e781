//! Websocket adapter.
//!
//! The identity credential travels as the `token` query parameter. After the
//! upgrade the server must announce `ready` within the handshake timeout;
//! `duplicate_session`, `connect_error` and `error` refuse the session for good.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use reelnexus_domain::TransportError;
use reelnexus_shared::{ClientMessage, RequestEnvelope, ServerMessage};

use super::core::{
    Channel, ChannelAdapter, ChannelSession, EstablishError, Inbound, HANDSHAKE_TIMEOUT,
};
use crate::config::TransportKind;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub type SocketAdapter = ChannelAdapter<SocketChannel>;

impl ChannelAdapter<SocketChannel> {
    pub fn for_url(socket_url: Url, token: impl Into<String>) -> Self {
        ChannelAdapter::new(
            TransportKind::WebSocket,
            SocketChannel {
                socket_url,
                token: token.into(),
            },
        )
    }
}

pub struct SocketChannel {
    socket_url: Url,
    token: String,
}

impl SocketChannel {
    fn endpoint(&self) -> Url {
        let mut url = self.socket_url.clone();
        url.query_pairs_mut().append_pair("token", &self.token);
        url
    }
}

#[async_trait]
impl Channel for SocketChannel {
    type Session = SocketSession;

    async fn establish(&self) -> Result<SocketSession, EstablishError> {
        let endpoint = self.endpoint();
        tracing::debug!(url = %self.socket_url, "Opening websocket");

        let handshake = async {
            let (stream, _) = connect_async(endpoint.as_str())
                .await
                .map_err(|e| TransportError::connection(e.to_string()))?;
            let mut session = SocketSession { stream };
            session.await_ready().await?;
            Ok::<_, EstablishError>(session)
        };

        tokio::time::timeout(HANDSHAKE_TIMEOUT, handshake)
            .await
            .map_err(|_| {
                EstablishError::Transport(TransportError::connection(format!(
                    "no ready message within {}ms",
                    HANDSHAKE_TIMEOUT.as_millis()
                )))
            })?
    }
}

pub struct SocketSession {
    stream: WsStream,
}

impl SocketSession {
    async fn await_ready(&mut self) -> Result<(), EstablishError> {
        loop {
            let message = self.next_server_message().await.ok_or_else(|| {
                TransportError::connection("socket closed before ready")
            })?;
            if let Some(fault) = message.terminal_fault() {
                return Err(EstablishError::Rejected(fault.clone()));
            }
            match message {
                ServerMessage::Ready(session) => {
                    tracing::info!(session_id = %session.session_id, "Session ready");
                    return Ok(());
                }
                ServerMessage::Disconnect => {
                    return Err(TransportError::connection("server disconnected during handshake").into());
                }
                other => tracing::debug!(?other, "Ignoring message before ready"),
            }
        }
    }

    /// Next decodable server message, or `None` once the socket is closed.
    async fn next_server_message(&mut self) -> Option<ServerMessage> {
        while let Some(frame) = self.stream.next().await {
            match frame {
                Ok(Message::Text(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                    Ok(message) => return Some(message),
                    Err(e) => tracing::warn!(error = %e, "Failed to parse server message"),
                },
                Ok(Message::Close(_)) => return None,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "Websocket read failed");
                    return None;
                }
            }
        }
        None
    }

    async fn send_message(&mut self, message: &ClientMessage) -> Result<(), TransportError> {
        let json = serde_json::to_string(message).map_err(|e| TransportError::protocol(e.to_string()))?;
        self.stream
            .send(Message::Text(json))
            .await
            .map_err(|e| TransportError::connection(e.to_string()))
    }
}

#[async_trait]
impl ChannelSession for SocketSession {
    async fn send(&mut self, envelope: RequestEnvelope) -> Result<(), TransportError> {
        self.send_message(&ClientMessage::Request(envelope)).await
    }

    async fn recv(&mut self) -> Option<Inbound> {
        loop {
            let message = self.next_server_message().await?;
            if let Some(fault) = message.terminal_fault() {
                return Some(Inbound::Terminal(fault.clone()));
            }
            match message {
                ServerMessage::Response(reply) => return Some(Inbound::Reply(reply)),
                ServerMessage::Event(event) => return Some(Inbound::Push(event)),
                ServerMessage::Disconnect => return Some(Inbound::Closed),
                ServerMessage::Ready(_) => tracing::debug!("Ignoring repeated ready"),
                _ => {}
            }
        }
    }

    async fn heartbeat(&mut self) -> Result<(), TransportError> {
        self.send_message(&ClientMessage::Heartbeat).await
    }
}
