//! Websocket message types.
//!
//! The client opens the socket with its identity credential and waits for the
//! server's first message:
//! - `ready`: session established, carries session data
//! - `disconnect`: server is closing the session (recoverable, client reconnects)
//! - `connect_error` / `error` / `duplicate_session`: terminal, carry a `code`
//!   that the UI shows in an error popup
//!
//! After `ready`, requests and replies travel as envelopes and the server may
//! push events at any time.

use serde::{Deserialize, Serialize};

use reelnexus_domain::Credits;

use crate::envelope::{PushEvent, ReplyEnvelope, RequestEnvelope};

/// Messages from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    Request(RequestEnvelope),
    Heartbeat,
}

/// Session data delivered with `ready`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
    pub session_id: String,
    #[serde(default)]
    pub balance: Option<Credits>,
}

/// Terminal failure notice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerFault {
    pub code: String,
    #[serde(default)]
    pub message: String,
}

/// Messages from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    Ready(SessionData),
    Disconnect,
    ConnectError(ServerFault),
    Error(ServerFault),
    DuplicateSession(ServerFault),
    Response(ReplyEnvelope),
    Event(PushEvent),
}

impl ServerMessage {
    /// The fault carried by a terminal notice, if this is one.
    pub fn terminal_fault(&self) -> Option<&ServerFault> {
        match self {
            ServerMessage::ConnectError(fault)
            | ServerMessage::Error(fault)
            | ServerMessage::DuplicateSession(fault) => Some(fault),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn duplicate_session_is_terminal() {
        let msg: ServerMessage = serde_json::from_value(json!({
            "type": "duplicate_session",
            "data": {"code": "E_DUP"}
        }))
        .unwrap();
        assert_eq!(msg.terminal_fault().map(|f| f.code.as_str()), Some("E_DUP"));
    }

    #[test]
    fn disconnect_needs_no_data() {
        let msg: ServerMessage = serde_json::from_str(r#"{"type":"disconnect"}"#).unwrap();
        assert_eq!(msg, ServerMessage::Disconnect);
        assert!(msg.terminal_fault().is_none());
    }

    #[test]
    fn ready_carries_session() {
        let msg: ServerMessage = serde_json::from_value(json!({
            "type": "ready",
            "data": {"sessionId": "s-1", "balance": 1000}
        }))
        .unwrap();
        assert_eq!(
            msg,
            ServerMessage::Ready(SessionData {
                session_id: "s-1".into(),
                balance: Some(1000)
            })
        );
    }
}
