//! Correlated request/reply envelopes.
//!
//! Outbound: `{ "id": 3, "type": "spin", "data": {...} }`
//! Inbound:  `{ "id": 3, "success": true, "data": {...} }` or `{ "id": 3, "error": "..." }`
//!
//! Ids are assigned by the sending adapter and only need to be unique among its
//! outstanding requests.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use reelnexus_domain::GamePayload;

use crate::requests::RequestKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: RequestKind,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyEnvelope {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub data: Value,
}

impl ReplyEnvelope {
    pub fn ok(id: u64, data: Value) -> Self {
        Self {
            id,
            success: Some(true),
            error: None,
            data,
        }
    }

    pub fn err(id: u64, error: impl Into<String>) -> Self {
        Self {
            id,
            success: Some(false),
            error: Some(error.into()),
            data: Value::Null,
        }
    }

    pub fn into_result(self) -> Result<Value, String> {
        match (self.error, self.success) {
            (Some(error), _) => Err(error),
            (None, Some(false)) => Err("request failed".to_string()),
            (None, _) => Ok(self.data),
        }
    }
}

/// An unsolicited event pushed by the authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushEvent {
    pub name: String,
    #[serde(default)]
    pub data: Value,
}

impl PushEvent {
    pub fn new(name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    /// Interpret the push as one of the known UI/Engine events.
    pub fn to_payload(&self) -> Result<GamePayload, serde_json::Error> {
        let mut object = serde_json::Map::new();
        object.insert("type".to_string(), Value::String(self.name.clone()));
        if !self.data.is_null() {
            object.insert("data".to_string(), self.data.clone());
        }
        serde_json::from_value(Value::Object(object))
    }
}

/// Anything a worker may write on its output stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkerInbound {
    Event { event: PushEvent },
    Reply(ReplyEnvelope),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn error_reply_wins_over_data() {
        let reply: ReplyEnvelope =
            serde_json::from_value(json!({"id": 4, "error": "bad bet", "data": {"x": 1}}))
                .unwrap();
        assert_eq!(reply.into_result(), Err("bad bet".to_string()));
    }

    #[test]
    fn reply_without_success_flag_is_ok() {
        let reply: ReplyEnvelope =
            serde_json::from_value(json!({"id": 4, "data": {"balance": 10}})).unwrap();
        assert_eq!(reply.into_result().unwrap()["balance"], 10);
    }

    #[test]
    fn worker_stream_distinguishes_events_from_replies() {
        let event: WorkerInbound =
            serde_json::from_str(r#"{"event":{"name":"ready","data":{}}}"#).unwrap();
        assert!(matches!(event, WorkerInbound::Event { ref event } if event.name == "ready"));

        let reply: WorkerInbound =
            serde_json::from_str(r#"{"id":1,"success":true,"data":null}"#).unwrap();
        assert!(matches!(reply, WorkerInbound::Reply(ReplyEnvelope { id: 1, .. })));
    }

    #[test]
    fn push_maps_onto_known_event() {
        let push = PushEvent::new("setBalance", json!({"balance": 250}));
        assert_eq!(
            push.to_payload().unwrap(),
            GamePayload::SetBalance { balance: 250 }
        );
        assert!(PushEvent::new("jackpotFireworks", Value::Null)
            .to_payload()
            .is_err());
    }
}
