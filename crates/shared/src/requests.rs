//! Requests from client to authority.

use serde::{Deserialize, Serialize};

use reelnexus_domain::{Credits, PlayerId, SessionId, SpinId};

use crate::envelope::RequestEnvelope;
use crate::WireError;

/// Who is spinning and with which wager breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpinContext {
    pub player_id: PlayerId,
    pub session_id: SessionId,
    pub spin_id: SpinId,
    pub bet_level: Credits,
    pub lines: u32,
    #[serde(default)]
    pub free_spin: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpinRequest {
    pub bet_amount: Credits,
    pub context: SpinContext,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerQuery {
    pub player_id: PlayerId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RequestKind {
    Spin,
    Balance,
    GameState,
}

impl RequestKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestKind::Spin => "spin",
            RequestKind::Balance => "balance",
            RequestKind::GameState => "gameState",
        }
    }
}

/// A typed request before it is wrapped for a correlated transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestPayload {
    Spin(SpinRequest),
    Balance(PlayerQuery),
    GameState(PlayerQuery),
}

impl RequestPayload {
    pub fn kind(&self) -> RequestKind {
        match self {
            RequestPayload::Spin(_) => RequestKind::Spin,
            RequestPayload::Balance(_) => RequestKind::Balance,
            RequestPayload::GameState(_) => RequestKind::GameState,
        }
    }

    pub fn into_envelope(self, id: u64) -> Result<RequestEnvelope, WireError> {
        let kind = self.kind();
        let data = match self {
            RequestPayload::Spin(request) => serde_json::to_value(request),
            RequestPayload::Balance(query) | RequestPayload::GameState(query) => {
                serde_json::to_value(query)
            }
        }
        .map_err(|source| WireError::Encode {
            kind: kind.as_str(),
            source,
        })?;
        Ok(RequestEnvelope { id, kind, data })
    }

    /// Recover the typed request on the serving side.
    pub fn from_envelope(envelope: &RequestEnvelope) -> Result<Self, WireError> {
        let decode_err = |source| WireError::Decode {
            kind: envelope.kind.as_str(),
            source,
        };
        Ok(match envelope.kind {
            RequestKind::Spin => RequestPayload::Spin(
                serde_json::from_value(envelope.data.clone()).map_err(decode_err)?,
            ),
            RequestKind::Balance => RequestPayload::Balance(
                serde_json::from_value(envelope.data.clone()).map_err(decode_err)?,
            ),
            RequestKind::GameState => RequestPayload::GameState(
                serde_json::from_value(envelope.data.clone()).map_err(decode_err)?,
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn balance_request_envelope_shape() {
        let envelope = RequestPayload::Balance(PlayerQuery {
            player_id: PlayerId::new("p1"),
        })
        .into_envelope(7)
        .unwrap();

        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({"id": 7, "type": "balance", "data": {"playerId": "p1"}})
        );
    }

    #[test]
    fn spin_envelope_decodes_back_on_serving_side() {
        let request = SpinRequest {
            bet_amount: 100,
            context: SpinContext {
                player_id: PlayerId::new("p1"),
                session_id: SessionId::new(),
                spin_id: SpinId::new(),
                bet_level: 10,
                lines: 10,
                free_spin: false,
            },
        };
        let envelope = RequestPayload::Spin(request.clone())
            .into_envelope(1)
            .unwrap();

        match RequestPayload::from_envelope(&envelope).unwrap() {
            RequestPayload::Spin(decoded) => assert_eq!(decoded, request),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn mismatched_data_is_a_decode_error() {
        let envelope = RequestEnvelope {
            id: 1,
            kind: RequestKind::Spin,
            data: json!({"playerId": "p1"}),
        };
        assert!(matches!(
            RequestPayload::from_envelope(&envelope),
            Err(WireError::Decode { kind: "spin", .. })
        ));
    }
}
