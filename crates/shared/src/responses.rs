//! Responses from authority to client.
//!
//! Every response is a plain value: transport failures are folded into
//! `success: false` / `error` fields instead of surfacing as errors.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use reelnexus_domain::{Credits, LineWin, SpinId};

/// Outcome of one spin as decided by the authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpinResult {
    pub spin_id: SpinId,
    /// Visible symbol window, one column per reel.
    pub reels: Vec<Vec<u8>>,
    pub win_amount: Credits,
    #[serde(default)]
    pub line_wins: Vec<LineWin>,
    #[serde(default)]
    pub free_spins_awarded: u32,
    /// Authoritative balance after settlement, when the authority reports it.
    #[serde(default)]
    pub balance: Option<Credits>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpinResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<SpinResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SpinResponse {
    pub fn ok(result: SpinResult) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }

    /// Collapse into the settled result, treating `success` without a result as a failure.
    pub fn into_result(self) -> Result<SpinResult, String> {
        match (self.success, self.result) {
            (true, Some(result)) => Ok(result),
            (true, None) => Err("spin response carried no result".to_string()),
            (false, _) => Err(self
                .error
                .unwrap_or_else(|| "spin rejected by authority".to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub balance: Credits,
    pub success: bool,
}

impl BalanceResponse {
    pub fn ok(balance: Credits) -> Self {
        Self {
            balance,
            success: true,
        }
    }

    pub fn failure() -> Self {
        Self {
            balance: 0,
            success: false,
        }
    }
}

/// Opaque game state, or an error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GameStateResponse {
    Error { error: String },
    State(Value),
}

impl GameStateResponse {
    pub fn error(msg: impl Into<String>) -> Self {
        GameStateResponse::Error { error: msg.into() }
    }

    pub fn state(&self) -> Option<&Value> {
        match self {
            GameStateResponse::State(value) => Some(value),
            GameStateResponse::Error { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn failure_serializes_without_result() {
        let value = serde_json::to_value(SpinResponse::failure("timeout")).unwrap();
        assert_eq!(value, json!({"success": false, "error": "timeout"}));
    }

    #[test]
    fn success_without_result_is_not_settled() {
        let response = SpinResponse {
            success: true,
            result: None,
            error: None,
        };
        assert!(response.into_result().is_err());
    }

    #[test]
    fn game_state_error_object_is_recognized() {
        let parsed: GameStateResponse =
            serde_json::from_value(json!({"error": "unknown player"})).unwrap();
        assert_eq!(parsed, GameStateResponse::error("unknown player"));

        let parsed: GameStateResponse =
            serde_json::from_value(json!({"freeSpinsRemaining": 3})).unwrap();
        assert_eq!(parsed.state().unwrap()["freeSpinsRemaining"], 3);
    }
}
