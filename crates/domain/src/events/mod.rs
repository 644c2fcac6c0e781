//! UI <-> Engine event vocabulary.
//!
//! Every event that crosses the presentation/game-logic boundary is one variant of
//! [`GamePayload`]. The enum is closed, so routes, transforms and subscribers all
//! agree on payload shape at compile time. On the wire a payload is
//! `{"type": "<eventName>", "data": {...}}`, matching the names the UI collaborator
//! already speaks.

mod payload;

pub use payload::{
    ComponentId, ComponentState, GamePayload, LineWin, PaytableEntry, SpinSpeed, ToastKind,
};

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{PlayerId, SessionId};

/// Literal event names as used by the UI collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventName {
    // Consumed from UI
    StartSpin,
    StopSpin,
    StartAutoPlay,
    StopAutoPlay,
    SetSpinSpeed,
    SkipWin,
    OnScreenClick,
    // Bi-directional
    SetVolume,
    SetBetValueIndex,
    SetBalance,
    SetLine,
    // Produced toward UI
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
    #[serde(rename = "showUI")]
    ShowUi,
    #[serde(rename = "hideUI")]
    HideUi,
    ShowToast,
    SpinCompleted,
    // Engine internal
    SyncBalance,
}

impl EventName {
    pub const ALL: [EventName; 26] = [
        EventName::StartSpin,
        EventName::StopSpin,
        EventName::StartAutoPlay,
        EventName::StopAutoPlay,
        EventName::SetSpinSpeed,
        EventName::SkipWin,
        EventName::OnScreenClick,
        EventName::SetVolume,
        EventName::SetBetValueIndex,
        EventName::SetBalance,
        EventName::SetLine,
        EventName::SetBetValues,
        EventName::ShowErrorPopup,
        EventName::SetBatchComponentState,
        EventName::SetComponentState,
        EventName::SetMessageBox,
        EventName::SetWinBox,
        EventName::OnWin,
        EventName::SetPaytable,
        EventName::SetMaxLine,
        EventName::CloseWrapperLoading,
        EventName::ShowUi,
        EventName::HideUi,
        EventName::ShowToast,
        EventName::SpinCompleted,
        EventName::SyncBalance,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventName::StartSpin => "startSpin",
            EventName::StopSpin => "stopSpin",
            EventName::StartAutoPlay => "startAutoPlay",
            EventName::StopAutoPlay => "stopAutoPlay",
            EventName::SetSpinSpeed => "setSpinSpeed",
            EventName::SkipWin => "skipWin",
            EventName::OnScreenClick => "onScreenClick",
            EventName::SetVolume => "setVolume",
            EventName::SetBetValueIndex => "setBetValueIndex",
            EventName::SetBalance => "setBalance",
            EventName::SetLine => "setLine",
            EventName::SetBetValues => "setBetValues",
            EventName::ShowErrorPopup => "showErrorPopup",
            EventName::SetBatchComponentState => "setBatchComponentState",
            EventName::SetComponentState => "setComponentState",
            EventName::SetMessageBox => "setMessageBox",
            EventName::SetWinBox => "setWinBox",
            EventName::OnWin => "onWin",
            EventName::SetPaytable => "setPaytable",
            EventName::SetMaxLine => "setMaxLine",
            EventName::CloseWrapperLoading => "closeWrapperLoading",
            EventName::ShowUi => "showUI",
            EventName::HideUi => "hideUI",
            EventName::ShowToast => "showToast",
            EventName::SpinCompleted => "spinCompleted",
            EventName::SyncBalance => "syncBalance",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventName::ALL
            .iter()
            .copied()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| format!("unknown event name: {s}"))
    }
}

/// Who emitted an event and when.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventContext {
    pub player_id: PlayerId,
    pub session_id: SessionId,
    pub timestamp: DateTime<Utc>,
}

impl EventContext {
    pub fn now(player_id: PlayerId, session_id: SessionId) -> Self {
        Self {
            player_id,
            session_id,
            timestamp: Utc::now(),
        }
    }
}

/// A named event travelling between the UI and Engine buses.
///
/// Immutable once emitted; forwarding code clones it rather than sharing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameEvent {
    #[serde(flatten)]
    pub payload: GamePayload,
    pub context: EventContext,
}

impl GameEvent {
    pub fn new(payload: GamePayload, context: EventContext) -> Self {
        Self { payload, context }
    }

    pub fn name(&self) -> EventName {
        self.payload.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names_parse_from_their_literals() {
        for name in EventName::ALL {
            assert_eq!(name.as_str().parse::<EventName>(), Ok(name));
        }
    }

    #[test]
    fn serde_names_match_literals() {
        assert_eq!(
            serde_json::to_string(&EventName::ShowUi).unwrap(),
            "\"showUI\""
        );
        assert_eq!(
            serde_json::to_string(&EventName::SetBetValueIndex).unwrap(),
            "\"setBetValueIndex\""
        );
    }

    #[test]
    fn unknown_name_is_rejected() {
        assert!("spinFaster".parse::<EventName>().is_err());
    }
}
