use serde::{Deserialize, Serialize};

use super::EventName;
use crate::Credits;

/// Reel animation speed selected by the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpinSpeed {
    #[default]
    Normal,
    Fast,
    Turbo,
}

/// Wager-affecting and navigation controls the Engine can lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ComponentId {
    SpinButton,
    StopButton,
    BetSelector,
    LineSelector,
    AutoPlayButton,
    SettingsButton,
}

impl ComponentId {
    /// Controls that change the wager and must stay locked while a spin is in flight.
    pub const WAGER_CONTROLS: [ComponentId; 4] = [
        ComponentId::BetSelector,
        ComponentId::LineSelector,
        ComponentId::AutoPlayButton,
        ComponentId::SettingsButton,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentState {
    pub id: ComponentId,
    pub enabled: bool,
    pub visible: bool,
}

impl ComponentState {
    pub fn enabled(id: ComponentId, enabled: bool) -> Self {
        Self {
            id,
            enabled,
            visible: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToastKind {
    Info,
    Warning,
    Error,
}

/// One winning payline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineWin {
    pub line: u32,
    pub symbol: u8,
    pub count: u8,
    pub amount: Credits,
}

/// Paytable row: multipliers of the line bet for 3, 4 and 5 of a kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaytableEntry {
    pub symbol: u8,
    pub name: String,
    pub pays: [u32; 3],
}

/// Payload of every UI/Engine event, tagged by event name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum GamePayload {
    StartSpin,
    StopSpin,
    StartAutoPlay {
        spins: u32,
    },
    StopAutoPlay,
    SetSpinSpeed {
        speed: SpinSpeed,
    },
    SkipWin,
    OnScreenClick,
    SetVolume {
        volume: f32,
    },
    SetBetValueIndex {
        index: usize,
    },
    SetBalance {
        balance: Credits,
    },
    SetLine {
        lines: u32,
    },
    SetBetValues {
        values: Vec<Credits>,
        selected: usize,
    },
    ShowErrorPopup {
        code: String,
        message: String,
        blocking: bool,
    },
    SetBatchComponentState {
        components: Vec<ComponentState>,
    },
    SetComponentState(ComponentState),
    SetMessageBox {
        text: String,
    },
    SetWinBox {
        amount: Credits,
    },
    OnWin {
        amount: Credits,
        lines: Vec<LineWin>,
    },
    SetPaytable {
        entries: Vec<PaytableEntry>,
    },
    SetMaxLine {
        lines: u32,
    },
    CloseWrapperLoading,
    #[serde(rename = "showUI")]
    ShowUi,
    #[serde(rename = "hideUI")]
    HideUi,
    ShowToast {
        message: String,
        kind: ToastKind,
    },
    SpinCompleted {
        success: bool,
    },
    SyncBalance,
}

impl GamePayload {
    pub fn name(&self) -> EventName {
        match self {
            GamePayload::StartSpin => EventName::StartSpin,
            GamePayload::StopSpin => EventName::StopSpin,
            GamePayload::StartAutoPlay { .. } => EventName::StartAutoPlay,
            GamePayload::StopAutoPlay => EventName::StopAutoPlay,
            GamePayload::SetSpinSpeed { .. } => EventName::SetSpinSpeed,
            GamePayload::SkipWin => EventName::SkipWin,
            GamePayload::OnScreenClick => EventName::OnScreenClick,
            GamePayload::SetVolume { .. } => EventName::SetVolume,
            GamePayload::SetBetValueIndex { .. } => EventName::SetBetValueIndex,
            GamePayload::SetBalance { .. } => EventName::SetBalance,
            GamePayload::SetLine { .. } => EventName::SetLine,
            GamePayload::SetBetValues { .. } => EventName::SetBetValues,
            GamePayload::ShowErrorPopup { .. } => EventName::ShowErrorPopup,
            GamePayload::SetBatchComponentState { .. } => EventName::SetBatchComponentState,
            GamePayload::SetComponentState(_) => EventName::SetComponentState,
            GamePayload::SetMessageBox { .. } => EventName::SetMessageBox,
            GamePayload::SetWinBox { .. } => EventName::SetWinBox,
            GamePayload::OnWin { .. } => EventName::OnWin,
            GamePayload::SetPaytable { .. } => EventName::SetPaytable,
            GamePayload::SetMaxLine { .. } => EventName::SetMaxLine,
            GamePayload::CloseWrapperLoading => EventName::CloseWrapperLoading,
            GamePayload::ShowUi => EventName::ShowUi,
            GamePayload::HideUi => EventName::HideUi,
            GamePayload::ShowToast { .. } => EventName::ShowToast,
            GamePayload::SpinCompleted { .. } => EventName::SpinCompleted,
            GamePayload::SyncBalance => EventName::SyncBalance,
        }
    }

    pub fn toast(kind: ToastKind, message: impl Into<String>) -> Self {
        GamePayload::ShowToast {
            message: message.into(),
            kind,
        }
    }
}
