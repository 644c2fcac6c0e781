//! Headless console front-end.
//!
//! Each input line is parsed into a `Command`; gameplay commands are emitted as
//! UI events through the distributor, the rest act on the `AppContext` directly.

use std::ops::ControlFlow;
use std::str::FromStr;

use reelnexus_domain::{GameEvent, GamePayload, SpinSpeed};

use crate::config::TransportKind;
use crate::runner::AppContext;

pub const HELP: &str = "\
commands:
  spin              play one spin
  auto <n>          autoplay n spins
  stop              stop autoplay
  skip              skip the win presentation
  click             dismiss the win presentation
  bet <index>       select a bet level
  lines <n>         select the line count
  speed <normal|fast|turbo>
  volume <0..1>
  balance           show balance and bet
  history           show recent transactions
  mode <local|http|websocket|webworker>
  retry             reconnect the current transport
  quit";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Spin,
    Auto(u32),
    Stop,
    Skip,
    Click,
    Bet(usize),
    Lines(u32),
    Speed(SpinSpeed),
    Volume(f32),
    Balance,
    History,
    Mode(TransportKind),
    Retry,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("unknown command '{0}', try 'help'")]
    Unknown(String),
    #[error("'{command}' needs {expected}")]
    Argument {
        command: &'static str,
        expected: &'static str,
    },
}

fn argument<T: FromStr>(
    arg: Option<&str>,
    command: &'static str,
    expected: &'static str,
) -> Result<T, CommandError> {
    arg.and_then(|a| a.parse().ok())
        .ok_or(CommandError::Argument { command, expected })
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let head = words.next().unwrap_or_default().to_ascii_lowercase();
        let arg = words.next();

        let command = match head.as_str() {
            "spin" | "s" => Command::Spin,
            "auto" => Command::Auto(argument(arg, "auto", "a spin count")?),
            "stop" => Command::Stop,
            "skip" => Command::Skip,
            "click" => Command::Click,
            "bet" => Command::Bet(argument(arg, "bet", "a level index")?),
            "lines" => Command::Lines(argument(arg, "lines", "a line count")?),
            "speed" => Command::Speed(match arg.map(str::to_ascii_lowercase).as_deref() {
                Some("normal") => SpinSpeed::Normal,
                Some("fast") => SpinSpeed::Fast,
                Some("turbo") => SpinSpeed::Turbo,
                _ => {
                    return Err(CommandError::Argument {
                        command: "speed",
                        expected: "normal, fast or turbo",
                    })
                }
            }),
            "volume" => Command::Volume(argument(arg, "volume", "a number between 0 and 1")?),
            "balance" | "b" => Command::Balance,
            "history" => Command::History,
            "mode" => Command::Mode(argument(arg, "mode", "local, http, websocket or webworker")?),
            "retry" => Command::Retry,
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            other => return Err(CommandError::Unknown(other.to_string())),
        };
        Ok(command)
    }
}

impl Command {
    /// The UI event this command raises, if it is a gameplay command.
    pub fn ui_payload(&self) -> Option<GamePayload> {
        let payload = match self {
            Command::Spin => GamePayload::StartSpin,
            Command::Auto(spins) => GamePayload::StartAutoPlay { spins: *spins },
            Command::Stop => GamePayload::StopAutoPlay,
            Command::Skip => GamePayload::SkipWin,
            Command::Click => GamePayload::OnScreenClick,
            Command::Bet(index) => GamePayload::SetBetValueIndex { index: *index },
            Command::Lines(lines) => GamePayload::SetLine { lines: *lines },
            Command::Speed(speed) => GamePayload::SetSpinSpeed { speed: *speed },
            Command::Volume(volume) => GamePayload::SetVolume { volume: *volume },
            _ => return None,
        };
        Some(payload)
    }
}

/// Run one command. Breaks on `quit`.
pub async fn execute(app: &AppContext, command: Command) -> ControlFlow<()> {
    if let Some(payload) = command.ui_payload() {
        if let Err(e) = app.emit_from_ui(payload).await {
            println!("! {e}");
        }
        return ControlFlow::Continue(());
    }

    match command {
        Command::Balance => {
            let s = app.nexus.snapshot().await;
            println!(
                "balance {} | bet {} x {} lines = {} | free spins {}{}",
                s.balance,
                s.bet_level,
                s.lines,
                s.total_bet,
                s.free_spins,
                s.autoplay_remaining
                    .map(|n| format!(" | autoplay {n} left"))
                    .unwrap_or_default()
            );
        }
        Command::History => {
            let history = app.nexus.history(10).await;
            if history.is_empty() {
                println!("no spins yet");
            }
            for tx in history {
                println!(
                    "{} {:?} bet {} win {} at {}",
                    tx.transaction_id,
                    tx.status,
                    tx.bet_amount,
                    tx.win_amount,
                    tx.timestamp.format("%H:%M:%S")
                );
            }
        }
        Command::Mode(mode) => match app.switch_mode(mode).await {
            Ok(kind) => println!("transport: {kind}"),
            Err(e) => println!("! {e}"),
        },
        Command::Retry => {
            if let Err(e) = app.retry().await {
                println!("! {e}");
            }
        }
        Command::Help => println!("{HELP}"),
        Command::Quit => return ControlFlow::Break(()),
        _ => {}
    }
    ControlFlow::Continue(())
}

/// One-line rendering of a UI-bound event.
pub fn describe(event: &GameEvent) -> String {
    match &event.payload {
        GamePayload::SetBalance { balance } => format!("balance: {balance}"),
        GamePayload::OnWin { amount, lines } => {
            format!("WIN {amount} on {} line(s)", lines.len())
        }
        GamePayload::SetWinBox { amount } => format!("win box: {amount}"),
        GamePayload::ShowToast { message, kind } => format!("[{kind:?}] {message}"),
        GamePayload::ShowErrorPopup {
            code,
            message,
            blocking,
        } => format!(
            "popup {code}: {message}{}",
            if *blocking { " (blocking)" } else { "" }
        ),
        GamePayload::SpinCompleted { success } => {
            format!("spin {}", if *success { "completed" } else { "not played" })
        }
        GamePayload::SetLine { lines } => format!("lines: {lines}"),
        GamePayload::SetBetValueIndex { index } => format!("bet level index: {index}"),
        GamePayload::SetBetValues { values, selected } => {
            format!("bet levels: {values:?} (selected {selected})")
        }
        GamePayload::SetBatchComponentState { components } => {
            let enabled = components.iter().filter(|c| c.enabled).count();
            format!("controls: {enabled}/{} enabled", components.len())
        }
        other => other.name().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelnexus_domain::{EventContext, PlayerId, SessionId, ToastKind};

    #[test]
    fn parses_gameplay_commands() {
        assert_eq!("spin".parse::<Command>().unwrap(), Command::Spin);
        assert_eq!("auto 25".parse::<Command>().unwrap(), Command::Auto(25));
        assert_eq!("  BET 2 ".parse::<Command>().unwrap(), Command::Bet(2));
        assert_eq!(
            "speed turbo".parse::<Command>().unwrap(),
            Command::Speed(SpinSpeed::Turbo)
        );
        assert_eq!(
            "mode ws".parse::<Command>().unwrap(),
            Command::Mode(TransportKind::WebSocket)
        );
    }

    #[test]
    fn reports_bad_input() {
        assert_eq!(
            "auto many".parse::<Command>().unwrap_err(),
            CommandError::Argument {
                command: "auto",
                expected: "a spin count"
            }
        );
        assert!(matches!(
            "dance".parse::<Command>(),
            Err(CommandError::Unknown(word)) if word == "dance"
        ));
        assert!("".parse::<Command>().is_err());
    }

    #[test]
    fn only_gameplay_commands_raise_ui_events() {
        assert_eq!(
            Command::Lines(5).ui_payload(),
            Some(GamePayload::SetLine { lines: 5 })
        );
        assert_eq!(Command::Click.ui_payload(), Some(GamePayload::OnScreenClick));
        assert_eq!(Command::History.ui_payload(), None);
        assert_eq!(Command::Quit.ui_payload(), None);
    }

    #[test]
    fn describes_ui_events() {
        let context = EventContext::now(PlayerId::new("p1"), SessionId::new());
        let toast = GameEvent::new(
            GamePayload::toast(ToastKind::Warning, "bet lowered"),
            context.clone(),
        );
        assert_eq!(describe(&toast), "[Warning] bet lowered");

        let shown = GameEvent::new(GamePayload::ShowUi, context);
        assert_eq!(describe(&shown), "showUI");
    }
}
