//! Client configuration.
//!
//! Loaded from an optional `reelnexus.toml` next to the binary plus
//! `REELNEXUS__<SECTION>__<KEY>` environment variables, e.g.
//! `REELNEXUS__TRANSPORT__MODE=websocket`. `.env.local` / `.env` are read first by
//! the binary, so they can supply those variables too.
//!
//! `TransportSettings` is the loose, user-facing shape; `TransportConfig` is the
//! validated form the communication manager builds adapters from.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use reelnexus_domain::{BetConfig, Credits};

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_SETTLE_WINDOW_MS: u64 = 100;
pub const DEFAULT_AUTOPLAY_DELAY_MS: u64 = 500;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Transport mode '{mode}' requires setting '{setting}'")]
    Missing {
        mode: TransportKind,
        setting: &'static str,
    },

    #[error("Setting '{setting}' is not a valid URL ('{value}'): {source}")]
    InvalidUrl {
        setting: &'static str,
        value: String,
        source: url::ParseError,
    },

    #[error("Setting '{setting}' is invalid: {message}")]
    Invalid {
        setting: &'static str,
        message: String,
    },

    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),
}

/// Declared transport mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TransportKind {
    #[default]
    #[serde(rename = "local")]
    Local,
    #[serde(rename = "http")]
    Http,
    #[serde(rename = "websocket")]
    WebSocket,
    #[serde(rename = "webworker")]
    WebWorker,
}

impl TransportKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransportKind::Local => "local",
            TransportKind::Http => "http",
            TransportKind::WebSocket => "websocket",
            TransportKind::WebWorker => "webworker",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(TransportKind::Local),
            "http" => Ok(TransportKind::Http),
            "websocket" | "ws" => Ok(TransportKind::WebSocket),
            "webworker" | "worker" => Ok(TransportKind::WebWorker),
            other => Err(format!("unknown transport mode: {other}")),
        }
    }
}

/// Transport section as written by the user. Only the fields of the selected
/// mode are required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    pub mode: TransportKind,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub socket_url: Option<String>,
    pub socket_token: Option<String>,
    pub worker_path: Option<String>,
    pub worker_args: Vec<String>,
    pub poll_interval_ms: u64,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            mode: TransportKind::Local,
            base_url: None,
            api_key: None,
            socket_url: None,
            socket_token: None,
            worker_path: None,
            worker_args: Vec::new(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

/// Validated per-mode transport configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportConfig {
    Local,
    Http {
        base_url: Url,
        api_key: Option<String>,
        poll_interval: Duration,
    },
    WebSocket {
        socket_url: Url,
        token: String,
    },
    WebWorker {
        worker_path: PathBuf,
        args: Vec<String>,
    },
}

impl TransportConfig {
    pub fn kind(&self) -> TransportKind {
        match self {
            TransportConfig::Local => TransportKind::Local,
            TransportConfig::Http { .. } => TransportKind::Http,
            TransportConfig::WebSocket { .. } => TransportKind::WebSocket,
            TransportConfig::WebWorker { .. } => TransportKind::WebWorker,
        }
    }

    /// Validate the settings of the selected mode, failing on the first problem.
    pub fn from_settings(settings: &TransportSettings) -> Result<Self, ConfigError> {
        let mode = settings.mode;
        let required = |value: &Option<String>, setting: &'static str| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .ok_or(ConfigError::Missing { mode, setting })
        };

        match mode {
            TransportKind::Local => Ok(TransportConfig::Local),
            TransportKind::Http => {
                let base_url = parse_url("base_url", &required(&settings.base_url, "base_url")?)?;
                if !matches!(base_url.scheme(), "http" | "https") {
                    return Err(ConfigError::Invalid {
                        setting: "base_url",
                        message: format!("expected http(s) scheme, got '{}'", base_url.scheme()),
                    });
                }
                if settings.poll_interval_ms == 0 {
                    return Err(ConfigError::Invalid {
                        setting: "poll_interval_ms",
                        message: "must be greater than zero".to_string(),
                    });
                }
                Ok(TransportConfig::Http {
                    base_url,
                    api_key: settings.api_key.clone().filter(|k| !k.is_empty()),
                    poll_interval: Duration::from_millis(settings.poll_interval_ms),
                })
            }
            TransportKind::WebSocket => {
                let socket_url =
                    parse_url("socket_url", &required(&settings.socket_url, "socket_url")?)?;
                if !matches!(socket_url.scheme(), "ws" | "wss") {
                    return Err(ConfigError::Invalid {
                        setting: "socket_url",
                        message: format!("expected ws(s) scheme, got '{}'", socket_url.scheme()),
                    });
                }
                Ok(TransportConfig::WebSocket {
                    socket_url,
                    token: required(&settings.socket_token, "socket_token")?,
                })
            }
            TransportKind::WebWorker => Ok(TransportConfig::WebWorker {
                worker_path: PathBuf::from(required(&settings.worker_path, "worker_path")?),
                args: settings.worker_args.clone(),
            }),
        }
    }
}

fn parse_url(setting: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|source| ConfigError::InvalidUrl {
        setting,
        value: value.to_string(),
        source,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub player_id: String,
    /// Resume an existing session instead of starting a new one.
    pub session_id: Option<String>,
    /// Identity credential; used as the socket token when none is configured.
    pub credential: Option<String>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            player_id: "player-1".to_string(),
            session_id: None,
            credential: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BettingSettings {
    pub levels: Vec<Credits>,
    pub default_level_index: usize,
    pub max_lines: u32,
}

impl Default for BettingSettings {
    fn default() -> Self {
        Self {
            levels: vec![1, 2, 5, 10, 20, 50],
            default_level_index: 0,
            max_lines: 10,
        }
    }
}

impl BettingSettings {
    pub fn bet_config(&self) -> BetConfig {
        if self.levels.is_empty() {
            return BetConfig::default();
        }
        BetConfig::new(self.levels.clone(), self.default_level_index, self.max_lines)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributorSettings {
    pub settle_window_ms: u64,
}

impl Default for DistributorSettings {
    fn default() -> Self {
        Self {
            settle_window_ms: DEFAULT_SETTLE_WINDOW_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoplaySettings {
    /// Pause between consecutive autoplay spins.
    pub spin_delay_ms: u64,
}

impl Default for AutoplaySettings {
    fn default() -> Self {
        Self {
            spin_delay_ms: DEFAULT_AUTOPLAY_DELAY_MS,
        }
    }
}

/// In-process authority used by `local` mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalSettings {
    pub starting_balance: Credits,
    pub seed: Option<u64>,
}

impl Default for LocalSettings {
    fn default() -> Self {
        Self {
            starting_balance: 1_000,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub transport: TransportSettings,
    pub session: SessionSettings,
    pub betting: BettingSettings,
    pub distributor: DistributorSettings,
    pub autoplay: AutoplaySettings,
    pub local: LocalSettings,
}

impl AppConfig {
    /// Load `reelnexus.toml` (optional) overlaid with `REELNEXUS__*` variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("reelnexus")
    }

    pub fn load_from(file_stem: &str) -> Result<Self, ConfigError> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::with_name(file_stem).required(false))
            .add_source(
                ::config::Environment::with_prefix("REELNEXUS")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("betting.levels")
                    .with_list_parse_key("transport.worker_args"),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Transport settings with the session credential filled in as socket token.
    pub fn transport_settings(&self) -> TransportSettings {
        let mut transport = self.transport.clone();
        if transport.socket_token.is_none() {
            transport.socket_token = self.session.credential.clone();
        }
        transport
    }

    pub fn settle_window(&self) -> Duration {
        Duration::from_millis(self.distributor.settle_window_ms)
    }

    pub fn autoplay_delay(&self) -> Duration {
        Duration::from_millis(self.autoplay.spin_delay_ms)
    }
}
