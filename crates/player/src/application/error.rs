use thiserror::Error;

use reelnexus_domain::TransportError;

use crate::config::{ConfigError, TransportKind};

/// Errors from the communication bridge.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("No transport adapter configured")]
    NoAdapterConfigured,
}

/// Errors from configuring or driving the active transport.
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Local mode requires an in-process game authority")]
    NoLocalAuthority,

    #[error("Failed to connect {kind} transport: {source}")]
    Connect {
        kind: TransportKind,
        source: TransportError,
    },

    #[error("No transport configured")]
    NotConfigured,

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}
