//! Error taxonomy for the slot client.
//!
//! Each layer owns one enum:
//! - [`TransportError`]: channel-level failures, raised inside adapters and
//!   converted to structured `{success: false, error}` results at the adapter boundary
//! - [`LedgerError`]: monetary rule violations, resolved locally by the ledger
//! - [`RoutingError`]: event routing rejections, logged and dropped by the distributor

use thiserror::Error;

use crate::events::EventName;
use crate::ids::TransactionId;
use crate::transaction::TransactionStatus;
use crate::Credits;

/// Transport-level failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Channel could not be established or maintained
    #[error("Connection error: {0}")]
    Connection(String),

    /// No response arrived before the call's deadline
    #[error("Request {request_id} timed out after {timeout_ms}ms")]
    RequestTimeout { request_id: u64, timeout_ms: u64 },

    /// Malformed or unexpected payload
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Adapter was torn down while the request was outstanding
    #[error("Transport disconnected")]
    Disconnected,

    /// Request issued before `connect()` completed
    #[error("Not connected")]
    NotConnected,
}

impl TransportError {
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }
}

/// Ledger rule violations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Bet exceeds the available balance (after de-escalation was attempted)
    #[error("Insufficient balance: bet {required} exceeds balance {available}")]
    InsufficientBalance { required: Credits, available: Credits },

    /// Attempted to complete/fail a transaction that is not pending
    #[error("Transaction {id} is {status}, expected pending")]
    TransactionState {
        id: TransactionId,
        status: TransactionStatus,
    },

    /// Attempted to complete/fail a transaction the ledger never opened
    #[error("Unknown transaction {0}")]
    UnknownTransaction(TransactionId),

    /// Crediting the amount would overflow the balance
    #[error("Crediting {credit} to balance {balance} overflows")]
    BalanceOverflow { balance: Credits, credit: Credits },
}

/// Event routing rejections.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoutingError {
    /// No route registered for this event name
    #[error("No route registered for event '{0}'")]
    Unregistered(EventName),

    /// The same direction/event key is still in flight
    #[error("Circular routing suppressed for '{key}'")]
    Circular { key: String },

    /// The event was emitted from a domain its route does not accept
    #[error("Event '{event}' cannot travel {attempted}")]
    DirectionMismatch {
        event: EventName,
        attempted: &'static str,
    },

    /// A route transform produced a payload for a different event
    #[error("Transform for '{expected}' produced '{produced}'")]
    TransformShape {
        expected: EventName,
        produced: EventName,
    },
}
