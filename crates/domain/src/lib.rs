//! ReelNexus Domain - core vocabulary shared by every layer of the slot client.
//!
//! - `events`: the closed set of UI/Engine event names and their payload shapes
//! - `ids`: strongly typed identifiers
//! - `transaction`: spin transactions and their terminal-state rules
//! - `betting`: bet levels, line counts and automatic bet de-escalation
//! - `error`: the error taxonomy (transport, ledger, routing)

pub mod betting;
pub mod error;
pub mod events;
pub mod ids;
pub mod transaction;

pub use betting::{BetAdjustment, BetConfig};
pub use error::{LedgerError, RoutingError, TransportError};
pub use events::{
    ComponentId, ComponentState, EventContext, EventName, GameEvent, GamePayload, LineWin,
    PaytableEntry, SpinSpeed, ToastKind,
};
pub use ids::{PlayerId, SessionId, SpinId, TransactionId};
pub use transaction::{SpinTransaction, TransactionStatus};

/// Monetary amounts are carried in integer minor units (cents, credits).
pub type Credits = u64;
