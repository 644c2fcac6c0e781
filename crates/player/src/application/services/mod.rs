//! Application services
//!
//! - `communication_bridge`: single entry point for spin/balance/state requests
//! - `communication_manager`: builds, swaps and connects the active transport
//! - `event_distributor`: routes events between the UI and Engine buses
//! - `transaction_ledger`: balance, spin transactions and their journal
//! - `slot_nexus`: spin orchestration on top of the ledger

pub mod communication_bridge;
pub mod communication_manager;
pub mod event_distributor;
pub mod slot_nexus;
pub mod transaction_ledger;

pub use communication_bridge::{BridgeEvent, CommunicationBridge};
pub use communication_manager::CommunicationManager;
pub use event_distributor::{
    default_routes, EventDistributor, EventMetadata, EventRoute, EventSource, RouteDirection,
};
pub use slot_nexus::{NexusSettings, NexusSnapshot, SlotNexus, SpinOutcome, SpinRejection};
pub use transaction_ledger::{LedgerEntry, LedgerEntryKind, TransactionLedger};
