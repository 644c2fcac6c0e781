//! Game authority port.

use async_trait::async_trait;
use serde_json::Value;

use reelnexus_domain::{Credits, PlayerId};
use reelnexus_shared::{SpinRequest, SpinResult};

use crate::error::AuthorityError;

/// The component that decides spin outcomes and holds the authoritative balance.
///
/// Implemented in-process by [`crate::SlotEngine`]; remote authorities are reached
/// through the client's transport adapters instead.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait GameAuthority: Send + Sync {
    /// Settle one spin: debit the stake, draw the reels, credit any win.
    async fn spin(&self, request: &SpinRequest) -> Result<SpinResult, AuthorityError>;

    async fn balance(&self, player_id: &PlayerId) -> Result<Credits, AuthorityError>;

    /// Opaque state used to restore a session (free spins left, last spin, paytable).
    async fn game_state(&self, player_id: &PlayerId) -> Result<Value, AuthorityError>;
}
