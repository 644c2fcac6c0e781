//! Error types for the game authority.

use reelnexus_domain::{Credits, PlayerId};

/// Why the authority refused or could not settle a request.
#[derive(Debug, thiserror::Error)]
pub enum AuthorityError {
    /// Wager exceeds the player's authoritative balance.
    #[error("Insufficient funds: bet {required} exceeds balance {available}")]
    InsufficientFunds { required: Credits, available: Credits },

    /// Wager breakdown is malformed (unknown line count, stake mismatch, no free spins).
    #[error("Invalid bet: {0}")]
    InvalidBet(String),

    /// Player has no wallet and the authority does not open one implicitly.
    #[error("Unknown player: {0}")]
    UnknownPlayer(PlayerId),

    /// Authority is temporarily unable to answer.
    #[error("Authority unavailable: {0}")]
    Unavailable(String),
}

impl AuthorityError {
    pub fn invalid_bet(message: impl ToString) -> Self {
        Self::InvalidBet(message.to_string())
    }

    pub fn unavailable(message: impl ToString) -> Self {
        Self::Unavailable(message.to_string())
    }
}

/// Worker host I/O failures. Malformed requests are answered, not raised.
#[derive(Debug, thiserror::Error)]
pub enum WorkerHostError {
    #[error("Worker stream I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode worker message: {0}")]
    Encode(#[from] serde_json::Error),
}
