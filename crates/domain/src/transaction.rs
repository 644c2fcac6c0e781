//! Spin transactions.
//!
//! A transaction is opened exactly once per accepted spin and moves from
//! `Pending` to exactly one terminal state. Terminal states are final.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::ids::{PlayerId, SpinId, TransactionId};
use crate::Credits;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionStatus::Pending => write!(f, "pending"),
            TransactionStatus::Completed => write!(f, "completed"),
            TransactionStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpinTransaction {
    pub transaction_id: TransactionId,
    pub spin_id: SpinId,
    pub player_id: PlayerId,
    pub bet_amount: Credits,
    pub win_amount: Credits,
    pub timestamp: DateTime<Utc>,
    pub status: TransactionStatus,
}

impl SpinTransaction {
    pub fn open(
        transaction_id: TransactionId,
        spin_id: SpinId,
        player_id: PlayerId,
        bet_amount: Credits,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            transaction_id,
            spin_id,
            player_id,
            bet_amount,
            win_amount: 0,
            timestamp,
            status: TransactionStatus::Pending,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == TransactionStatus::Pending
    }

    /// Move to `Completed` with the given win.
    pub fn complete(&mut self, win_amount: Credits) -> Result<(), LedgerError> {
        self.ensure_pending()?;
        self.win_amount = win_amount;
        self.status = TransactionStatus::Completed;
        Ok(())
    }

    /// Move to `Failed`. The win stays at zero.
    pub fn fail(&mut self) -> Result<(), LedgerError> {
        self.ensure_pending()?;
        self.status = TransactionStatus::Failed;
        Ok(())
    }

    fn ensure_pending(&self) -> Result<(), LedgerError> {
        if self.is_pending() {
            Ok(())
        } else {
            Err(LedgerError::TransactionState {
                id: self.transaction_id.clone(),
                status: self.status,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending() -> SpinTransaction {
        SpinTransaction::open(
            TransactionId::new(1, 1),
            SpinId::new(),
            PlayerId::new("p1"),
            50,
            Utc::now(),
        )
    }

    #[test]
    fn completed_transaction_cannot_fail() {
        let mut tx = pending();
        tx.complete(120).unwrap();

        let err = tx.fail().unwrap_err();
        assert!(matches!(
            err,
            LedgerError::TransactionState {
                status: TransactionStatus::Completed,
                ..
            }
        ));
        assert_eq!(tx.status, TransactionStatus::Completed);
        assert_eq!(tx.win_amount, 120);
    }

    #[test]
    fn second_completion_keeps_first_win() {
        let mut tx = pending();
        tx.complete(10).unwrap();
        assert!(tx.complete(999).is_err());
        assert_eq!(tx.win_amount, 10);
    }

    #[test]
    fn failed_is_terminal() {
        let mut tx = pending();
        tx.fail().unwrap();
        assert!(tx.status.is_terminal());
        assert!(tx.complete(5).is_err());
        assert_eq!(tx.win_amount, 0);
    }
}
