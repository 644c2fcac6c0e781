//! Transaction ledger: the client's balance and every spin transaction.
//!
//! All balance changes go through the ledger and each one appends a journal
//! entry, so the balance at any point can be replayed from the journal.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use reelnexus_domain::{
    Credits, LedgerError, PlayerId, SpinId, SpinTransaction, TransactionId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEntryKind {
    Opened,
    Completed,
    Failed,
    Reconciled,
}

/// Append-only journal record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub sequence: u64,
    pub kind: LedgerEntryKind,
    pub transaction_id: Option<TransactionId>,
    pub balance_before: Credits,
    pub balance_after: Credits,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug)]
pub struct TransactionLedger {
    balance: Credits,
    transactions: HashMap<TransactionId, SpinTransaction>,
    order: Vec<TransactionId>,
    journal: Vec<LedgerEntry>,
    next_transaction: u64,
}

impl TransactionLedger {
    pub fn new(opening_balance: Credits) -> Self {
        Self {
            balance: opening_balance,
            transactions: HashMap::new(),
            order: Vec::new(),
            journal: Vec::new(),
            next_transaction: 0,
        }
    }

    pub fn balance(&self) -> Credits {
        self.balance
    }

    /// Deduct `bet_amount` and open a pending transaction for the spin.
    pub fn open(
        &mut self,
        spin_id: SpinId,
        player_id: PlayerId,
        bet_amount: Credits,
    ) -> Result<TransactionId, LedgerError> {
        if bet_amount > self.balance {
            return Err(LedgerError::InsufficientBalance {
                required: bet_amount,
                available: self.balance,
            });
        }

        self.next_transaction += 1;
        let now = Utc::now();
        let transaction_id = TransactionId::new(now.timestamp_millis(), self.next_transaction);
        let before = self.balance;
        self.balance -= bet_amount;

        self.transactions.insert(
            transaction_id.clone(),
            SpinTransaction::open(transaction_id.clone(), spin_id, player_id, bet_amount, now),
        );
        self.order.push(transaction_id.clone());
        self.append(LedgerEntryKind::Opened, Some(transaction_id.clone()), before);

        tracing::debug!(
            transaction_id = %transaction_id,
            spin_id = %spin_id,
            bet = bet_amount,
            balance = self.balance,
            "Transaction opened"
        );
        Ok(transaction_id)
    }

    /// Settle a pending transaction and credit the win.
    pub fn complete(
        &mut self,
        transaction_id: &TransactionId,
        win_amount: Credits,
    ) -> Result<SpinTransaction, LedgerError> {
        let transaction = self
            .transactions
            .get_mut(transaction_id)
            .ok_or_else(|| LedgerError::UnknownTransaction(transaction_id.clone()))?;
        let credited = credit(self.balance, win_amount)?;
        transaction.complete(win_amount)?;
        let settled = transaction.clone();

        let before = self.balance;
        self.balance = credited;
        self.append(LedgerEntryKind::Completed, Some(transaction_id.clone()), before);
        Ok(settled)
    }

    /// Fail a pending transaction and refund its bet in full.
    pub fn fail(&mut self, transaction_id: &TransactionId) -> Result<SpinTransaction, LedgerError> {
        let transaction = self
            .transactions
            .get_mut(transaction_id)
            .ok_or_else(|| LedgerError::UnknownTransaction(transaction_id.clone()))?;
        let refunded = credit(self.balance, transaction.bet_amount)?;
        transaction.fail()?;
        let failed = transaction.clone();

        let before = self.balance;
        self.balance = refunded;
        self.append(LedgerEntryKind::Failed, Some(transaction_id.clone()), before);
        Ok(failed)
    }

    /// Adopt the authority's balance. Returns the journal entry if it changed anything.
    pub fn reconcile(&mut self, authoritative: Credits) -> Option<LedgerEntry> {
        if authoritative == self.balance {
            return None;
        }
        let before = self.balance;
        self.balance = authoritative;
        tracing::info!(before, after = authoritative, "Balance reconciled with authority");
        Some(self.append(LedgerEntryKind::Reconciled, None, before))
    }

    /// The player's transactions, newest first, at most `limit`.
    pub fn transactions_for(&self, player_id: &PlayerId, limit: usize) -> Vec<SpinTransaction> {
        self.order
            .iter()
            .rev()
            .filter_map(|id| self.transactions.get(id))
            .filter(|tx| &tx.player_id == player_id)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.transactions.values().filter(|tx| tx.is_pending()).count()
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn journal(&self) -> &[LedgerEntry] {
        &self.journal
    }

    fn append(
        &mut self,
        kind: LedgerEntryKind,
        transaction_id: Option<TransactionId>,
        balance_before: Credits,
    ) -> LedgerEntry {
        let entry = LedgerEntry {
            sequence: self.journal.len() as u64 + 1,
            kind,
            transaction_id,
            balance_before,
            balance_after: self.balance,
            timestamp: Utc::now(),
        };
        self.journal.push(entry.clone());
        entry
    }
}

fn credit(balance: Credits, amount: Credits) -> Result<Credits, LedgerError> {
    balance
        .checked_add(amount)
        .ok_or(LedgerError::BalanceOverflow {
            balance,
            credit: amount,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelnexus_domain::TransactionStatus;

    fn player() -> PlayerId {
        PlayerId::new("p1")
    }

    #[test]
    fn completion_credits_win_on_top_of_deduction() {
        let mut ledger = TransactionLedger::new(1_000);
        let id = ledger.open(SpinId::new(), player(), 100).unwrap();
        assert_eq!(ledger.balance(), 900);

        let tx = ledger.complete(&id, 250).unwrap();
        assert_eq!(tx.status, TransactionStatus::Completed);
        assert_eq!(ledger.balance(), 1_000 - 100 + 250);
    }

    #[test]
    fn failure_is_balance_neutral() {
        let mut ledger = TransactionLedger::new(500);
        let id = ledger.open(SpinId::new(), player(), 200).unwrap();
        ledger.fail(&id).unwrap();
        assert_eq!(ledger.balance(), 500);
        assert_eq!(ledger.pending_count(), 0);
    }

    #[test]
    fn terminal_transactions_reject_further_transitions() {
        let mut ledger = TransactionLedger::new(500);
        let id = ledger.open(SpinId::new(), player(), 50).unwrap();
        ledger.complete(&id, 10).unwrap();

        assert!(matches!(
            ledger.complete(&id, 999),
            Err(LedgerError::TransactionState { .. })
        ));
        assert!(ledger.fail(&id).is_err());
        assert_eq!(ledger.balance(), 460);

        let unknown = TransactionId::new(0, 42);
        assert_eq!(
            ledger.fail(&unknown).unwrap_err(),
            LedgerError::UnknownTransaction(unknown)
        );
    }

    #[test]
    fn overflowing_win_leaves_transaction_pending() {
        let mut ledger = TransactionLedger::new(100);
        let id = ledger.open(SpinId::new(), player(), 10).unwrap();

        assert_eq!(
            ledger.complete(&id, Credits::MAX).unwrap_err(),
            LedgerError::BalanceOverflow {
                balance: 90,
                credit: Credits::MAX
            }
        );
        assert_eq!(ledger.balance(), 90);
        assert_eq!(ledger.pending_count(), 1);
        assert_eq!(ledger.journal().len(), 1);

        // Still pending, so it can be failed and refunded.
        ledger.fail(&id).unwrap();
        assert_eq!(ledger.balance(), 100);
        assert_eq!(
            ledger.transactions_for(&player(), 1)[0].status,
            TransactionStatus::Failed
        );
    }

    #[test]
    fn bet_above_balance_opens_nothing() {
        let mut ledger = TransactionLedger::new(40);
        assert_eq!(
            ledger.open(SpinId::new(), player(), 50).unwrap_err(),
            LedgerError::InsufficientBalance {
                required: 50,
                available: 40
            }
        );
        assert!(ledger.is_empty());
        assert!(ledger.journal().is_empty());
    }

    #[test]
    fn history_is_newest_first_and_per_player() {
        let mut ledger = TransactionLedger::new(1_000);
        let first = ledger.open(SpinId::new(), player(), 10).unwrap();
        ledger.open(SpinId::new(), PlayerId::new("p2"), 10).unwrap();
        let third = ledger.open(SpinId::new(), player(), 10).unwrap();

        let history = ledger.transactions_for(&player(), 10);
        let ids: Vec<_> = history.iter().map(|tx| tx.transaction_id.clone()).collect();
        assert_eq!(ids, vec![third.clone(), first]);
        assert_eq!(ledger.transactions_for(&player(), 1)[0].transaction_id, third);
    }

    #[test]
    fn journal_replays_to_current_balance() {
        let mut ledger = TransactionLedger::new(300);
        let a = ledger.open(SpinId::new(), player(), 30).unwrap();
        ledger.complete(&a, 0).unwrap();
        let b = ledger.open(SpinId::new(), player(), 30).unwrap();
        ledger.fail(&b).unwrap();
        assert!(ledger.reconcile(ledger.balance()).is_none());
        ledger.reconcile(1_000).unwrap();

        let kinds: Vec<_> = ledger.journal().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                LedgerEntryKind::Opened,
                LedgerEntryKind::Completed,
                LedgerEntryKind::Opened,
                LedgerEntryKind::Failed,
                LedgerEntryKind::Reconciled,
            ]
        );
        for pair in ledger.journal().windows(2) {
            assert_eq!(pair[0].balance_after, pair[1].balance_before);
        }
        assert_eq!(ledger.journal().last().unwrap().balance_after, ledger.balance());
    }
}
