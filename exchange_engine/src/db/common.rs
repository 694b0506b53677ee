//! Result types shared by the backend trait and its implementations.

use xge_common::{Idr, Rub};

use crate::db_types::{Transaction, TxNumber};

#[derive(Debug, Clone)]
pub enum InsertTransactionResult {
    Inserted(i64),
    AlreadyExists(i64),
}

/// Result of grouping every accepted order into the current invoice.
#[derive(Debug, Clone, Default)]
pub struct BatchBillOutcome {
    /// The orders moved to `bill`, in their post-update state.
    pub transactions: Vec<Transaction>,
    pub total_idr: Idr,
    pub total_rub: Rub,
}

impl BatchBillOutcome {
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

/// Result of reconciling the invoice against a reported payout.
#[derive(Debug, Clone)]
pub enum SettleOutcome {
    /// Every billed order moved to `accounted`.
    Settled { transactions: Vec<Transaction>, total_idr: Idr },
    /// The reported amount disagreed with the invoice total beyond tolerance. Nothing was changed.
    Mismatch { expected: Idr, reported: Idr },
}

/// Result of archiving stale pre-shift orders.
#[derive(Debug, Clone, Default)]
pub struct SweepOutcome {
    pub swept: Vec<TxNumber>,
}

impl SweepOutcome {
    pub fn count(&self) -> usize {
        self.swept.len()
    }
}

/// Result of decrementing a chat's control counter.
#[derive(Debug, Clone, Copy)]
pub struct CounterDecrement {
    /// Counter value after the operation.
    pub value: i64,
    /// Set when the counter was already at zero, meaning bookkeeping drifted somewhere upstream.
    pub anomaly: bool,
}
