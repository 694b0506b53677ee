use chrono::NaiveDateTime;

use crate::{
    audit::AuditEntry,
    db::common::{BatchBillOutcome, CounterDecrement, InsertTransactionResult, SettleOutcome, SweepOutcome},
    db_types::{
        BankAccount,
        ChatId,
        NewBankAccount,
        NewRateTable,
        NewTransaction,
        RateLimits,
        RateTable,
        ShiftSettings,
        Transaction,
        TransactionStatus,
        TxNumber,
    },
};

/// This trait defines the persistence behaviour backing the exchange engine.
///
/// This behaviour includes:
/// * Storing transactions and moving them through the status table under guard conditions.
/// * Maintaining the rate card, tier limits and payout accounts.
/// * The per-chat control counter and the free-form settings used by the shift scheduler.
///
/// All multi-row operations are atomic: either every affected row changes, or none do.
#[allow(async_fn_in_trait)]
pub trait ExchangerDatabase: Clone {
    type Error: std::error::Error;

    /// The URL of the database
    fn url(&self) -> &str;

    /// Stores a new transaction. If a row with the same transaction number already exists, nothing
    /// is written and the existing row id is reported.
    async fn insert_transaction(&self, tx: NewTransaction) -> Result<InsertTransactionResult, Self::Error>;

    async fn fetch_transaction(&self, number: &TxNumber) -> Result<Option<Transaction>, Self::Error>;

    async fn fetch_transactions_with_status(
        &self,
        status: TransactionStatus,
    ) -> Result<Vec<Transaction>, Self::Error>;

    /// One partner chat's transactions in one status, for per-chat reporting.
    async fn fetch_chat_transactions_with_status(
        &self,
        chat: ChatId,
        status: TransactionStatus,
    ) -> Result<Vec<Transaction>, Self::Error>;

    /// Moves a transaction to `target` if and only if its current status is one of `expected`,
    /// appending `entry` to its audit trail in the same statement.
    ///
    /// Returns the post-update row, or `None` when the guard did not match (the row is missing or
    /// some concurrent actor won the race). Guard misses are not errors.
    async fn transition_transaction(
        &self,
        number: &TxNumber,
        expected: &[TransactionStatus],
        target: TransactionStatus,
        entry: &AuditEntry,
        now: NaiveDateTime,
    ) -> Result<Option<Transaction>, Self::Error>;

    async fn set_note(&self, number: &TxNumber, note: &str) -> Result<bool, Self::Error>;

    async fn set_crm_number(&self, number: &TxNumber, crm_number: &str) -> Result<bool, Self::Error>;

    /// Groups every `accept` order of one partner chat into the current invoice by moving it to
    /// `bill`, atomically. An empty accept set yields an empty outcome and writes nothing.
    async fn bill_accepted(
        &self,
        chat: ChatId,
        entry: &AuditEntry,
        now: NaiveDateTime,
    ) -> Result<BatchBillOutcome, Self::Error>;

    /// Reconciles a chat's invoice: when the reported IDR total matches the sum of its `bill`
    /// orders within `tolerance`, every one of them moves to `accounted` atomically. On a mismatch
    /// nothing changes and both totals are reported back.
    async fn settle_billed(
        &self,
        chat: ChatId,
        reported_total: xge_common::Idr,
        tolerance: xge_common::Idr,
        entry: &AuditEntry,
        now: NaiveDateTime,
    ) -> Result<SettleOutcome, Self::Error>;

    /// Archives every `created` order older than `cutoff` to `timeout`, atomically.
    async fn sweep_stale(
        &self,
        cutoff: NaiveDateTime,
        entry: &AuditEntry,
        now: NaiveDateTime,
    ) -> Result<SweepOutcome, Self::Error>;

    /// Bumps the chat's control counter by one, creating it at 1 if absent. Returns the new value.
    async fn increment_control_counter(&self, chat: ChatId) -> Result<i64, Self::Error>;

    /// Drops the chat's control counter by one, clamping at zero. A decrement attempted at zero is
    /// reported as an anomaly rather than an error.
    async fn decrement_control_counter(&self, chat: ChatId) -> Result<CounterDecrement, Self::Error>;

    async fn control_counter(&self, chat: ChatId) -> Result<i64, Self::Error>;

    /// The rate card currently in force, if one has been published.
    async fn fetch_actual_rates(&self) -> Result<Option<RateTable>, Self::Error>;

    /// Publishes a new rate card and makes it the actual one, retiring the previous card in the
    /// same transaction.
    async fn insert_rate_table(&self, rates: NewRateTable) -> Result<i64, Self::Error>;

    /// Makes a previously published rate card the actual one. Returns false when no card with that
    /// id exists, in which case the previous card stays in force.
    async fn set_actual_rate(&self, id: i64) -> Result<bool, Self::Error>;

    async fn fetch_rate_limits(&self) -> Result<Option<RateLimits>, Self::Error>;

    async fn set_rate_limits(&self, limits: RateLimits) -> Result<(), Self::Error>;

    /// All payout accounts, active and retired.
    async fn fetch_accounts(&self) -> Result<Vec<BankAccount>, Self::Error>;

    async fn insert_account(&self, account: NewBankAccount) -> Result<i64, Self::Error>;

    /// Makes the given account the primary payout account, clearing the flag on every other row in
    /// the same transaction. Returns false when the account is missing or inactive.
    async fn set_actual_account(&self, account_number: i64) -> Result<bool, Self::Error>;

    /// Makes the given account the overflow account for above-threshold payouts. Same contract as
    /// [`Self::set_actual_account`].
    async fn set_special_account(&self, account_number: i64) -> Result<bool, Self::Error>;

    /// Retires an account. A retired account keeps its history but loses both selection flags.
    async fn deactivate_account(&self, account_number: i64) -> Result<bool, Self::Error>;

    async fn fetch_shift_settings(&self) -> Result<Option<ShiftSettings>, Self::Error>;

    async fn set_shift_settings(&self, settings: ShiftSettings) -> Result<(), Self::Error>;

    /// Free-form setting read, used for scheduler flags and anything operators store by key.
    async fn setting(&self, key: &str) -> Result<Option<String>, Self::Error>;

    async fn set_setting(&self, key: &str, value: &str) -> Result<(), Self::Error>;

    /// Flips a boolean-encoded setting and returns the new state. Absent keys count as false.
    async fn toggle_setting(&self, key: &str) -> Result<bool, Self::Error>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}
