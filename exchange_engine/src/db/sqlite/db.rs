use std::fmt::Debug;

use chrono::NaiveDateTime;
use sqlx::SqlitePool;
use xge_common::Idr;

use super::{accounts, new_pool, rates, settings, transactions, SqliteDatabaseError};
use crate::{
    audit::AuditEntry,
    db::{
        common::{BatchBillOutcome, CounterDecrement, InsertTransactionResult, SettleOutcome, SweepOutcome},
        traits::ExchangerDatabase,
    },
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

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    pub async fn new(url: &str, max_connections: u32) -> Result<Self, SqliteDatabaseError> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl ExchangerDatabase for SqliteDatabase {
    type Error = SqliteDatabaseError;

    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_transaction(&self, tx: NewTransaction) -> Result<InsertTransactionResult, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        transactions::idempotent_insert(tx, &mut conn).await
    }

    async fn fetch_transaction(&self, number: &TxNumber) -> Result<Option<Transaction>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        transactions::fetch_by_number(number, &mut conn).await
    }

    async fn fetch_transactions_with_status(
        &self,
        status: TransactionStatus,
    ) -> Result<Vec<Transaction>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        transactions::fetch_with_status(status, &mut conn).await
    }

    async fn fetch_chat_transactions_with_status(
        &self,
        chat: ChatId,
        status: TransactionStatus,
    ) -> Result<Vec<Transaction>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        transactions::fetch_with_status_in_chat(status, chat, &mut conn).await
    }

    async fn transition_transaction(
        &self,
        number: &TxNumber,
        expected: &[TransactionStatus],
        target: TransactionStatus,
        entry: &AuditEntry,
        now: NaiveDateTime,
    ) -> Result<Option<Transaction>, Self::Error> {
        let mut tx = self.pool.begin().await?;
        let result = transactions::transition(number, expected, target, entry, now, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn set_note(&self, number: &TxNumber, note: &str) -> Result<bool, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        transactions::set_note(number, note, &mut conn).await
    }

    async fn set_crm_number(&self, number: &TxNumber, crm_number: &str) -> Result<bool, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        transactions::set_crm_number(number, crm_number, &mut conn).await
    }

    async fn bill_accepted(
        &self,
        chat: ChatId,
        entry: &AuditEntry,
        now: NaiveDateTime,
    ) -> Result<BatchBillOutcome, Self::Error> {
        let mut tx = self.pool.begin().await?;
        let outcome = transactions::bill_accepted(chat, entry, now, &mut tx).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    async fn settle_billed(
        &self,
        chat: ChatId,
        reported_total: Idr,
        tolerance: Idr,
        entry: &AuditEntry,
        now: NaiveDateTime,
    ) -> Result<SettleOutcome, Self::Error> {
        let mut tx = self.pool.begin().await?;
        let outcome =
            transactions::settle_billed(chat, reported_total, tolerance, entry, now, &mut tx).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    async fn sweep_stale(
        &self,
        cutoff: NaiveDateTime,
        entry: &AuditEntry,
        now: NaiveDateTime,
    ) -> Result<SweepOutcome, Self::Error> {
        let mut tx = self.pool.begin().await?;
        let outcome = transactions::sweep_stale(cutoff, entry, now, &mut tx).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    async fn increment_control_counter(&self, chat: ChatId) -> Result<i64, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        settings::increment_control_counter(chat, &mut conn).await
    }

    async fn decrement_control_counter(&self, chat: ChatId) -> Result<CounterDecrement, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        settings::decrement_control_counter(chat, &mut conn).await
    }

    async fn control_counter(&self, chat: ChatId) -> Result<i64, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        settings::control_counter(chat, &mut conn).await
    }

    async fn fetch_actual_rates(&self) -> Result<Option<RateTable>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        rates::fetch_actual_rates(&mut conn).await
    }

    async fn insert_rate_table(&self, new_rates: NewRateTable) -> Result<i64, Self::Error> {
        let mut tx = self.pool.begin().await?;
        let id = rates::insert_rate_table(new_rates, &mut tx).await?;
        tx.commit().await?;
        Ok(id)
    }

    async fn set_actual_rate(&self, id: i64) -> Result<bool, Self::Error> {
        let mut tx = self.pool.begin().await?;
        let result = rates::set_actual_rate(id, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn fetch_rate_limits(&self) -> Result<Option<RateLimits>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        rates::fetch_rate_limits(&mut conn).await
    }

    async fn set_rate_limits(&self, limits: RateLimits) -> Result<(), Self::Error> {
        let mut conn = self.pool.acquire().await?;
        rates::set_rate_limits(limits, &mut conn).await
    }

    async fn fetch_accounts(&self) -> Result<Vec<BankAccount>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        accounts::fetch_accounts(&mut conn).await
    }

    async fn insert_account(&self, account: NewBankAccount) -> Result<i64, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        accounts::insert_account(account, &mut conn).await
    }

    async fn set_actual_account(&self, account_number: i64) -> Result<bool, Self::Error> {
        let mut tx = self.pool.begin().await?;
        let result = accounts::set_actual_account(account_number, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn set_special_account(&self, account_number: i64) -> Result<bool, Self::Error> {
        let mut tx = self.pool.begin().await?;
        let result = accounts::set_special_account(account_number, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn deactivate_account(&self, account_number: i64) -> Result<bool, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        accounts::deactivate_account(account_number, &mut conn).await
    }

    async fn fetch_shift_settings(&self) -> Result<Option<ShiftSettings>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        settings::fetch_shift_settings(&mut conn).await
    }

    async fn set_shift_settings(&self, shift: ShiftSettings) -> Result<(), Self::Error> {
        let mut tx = self.pool.begin().await?;
        settings::set_shift_settings(shift, &mut tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn setting(&self, key: &str) -> Result<Option<String>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        settings::setting(key, &mut conn).await
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<(), Self::Error> {
        let mut conn = self.pool.acquire().await?;
        settings::set_setting(key, value, &mut conn).await
    }

    async fn toggle_setting(&self, key: &str) -> Result<bool, Self::Error> {
        let mut tx = self.pool.begin().await?;
        let value = settings::toggle_setting(key, &mut tx).await?;
        tx.commit().await?;
        Ok(value)
    }

    async fn close(&mut self) -> Result<(), Self::Error> {
        self.pool.close().await;
        Ok(())
    }
}
