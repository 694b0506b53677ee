use chrono::NaiveDateTime;
use log::{debug, trace};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use xge_common::{Idr, Rub};

use crate::{
    audit::{AuditEntry, RECORD_SEPARATOR},
    db::{
        common::{BatchBillOutcome, InsertTransactionResult, SettleOutcome, SweepOutcome},
        sqlite::SqliteDatabaseError,
    },
    db_types::{ChatId, NewTransaction, Transaction, TransactionStatus, TxNumber},
};

pub async fn idempotent_insert(
    tx: NewTransaction,
    conn: &mut SqliteConnection,
) -> Result<InsertTransactionResult, SqliteDatabaseError> {
    let result = match transaction_exists(&tx.transaction_number, conn).await? {
        Some(id) => InsertTransactionResult::AlreadyExists(id),
        None => insert_transaction(tx, conn).await?,
    };
    Ok(result)
}

/// Inserts a new transaction using the given connection. This is not atomic on its own. You can
/// embed this call inside a transaction if you need atomicity with other writes, and pass
/// `&mut *tx` as the connection argument.
async fn insert_transaction(
    tx: NewTransaction,
    conn: &mut SqliteConnection,
) -> Result<InsertTransactionResult, SqliteDatabaseError> {
    let id = sqlx::query_scalar::<_, i64>(
        r#"
            INSERT INTO transactions (
                transaction_number,
                user_id,
                created_at,
                idr_amount,
                rate_used,
                rub_amount,
                account_info,
                status,
                status_changed_at,
                history,
                source_chat
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id;
        "#,
    )
    .bind(&tx.transaction_number)
    .bind(tx.user_id)
    .bind(tx.created_at)
    .bind(tx.idr_amount)
    .bind(tx.rate_used)
    .bind(tx.rub_amount)
    .bind(&tx.account_info)
    .bind(tx.status)
    .bind(tx.created_at)
    .bind(&tx.history)
    .bind(tx.source_chat)
    .fetch_one(conn)
    .await?;
    Ok(InsertTransactionResult::Inserted(id))
}

pub async fn fetch_by_number(
    number: &TxNumber,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, SqliteDatabaseError> {
    let tx = sqlx::query_as::<_, Transaction>(
        r#"
            SELECT
                id, transaction_number, user_id, created_at, idr_amount, rate_used, rub_amount,
                note, account_info, status, status_changed_at, history, source_chat, crm_number
            FROM transactions
            WHERE transaction_number = ?
            LIMIT 1;
        "#,
    )
    .bind(number)
    .fetch_optional(conn)
    .await?;
    Ok(tx)
}

pub async fn transaction_exists(
    number: &TxNumber,
    conn: &mut SqliteConnection,
) -> Result<Option<i64>, SqliteDatabaseError> {
    let id = sqlx::query_scalar::<_, i64>("SELECT id FROM transactions WHERE transaction_number = ? LIMIT 1")
        .bind(number)
        .fetch_optional(conn)
        .await?;
    Ok(id)
}

pub async fn fetch_with_status(
    status: TransactionStatus,
    conn: &mut SqliteConnection,
) -> Result<Vec<Transaction>, SqliteDatabaseError> {
    let txs = sqlx::query_as::<_, Transaction>(
        r#"
            SELECT
                id, transaction_number, user_id, created_at, idr_amount, rate_used, rub_amount,
                note, account_info, status, status_changed_at, history, source_chat, crm_number
            FROM transactions
            WHERE status = ?
            ORDER BY id;
        "#,
    )
    .bind(status)
    .fetch_all(conn)
    .await?;
    Ok(txs)
}

/// Moves a transaction to `target` guarded by its current status, appending the audit entry in the
/// same statement. Returns the post-update row, or `None` when the guard missed.
pub async fn transition(
    number: &TxNumber,
    expected: &[TransactionStatus],
    target: TransactionStatus,
    entry: &AuditEntry,
    now: NaiveDateTime,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, SqliteDatabaseError> {
    if expected.is_empty() {
        return Ok(None);
    }
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE transactions SET status = ");
    qb.push_bind(target);
    qb.push(", status_changed_at = ");
    qb.push_bind(now);
    push_history_append(&mut qb, entry);
    qb.push(" WHERE transaction_number = ");
    qb.push_bind(number);
    qb.push(" AND status IN (");
    let mut statuses = qb.separated(", ");
    for status in expected {
        statuses.push_bind(*status);
    }
    qb.push(")");
    let result = qb.build().execute(&mut *conn).await?;
    if result.rows_affected() == 0 {
        trace!("🗃️ Transition of {number} to {target} missed its guard");
        return Ok(None);
    }
    debug!("🗃️ Transaction {number} moved to {target}");
    fetch_by_number(number, conn).await
}

pub async fn set_note(
    number: &TxNumber,
    note: &str,
    conn: &mut SqliteConnection,
) -> Result<bool, SqliteDatabaseError> {
    let result = sqlx::query("UPDATE transactions SET note = ? WHERE transaction_number = ?")
        .bind(note)
        .bind(number)
        .execute(conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn set_crm_number(
    number: &TxNumber,
    crm_number: &str,
    conn: &mut SqliteConnection,
) -> Result<bool, SqliteDatabaseError> {
    let result = sqlx::query("UPDATE transactions SET crm_number = ? WHERE transaction_number = ?")
        .bind(crm_number)
        .bind(number)
        .execute(conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Fetches a chat's rows in one status, ordered by insertion.
pub async fn fetch_with_status_in_chat(
    status: TransactionStatus,
    chat: ChatId,
    conn: &mut SqliteConnection,
) -> Result<Vec<Transaction>, SqliteDatabaseError> {
    let txs = sqlx::query_as::<_, Transaction>(
        r#"
            SELECT
                id, transaction_number, user_id, created_at, idr_amount, rate_used, rub_amount,
                note, account_info, status, status_changed_at, history, source_chat, crm_number
            FROM transactions
            WHERE status = ? AND source_chat = ?
            ORDER BY id;
        "#,
    )
    .bind(status)
    .bind(chat)
    .fetch_all(conn)
    .await?;
    Ok(txs)
}

/// Moves every `accept` order of one chat to `bill`. Call inside an open transaction so the select
/// and the update see the same rows.
pub async fn bill_accepted(
    chat: ChatId,
    entry: &AuditEntry,
    now: NaiveDateTime,
    conn: &mut SqliteConnection,
) -> Result<BatchBillOutcome, SqliteDatabaseError> {
    let accepted = fetch_with_status_in_chat(TransactionStatus::Accept, chat, &mut *conn).await?;
    if accepted.is_empty() {
        return Ok(BatchBillOutcome::default());
    }
    let ids: Vec<i64> = accepted.iter().map(|t| t.id).collect();
    let updated = retag_by_id(&ids, TransactionStatus::Bill, entry, now, conn).await?;
    let total_idr = updated.iter().map(|t| t.idr_amount).sum::<Idr>();
    let total_rub = updated.iter().map(|t| t.rub_amount).sum::<Rub>();
    debug!("🗃️ {} orders billed for a total of {total_idr} / {total_rub}", updated.len());
    Ok(BatchBillOutcome { transactions: updated, total_idr, total_rub })
}

/// Reconciles a chat's invoice against the reported payout. On a match within tolerance every
/// `bill` order moves to `accounted`; on a mismatch nothing changes. Call inside an open
/// transaction.
pub async fn settle_billed(
    chat: ChatId,
    reported_total: Idr,
    tolerance: Idr,
    entry: &AuditEntry,
    now: NaiveDateTime,
    conn: &mut SqliteConnection,
) -> Result<SettleOutcome, SqliteDatabaseError> {
    let billed = fetch_with_status_in_chat(TransactionStatus::Bill, chat, &mut *conn).await?;
    let expected = billed.iter().map(|t| t.idr_amount).sum::<Idr>();
    let delta = (expected - reported_total).abs();
    if delta > tolerance.abs() {
        debug!("🗃️ Invoice mismatch: expected {expected}, reported {reported_total}");
        return Ok(SettleOutcome::Mismatch { expected, reported: reported_total });
    }
    if billed.is_empty() {
        return Ok(SettleOutcome::Settled { transactions: Vec::new(), total_idr: expected });
    }
    let ids: Vec<i64> = billed.iter().map(|t| t.id).collect();
    let updated = retag_by_id(&ids, TransactionStatus::Accounted, entry, now, conn).await?;
    debug!("🗃️ Invoice settled: {} orders accounted for {expected}", updated.len());
    Ok(SettleOutcome::Settled { transactions: updated, total_idr: expected })
}

/// Archives every `created` order older than `cutoff`. Call inside an open transaction.
pub async fn sweep_stale(
    cutoff: NaiveDateTime,
    entry: &AuditEntry,
    now: NaiveDateTime,
    conn: &mut SqliteConnection,
) -> Result<SweepOutcome, SqliteDatabaseError> {
    let stale = sqlx::query_as::<_, Transaction>(
        r#"
            SELECT
                id, transaction_number, user_id, created_at, idr_amount, rate_used, rub_amount,
                note, account_info, status, status_changed_at, history, source_chat, crm_number
            FROM transactions
            WHERE status = 'created' AND created_at < ?
            ORDER BY id;
        "#,
    )
    .bind(cutoff)
    .fetch_all(&mut *conn)
    .await?;
    if stale.is_empty() {
        return Ok(SweepOutcome::default());
    }
    let ids: Vec<i64> = stale.iter().map(|t| t.id).collect();
    let updated = retag_by_id(&ids, TransactionStatus::Timeout, entry, now, conn).await?;
    Ok(SweepOutcome { swept: updated.into_iter().map(|t| t.transaction_number).collect() })
}

/// Single-statement status update with history append for a fixed set of row ids, followed by a
/// re-read of the affected rows.
async fn retag_by_id(
    ids: &[i64],
    target: TransactionStatus,
    entry: &AuditEntry,
    now: NaiveDateTime,
    conn: &mut SqliteConnection,
) -> Result<Vec<Transaction>, SqliteDatabaseError> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE transactions SET status = ");
    qb.push_bind(target);
    qb.push(", status_changed_at = ");
    qb.push_bind(now);
    push_history_append(&mut qb, entry);
    qb.push(" WHERE id IN (");
    let mut id_list = qb.separated(", ");
    for id in ids {
        id_list.push_bind(*id);
    }
    qb.push(")");
    let result = qb.build().execute(&mut *conn).await?;
    if result.rows_affected() != ids.len() as u64 {
        return Err(SqliteDatabaseError::QueryError(format!(
            "Batch retag to {target} touched {} of {} rows",
            result.rows_affected(),
            ids.len()
        )));
    }
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        r#"
            SELECT
                id, transaction_number, user_id, created_at, idr_amount, rate_used, rub_amount,
                note, account_info, status, status_changed_at, history, source_chat, crm_number
            FROM transactions WHERE id IN (
        "#,
    );
    let mut id_list = qb.separated(", ");
    for id in ids {
        id_list.push_bind(*id);
    }
    qb.push(") ORDER BY id");
    let rows = qb.build_query_as::<Transaction>().fetch_all(conn).await?;
    Ok(rows)
}

fn push_history_append(qb: &mut QueryBuilder<'_, Sqlite>, entry: &AuditEntry) {
    let encoded = entry.encode();
    qb.push(", history = CASE WHEN history = '' THEN ");
    qb.push_bind(encoded.clone());
    qb.push(format!(" ELSE history || '{RECORD_SEPARATOR}' || "));
    qb.push_bind(encoded);
    qb.push(" END");
}
