use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db::sqlite::SqliteDatabaseError,
    db_types::{BankAccount, NewBankAccount},
};

pub async fn fetch_accounts(conn: &mut SqliteConnection) -> Result<Vec<BankAccount>, SqliteDatabaseError> {
    let accounts = sqlx::query_as::<_, BankAccount>(
        r#"
            SELECT account_number, bank, card_number, recipient_name, sbp_phone,
                   is_active, is_actual, is_special
            FROM bank_accounts
            ORDER BY account_number;
        "#,
    )
    .fetch_all(conn)
    .await?;
    Ok(accounts)
}

pub async fn insert_account(
    account: NewBankAccount,
    conn: &mut SqliteConnection,
) -> Result<i64, SqliteDatabaseError> {
    let id = sqlx::query_scalar::<_, i64>(
        r#"
            INSERT INTO bank_accounts (bank, card_number, recipient_name, sbp_phone, created_by)
            VALUES (?, ?, ?, ?, ?)
            RETURNING account_number;
        "#,
    )
    .bind(&account.bank)
    .bind(&account.card_number)
    .bind(&account.recipient_name)
    .bind(&account.sbp_phone)
    .bind(account.created_by)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Payout account #{id} ({}) added", account.bank);
    Ok(id)
}

/// Makes one account the primary payout target. Call inside an open transaction. The flag moves
/// only onto an active account; an inactive or missing target leaves the previous holder in place.
pub async fn set_actual_account(
    account_number: i64,
    conn: &mut SqliteConnection,
) -> Result<bool, SqliteDatabaseError> {
    move_flag("is_actual", account_number, conn).await
}

/// Same contract as [`set_actual_account`], for the above-threshold overflow account.
pub async fn set_special_account(
    account_number: i64,
    conn: &mut SqliteConnection,
) -> Result<bool, SqliteDatabaseError> {
    move_flag("is_special", account_number, conn).await
}

async fn move_flag(
    flag: &str,
    account_number: i64,
    conn: &mut SqliteConnection,
) -> Result<bool, SqliteDatabaseError> {
    let eligible = sqlx::query_scalar::<_, i64>(
        "SELECT account_number FROM bank_accounts WHERE account_number = ? AND is_active = 1 LIMIT 1",
    )
    .bind(account_number)
    .fetch_optional(&mut *conn)
    .await?;
    if eligible.is_none() {
        return Ok(false);
    }
    // flag is one of two fixed column names, never user input
    sqlx::query(&format!("UPDATE bank_accounts SET {flag} = 0 WHERE {flag} = 1")).execute(&mut *conn).await?;
    sqlx::query(&format!("UPDATE bank_accounts SET {flag} = 1 WHERE account_number = ?"))
        .bind(account_number)
        .execute(conn)
        .await?;
    debug!("🗃️ Account #{account_number} now holds {flag}");
    Ok(true)
}

/// Retires an account, clearing both selection flags so it can never be quoted again.
pub async fn deactivate_account(
    account_number: i64,
    conn: &mut SqliteConnection,
) -> Result<bool, SqliteDatabaseError> {
    let result = sqlx::query(
        "UPDATE bank_accounts SET is_active = 0, is_actual = 0, is_special = 0 WHERE account_number = ?",
    )
    .bind(account_number)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}
