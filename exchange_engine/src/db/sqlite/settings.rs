use log::{debug, warn};
use sqlx::SqliteConnection;
use xge_common::parse_boolean_flag;

use crate::{
    db::{common::CounterDecrement, sqlite::SqliteDatabaseError},
    db_types::{ChatId, ShiftSettings},
};

const SHIFT_START_KEY: &str = "shift_start";
const SHIFT_END_KEY: &str = "shift_end";

/// Settings key of the per-chat counter of orders sitting in `control`.
pub fn control_counter_key(chat: ChatId) -> String {
    format!("{chat}_control_counter")
}

pub async fn setting(key: &str, conn: &mut SqliteConnection) -> Result<Option<String>, SqliteDatabaseError> {
    let value = sqlx::query_scalar::<_, String>("SELECT value FROM system_settings WHERE key = ?")
        .bind(key)
        .fetch_optional(conn)
        .await?;
    Ok(value)
}

/// Flips a boolean-encoded setting and returns the new state. An absent or unparseable value
/// counts as false, so the first toggle always lands on true. Call inside an open transaction.
pub async fn toggle_setting(key: &str, conn: &mut SqliteConnection) -> Result<bool, SqliteDatabaseError> {
    let current = parse_boolean_flag(setting(key, &mut *conn).await?, false);
    let new_value = !current;
    set_setting(key, if new_value { "1" } else { "0" }, conn).await?;
    debug!("🗃️ Setting '{key}' toggled to {new_value}");
    Ok(new_value)
}

pub async fn set_setting(key: &str, value: &str, conn: &mut SqliteConnection) -> Result<(), SqliteDatabaseError> {
    sqlx::query(
        r#"
            INSERT INTO system_settings (key, value) VALUES (?, ?)
            ON CONFLICT (key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP;
        "#,
    )
    .bind(key)
    .bind(value)
    .execute(conn)
    .await?;
    Ok(())
}

/// Bumps the chat's control counter in a single statement, creating it at 1 when absent.
pub async fn increment_control_counter(
    chat: ChatId,
    conn: &mut SqliteConnection,
) -> Result<i64, SqliteDatabaseError> {
    let value = sqlx::query_scalar::<_, i64>(
        r#"
            INSERT INTO system_settings (key, value) VALUES (?, '1')
            ON CONFLICT (key) DO UPDATE
                SET value = CAST(CAST(value AS INTEGER) + 1 AS TEXT), updated_at = CURRENT_TIMESTAMP
            RETURNING CAST(value AS INTEGER);
        "#,
    )
    .bind(control_counter_key(chat))
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Control counter for chat {chat} is now {value}");
    Ok(value)
}

/// Drops the chat's control counter in a single guarded statement. The guard refuses to go below
/// zero; a refused decrement is reported as an anomaly so callers can flag the bookkeeping drift.
pub async fn decrement_control_counter(
    chat: ChatId,
    conn: &mut SqliteConnection,
) -> Result<CounterDecrement, SqliteDatabaseError> {
    let value = sqlx::query_scalar::<_, i64>(
        r#"
            UPDATE system_settings
                SET value = CAST(CAST(value AS INTEGER) - 1 AS TEXT), updated_at = CURRENT_TIMESTAMP
            WHERE key = ? AND CAST(value AS INTEGER) > 0
            RETURNING CAST(value AS INTEGER);
        "#,
    )
    .bind(control_counter_key(chat))
    .fetch_optional(&mut *conn)
    .await?;
    match value {
        Some(value) => {
            debug!("🗃️ Control counter for chat {chat} is now {value}");
            Ok(CounterDecrement { value, anomaly: false })
        },
        None => {
            warn!("⚠️ Control counter for chat {chat} was decremented at zero");
            sqlx::query("INSERT OR IGNORE INTO system_settings (key, value) VALUES (?, '0')")
                .bind(control_counter_key(chat))
                .execute(conn)
                .await?;
            Ok(CounterDecrement { value: 0, anomaly: true })
        },
    }
}

pub async fn control_counter(chat: ChatId, conn: &mut SqliteConnection) -> Result<i64, SqliteDatabaseError> {
    let value = setting(&control_counter_key(chat), conn).await?;
    match value {
        None => Ok(0),
        Some(v) => {
            v.parse::<i64>().map_err(|_| SqliteDatabaseError::CorruptValue(format!("control counter: '{v}'")))
        },
    }
}

pub async fn fetch_shift_settings(
    conn: &mut SqliteConnection,
) -> Result<Option<ShiftSettings>, SqliteDatabaseError> {
    let start = setting(SHIFT_START_KEY, &mut *conn).await?;
    let end = setting(SHIFT_END_KEY, conn).await?;
    match (start, end) {
        (Some(start), Some(end)) => ShiftSettings::parse(&start, &end)
            .map(Some)
            .map_err(|e| SqliteDatabaseError::CorruptValue(e.to_string())),
        _ => Ok(None),
    }
}

pub async fn set_shift_settings(
    settings: ShiftSettings,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    set_setting(SHIFT_START_KEY, &settings.shift_start.format("%H:%M:%S").to_string(), &mut *conn).await?;
    set_setting(SHIFT_END_KEY, &settings.shift_end.format("%H:%M:%S").to_string(), conn).await?;
    Ok(())
}
