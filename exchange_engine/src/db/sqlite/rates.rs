use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db::sqlite::SqliteDatabaseError,
    db_types::{NewRateTable, RateLimits, RateTable},
};

pub async fn fetch_actual_rates(conn: &mut SqliteConnection) -> Result<Option<RateTable>, SqliteDatabaseError> {
    let rates = sqlx::query_as::<_, RateTable>(
        r#"
            SELECT id, main_rate, rate1, rate2, rate3, rate4, rate_back, special_threshold, is_actual
            FROM rates
            WHERE is_actual = 1
            ORDER BY id DESC
            LIMIT 1;
        "#,
    )
    .fetch_optional(conn)
    .await?;
    Ok(rates)
}

/// Inserts a new rate card and flags it actual. Retire the old card and publish the new one inside
/// one open transaction so readers never observe zero or two actual cards.
pub async fn insert_rate_table(
    rates: NewRateTable,
    conn: &mut SqliteConnection,
) -> Result<i64, SqliteDatabaseError> {
    sqlx::query("UPDATE rates SET is_actual = 0 WHERE is_actual = 1").execute(&mut *conn).await?;
    let id = sqlx::query_scalar::<_, i64>(
        r#"
            INSERT INTO rates (main_rate, rate1, rate2, rate3, rate4, rate_back, special_threshold, is_actual)
            VALUES (?, ?, ?, ?, ?, ?, ?, 1)
            RETURNING id;
        "#,
    )
    .bind(rates.main_rate)
    .bind(rates.rate1)
    .bind(rates.rate2)
    .bind(rates.rate3)
    .bind(rates.rate4)
    .bind(rates.rate_back)
    .bind(rates.special_threshold)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ New rate card #{id} published");
    Ok(id)
}

/// Makes the card with the given id the actual one. Call inside an open transaction. Returns false
/// and changes nothing when the id does not exist.
pub async fn set_actual_rate(id: i64, conn: &mut SqliteConnection) -> Result<bool, SqliteDatabaseError> {
    let exists = sqlx::query_scalar::<_, i64>("SELECT id FROM rates WHERE id = ? LIMIT 1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    if exists.is_none() {
        return Ok(false);
    }
    sqlx::query("UPDATE rates SET is_actual = 0 WHERE is_actual = 1").execute(&mut *conn).await?;
    sqlx::query("UPDATE rates SET is_actual = 1 WHERE id = ?").bind(id).execute(conn).await?;
    debug!("🗃️ Rate card #{id} is now actual");
    Ok(true)
}

pub async fn fetch_rate_limits(conn: &mut SqliteConnection) -> Result<Option<RateLimits>, SqliteDatabaseError> {
    let limits = sqlx::query_as::<_, RateLimits>("SELECT tier1, tier2, tier3, tier4 FROM rate_limits WHERE id = 1")
        .fetch_optional(conn)
        .await?;
    Ok(limits)
}

pub async fn set_rate_limits(limits: RateLimits, conn: &mut SqliteConnection) -> Result<(), SqliteDatabaseError> {
    sqlx::query(
        r#"
            INSERT INTO rate_limits (id, tier1, tier2, tier3, tier4) VALUES (1, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET tier1 = excluded.tier1, tier2 = excluded.tier2,
                tier3 = excluded.tier3, tier4 = excluded.tier4;
        "#,
    )
    .bind(limits.tier1)
    .bind(limits.tier2)
    .bind(limits.tier3)
    .bind(limits.tier4)
    .execute(conn)
    .await?;
    Ok(())
}
