use chrono::{DateTime, Utc};
use log::debug;
use sqlx::SqliteConnection;

use crate::db_types::{OtpCode, OtpPurpose, OTP_MAX_ATTEMPTS};

/// Deactivates any active codes for (user, purpose). A new code supersedes all priors.
pub async fn deactivate_active_codes(
    user_id: i64,
    purpose: OtpPurpose,
    conn: &mut SqliteConnection,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("UPDATE otp_codes SET is_active = 0 WHERE user_id = $1 AND purpose = $2 AND is_active = 1")
        .bind(user_id)
        .bind(purpose)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

pub async fn insert_code(
    user_id: i64,
    purpose: OtpPurpose,
    code_hash: &str,
    expires_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<OtpCode, sqlx::Error> {
    let code: OtpCode = sqlx::query_as(
        r#"
            INSERT INTO otp_codes (user_id, purpose, code_hash, expires_at)
            VALUES ($1, $2, $3, $4)
            RETURNING *;
        "#,
    )
    .bind(user_id)
    .bind(purpose)
    .bind(code_hash)
    .bind(expires_at)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ OTP code #{} stored for user #{user_id}", code.id);
    Ok(code)
}

/// The single active code for (user, purpose), if any.
pub async fn fetch_active_code(
    user_id: i64,
    purpose: OtpPurpose,
    conn: &mut SqliteConnection,
) -> Result<Option<OtpCode>, sqlx::Error> {
    sqlx::query_as(
        "SELECT * FROM otp_codes WHERE user_id = $1 AND purpose = $2 AND is_active = 1 ORDER BY created_at DESC \
         LIMIT 1",
    )
    .bind(user_id)
    .bind(purpose)
    .fetch_optional(conn)
    .await
}

/// Bumps the failure counter, deactivating the code once the limit is hit. Returns the new
/// attempt count.
pub async fn record_failed_attempt(otp_id: i64, conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    let code: Option<OtpCode> = sqlx::query_as(
        r#"
            UPDATE otp_codes
            SET attempts = attempts + 1,
                is_active = CASE WHEN attempts + 1 >= $2 THEN 0 ELSE is_active END
            WHERE id = $1
            RETURNING *;
        "#,
    )
    .bind(otp_id)
    .bind(OTP_MAX_ATTEMPTS)
    .fetch_optional(conn)
    .await?;
    Ok(code.map(|c| c.attempts).unwrap_or(0))
}

pub async fn deactivate_code(otp_id: i64, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE otp_codes SET is_active = 0 WHERE id = $1").bind(otp_id).execute(conn).await?;
    Ok(())
}

/// Marks the code as verified and spent.
pub async fn consume_code(otp_id: i64, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE otp_codes SET is_active = 0, verified_at = CURRENT_TIMESTAMP WHERE id = $1")
        .bind(otp_id)
        .execute(conn)
        .await?;
    Ok(())
}
