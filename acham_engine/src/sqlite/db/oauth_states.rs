use chrono::Utc;
use log::trace;
use sqlx::SqliteConnection;

use crate::{db_types::OauthState, traits::NewOauthState};

pub async fn insert_state(state: NewOauthState, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
            INSERT INTO oauth_states (state, provider, redirect_uri, expires_at)
            VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(&state.state)
    .bind(&state.provider)
    .bind(&state.redirect_uri)
    .bind(state.expires_at)
    .execute(conn)
    .await?;
    trace!("🗃️ Stored oauth state for provider {}", state.provider);
    Ok(())
}

/// Deletes and returns the state entry in one statement. Expired entries are deleted but not
/// returned, so a stale callback cannot be redeemed.
pub async fn pop_state(
    provider: &str,
    state: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<OauthState>, sqlx::Error> {
    let entry: Option<OauthState> =
        sqlx::query_as("DELETE FROM oauth_states WHERE provider = $1 AND state = $2 RETURNING *")
            .bind(provider)
            .bind(state)
            .fetch_optional(conn)
            .await?;
    Ok(entry.filter(|e| e.expires_at >= Utc::now()))
}

/// Housekeeping: drop entries past their expiry.
pub async fn purge_expired(conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let result =
        sqlx::query("DELETE FROM oauth_states WHERE expires_at < CURRENT_TIMESTAMP").execute(conn).await?;
    Ok(result.rows_affected())
}
