use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewUser, SocialAccount, User},
    traits::AccountApiError,
};

/// Inserts a new user. A duplicate email surfaces as [`AccountApiError::EmailTaken`].
pub async fn insert_user(user: NewUser, conn: &mut SqliteConnection) -> Result<User, AccountApiError> {
    let inserted: Result<User, sqlx::Error> = sqlx::query_as(
        r#"
            INSERT INTO users (name, email, phone, country_id, password_hash)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *;
        "#,
    )
    .bind(&user.name)
    .bind(&user.email)
    .bind(&user.phone)
    .bind(user.country_id)
    .bind(&user.password_hash)
    .fetch_one(conn)
    .await;
    match inserted {
        Ok(user) => {
            debug!("🗃️ User [{}] inserted with id {}", user.email, user.id);
            Ok(user)
        },
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(AccountApiError::EmailTaken(user.email)),
        Err(e) => Err(e.into()),
    }
}

pub async fn fetch_user_by_id(id: i64, conn: &mut SqliteConnection) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM users WHERE id = $1").bind(id).fetch_optional(conn).await
}

pub async fn fetch_user_by_email(email: &str, conn: &mut SqliteConnection) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM users WHERE email = $1").bind(email).fetch_optional(conn).await
}

pub async fn fetch_user_by_phone(phone: &str, conn: &mut SqliteConnection) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM users WHERE phone = $1 ORDER BY id LIMIT 1")
        .bind(phone)
        .fetch_optional(conn)
        .await
}

pub async fn set_phone_verified(user_id: i64, conn: &mut SqliteConnection) -> Result<User, AccountApiError> {
    let updated: Option<User> = sqlx::query_as(
        "UPDATE users SET phone_verified = 'Y', updated_at = CURRENT_TIMESTAMP WHERE id = $1 RETURNING *",
    )
    .bind(user_id)
    .fetch_optional(conn)
    .await?;
    updated.ok_or(AccountApiError::UserNotFound(user_id))
}

pub async fn update_password_hash(
    user_id: i64,
    password_hash: &str,
    conn: &mut SqliteConnection,
) -> Result<(), AccountApiError> {
    let result = sqlx::query("UPDATE users SET password_hash = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2")
        .bind(password_hash)
        .bind(user_id)
        .execute(conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AccountApiError::UserNotFound(user_id));
    }
    Ok(())
}

pub async fn fetch_user_for_social(
    provider: &str,
    uid: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as(
        r#"
            SELECT users.* FROM users
            JOIN social_accounts ON social_accounts.user_id = users.id
            WHERE social_accounts.provider = $1 AND social_accounts.uid = $2
        "#,
    )
    .bind(provider)
    .bind(uid)
    .fetch_optional(conn)
    .await
}

/// Insert-or-refresh a social identity link. The captured profile is replaced on conflict.
pub async fn upsert_social_account(
    user_id: i64,
    provider: &str,
    uid: &str,
    extra_data: &str,
    conn: &mut SqliteConnection,
) -> Result<SocialAccount, sqlx::Error> {
    sqlx::query_as(
        r#"
            INSERT INTO social_accounts (user_id, provider, uid, extra_data)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (provider, uid) DO UPDATE SET extra_data = excluded.extra_data
            RETURNING *;
        "#,
    )
    .bind(user_id)
    .bind(provider)
    .bind(uid)
    .bind(extra_data)
    .fetch_one(conn)
    .await
}
