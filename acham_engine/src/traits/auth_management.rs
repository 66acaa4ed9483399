use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db_types::OauthState;

#[derive(Debug, Clone, Error)]
pub enum AuthApiError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("The supplied credentials are invalid")]
    InvalidCredentials,
    #[error("Invalid or expired state parameter")]
    StateNotFound,
    #[error("Could not verify the supplied credential. {0}")]
    CredentialError(String),
}

impl From<sqlx::Error> for AuthApiError {
    fn from(e: sqlx::Error) -> Self {
        AuthApiError::DatabaseError(e.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct NewOauthState {
    pub state: String,
    pub provider: String,
    pub redirect_uri: String,
    pub expires_at: DateTime<Utc>,
}

/// Persisted authentication state. OAuth `state` tokens live in the database so any worker can
/// complete a callback that another worker started.
#[allow(async_fn_in_trait)]
pub trait AuthManagement {
    async fn store_oauth_state(&self, state: NewOauthState) -> Result<(), AuthApiError>;

    /// Remove and return the stored state in one step. Expired entries are discarded, not
    /// returned.
    async fn pop_oauth_state(&self, provider: &str, state: &str) -> Result<Option<OauthState>, AuthApiError>;
}
