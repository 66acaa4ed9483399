//! Credential checks and OAuth authorization state.

use std::fmt::Debug;

use chrono::{Duration, Utc};
use log::*;

use crate::{
    db_types::{OauthState, User},
    helpers::verify_secret,
    traits::{AccountManagement, AuthApiError, AuthManagement, NewOauthState},
};

/// How long a pending OAuth authorization stays redeemable.
const OAUTH_STATE_TTL_MINUTES: i64 = 5;

pub struct AuthApi<B> {
    db: B,
}

impl<B: Debug> Debug for AuthApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AuthApi ({:?})", self.db)
    }
}

impl<B> AuthApi<B>
where B: AccountManagement + AuthManagement
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    /// Check an email-or-phone + password pair, returning the user on success.
    ///
    /// Unknown identifiers and wrong passwords are indistinguishable to the caller; both come
    /// back as [`AuthApiError::InvalidCredentials`].
    pub async fn login_with_password(&self, identifier: &str, password: &str) -> Result<User, AuthApiError> {
        let user = if identifier.contains('@') {
            self.db.fetch_user_by_email(&identifier.trim().to_lowercase()).await
        } else {
            self.db.fetch_user_by_phone(identifier.trim()).await
        }
        .map_err(|e| AuthApiError::DatabaseError(e.to_string()))?;
        let Some(user) = user else {
            debug!("🔐️ Login attempt for unknown identifier");
            return Err(AuthApiError::InvalidCredentials);
        };
        let Some(hash) = user.password_hash.as_deref() else {
            debug!("🔐️ Login attempt for passwordless account #{}", user.id);
            return Err(AuthApiError::InvalidCredentials);
        };
        let valid = verify_secret(password, hash).map_err(|e| AuthApiError::CredentialError(e.to_string()))?;
        if !valid {
            debug!("🔐️ Password mismatch for user #{}", user.id);
            return Err(AuthApiError::InvalidCredentials);
        }
        Ok(user)
    }

    /// Persist an OAuth `state` token so the matching callback can be validated, possibly by a
    /// different worker.
    pub async fn store_oauth_state(
        &self,
        provider: &str,
        state: &str,
        redirect_uri: &str,
    ) -> Result<(), AuthApiError> {
        let entry = NewOauthState {
            state: state.to_string(),
            provider: provider.to_string(),
            redirect_uri: redirect_uri.to_string(),
            expires_at: Utc::now() + Duration::minutes(OAUTH_STATE_TTL_MINUTES),
        };
        self.db.store_oauth_state(entry).await
    }

    /// Redeem an OAuth `state` token. Single use: a second redemption fails.
    pub async fn pop_oauth_state(&self, provider: &str, state: &str) -> Result<OauthState, AuthApiError> {
        self.db.pop_oauth_state(provider, state).await?.ok_or(AuthApiError::StateNotFound)
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}
