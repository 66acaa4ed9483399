//! Unified API for user accounts, countries and social identities.

use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{Country, NewUser, User},
    helpers::{hash_secret, verify_secret},
    traits::{AccountApiError, AccountManagement},
};

/// The result of a registration: the created user, and whether the country's rules demand a
/// phone-verification OTP before the account is fully usable.
#[derive(Debug, Clone)]
pub struct RegisteredUser {
    pub user: User,
    pub requires_otp: bool,
}

pub struct AccountApi<B> {
    db: B,
}

impl<B: Debug> Debug for AccountApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AccountApi ({:?})", self.db)
    }
}

impl<B> AccountApi<B>
where B: AccountManagement
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    /// Register a new user.
    ///
    /// Enforces the country invariant: when the chosen country requires phone verification, a
    /// phone number must be supplied, and the caller must follow up with an OTP round-trip.
    /// For countries that don't, no OTP is ever created and `requires_otp` is false.
    pub async fn register(&self, new_user: RegistrationRequest) -> Result<RegisteredUser, AccountApiError> {
        let requires_otp = match new_user.country_id {
            Some(country_id) => {
                let country = self
                    .db
                    .fetch_country(country_id)
                    .await?
                    .ok_or(AccountApiError::CountryNotFound(country_id))?;
                country.requires_phone_verification.is_yes()
            },
            None => false,
        };
        if requires_otp && new_user.phone.as_deref().map(str::trim).unwrap_or("").is_empty() {
            return Err(AccountApiError::PhoneRequired);
        }
        let password_hash = match &new_user.password {
            Some(pw) => Some(hash_secret(pw).map_err(|e| AccountApiError::CredentialError(e.to_string()))?),
            None => None,
        };
        let user = self
            .db
            .create_user(NewUser {
                name: new_user.name,
                email: new_user.email.trim().to_lowercase(),
                phone: new_user.phone,
                country_id: new_user.country_id,
                password_hash,
            })
            .await?;
        debug!("👤️ User #{} registered (requires_otp: {requires_otp})", user.id);
        Ok(RegisteredUser { user, requires_otp })
    }

    pub async fn user_by_id(&self, id: i64) -> Result<Option<User>, AccountApiError> {
        self.db.fetch_user_by_id(id).await
    }

    pub async fn user_by_email(&self, email: &str) -> Result<Option<User>, AccountApiError> {
        self.db.fetch_user_by_email(&email.trim().to_lowercase()).await
    }

    pub async fn user_by_phone(&self, phone: &str) -> Result<Option<User>, AccountApiError> {
        self.db.fetch_user_by_phone(phone).await
    }

    pub async fn countries(&self) -> Result<Vec<Country>, AccountApiError> {
        self.db.fetch_countries().await
    }

    /// Change a user's password after verifying the current one.
    pub async fn change_password(
        &self,
        user_id: i64,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AccountApiError> {
        let user = self.db.fetch_user_by_id(user_id).await?.ok_or(AccountApiError::UserNotFound(user_id))?;
        let stored = user.password_hash.as_deref().unwrap_or("");
        let matches = !stored.is_empty()
            && verify_secret(current_password, stored).map_err(|e| AccountApiError::CredentialError(e.to_string()))?;
        if !matches {
            return Err(AccountApiError::CredentialError("Current password does not match".to_string()));
        }
        let new_hash = hash_secret(new_password).map_err(|e| AccountApiError::CredentialError(e.to_string()))?;
        self.db.update_password_hash(user_id, &new_hash).await?;
        info!("👤️ Password updated for user #{user_id}");
        Ok(())
    }

    /// Create-or-match a local user for a social identity, and record the link.
    ///
    /// Matching order: existing (provider, uid) link, then email. Profiles with no email get a
    /// generated placeholder address so the unique-email invariant holds.
    pub async fn social_login(
        &self,
        provider: &str,
        uid: &str,
        email: Option<&str>,
        name: Option<&str>,
        extra_data: &str,
    ) -> Result<User, AccountApiError> {
        if let Some(user) = self.db.fetch_user_for_social(provider, uid).await? {
            self.db.upsert_social_account(user.id, provider, uid, extra_data).await?;
            return Ok(user);
        }
        let email = match email.map(|e| e.trim().to_lowercase()).filter(|e| !e.is_empty()) {
            Some(e) => e,
            None => format!("{provider}-{uid}@{provider}.oauth.local"),
        };
        let user = match self.db.fetch_user_by_email(&email).await? {
            Some(user) => user,
            None => {
                info!("👤️ Creating a new account for {provider} identity");
                self.db
                    .create_user(NewUser {
                        name: name.unwrap_or("").to_string(),
                        email,
                        phone: None,
                        country_id: None,
                        password_hash: None,
                    })
                    .await?
            },
        };
        self.db.upsert_social_account(user.id, provider, uid, extra_data).await?;
        Ok(user)
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

/// Registration input, with the plaintext password still attached. The API hashes it before
/// anything is stored.
#[derive(Debug, Clone)]
pub struct RegistrationRequest {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub country_id: Option<i64>,
    pub password: Option<String>,
}
