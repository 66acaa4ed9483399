use thiserror::Error;

use crate::db_types::{Country, NewUser, SocialAccount, User};

#[derive(Debug, Clone, Error)]
pub enum AccountApiError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("An account with email {0} already exists")]
    EmailTaken(String),
    #[error("User account {0} not found")]
    UserNotFound(i64),
    #[error("Country {0} does not exist")]
    CountryNotFound(i64),
    #[error("A phone number is required for this country")]
    PhoneRequired,
    #[error("Could not hash the supplied credential. {0}")]
    CredentialError(String),
}

impl From<sqlx::Error> for AccountApiError {
    fn from(e: sqlx::Error) -> Self {
        AccountApiError::DatabaseError(e.to_string())
    }
}

/// Queries and mutations for user accounts, the country reference table, and linked social
/// accounts.
#[allow(async_fn_in_trait)]
pub trait AccountManagement {
    async fn fetch_user_by_id(&self, id: i64) -> Result<Option<User>, AccountApiError>;

    /// Email lookups are case-insensitive; backends store emails lowercased.
    async fn fetch_user_by_email(&self, email: &str) -> Result<Option<User>, AccountApiError>;

    async fn fetch_user_by_phone(&self, phone: &str) -> Result<Option<User>, AccountApiError>;

    /// Insert a new user. Returns [`AccountApiError::EmailTaken`] on a duplicate email.
    async fn create_user(&self, user: NewUser) -> Result<User, AccountApiError>;

    /// Flip the user's phone-verification flag to `Y`. Returns the updated record.
    async fn set_phone_verified(&self, user_id: i64) -> Result<User, AccountApiError>;

    async fn update_password_hash(&self, user_id: i64, password_hash: &str) -> Result<(), AccountApiError>;

    /// The country reference table, ordered by name.
    async fn fetch_countries(&self) -> Result<Vec<Country>, AccountApiError>;

    async fn fetch_country(&self, id: i64) -> Result<Option<Country>, AccountApiError>;

    /// The user linked to the given provider identity, if any.
    async fn fetch_user_for_social(&self, provider: &str, uid: &str) -> Result<Option<User>, AccountApiError>;

    /// Link a provider identity to a user, updating the captured profile if the link exists.
    async fn upsert_social_account(
        &self,
        user_id: i64,
        provider: &str,
        uid: &str,
        extra_data: &str,
    ) -> Result<SocialAccount, AccountApiError>;
}
