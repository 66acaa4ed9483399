use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db_types::{OtpCode, OtpPurpose};

#[derive(Debug, Clone, Error)]
pub enum OtpApiError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("OTP code not found or expired")]
    CodeNotFound,
    #[error("OTP code expired")]
    CodeExpired,
    #[error("Invalid OTP code")]
    CodeMismatch,
    #[error("User has no phone number")]
    NoPhoneNumber,
    #[error("Could not hash the OTP code. {0}")]
    CredentialError(String),
}

impl From<sqlx::Error> for OtpApiError {
    fn from(e: sqlx::Error) -> Self {
        OtpApiError::DatabaseError(e.to_string())
    }
}

impl OtpApiError {
    /// Whether this error should surface as a field validation failure rather than a 5xx.
    pub fn is_validation(&self) -> bool {
        matches!(self, OtpApiError::CodeNotFound | OtpApiError::CodeExpired | OtpApiError::CodeMismatch)
    }
}

/// Storage for one-time phone verification codes.
#[allow(async_fn_in_trait)]
pub trait OtpManagement {
    /// Deactivate any prior active codes for (user, purpose) and insert the new one, atomically.
    async fn create_otp(
        &self,
        user_id: i64,
        purpose: OtpPurpose,
        code_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<OtpCode, OtpApiError>;

    async fn fetch_active_otp(&self, user_id: i64, purpose: OtpPurpose) -> Result<Option<OtpCode>, OtpApiError>;

    /// Bump the failure counter; deactivates the code once the attempt limit is reached.
    /// Returns the new attempt count.
    async fn record_failed_attempt(&self, otp_id: i64) -> Result<i64, OtpApiError>;

    async fn deactivate_otp(&self, otp_id: i64) -> Result<(), OtpApiError>;

    /// Consume the code and mark the owner's phone as verified, in one transaction.
    async fn consume_otp(&self, otp_id: i64, user_id: i64) -> Result<(), OtpApiError>;
}
