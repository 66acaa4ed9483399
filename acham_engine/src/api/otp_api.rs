//! Issuing and verifying one-time phone verification codes.

use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;

use crate::{
    db_types::{OtpCode, OtpPurpose, User, OTP_MAX_ATTEMPTS},
    helpers::{generate_otp_code, hash_secret, verify_secret},
    traits::{OtpApiError, OtpManagement},
};

/// A freshly issued code. The clear code exists only in memory, for delivery; the store keeps
/// the hash.
#[derive(Debug, Clone)]
pub struct IssuedOtp {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

pub struct OtpApi<B> {
    db: B,
}

impl<B: Debug> Debug for OtpApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OtpApi ({:?})", self.db)
    }
}

impl<B> OtpApi<B>
where B: OtpManagement
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    /// Issue a new code for the user, superseding any prior active code for the same purpose.
    ///
    /// The returned clear code is handed to the SMS layer by the caller. Delivery failure does
    /// not invalidate the stored code; the user can ask for a resend.
    pub async fn request_otp(&self, user: &User, purpose: OtpPurpose) -> Result<IssuedOtp, OtpApiError> {
        if user.phone.as_deref().map(str::trim).unwrap_or("").is_empty() {
            return Err(OtpApiError::NoPhoneNumber);
        }
        let code = generate_otp_code();
        let code_hash = hash_secret(&code).map_err(|e| OtpApiError::CredentialError(e.to_string()))?;
        let expires_at = OtpCode::default_expiry(Utc::now());
        let otp = self.db.create_otp(user.id, purpose, &code_hash, expires_at).await?;
        debug!("📨️ Issued {purpose} OTP #{} for user #{} (expires {expires_at})", otp.id, user.id);
        Ok(IssuedOtp { code, expires_at })
    }

    /// Verify a submitted code.
    ///
    /// Success consumes the code and marks the user's phone as verified. Every failure mode
    /// (no active code, expired, mismatch) maps to a validation error that leaks nothing about
    /// the stored code. A fifth wrong attempt deactivates the code.
    pub async fn verify_otp(&self, user_id: i64, purpose: OtpPurpose, code: &str) -> Result<(), OtpApiError> {
        let otp = self.db.fetch_active_otp(user_id, purpose).await?.ok_or(OtpApiError::CodeNotFound)?;
        if otp.is_expired(Utc::now()) {
            debug!("📨️ OTP #{} for user #{user_id} has expired. Deactivating.", otp.id);
            self.db.deactivate_otp(otp.id).await?;
            return Err(OtpApiError::CodeExpired);
        }
        let matches =
            verify_secret(code, &otp.code_hash).map_err(|e| OtpApiError::CredentialError(e.to_string()))?;
        if !matches {
            let attempts = self.db.record_failed_attempt(otp.id).await?;
            debug!("📨️ Wrong OTP for user #{user_id}. Attempt {attempts}/{OTP_MAX_ATTEMPTS}");
            return Err(OtpApiError::CodeMismatch);
        }
        self.db.consume_otp(otp.id, user_id).await?;
        info!("📨️ Phone verified for user #{user_id}");
        Ok(())
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}
