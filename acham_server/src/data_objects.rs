use std::fmt::Display;

use acham_engine::db_types::{OrderStatusType, PaymentStatus, PaymentTransaction, User};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::TokenPair;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

//----------------------------------------  Users & auth  -------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub name: String,
    pub email: String,
    pub password: Option<String>,
    pub country_id: Option<i64>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterResponse {
    pub user: User,
    pub requires_otp: bool,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyOtpRequest {
    pub otp_code: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResendOtpRequest {
    pub user_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    /// Email address or phone number.
    pub identifier: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhoneLoginRequest {
    pub phone: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhoneVerifyRequest {
    pub phone: String,
    pub otp_code: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshRequest {
    pub refresh: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyTokenRequest {
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// The standard response to any successful login or registration: the token pair plus the user.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPairResponse {
    pub access: String,
    pub refresh: String,
    pub user: User,
}

impl TokenPairResponse {
    pub fn new(pair: TokenPair, user: User) -> Self {
        Self { access: pair.access, refresh: pair.refresh, user }
    }
}

//----------------------------------------  Social login  -------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizeQuery {
    pub redirect_uri: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthorizeResponse {
    pub authorization_url: String,
    pub state: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OauthCallbackRequest {
    pub code: String,
    pub state: String,
    pub redirect_uri: String,
}

//----------------------------------------  Payments  -----------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ConfirmPaymentRequest {
    pub transaction_id: String,
    pub card_number: String,
    /// Expiry in MMYY format.
    pub expire: String,
    #[serde(default)]
    pub cardholder_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentOtpRequest {
    pub transaction_id: String,
    pub sms_key: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct InitiateResponse {
    pub transaction_id: Option<String>,
    pub shop_transaction_id: String,
    pub status: PaymentStatus,
    pub verification_url: Option<String>,
    pub seconds_left: Option<i64>,
}

impl From<&PaymentTransaction> for InitiateResponse {
    fn from(tx: &PaymentTransaction) -> Self {
        Self {
            transaction_id: tx.octo_transaction_id.clone(),
            shop_transaction_id: tx.shop_transaction_id.clone(),
            status: tx.status,
            verification_url: tx.verification_url.clone(),
            seconds_left: tx.seconds_left,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentStatusResponse {
    pub transaction_id: Option<String>,
    pub payment_id: Option<String>,
    pub status: PaymentStatus,
    pub verification_url: Option<String>,
    pub seconds_left: Option<i64>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

impl From<&PaymentTransaction> for PaymentStatusResponse {
    fn from(tx: &PaymentTransaction) -> Self {
        Self {
            transaction_id: tx.octo_transaction_id.clone(),
            payment_id: tx.octo_payment_id.clone(),
            status: tx.status,
            verification_url: tx.verification_url.clone(),
            seconds_left: tx.seconds_left,
            error_code: tx.error_code.clone(),
            error_message: tx.error_message.clone(),
        }
    }
}

/// The status-poll response: where the order stands, and the latest payment attempt if one was
/// ever made.
#[derive(Debug, Clone, Serialize)]
pub struct OrderPaymentStatus {
    pub order_status: OrderStatusType,
    pub paid_at: Option<DateTime<Utc>>,
    pub payment: Option<PaymentStatusResponse>,
}

/// The gateway's webhook payload. Field names vary between gateway versions, so both the
/// transaction id spellings are accepted and the outcome is derived from whichever of `status`
/// and `error` is present.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentNotification {
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub error: Option<i64>,
    #[serde(rename = "errMessage", default)]
    pub err_message: Option<String>,
}

impl PaymentNotification {
    pub fn gateway_id(&self) -> Option<&str> {
        self.transaction_id.as_deref().or(self.id.as_deref())
    }

    /// The terminal status the gateway is reporting, if the payload is conclusive.
    pub fn reported_status(&self) -> Option<PaymentStatus> {
        let status = self.status.as_deref().map(str::to_lowercase);
        match (status.as_deref(), self.error) {
            (Some("success"), _) => Some(PaymentStatus::Success),
            (_, Some(0)) => Some(PaymentStatus::Success),
            (Some("cancelled"), _) | (Some("canceled"), _) => Some(PaymentStatus::Cancelled),
            (Some("failed"), _) => Some(PaymentStatus::Failed),
            (_, Some(_)) => Some(PaymentStatus::Failed),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn notification_outcomes() {
        let n: PaymentNotification =
            serde_json::from_str(r#"{"transaction_id":"t1","status":"success"}"#).unwrap();
        assert_eq!(n.reported_status(), Some(PaymentStatus::Success));
        assert_eq!(n.gateway_id(), Some("t1"));

        let n: PaymentNotification = serde_json::from_str(r#"{"id":"t2","error":0}"#).unwrap();
        assert_eq!(n.reported_status(), Some(PaymentStatus::Success));
        assert_eq!(n.gateway_id(), Some("t2"));

        let n: PaymentNotification =
            serde_json::from_str(r#"{"id":"t3","error":-20405,"errMessage":"Declined"}"#).unwrap();
        assert_eq!(n.reported_status(), Some(PaymentStatus::Failed));

        let n: PaymentNotification = serde_json::from_str(r#"{"id":"t4","status":"cancelled"}"#).unwrap();
        assert_eq!(n.reported_status(), Some(PaymentStatus::Cancelled));

        let n: PaymentNotification = serde_json::from_str(r#"{"id":"t5"}"#).unwrap();
        assert_eq!(n.reported_status(), None);
    }
}
