use std::{fmt::Display, str::FromStr};

use acham_common::Money;
use chrono::{DateTime, Duration, Utc};
use log::error;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

pub const OTP_CODE_LENGTH: usize = 6;
pub const OTP_TTL_MINUTES: i64 = 10;
pub const OTP_MAX_ATTEMPTS: i64 = 5;

#[derive(Debug, Clone, Error)]
#[error("Invalid status value: {0}")]
pub struct ConversionError(String);

//--------------------------------------       YesNo         ---------------------------------------------------------
/// Y/N flag, stored as TEXT. Used for phone-verification flags on users and countries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum YesNo {
    Y,
    #[default]
    N,
}

impl YesNo {
    pub fn is_yes(&self) -> bool {
        matches!(self, YesNo::Y)
    }
}

impl From<bool> for YesNo {
    fn from(value: bool) -> Self {
        if value {
            YesNo::Y
        } else {
            YesNo::N
        }
    }
}

impl Display for YesNo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            YesNo::Y => write!(f, "Y"),
            YesNo::N => write!(f, "N"),
        }
    }
}

impl FromStr for YesNo {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Y" => Ok(Self::Y),
            "N" => Ok(Self::N),
            s => Err(ConversionError(format!("Invalid yes/no flag: {s}"))),
        }
    }
}

//--------------------------------------     Country        ----------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Country {
    pub id: i64,
    pub name: String,
    pub code: String,
    pub phone_code: String,
    pub requires_phone_verification: YesNo,
}

//--------------------------------------       User          ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub country_id: Option<i64>,
    pub phone_verified: YesNo,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub country_id: Option<i64>,
    pub password_hash: Option<String>,
}

//--------------------------------------     OtpPurpose      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum OtpPurpose {
    Registration,
    Login,
}

impl Display for OtpPurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OtpPurpose::Registration => write!(f, "Registration"),
            OtpPurpose::Login => write!(f, "Login"),
        }
    }
}

impl FromStr for OtpPurpose {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Registration" => Ok(Self::Registration),
            "Login" => Ok(Self::Login),
            s => Err(ConversionError(format!("Invalid OTP purpose: {s}"))),
        }
    }
}

//--------------------------------------      OtpCode        ---------------------------------------------------------
/// A one-time phone verification code. Only the argon2 hash of the code is stored.
///
/// At most one active code exists per (user, purpose); issuing a new code deactivates priors.
#[derive(Debug, Clone, FromRow)]
pub struct OtpCode {
    pub id: i64,
    pub user_id: i64,
    pub purpose: OtpPurpose,
    pub code_hash: String,
    pub attempts: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
}

impl OtpCode {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    pub fn default_expiry(created_at: DateTime<Utc>) -> DateTime<Utc> {
        created_at + Duration::minutes(OTP_TTL_MINUTES)
    }
}

//--------------------------------------   SocialAccount     ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SocialAccount {
    pub id: i64,
    pub user_id: i64,
    pub provider: String,
    pub uid: String,
    /// The provider profile, captured verbatim as JSON text.
    pub extra_data: String,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------     OauthState      ---------------------------------------------------------
/// A pending OAuth authorization, keyed by the random `state` parameter. Single use.
#[derive(Debug, Clone, FromRow)]
pub struct OauthState {
    pub state: String,
    pub provider: String,
    pub redirect_uri: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

//--------------------------------------   OrderStatusType   ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum OrderStatusType {
    /// The order has been placed and is waiting for a successful payment.
    PendingPayment,
    /// The gateway confirmed the payment in full.
    PaymentConfirmed,
    /// The gateway reported the payment as failed.
    PaymentFailed,
    /// The order was cancelled by the user, an admin, or the gateway.
    Cancelled,
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatusType::PendingPayment => write!(f, "PendingPayment"),
            OrderStatusType::PaymentConfirmed => write!(f, "PaymentConfirmed"),
            OrderStatusType::PaymentFailed => write!(f, "PaymentFailed"),
            OrderStatusType::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PendingPayment" => Ok(Self::PendingPayment),
            "PaymentConfirmed" => Ok(Self::PaymentConfirmed),
            "PaymentFailed" => Ok(Self::PaymentFailed),
            "Cancelled" => Ok(Self::Cancelled),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

impl From<String> for OrderStatusType {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid order status: {value}. But this conversion cannot fail. Defaulting to PendingPayment");
            OrderStatusType::PendingPayment
        })
    }
}

//--------------------------------------       Order         ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub public_id: String,
    pub number: String,
    pub user_id: i64,
    pub status: OrderStatusType,
    pub currency: String,
    pub total_amount: Money,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub number: String,
    pub user_id: i64,
    pub currency: String,
    pub total_amount: Money,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
}

//--------------------------------------    PaymentStatus    ---------------------------------------------------------
/// The lifecycle of a payment transaction against the gateway.
///
/// ```text
/// Pending ──▶ Prepared ──▶ VerificationRequired ──▶ Processing ──▶ Success
///    │            │                  │                   │    ├──▶ Failed
///    └────────────┴──────────────────┴───────────────────┘    └──▶ Cancelled
/// ```
///
/// `Success` is only reachable from `Processing` (the webhook path). `Failed` and `Cancelled`
/// can be reached from any non-terminal state except that `Pending` cannot skip to them via the
/// verification path. Terminal states accept no further changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum PaymentStatus {
    /// A transaction record exists but the gateway has not acknowledged the charge yet.
    Pending,
    /// The gateway registered the charge and returned its transaction id.
    Prepared,
    /// The gateway wants cardholder verification (SMS key or a hosted OTP form).
    VerificationRequired,
    /// The charge was handed off for capture; the webhook will report the outcome.
    Processing,
    Success,
    Failed,
    Cancelled,
}

impl PaymentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Success | PaymentStatus::Failed | PaymentStatus::Cancelled)
    }

    /// The allowed-transition table. Anything not listed here is an illegal state change and
    /// must be rejected with a conflict error.
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (*self, next),
            (Pending, Prepared)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (Prepared, VerificationRequired)
                | (Prepared, Processing)
                | (Prepared, Failed)
                | (Prepared, Cancelled)
                | (VerificationRequired, Processing)
                | (VerificationRequired, Failed)
                | (VerificationRequired, Cancelled)
                | (Processing, Success)
                | (Processing, Failed)
                | (Processing, Cancelled)
        )
    }
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "Pending"),
            PaymentStatus::Prepared => write!(f, "Prepared"),
            PaymentStatus::VerificationRequired => write!(f, "VerificationRequired"),
            PaymentStatus::Processing => write!(f, "Processing"),
            PaymentStatus::Success => write!(f, "Success"),
            PaymentStatus::Failed => write!(f, "Failed"),
            PaymentStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Prepared" => Ok(Self::Prepared),
            "VerificationRequired" => Ok(Self::VerificationRequired),
            "Processing" => Ok(Self::Processing),
            "Success" => Ok(Self::Success),
            "Failed" => Ok(Self::Failed),
            "Cancelled" => Ok(Self::Cancelled),
            s => Err(ConversionError(format!("Invalid payment status: {s}"))),
        }
    }
}

impl From<String> for PaymentStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid payment status: {value}. But this conversion cannot fail. Defaulting to Pending");
            PaymentStatus::Pending
        })
    }
}

//-------------------------------------- PaymentTransaction  ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PaymentTransaction {
    pub id: i64,
    pub order_id: i64,
    pub shop_transaction_id: String,
    pub octo_transaction_id: Option<String>,
    pub octo_payment_id: Option<String>,
    pub status: PaymentStatus,
    pub amount: Money,
    pub currency: String,
    pub verification_url: Option<String>,
    pub seconds_left: Option<i64>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    /// The request we sent to the gateway, captured verbatim as JSON text for audit.
    pub request_payload: String,
    /// The last gateway response or webhook payload, captured verbatim as JSON text.
    pub response_payload: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewPaymentTransaction {
    pub order_id: i64,
    pub shop_transaction_id: String,
    pub amount: Money,
    pub currency: String,
    pub request_payload: String,
}

/// A partial update applied together with a status transition. Only supplied fields change.
#[derive(Debug, Clone, Default)]
pub struct TransactionUpdate {
    pub octo_transaction_id: Option<String>,
    pub octo_payment_id: Option<String>,
    pub verification_url: Option<String>,
    pub seconds_left: Option<i64>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub request_payload: Option<String>,
    pub response_payload: Option<String>,
}

#[cfg(test)]
mod test {
    use super::PaymentStatus::{self, *};

    const ALL: [PaymentStatus; 7] =
        [Pending, Prepared, VerificationRequired, Processing, Success, Failed, Cancelled];

    #[test]
    fn happy_path_is_legal() {
        assert!(Pending.can_transition_to(Prepared));
        assert!(Prepared.can_transition_to(VerificationRequired));
        assert!(VerificationRequired.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Success));
    }

    #[test]
    fn immediate_approval_skips_verification() {
        assert!(Prepared.can_transition_to(Processing));
    }

    #[test]
    fn success_is_only_reachable_from_processing() {
        for status in ALL {
            assert_eq!(status.can_transition_to(Success), status == Processing, "from {status}");
        }
    }

    #[test]
    fn terminal_states_accept_nothing() {
        for terminal in [Success, Failed, Cancelled] {
            assert!(terminal.is_terminal());
            for next in ALL {
                assert!(!terminal.can_transition_to(next), "{terminal} -> {next} should be rejected");
            }
        }
    }

    #[test]
    fn no_backward_or_skipping_transitions() {
        assert!(!Pending.can_transition_to(Processing));
        assert!(!Pending.can_transition_to(VerificationRequired));
        assert!(!Prepared.can_transition_to(Pending));
        assert!(!Processing.can_transition_to(Prepared));
        assert!(!VerificationRequired.can_transition_to(Prepared));
    }

    #[test]
    fn statuses_round_trip_through_text() {
        for status in ALL {
            let text = status.to_string();
            assert_eq!(text.parse::<PaymentStatus>().unwrap(), status);
        }
    }
}
