//! ACHAM Payment & Accounts Engine
//!
//! This library contains the core logic for the ACHAM commerce backend: user accounts and
//! phone verification, credential checks for token issuance, and the payment-transaction state
//! machine that tracks charges against the external OCTO gateway.
//!
//! The library is divided into two main sections:
//! 1. Database management and control ([`mod@sqlite`]). You should never need to access the
//!    database directly. Instead, use the public API provided by the engine. The exception is the
//!    data types used in the database. These are defined in the `db_types` module and are public.
//! 2. The engine public API ([`mod@api`]). This provides the public-facing functionality of the
//!    engine. It is responsible for managing users, OTP codes, credentials and payment
//!    transactions. Specific backends need to implement the traits in the [`mod@traits`] module
//!    in order to act as a backend for the ACHAM server.
pub mod api;
pub mod db_types;
pub mod helpers;
pub mod traits;

#[cfg(feature = "sqlite")]
pub mod test_utils;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;

pub use api::{
    accounts_api::AccountApi,
    auth_api::AuthApi,
    otp_api::{IssuedOtp, OtpApi},
    payment_flow_api::{NotificationOutcome, PaymentFlowApi},
};
pub use traits::{
    AccountApiError,
    AccountManagement,
    AuthApiError,
    AuthManagement,
    OtpApiError,
    OtpManagement,
    PaymentGatewayDatabase,
    PaymentGatewayError,
};
