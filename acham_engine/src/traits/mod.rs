//! # Database management and control.
//!
//! This module provides the interfaces that define the contracts of the engine database
//! *backends*.
//!
//! ## Traits
//! * [`AccountManagement`] defines behavior for users, countries and linked social accounts.
//! * [`OtpManagement`] defines behavior for one-time phone verification codes.
//! * [`AuthManagement`] defines behavior for persisted OAuth authorization state.
//! * [`PaymentGatewayDatabase`] defines the payment-transaction state machine storage, including
//!   the atomic compare-and-set status transition every legal-transition check relies on.
//!
//! Each trait exports its own error enum alongside it, so API layers can map backend failures
//! into their own taxonomy without dragging `sqlx` types upward.
mod account_management;
mod auth_management;
mod otp_management;
mod payment_gateway_database;

pub use account_management::{AccountApiError, AccountManagement};
pub use auth_management::{AuthApiError, AuthManagement, NewOauthState};
pub use otp_management::{OtpApiError, OtpManagement};
pub use payment_gateway_database::{PaymentGatewayDatabase, PaymentGatewayError};
