//! # Engine public API
//!
//! The `api` module exposes the programmatic API for the ACHAM engine. The API is modular, so
//! that clients can pick and choose the functionality they need, and different parts could be
//! backed by different stores.
//!
//! * [`accounts_api`] manages user registration, profiles, passwords, countries and social
//!   identities.
//! * [`auth_api`] checks login credentials and tracks OAuth authorization state.
//! * [`otp_api`] issues and verifies one-time phone verification codes.
//! * [`payment_flow_api`] drives the payment-transaction state machine in response to gateway
//!   responses and webhook notifications.
//!
//! # API usage
//!
//! The pattern for all the APIs is the same. An API instance is created by supplying a database
//! backend that implements the backend traits the API requires:
//!
//! ```rust,ignore
//! use acham_engine::{AccountApi, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url(...).await?;
//! // SqliteDatabase implements AccountManagement
//! let api = AccountApi::new(db);
//! let countries = api.countries().await?;
//! ```
pub mod accounts_api;
pub mod auth_api;
pub mod otp_api;
pub mod payment_flow_api;
