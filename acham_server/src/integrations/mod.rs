//! Clients for the external providers the server delegates to: Eskiz for SMS delivery, and the
//! OAuth providers for social login. The payment gateway client lives in its own crate
//! (`octo_tools`).
pub mod eskiz;
pub mod oauth;

pub use eskiz::{EskizClient, SmsBackend, SmsError};
pub use oauth::{OauthClient, SocialProfile};
