//! Eskiz SMS client and the delivery backend switch.

use std::sync::Arc;

use acham_common::helpers::normalize_uz_phone;
use log::*;
use reqwest::Client;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::config::EskizConfig;

const AUTH_URL: &str = "https://notify.eskiz.uz/api/auth/login";
const SMS_URL: &str = "https://notify.eskiz.uz/api/message/sms/send";

#[derive(Debug, Error)]
pub enum SmsError {
    #[error("SMS provider credentials are not configured")]
    NotConfigured,
    #[error("Could not reach the SMS provider: {0}")]
    RequestError(String),
    #[error("SMS provider rejected the request: {0}")]
    ApiError(String),
}

/// Where OTP messages go. Production configures Eskiz; everywhere else the codes are logged,
/// which keeps the flow testable without a provider account.
#[derive(Clone)]
pub enum SmsBackend {
    Eskiz(EskizClient),
    Log,
}

impl SmsBackend {
    pub fn from_config(config: &EskizConfig) -> Self {
        if config.is_configured() {
            info!("📨️ SMS delivery via Eskiz is enabled");
            SmsBackend::Eskiz(EskizClient::new(config.clone()))
        } else {
            SmsBackend::Log
        }
    }

    /// Deliver an OTP code. Failures are reported to the caller, but the code itself stays
    /// valid; the user can ask for a resend.
    pub async fn send_otp(&self, phone: &str, code: &str) -> Result<(), SmsError> {
        let message = format!("Confirmation code for registration on the Acham.uz website: {code}");
        match self {
            SmsBackend::Eskiz(client) => client.send_sms(phone, &message).await,
            SmsBackend::Log => {
                info!("📨️ [log delivery] OTP for {phone}: {code}");
                Ok(())
            },
        }
    }
}

/// Minimal Eskiz client for sending OTP codes. The bearer token from the auth endpoint is
/// cached; a 401 triggers one re-authentication and retry.
#[derive(Clone)]
pub struct EskizClient {
    config: EskizConfig,
    client: Client,
    token: Arc<RwLock<Option<String>>>,
}

impl EskizClient {
    pub fn new(config: EskizConfig) -> Self {
        Self { config, client: Client::new(), token: Arc::new(RwLock::new(None)) }
    }

    async fn authenticate(&self) -> Result<String, SmsError> {
        if !self.config.is_configured() {
            return Err(SmsError::NotConfigured);
        }
        let response = self
            .client
            .post(AUTH_URL)
            .form(&[("email", self.config.email.as_str()), ("password", self.config.password.reveal().as_str())])
            .send()
            .await
            .map_err(|e| SmsError::RequestError(e.to_string()))?;
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SmsError::ApiError(format!("Eskiz auth failed: {body}")));
        }
        let payload = response.json::<Value>().await.map_err(|e| SmsError::ApiError(e.to_string()))?;
        let token = payload["data"]["token"]
            .as_str()
            .ok_or_else(|| SmsError::ApiError(format!("Eskiz auth response missing token: {payload}")))?
            .to_string();
        *self.token.write().await = Some(token.clone());
        Ok(token)
    }

    async fn get_token(&self) -> Result<String, SmsError> {
        if let Some(token) = self.token.read().await.clone() {
            return Ok(token);
        }
        self.authenticate().await
    }

    pub async fn send_sms(&self, phone: &str, message: &str) -> Result<(), SmsError> {
        let token = self.get_token().await?;
        let formatted_phone = normalize_uz_phone(phone);
        let response = self.post_sms(&token, &formatted_phone, message).await?;
        let response = if response.status().as_u16() == 401 {
            info!("📨️ Eskiz token expired, re-authenticating.");
            let token = self.authenticate().await?;
            self.post_sms(&token, &formatted_phone, message).await?
        } else {
            response
        };
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SmsError::ApiError(format!("Eskiz send failed: {body}")));
        }
        let payload = response.json::<Value>().await.map_err(|e| SmsError::ApiError(e.to_string()))?;
        debug!("📨️ Eskiz send response: {payload}");
        Ok(())
    }

    async fn post_sms(&self, token: &str, phone: &str, message: &str) -> Result<reqwest::Response, SmsError> {
        let mut form = vec![
            ("mobile_phone", phone.to_string()),
            ("message", message.to_string()),
            ("from", self.config.sender.clone()),
        ];
        if let Some(callback) = &self.config.callback_url {
            form.push(("callback_url", callback.clone()));
        }
        self.client
            .post(SMS_URL)
            .bearer_auth(token)
            .form(&form)
            .send()
            .await
            .map_err(|e| SmsError::RequestError(e.to_string()))
    }
}
