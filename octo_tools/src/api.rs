use std::sync::Arc;

use log::*;
use reqwest::Client;
use serde_json::{json, Value};

use crate::{
    config::OctoConfig,
    data_objects::{CardData, OctoResponse, PrepareChargeRequest},
    OctoApiError,
};

/// The capability interface for the payment gateway.
///
/// Route handlers are generic over this trait so that endpoint tests can substitute a fake
/// gateway. [`OctoApi`] is the production implementation.
#[allow(async_fn_in_trait)]
pub trait OctoGateway {
    /// Register a charge with the gateway before any card data is collected.
    async fn prepare_payment(&self, request: PrepareChargeRequest) -> Result<OctoResponse, OctoApiError>;
    /// Forward the shopper's card data for an already-prepared charge.
    async fn pay(&self, transaction_id: &str, card_data: CardData) -> Result<OctoResponse, OctoApiError>;
    /// Fetch the cardholder-verification requirements for a charge (OTP URL, time box).
    async fn verification_info(&self, transaction_id: &str) -> Result<OctoResponse, OctoApiError>;
    /// Forward the SMS key the shopper received to complete verification.
    async fn check_sms_key(&self, transaction_id: &str, sms_key: &str) -> Result<OctoResponse, OctoApiError>;
    /// Poll the gateway-side state of a charge.
    async fn check_transaction(&self, transaction_id: &str) -> Result<OctoResponse, OctoApiError>;
}

#[derive(Clone)]
pub struct OctoApi {
    config: OctoConfig,
    client: Arc<Client>,
}

impl OctoApi {
    pub fn new(config: OctoConfig) -> Result<Self, OctoApiError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| OctoApiError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    pub fn config(&self) -> &OctoConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.api_url)
    }

    /// POST a JSON payload to the gateway and decode the standard envelope.
    ///
    /// Gateway-side rejections (nonzero `error`) are returned inside the envelope, not as an
    /// `Err` — callers decide whether a rejection is terminal for them. Transport and decoding
    /// problems are errors.
    async fn gateway_post(&self, path: &str, mut payload: Value) -> Result<OctoResponse, OctoApiError> {
        payload["octo_shop_id"] = json!(self.config.shop_id);
        payload["octo_secret"] = json!(self.config.shop_secret.reveal());
        let url = self.url(path);
        trace!("💳️ Sending gateway request: POST {url}");
        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| OctoApiError::RequestError(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.map_err(|e| OctoApiError::ResponseError(e.to_string()))?;
            warn!("💳️ Gateway returned HTTP {status} for {url}: {message}");
            return Err(OctoApiError::HttpError { status: status.as_u16(), message });
        }
        let envelope = response.json::<OctoResponse>().await.map_err(|e| OctoApiError::JsonError(e.to_string()))?;
        if envelope.is_success() {
            trace!("💳️ Gateway accepted request to {path}");
        } else {
            debug!(
                "💳️ Gateway rejected request to {path}. Error {}: {}",
                envelope.error,
                envelope.err_message.as_deref().unwrap_or("no message")
            );
        }
        Ok(envelope)
    }
}

impl OctoGateway for OctoApi {
    async fn prepare_payment(&self, request: PrepareChargeRequest) -> Result<OctoResponse, OctoApiError> {
        let payload = json!({
            "shop_transaction_id": request.shop_transaction_id,
            "auto_capture": true,
            "test": self.config.test_mode,
            "user_data": request.user_data,
            "total_sum": request.total_sum.to_major(),
            "currency": request.currency,
            "description": request.description,
            "basket": request.basket,
            "payment_methods": [
                { "method": "bank_card" },
                { "method": "uzcard" },
                { "method": "humo" },
            ],
            "return_url": request.return_url,
            "notify_url": request.notify_url,
            "language": request.language,
            "ttl": request.ttl,
        });
        debug!("💳️ Preparing charge for shop transaction {}", request.shop_transaction_id);
        self.gateway_post("/prepare_payment", payload).await
    }

    async fn pay(&self, transaction_id: &str, card_data: CardData) -> Result<OctoResponse, OctoApiError> {
        debug!("💳️ Forwarding card data for gateway transaction {transaction_id}");
        let payload = json!({
            "transaction_id": transaction_id,
            "card_data": card_data,
        });
        self.gateway_post("/pay", payload).await
    }

    async fn verification_info(&self, transaction_id: &str) -> Result<OctoResponse, OctoApiError> {
        debug!("💳️ Fetching verification info for gateway transaction {transaction_id}");
        self.gateway_post("/verificationInfo", json!({ "transaction_id": transaction_id })).await
    }

    async fn check_sms_key(&self, transaction_id: &str, sms_key: &str) -> Result<OctoResponse, OctoApiError> {
        debug!("💳️ Checking SMS key for gateway transaction {transaction_id}");
        let payload = json!({
            "transaction_id": transaction_id,
            "sms_key": sms_key,
        });
        self.gateway_post("/check_sms_key", payload).await
    }

    async fn check_transaction(&self, transaction_id: &str) -> Result<OctoResponse, OctoApiError> {
        debug!("💳️ Checking state of gateway transaction {transaction_id}");
        self.gateway_post("/check_transaction", json!({ "transaction_id": transaction_id })).await
    }
}
