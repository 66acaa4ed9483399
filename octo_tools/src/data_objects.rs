use acham_common::Money;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::OctoApiError;

/// The envelope every OCTO endpoint responds with.
///
/// `error == 0` means success; anything else is a gateway-side rejection with `errMessage`
/// carrying the human-readable reason. The raw `data` object is kept verbatim so callers can
/// persist the exchange for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OctoResponse {
    #[serde(default)]
    pub error: i64,
    #[serde(rename = "errMessage", default)]
    pub err_message: Option<String>,
    #[serde(rename = "apiMessageForDevelopers", default)]
    pub api_message: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}

impl OctoResponse {
    pub fn is_success(&self) -> bool {
        self.error == 0
    }

    /// Unwrap the `data` object, converting a gateway rejection into an error.
    pub fn into_data(self) -> Result<Value, OctoApiError> {
        if self.is_success() {
            Ok(self.data.unwrap_or(Value::Null))
        } else {
            Err(OctoApiError::GatewayError {
                code: self.error,
                message: self.err_message.unwrap_or_else(|| "Gateway rejected the request".to_string()),
            })
        }
    }

    pub fn typed_data<T: serde::de::DeserializeOwned>(self) -> Result<T, OctoApiError> {
        let data = self.into_data()?;
        serde_json::from_value(data).map_err(|e| OctoApiError::JsonError(e.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserData {
    pub user_id: String,
    pub phone: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasketItem {
    pub position_desc: String,
    pub count: u32,
    pub price: f64,
    pub spic: String,
    pub inn: String,
    pub package_code: String,
    pub nds: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardData {
    pub card_number: String,
    /// Expiry in MMYY format.
    pub expire: String,
    #[serde(default)]
    pub cardholder_name: String,
}

/// Everything `prepare_payment` needs besides the shop credentials, which the client injects.
#[derive(Debug, Clone, Serialize)]
pub struct PrepareChargeRequest {
    pub shop_transaction_id: String,
    pub total_sum: Money,
    pub currency: String,
    pub description: String,
    pub user_data: UserData,
    pub basket: Vec<BasketItem>,
    pub return_url: String,
    pub notify_url: String,
    pub language: String,
    /// Minutes before the prepared charge expires gateway-side.
    pub ttl: u32,
}

/// `data` payload of a successful `prepare_payment` call.
#[derive(Debug, Clone, Deserialize)]
pub struct PreparedCharge {
    pub id: String,
    #[serde(rename = "octo_pay_url", default)]
    pub pay_url: Option<String>,
}

/// `data` payload of a successful `pay` call.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChargeAccepted {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// `data` payload of a successful `verificationInfo` call.
#[derive(Debug, Clone, Deserialize)]
pub struct VerificationInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub verification_url: Option<String>,
    #[serde(rename = "secondsLeft", default)]
    pub seconds_left: Option<i64>,
    #[serde(default)]
    pub status: Option<String>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn success_envelope() {
        let raw = r#"{"error":0,"data":{"id":"a1b2","octo_pay_url":"https://pay2.octo.uz/pay/a1b2"}}"#;
        let response: OctoResponse = serde_json::from_str(raw).unwrap();
        assert!(response.is_success());
        let charge: PreparedCharge = response.typed_data().unwrap();
        assert_eq!(charge.id, "a1b2");
        assert_eq!(charge.pay_url.as_deref(), Some("https://pay2.octo.uz/pay/a1b2"));
    }

    #[test]
    fn rejection_envelope() {
        let raw = r#"{"error":-20407,"errMessage":"Invalid card number"}"#;
        let response: OctoResponse = serde_json::from_str(raw).unwrap();
        assert!(!response.is_success());
        let err = response.into_data().unwrap_err();
        assert_eq!(err.gateway_code(), Some(-20407));
    }

    #[test]
    fn verification_info_field_names() {
        let raw = r#"{"error":0,"data":{"id":"p-77","verification_url":null,"secondsLeft":300,"status":"verification_required"}}"#;
        let response: OctoResponse = serde_json::from_str(raw).unwrap();
        let info: VerificationInfo = response.typed_data().unwrap();
        assert_eq!(info.seconds_left, Some(300));
        assert_eq!(info.id.as_deref(), Some("p-77"));
        assert!(info.verification_url.is_none());
    }
}
