use thiserror::Error;

#[derive(Debug, Error)]
pub enum OctoApiError {
    #[error("Could not initialize client: {0}")]
    Initialization(String),
    #[error("Could not reach the OCTO gateway: {0}")]
    RequestError(String),
    #[error("Invalid response from the OCTO gateway: {0}")]
    ResponseError(String),
    #[error("Could not deserialize JSON: {0}")]
    JsonError(String),
    #[error("Gateway request failed. HTTP {status}. {message}")]
    HttpError { status: u16, message: String },
    #[error("Gateway rejected the request. Error {code}. {message}")]
    GatewayError { code: i64, message: String },
}

impl OctoApiError {
    /// The gateway's own error code, when it supplied one.
    pub fn gateway_code(&self) -> Option<i64> {
        match self {
            OctoApiError::GatewayError { code, .. } => Some(*code),
            _ => None,
        }
    }
}
