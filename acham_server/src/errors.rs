use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use acham_engine::{AccountApiError, AuthApiError, OtpApiError, PaymentGatewayError};
use octo_tools::OctoApiError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("{message}")]
    FieldValidation { field: String, message: String },
    #[error("Authentication failed. {0}")]
    AuthenticationError(String),
    #[error("Auth token invalid or not provided")]
    CouldNotDeserializeAuthToken,
    #[error("Insufficient Permissions. {0}")]
    InsufficientPermissions(String),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("Conflict. {0}")]
    Conflict(String),
    #[error("The payment provider rejected the request. {message}")]
    UpstreamError { code: String, message: String },
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
}

impl ServerError {
    /// Shorthand for the ubiquitous 400-with-a-field-message case.
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        Self::FieldValidation { field: field.to_string(), message: message.into() }
    }
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::FieldValidation { .. } => StatusCode::BAD_REQUEST,
            Self::AuthenticationError(_) => StatusCode::UNAUTHORIZED,
            Self::CouldNotDeserializeAuthToken => StatusCode::UNAUTHORIZED,
            Self::InsufficientPermissions(_) => StatusCode::FORBIDDEN,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::UpstreamError { .. } => StatusCode::BAD_GATEWAY,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            Self::FieldValidation { field, message } => {
                serde_json::json!({ "errors": { field: message } })
            },
            Self::UpstreamError { code, message } => {
                serde_json::json!({ "error": message, "error_code": code })
            },
            _ => serde_json::json!({ "error": self.to_string() }),
        };
        HttpResponse::build(self.status_code()).insert_header(ContentType::json()).body(body.to_string())
    }
}

impl From<AccountApiError> for ServerError {
    fn from(e: AccountApiError) -> Self {
        match e {
            AccountApiError::EmailTaken(_) => Self::field("email", e.to_string()),
            AccountApiError::PhoneRequired => Self::field("phone", e.to_string()),
            AccountApiError::CountryNotFound(_) => Self::field("country_id", e.to_string()),
            AccountApiError::UserNotFound(_) => Self::NoRecordFound(e.to_string()),
            AccountApiError::CredentialError(_) => Self::AuthenticationError(e.to_string()),
            AccountApiError::DatabaseError(e) => Self::BackendError(format!("Database error: {e}")),
        }
    }
}

impl From<AuthApiError> for ServerError {
    fn from(e: AuthApiError) -> Self {
        match e {
            AuthApiError::InvalidCredentials => Self::AuthenticationError(e.to_string()),
            AuthApiError::StateNotFound => Self::field("state", e.to_string()),
            AuthApiError::CredentialError(_) => Self::AuthenticationError(e.to_string()),
            AuthApiError::DatabaseError(e) => Self::BackendError(format!("Database error: {e}")),
        }
    }
}

impl From<OtpApiError> for ServerError {
    fn from(e: OtpApiError) -> Self {
        match e {
            OtpApiError::CodeNotFound | OtpApiError::CodeExpired | OtpApiError::CodeMismatch => {
                Self::field("otp_code", e.to_string())
            },
            OtpApiError::NoPhoneNumber => Self::field("phone", e.to_string()),
            OtpApiError::CredentialError(e) => Self::BackendError(e),
            OtpApiError::DatabaseError(e) => Self::BackendError(format!("Database error: {e}")),
        }
    }
}

impl From<PaymentGatewayError> for ServerError {
    fn from(e: PaymentGatewayError) -> Self {
        match e {
            PaymentGatewayError::OrderNotFound(_) | PaymentGatewayError::OrderIdNotFound(_) => {
                Self::NoRecordFound(e.to_string())
            },
            PaymentGatewayError::TransactionNotFound(_) => Self::NoRecordFound(e.to_string()),
            PaymentGatewayError::IllegalStatusChange { .. } | PaymentGatewayError::OrderNotPayable(_) => {
                Self::Conflict(e.to_string())
            },
            PaymentGatewayError::DatabaseError(e) => Self::BackendError(format!("Database error: {e}")),
        }
    }
}

impl From<OctoApiError> for ServerError {
    fn from(e: OctoApiError) -> Self {
        match e {
            OctoApiError::GatewayError { code, message } => Self::UpstreamError { code: code.to_string(), message },
            OctoApiError::HttpError { status, message } => {
                Self::UpstreamError { code: status.to_string(), message }
            },
            OctoApiError::RequestError(message) => Self::UpstreamError { code: "-1".to_string(), message },
            other => Self::UpstreamError { code: "-1".to_string(), message: other.to_string() },
        }
    }
}
