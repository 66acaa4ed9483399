//! Token issuing and verification.
//!
//! Successful logins get a pair: a short-lived access token and a long-lived refresh token,
//! both HS256-signed JWTs over the configured server secret. The refresh token can only be
//! spent at the refresh endpoint; the access token is what authenticates every other protected
//! route, via the [`JwtClaims`] extractor.

use std::future::{ready, Ready};

use actix_web::{dev::Payload, FromRequest, HttpRequest};
use acham_engine::db_types::User;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{config::AuthConfig, errors::ServerError};

pub const ACCESS_TOKEN_MINUTES: i64 = 60;
pub const REFRESH_TOKEN_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject: the user id, stringified per JWT convention.
    pub sub: String,
    pub user_id: i64,
    pub email: String,
    pub token_type: TokenType,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl TokenIssuer {
    pub fn new(config: &AuthConfig) -> Self {
        let secret = config.jwt_secret.reveal().as_bytes();
        Self { encoding_key: EncodingKey::from_secret(secret), decoding_key: DecodingKey::from_secret(secret) }
    }

    /// Issue a fresh access + refresh pair for the user.
    pub fn issue_pair(&self, user: &User) -> Result<TokenPair, ServerError> {
        let access = self.issue(user, TokenType::Access, Duration::minutes(ACCESS_TOKEN_MINUTES))?;
        let refresh = self.issue(user, TokenType::Refresh, Duration::days(REFRESH_TOKEN_DAYS))?;
        Ok(TokenPair { access, refresh })
    }

    fn issue(&self, user: &User, token_type: TokenType, ttl: Duration) -> Result<String, ServerError> {
        let now = Utc::now();
        let claims = JwtClaims {
            sub: user.id.to_string(),
            user_id: user.id,
            email: user.email.clone(),
            token_type,
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| ServerError::BackendError(format!("Could not sign token. {e}")))
    }

    pub fn verify_access(&self, token: &str) -> Result<JwtClaims, ServerError> {
        self.verify(token, TokenType::Access)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<JwtClaims, ServerError> {
        self.verify(token, TokenType::Refresh)
    }

    fn verify(&self, token: &str, expected: TokenType) -> Result<JwtClaims, ServerError> {
        let data = decode::<JwtClaims>(token, &self.decoding_key, &Validation::default()).map_err(|e| {
            debug!("🔐️ Token validation failed: {e}");
            ServerError::AuthenticationError("Token is invalid or expired.".to_string())
        })?;
        if data.claims.token_type != expected {
            debug!("🔐️ Wrong token type presented: {:?}", data.claims.token_type);
            return Err(ServerError::AuthenticationError("Wrong token type for this operation.".to_string()));
        }
        Ok(data.claims)
    }
}

/// Extracts and verifies the bearer access token, so protected handlers can simply take a
/// `JwtClaims` argument.
impl FromRequest for JwtClaims {
    type Error = ServerError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(claims_from_request(req))
    }
}

fn claims_from_request(req: &HttpRequest) -> Result<JwtClaims, ServerError> {
    let signer = req
        .app_data::<actix_web::web::Data<TokenIssuer>>()
        .ok_or_else(|| ServerError::InitializeError("TokenIssuer is not configured".to_string()))?;
    let header = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or(ServerError::CouldNotDeserializeAuthToken)?;
    let token = header.strip_prefix("Bearer ").ok_or(ServerError::CouldNotDeserializeAuthToken)?;
    signer.verify_access(token.trim())
}
