//! Social-login bridge: authorize-URL construction, code exchange and profile fetch for the
//! configured OAuth providers.
//!
//! The providers differ in small, annoying ways: Google wants space-separated scopes, a form
//! POST for the token exchange and reports its user id as `sub`; Facebook wants comma-separated
//! scopes, a GET token exchange and an explicit field list on the profile call. State and code
//! validation beyond the round-trip itself is the provider's problem, not ours.

use log::*;
use reqwest::Client;
use serde_json::Value;
use url::Url;

use crate::{
    config::{OauthConfig, OauthProviderConfig},
    errors::ServerError,
};

struct ProviderEndpoints {
    authorization_base_url: &'static str,
    token_url: &'static str,
    userinfo_url: &'static str,
}

fn endpoints(provider: &str) -> Option<ProviderEndpoints> {
    match provider {
        "google" => Some(ProviderEndpoints {
            authorization_base_url: "https://accounts.google.com/o/oauth2/v2/auth",
            token_url: "https://oauth2.googleapis.com/token",
            userinfo_url: "https://www.googleapis.com/oauth2/v3/userinfo",
        }),
        "facebook" => Some(ProviderEndpoints {
            authorization_base_url: "https://www.facebook.com/v18.0/dialog/oauth",
            token_url: "https://graph.facebook.com/v18.0/oauth/access_token",
            userinfo_url: "https://graph.facebook.com/me",
        }),
        _ => None,
    }
}

/// The identity we extract from a provider profile, plus the raw payload for audit.
#[derive(Debug, Clone)]
pub struct SocialProfile {
    pub uid: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub raw: Value,
}

#[derive(Clone)]
pub struct OauthClient {
    config: OauthConfig,
    client: Client,
}

impl OauthClient {
    pub fn new(config: OauthConfig) -> Self {
        Self { config, client: Client::new() }
    }

    fn provider_config(&self, provider: &str) -> Result<&OauthProviderConfig, ServerError> {
        self.config
            .provider(provider)
            .ok_or_else(|| ServerError::ConfigurationError(format!("OAuth provider {provider} is not configured")))
    }

    /// Whether this provider name is one we know how to talk to at all.
    pub fn is_known_provider(provider: &str) -> bool {
        endpoints(provider).is_some()
    }

    pub fn build_authorization_url(
        &self,
        provider: &str,
        redirect_uri: &str,
        state: &str,
    ) -> Result<String, ServerError> {
        let config = self.provider_config(provider)?;
        let endpoints = endpoints(provider)
            .ok_or_else(|| ServerError::field("provider", format!("Unknown provider: {provider}")))?;
        let mut url = Url::parse(endpoints.authorization_base_url)
            .map_err(|e| ServerError::ConfigurationError(e.to_string()))?;
        {
            let mut params = url.query_pairs_mut();
            params.append_pair("client_id", &config.client_id);
            params.append_pair("redirect_uri", redirect_uri);
            params.append_pair("response_type", "code");
            params.append_pair("state", state);
            match provider {
                "google" => {
                    params.append_pair("scope", &config.scopes.join(" "));
                    params.append_pair("access_type", "offline");
                    params.append_pair("prompt", "consent");
                },
                _ => {
                    params.append_pair("scope", &config.scopes.join(","));
                },
            }
        }
        Ok(url.to_string())
    }

    /// Exchange the authorization code for the provider's token set.
    pub async fn exchange_code(
        &self,
        provider: &str,
        code: &str,
        redirect_uri: &str,
    ) -> Result<Value, ServerError> {
        let config = self.provider_config(provider)?;
        let endpoints = endpoints(provider)
            .ok_or_else(|| ServerError::field("provider", format!("Unknown provider: {provider}")))?;
        debug!("🔐️ Exchanging authorization code with {provider}");
        let response = match provider {
            "google" => self
                .client
                .post(endpoints.token_url)
                .form(&[
                    ("code", code),
                    ("client_id", config.client_id.as_str()),
                    ("client_secret", config.client_secret.reveal().as_str()),
                    ("redirect_uri", redirect_uri),
                    ("grant_type", "authorization_code"),
                ])
                .send()
                .await,
            _ => self
                .client
                .get(endpoints.token_url)
                .query(&[
                    ("code", code),
                    ("client_id", config.client_id.as_str()),
                    ("client_secret", config.client_secret.reveal().as_str()),
                    ("redirect_uri", redirect_uri),
                ])
                .send()
                .await,
        }
        .map_err(|e| ServerError::UpstreamError { code: "-1".to_string(), message: e.to_string() })?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            warn!("🔐️ {provider} token exchange failed ({status}): {body}");
            return Err(ServerError::UpstreamError { code: status.to_string(), message: body });
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| ServerError::UpstreamError { code: "-1".to_string(), message: e.to_string() })
    }

    /// Fetch the provider profile for the exchanged access token.
    pub async fn fetch_profile(&self, provider: &str, access_token: &str) -> Result<SocialProfile, ServerError> {
        let endpoints = endpoints(provider)
            .ok_or_else(|| ServerError::field("provider", format!("Unknown provider: {provider}")))?;
        let response = match provider {
            "google" => self.client.get(endpoints.userinfo_url).bearer_auth(access_token).send().await,
            _ => self
                .client
                .get(endpoints.userinfo_url)
                .query(&[("access_token", access_token), ("fields", "id,name,email")])
                .send()
                .await,
        }
        .map_err(|e| ServerError::UpstreamError { code: "-1".to_string(), message: e.to_string() })?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ServerError::UpstreamError { code: status.to_string(), message: body });
        }
        let raw = response
            .json::<Value>()
            .await
            .map_err(|e| ServerError::UpstreamError { code: "-1".to_string(), message: e.to_string() })?;
        profile_from_payload(raw)
    }
}

/// Pull the identity fields out of a provider profile. Google reports `sub` where Facebook
/// reports `id`.
pub fn profile_from_payload(raw: Value) -> Result<SocialProfile, ServerError> {
    let uid = raw["id"]
        .as_str()
        .or_else(|| raw["sub"].as_str())
        .map(String::from)
        .ok_or_else(|| ServerError::field("code", "Unable to determine user identifier from provider response"))?;
    let email = raw["email"].as_str().map(String::from);
    let name = raw["name"].as_str().or_else(|| raw["given_name"].as_str()).map(String::from);
    Ok(SocialProfile { uid, email, name, raw })
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::profile_from_payload;

    #[test]
    fn google_profiles_use_sub() {
        let profile =
            profile_from_payload(json!({"sub": "g-1", "email": "a@b.com", "given_name": "Ann"})).unwrap();
        assert_eq!(profile.uid, "g-1");
        assert_eq!(profile.email.as_deref(), Some("a@b.com"));
        assert_eq!(profile.name.as_deref(), Some("Ann"));
    }

    #[test]
    fn facebook_profiles_use_id() {
        let profile = profile_from_payload(json!({"id": "fb-2", "name": "Bob"})).unwrap();
        assert_eq!(profile.uid, "fb-2");
        assert!(profile.email.is_none());
    }

    #[test]
    fn missing_identifier_is_an_error() {
        assert!(profile_from_payload(json!({"email": "x@y.z"})).is_err());
    }
}
