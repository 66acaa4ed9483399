use std::env;

use acham_common::{helpers::parse_boolean_flag, Secret};
use log::*;
use octo_tools::OctoConfig;
use rand::{distributions::Alphanumeric, Rng};

const DEFAULT_ACHAM_HOST: &str = "127.0.0.1";
const DEFAULT_ACHAM_PORT: u16 = 8380;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub auth: AuthConfig,
    /// If true, the X-Forwarded-For header will be used to determine the client's IP address,
    /// rather than the connection's remote address.
    pub use_x_forwarded_for: bool,
    /// Public base URL of this server, used to build the webhook notify_url the gateway calls
    /// back on.
    pub public_url: String,
    /// Frontend base URL, used to build the return_url shoppers land on after paying.
    pub frontend_url: String,
    /// When false, webhook signatures are not checked. Local testing only.
    pub octo_notify_checks: bool,
    pub octo: OctoConfig,
    pub eskiz: EskizConfig,
    pub oauth: OauthConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_ACHAM_HOST.to_string(),
            port: DEFAULT_ACHAM_PORT,
            database_url: String::default(),
            auth: AuthConfig::default(),
            use_x_forwarded_for: false,
            public_url: format!("http://{DEFAULT_ACHAM_HOST}:{DEFAULT_ACHAM_PORT}"),
            frontend_url: "http://localhost:4200".to_string(),
            octo_notify_checks: true,
            octo: OctoConfig::default(),
            eskiz: EskizConfig::default(),
            oauth: OauthConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("ACHAM_HOST").ok().unwrap_or_else(|| DEFAULT_ACHAM_HOST.into());
        let port = env::var("ACHAM_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for ACHAM_PORT. {e} Using the default, {DEFAULT_ACHAM_PORT}, \
                         instead."
                    );
                    DEFAULT_ACHAM_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_ACHAM_PORT);
        let database_url = env::var("ACHAM_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ ACHAM_DATABASE_URL is not set. Please set it to the URL for the ACHAM database.");
            String::default()
        });
        let auth = AuthConfig::try_from_env().unwrap_or_else(|e| {
            warn!(
                "🪛️ Could not load the authentication configuration from environment variables. {e}. Reverting to \
                 the default configuration."
            );
            AuthConfig::default()
        });
        let use_x_forwarded_for = parse_boolean_flag(env::var("ACHAM_USE_X_FORWARDED_FOR").ok(), false);
        let public_url = env::var("ACHAM_PUBLIC_URL").ok().unwrap_or_else(|| {
            let fallback = format!("http://{host}:{port}");
            warn!("🪛️ ACHAM_PUBLIC_URL is not set. Webhook notify URLs will use {fallback}.");
            fallback
        });
        let frontend_url = env::var("ACHAM_FRONTEND_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ ACHAM_FRONTEND_URL is not set. Using http://localhost:4200.");
            "http://localhost:4200".to_string()
        });
        let octo_notify_checks = parse_boolean_flag(env::var("OCTO_NOTIFY_CHECKS").ok(), true);
        if !octo_notify_checks {
            warn!("🚨️ OCTO webhook signature checks are DISABLED. Do not run production like this.");
        }
        Self {
            host,
            port,
            database_url,
            auth,
            use_x_forwarded_for,
            public_url,
            frontend_url,
            octo_notify_checks,
            octo: OctoConfig::new_from_env_or_default(),
            eskiz: EskizConfig::from_env_or_default(),
            oauth: OauthConfig::from_env_or_default(),
        }
    }
}

//-------------------------------------------------  AuthConfig  ------------------------------------------------------
#[derive(Clone, Debug)]
pub struct AuthConfig {
    /// The secret used to sign and verify token pairs (HS256).
    pub jwt_secret: Secret<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        warn!(
            "🚨️🚨️🚨️ The JWT signing secret has not been set. I'm using a random value for this session. Every \
             restart will invalidate all issued tokens. Set the ACHAM_JWT_SECRET environment variable on production \
             instances. 🚨️🚨️🚨️"
        );
        let secret: String = rand::thread_rng().sample_iter(&Alphanumeric).take(64).map(char::from).collect();
        Self { jwt_secret: Secret::new(secret) }
    }
}

impl AuthConfig {
    pub fn try_from_env() -> Result<Self, crate::errors::ServerError> {
        let secret = env::var("ACHAM_JWT_SECRET")
            .map_err(|e| crate::errors::ServerError::ConfigurationError(format!("{e} [ACHAM_JWT_SECRET]")))?;
        if secret.len() < 32 {
            return Err(crate::errors::ServerError::ConfigurationError(
                "ACHAM_JWT_SECRET must be at least 32 characters long.".to_string(),
            ));
        }
        Ok(Self { jwt_secret: Secret::new(secret) })
    }
}

//-------------------------------------------------  EskizConfig  -----------------------------------------------------
/// Credentials for the Eskiz SMS provider. When incomplete, OTP delivery falls back to logging,
/// which is the intended behavior outside production.
#[derive(Clone, Debug, Default)]
pub struct EskizConfig {
    pub email: String,
    pub password: Secret<String>,
    pub sender: String,
    pub callback_url: Option<String>,
}

impl EskizConfig {
    pub fn from_env_or_default() -> Self {
        let email = env::var("ESKIZ_EMAIL").unwrap_or_default();
        let password = Secret::new(env::var("ESKIZ_PASSWORD").unwrap_or_default());
        let sender = env::var("ESKIZ_SENDER").unwrap_or_default();
        let callback_url = env::var("ESKIZ_CALLBACK_URL").ok();
        let config = Self { email, password, sender, callback_url };
        if !config.is_configured() {
            info!("🪛️ Eskiz SMS credentials are not configured. OTP codes will be logged instead of sent.");
        }
        config
    }

    pub fn is_configured(&self) -> bool {
        !self.email.is_empty() && !self.password.is_empty() && !self.sender.is_empty()
    }
}

//-------------------------------------------------  OauthConfig  -----------------------------------------------------
#[derive(Clone, Debug, Default)]
pub struct OauthConfig {
    pub google: Option<OauthProviderConfig>,
    pub facebook: Option<OauthProviderConfig>,
}

#[derive(Clone, Debug)]
pub struct OauthProviderConfig {
    pub client_id: String,
    pub client_secret: Secret<String>,
    pub scopes: Vec<String>,
}

impl OauthConfig {
    pub fn from_env_or_default() -> Self {
        let google = OauthProviderConfig::from_env("GOOGLE", &["openid", "email", "profile"]);
        let facebook = OauthProviderConfig::from_env("FACEBOOK", &["email", "public_profile"]);
        Self { google, facebook }
    }

    pub fn provider(&self, name: &str) -> Option<&OauthProviderConfig> {
        match name {
            "google" => self.google.as_ref(),
            "facebook" => self.facebook.as_ref(),
            _ => None,
        }
    }
}

impl OauthProviderConfig {
    /// Reads `<PREFIX>_OAUTH_CLIENT_ID`, `<PREFIX>_OAUTH_CLIENT_SECRET` and
    /// `<PREFIX>_OAUTH_SCOPES` (space- or comma-separated).
    fn from_env(prefix: &str, default_scopes: &[&str]) -> Option<Self> {
        let client_id = env::var(format!("{prefix}_OAUTH_CLIENT_ID")).ok()?;
        let client_secret = match env::var(format!("{prefix}_OAUTH_CLIENT_SECRET")) {
            Ok(s) => Secret::new(s),
            Err(_) => {
                warn!("🪛️ {prefix}_OAUTH_CLIENT_ID is set but {prefix}_OAUTH_CLIENT_SECRET is not. Ignoring.");
                return None;
            },
        };
        let scopes = match env::var(format!("{prefix}_OAUTH_SCOPES")) {
            Ok(s) => s
                .split([' ', ','])
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect::<Vec<String>>(),
            Err(_) => default_scopes.iter().map(|s| s.to_string()).collect(),
        };
        info!("🪛️ OAuth provider {} configured with scopes: {}", prefix.to_lowercase(), scopes.join(" "));
        Some(Self { client_id, client_secret, scopes })
    }
}

/// The subset of the configuration needed to resolve client addresses behind a reverse proxy.
#[derive(Clone, Copy, Debug)]
pub struct ProxyConfig {
    pub use_x_forwarded_for: bool,
}

impl ProxyConfig {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self { use_x_forwarded_for: config.use_x_forwarded_for }
    }
}

/// The subset of the configuration the payment handlers need to build gateway URLs. Kept small
/// to avoid passing secrets around the system.
#[derive(Clone, Debug)]
pub struct PaymentUrls {
    pub frontend_url: String,
    pub public_url: String,
}

impl PaymentUrls {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self { frontend_url: config.frontend_url.clone(), public_url: config.public_url.clone() }
    }

    pub fn return_url(&self, order_public_id: &str) -> String {
        format!("{}/profile?order={order_public_id}", self.frontend_url)
    }

    pub fn notify_url(&self) -> String {
        format!("{}/api/payments/notify", self.public_url)
    }
}
