use acham_common::{helpers::parse_boolean_flag, Secret};
use log::*;

#[derive(Debug, Clone, Default)]
pub struct OctoConfig {
    /// Base URL of the OCTO gateway, without a trailing slash.
    pub api_url: String,
    pub shop_id: String,
    pub shop_secret: Secret<String>,
    /// When set, charges are prepared against the gateway's sandbox and no real money moves.
    pub test_mode: bool,
}

impl OctoConfig {
    pub fn new_from_env_or_default() -> Self {
        let api_url = std::env::var("OCTO_API_URL").unwrap_or_else(|_| {
            warn!("OCTO_API_URL not set, using https://secure.octo.uz as default");
            "https://secure.octo.uz".to_string()
        });
        let shop_id = std::env::var("OCTO_SHOP_ID").unwrap_or_else(|_| {
            warn!("OCTO_SHOP_ID not set, using (probably useless) default");
            "0".to_string()
        });
        let shop_secret = Secret::new(std::env::var("OCTO_SECRET").unwrap_or_else(|_| {
            warn!("OCTO_SECRET not set, using (probably useless) default");
            "00000000000000".to_string()
        }));
        let test_mode = parse_boolean_flag(std::env::var("OCTO_TEST_MODE").ok(), false);
        if test_mode {
            info!("OCTO gateway is running in test mode. Charges will not move real money.");
        }
        Self { api_url, shop_id, shop_secret, test_mode }
    }
}
