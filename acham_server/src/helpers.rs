use std::{net::IpAddr, str::FromStr};

use actix_web::HttpRequest;
use hmac::{Hmac, Mac};
use log::{debug, trace};
use rand::{distributions::Alphanumeric, Rng};
use sha2::Sha256;

/// Base64 HMAC-SHA256 digest of `data` under `secret`. This is the signature scheme the gateway
/// webhook is validated with.
pub fn calculate_hmac(secret: &str, data: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take a key of any size");
    mac.update(data);
    base64::encode(mac.finalize().into_bytes())
}

/// A random url-safe token for OAuth state parameters.
pub fn random_urlsafe_token(len: usize) -> String {
    rand::thread_rng().sample_iter(&Alphanumeric).take(len).map(char::from).collect()
}

/// Get the remote IP address from the request, preferring the `X-Forwarded-For` header iif
/// `use_x_forwarded_for` is set in the configuration, and falling back to the peer address from
/// the connection info.
pub fn get_remote_ip(req: &HttpRequest, use_x_forwarded_for: bool) -> Option<IpAddr> {
    if use_x_forwarded_for {
        trace!("Checking X-Forwarded-For header");
        let result =
            req.headers().get("X-Forwarded-For").and_then(|v| v.to_str().ok()).and_then(|s| IpAddr::from_str(s).ok());
        if let Some(ip) = result {
            debug!("Using X-Forwarded-For header for remote address: {ip}");
            return Some(ip);
        }
    }
    let peer_addr = req.connection_info().peer_addr().map(|a| a.to_string());
    trace!("Using Peer address for remote address: {:?}", peer_addr);
    peer_addr.and_then(|s| IpAddr::from_str(&s).ok())
}

#[cfg(test)]
mod test {
    use super::{calculate_hmac, random_urlsafe_token};

    #[test]
    fn hmac_is_deterministic_and_key_dependent() {
        let a = calculate_hmac("shop-secret", b"{\"status\":\"success\"}");
        let b = calculate_hmac("shop-secret", b"{\"status\":\"success\"}");
        let c = calculate_hmac("other-secret", b"{\"status\":\"success\"}");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn state_tokens_are_unique() {
        let a = random_urlsafe_token(43);
        let b = random_urlsafe_token(43);
        assert_eq!(a.len(), 43);
        assert_ne!(a, b);
    }
}
