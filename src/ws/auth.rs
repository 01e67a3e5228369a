use crate::core::errors::WsError;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, Secret};
use serde_json::{json, Value};
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};

type HmacSha256 = Hmac<Sha256>;

pub fn timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}

/// Sign the websocket auth challenge: HMAC-SHA256 over `GET/realtime{expires}`
/// with the account secret, hex-encoded.
pub fn sign(secret_key: &Secret<String>, expires: u64) -> Result<String, WsError> {
    let payload = format!("GET/realtime{expires}");
    let mut mac = HmacSha256::new_from_slice(secret_key.expose_secret().as_bytes())
        .map_err(|_| WsError::AuthFailed("invalid secret key".to_string()))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Build the args for `{"op":"auth"}`: `[api_key, expires, signature]`.
pub fn build_auth_args(
    api_key: &str,
    secret_key: &Secret<String>,
    expires: u64,
) -> Result<Vec<Value>, WsError> {
    let signature = sign(secret_key, expires)?;
    Ok(vec![json!(api_key), json!(expires), json!(signature)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_hex_sha256_sized() {
        let secret = Secret::new("test_secret".to_string());
        let signature = sign(&secret, 1_700_000_000_000).unwrap();
        assert_eq!(signature.len(), 64);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn signature_is_deterministic_per_expiry() {
        let secret = Secret::new("test_secret".to_string());
        let a = sign(&secret, 1_700_000_000_000).unwrap();
        let b = sign(&secret, 1_700_000_000_000).unwrap();
        let c = sign(&secret, 1_700_000_000_001).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn auth_args_carry_key_expiry_signature() {
        let secret = Secret::new("test_secret".to_string());
        let args = build_auth_args("test_key", &secret, 42).unwrap();
        assert_eq!(args.len(), 3);
        assert_eq!(args[0], "test_key");
        assert_eq!(args[1], 42);
        assert!(args[2].is_string());
    }
}
