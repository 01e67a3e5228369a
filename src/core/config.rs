use secrecy::{ExposeSecret, Secret};
use std::env;
use std::time::Duration;
use thiserror::Error;

pub const MAINNET_WS_URL: &str = "wss://stream.bybit.com";
pub const TESTNET_WS_URL: &str = "wss://stream-testnet.bybit.com";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    MissingEnvironmentVariable(String),
}

/// Product category selecting the public stream endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Spot,
    Linear,
    Inverse,
    Option,
}

impl Category {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Spot => "spot",
            Self::Linear => "linear",
            Self::Inverse => "inverse",
            Self::Option => "option",
        }
    }
}

/// Websocket transport tuning.
#[derive(Debug, Clone)]
pub struct WsConfig {
    pub connect_timeout: Duration,
    /// Deadline for a single frame write; an elapsed deadline is fatal for
    /// that send only.
    pub write_timeout: Duration,
    /// Keepalive cadence; each tick sends a control ping and an
    /// application-level `{"op":"ping"}`.
    pub ping_interval: Duration,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(60),
            ping_interval: Duration::from_secs(20),
        }
    }
}

/// Bybit client configuration.
///
/// Credentials are wrapped in [`Secret`] so they never appear in debug output.
/// Public stream connections work with empty credentials.
#[derive(Debug, Clone)]
pub struct BybitConfig {
    pub api_key: Secret<String>,
    pub secret_key: Secret<String>,
    pub testnet: bool,
    pub base_url: Option<String>,
    /// Clock-skew tolerance in ms; also bounds auth-signature expiry.
    pub recv_window_ms: u64,
    pub ws: WsConfig,
}

impl BybitConfig {
    #[must_use]
    pub fn new(api_key: String, secret_key: String) -> Self {
        Self {
            api_key: Secret::new(api_key),
            secret_key: Secret::new(secret_key),
            testnet: false,
            base_url: None,
            recv_window_ms: 5_000,
            ws: WsConfig::default(),
        }
    }

    /// Configuration without credentials, enough for public streams.
    #[must_use]
    pub fn public_only() -> Self {
        Self::new(String::new(), String::new())
    }

    /// Read configuration from `BYBIT_API_KEY`, `BYBIT_SECRET_KEY` and the
    /// optional `BYBIT_TESTNET` / `BYBIT_BASE_URL`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = env::var("BYBIT_API_KEY")
            .map_err(|_| ConfigError::MissingEnvironmentVariable("BYBIT_API_KEY".to_string()))?;
        let secret_key = env::var("BYBIT_SECRET_KEY")
            .map_err(|_| ConfigError::MissingEnvironmentVariable("BYBIT_SECRET_KEY".to_string()))?;

        let testnet = env::var("BYBIT_TESTNET")
            .unwrap_or_else(|_| "false".to_string())
            .parse::<bool>()
            .unwrap_or(false);

        let base_url = env::var("BYBIT_BASE_URL").ok();

        Ok(Self {
            testnet,
            base_url,
            ..Self::new(api_key, secret_key)
        })
    }

    #[must_use]
    pub fn testnet(mut self, testnet: bool) -> Self {
        self.testnet = testnet;
        self
    }

    #[must_use]
    pub fn base_url(mut self, base_url: String) -> Self {
        self.base_url = Some(base_url);
        self
    }

    #[must_use]
    pub fn ws(mut self, ws: WsConfig) -> Self {
        self.ws = ws;
        self
    }

    #[must_use]
    pub fn has_credentials(&self) -> bool {
        !self.api_key.expose_secret().is_empty() && !self.secret_key.expose_secret().is_empty()
    }

    fn host(&self) -> &str {
        if let Some(url) = &self.base_url {
            url
        } else if self.testnet {
            TESTNET_WS_URL
        } else {
            MAINNET_WS_URL
        }
    }

    #[must_use]
    pub fn ws_public_url(&self, category: Category) -> String {
        format!("{}/v5/public/{}", self.host(), category.as_str())
    }

    #[must_use]
    pub fn ws_private_url(&self) -> String {
        format!("{}/v5/private", self.host())
    }

    #[must_use]
    pub fn ws_trade_url(&self) -> String {
        format!("{}/v5/trade", self.host())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_url_follows_category() {
        let config = BybitConfig::public_only();
        assert_eq!(
            config.ws_public_url(Category::Linear),
            "wss://stream.bybit.com/v5/public/linear"
        );
        assert_eq!(
            config.ws_public_url(Category::Spot),
            "wss://stream.bybit.com/v5/public/spot"
        );
    }

    #[test]
    fn testnet_switches_host() {
        let config = BybitConfig::public_only().testnet(true);
        assert_eq!(
            config.ws_private_url(),
            "wss://stream-testnet.bybit.com/v5/private"
        );
    }

    #[test]
    fn base_url_overrides_host() {
        let config = BybitConfig::public_only().base_url("ws://localhost:9000".to_string());
        assert_eq!(config.ws_trade_url(), "ws://localhost:9000/v5/trade");
    }

    #[test]
    fn credentials_detected() {
        assert!(!BybitConfig::public_only().has_credentials());
        assert!(BybitConfig::new("key".to_string(), "secret".to_string()).has_credentials());
    }
}
