//! Endpoint configuration for the network bindings.

use notisync_core::defaults;
use notisync_core::{Error, Result};

/// Configuration for [`HttpRemoteSource`](crate::HttpRemoteSource) and
/// [`WebSocketSignalChannel`](crate::WebSocketSignalChannel).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// REST base URL, e.g. `https://app.example.com/api/v1`.
    pub api_url: String,
    /// WebSocket base URL, e.g. `wss://app.example.com/api/v1/ws`.
    pub ws_url: String,
    /// Bearer token attached to REST calls (obtained elsewhere).
    pub api_token: Option<String>,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: defaults::API_URL.to_string(),
            ws_url: defaults::WS_URL.to_string(),
            api_token: None,
            request_timeout_secs: defaults::REQUEST_TIMEOUT_SECS,
        }
    }
}

impl ClientConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `NOTISYNC_API_URL` | `http://localhost:3000/api/v1` | REST base URL |
    /// | `NOTISYNC_WS_URL` | `ws://localhost:3000/api/v1/ws` | WebSocket base URL |
    /// | `NOTISYNC_API_TOKEN` | unset | Bearer token for REST calls |
    /// | `NOTISYNC_REQUEST_TIMEOUT_SECS` | `15` | Per-request timeout |
    pub fn from_env() -> Self {
        let api_url =
            std::env::var("NOTISYNC_API_URL").unwrap_or_else(|_| defaults::API_URL.to_string());
        let ws_url =
            std::env::var("NOTISYNC_WS_URL").unwrap_or_else(|_| defaults::WS_URL.to_string());
        let api_token = std::env::var("NOTISYNC_API_TOKEN")
            .ok()
            .filter(|token| !token.is_empty());
        let request_timeout_secs = std::env::var("NOTISYNC_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::REQUEST_TIMEOUT_SECS)
            .max(1);

        Self {
            api_url,
            ws_url,
            api_token,
            request_timeout_secs,
        }
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    pub fn with_ws_url(mut self, url: impl Into<String>) -> Self {
        self.ws_url = url.into();
        self
    }

    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    pub fn with_request_timeout(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    /// Check URL schemes and the timeout.
    pub fn validate(&self) -> Result<()> {
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "api_url must be http(s): {}",
                self.api_url
            )));
        }
        if !(self.ws_url.starts_with("ws://") || self.ws_url.starts_with("wss://")) {
            return Err(Error::Config(format!(
                "ws_url must be ws(s): {}",
                self.ws_url
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::Config(
                "request_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_default() {
        let config = ClientConfig::default();
        assert_eq!(config.api_url, "http://localhost:3000/api/v1");
        assert_eq!(config.ws_url, "ws://localhost:3000/api/v1/ws");
        assert!(config.api_token.is_none());
        assert_eq!(config.request_timeout_secs, 15);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_client_config_builder() {
        let config = ClientConfig::default()
            .with_api_url("https://app.example.com/api/v1")
            .with_ws_url("wss://app.example.com/ws")
            .with_api_token("secret")
            .with_request_timeout(5);

        assert_eq!(config.api_url, "https://app.example.com/api/v1");
        assert_eq!(config.ws_url, "wss://app.example.com/ws");
        assert_eq!(config.api_token.as_deref(), Some("secret"));
        assert_eq!(config.request_timeout_secs, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_client_config_rejects_bad_schemes() {
        let config = ClientConfig::default().with_api_url("ftp://example.com");
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = ClientConfig::default().with_ws_url("http://example.com/ws");
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = ClientConfig::default().with_request_timeout(0);
        assert!(config.validate().is_err());
    }
}
