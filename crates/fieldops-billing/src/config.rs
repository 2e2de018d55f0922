//! Billing gateway configuration.

use crate::error::BillingError;

/// Default connect timeout for gateway calls.
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Default read timeout for gateway calls. Cancellation blocks the caller
/// on these requests, so the ceiling is deliberately low.
const DEFAULT_READ_TIMEOUT_SECS: u64 = 10;

/// Configuration for the external billing gateway client.
#[derive(Clone)]
pub struct GatewayConfig {
    /// Base URL of the provider API, without a trailing slash.
    pub base_url: String,
    /// API key sent as a bearer token.
    pub api_key: String,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Read timeout in seconds.
    pub read_timeout_secs: u64,
}

impl GatewayConfig {
    /// Build a config with default timeouts.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            read_timeout_secs: DEFAULT_READ_TIMEOUT_SECS,
        }
    }

    /// Build a config from `BILLING_GATEWAY_URL` and `BILLING_GATEWAY_API_KEY`,
    /// with optional `BILLING_GATEWAY_CONNECT_TIMEOUT_SECS` and
    /// `BILLING_GATEWAY_READ_TIMEOUT_SECS` overrides.
    pub fn from_env() -> Result<Self, BillingError> {
        let base_url = std::env::var("BILLING_GATEWAY_URL").map_err(|_| {
            BillingError::InvalidConfiguration("BILLING_GATEWAY_URL is not set".to_string())
        })?;
        let api_key = std::env::var("BILLING_GATEWAY_API_KEY").map_err(|_| {
            BillingError::InvalidConfiguration("BILLING_GATEWAY_API_KEY is not set".to_string())
        })?;

        let mut config = Self::new(base_url, api_key);

        if let Ok(secs) = std::env::var("BILLING_GATEWAY_CONNECT_TIMEOUT_SECS") {
            config.connect_timeout_secs = secs.parse().map_err(|_| {
                BillingError::InvalidConfiguration(format!(
                    "Invalid BILLING_GATEWAY_CONNECT_TIMEOUT_SECS: {secs}"
                ))
            })?;
        }
        if let Ok(secs) = std::env::var("BILLING_GATEWAY_READ_TIMEOUT_SECS") {
            config.read_timeout_secs = secs.parse().map_err(|_| {
                BillingError::InvalidConfiguration(format!(
                    "Invalid BILLING_GATEWAY_READ_TIMEOUT_SECS: {secs}"
                ))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), BillingError> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(BillingError::InvalidConfiguration(format!(
                "base_url must be an http(s) URL, got: {}",
                self.base_url
            )));
        }
        if self.api_key.is_empty() {
            return Err(BillingError::InvalidConfiguration(
                "api_key must not be empty".to_string(),
            ));
        }
        if self.read_timeout_secs == 0 || self.connect_timeout_secs == 0 {
            return Err(BillingError::InvalidConfiguration(
                "timeouts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("read_timeout_secs", &self.read_timeout_secs)
            .finish()
    }
}
