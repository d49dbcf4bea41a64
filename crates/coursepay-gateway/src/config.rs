//! Gateway configuration.
//!
//! Loaded once at startup. Every required variable is checked here so a
//! misconfigured process refuses to start instead of failing its first
//! payment.

use std::time::Duration;

use coursepay_crypto::{CryptoError, SigningSecret};
use url::Url;

/// Default path of the transaction status endpoint.
pub const DEFAULT_STATUS_PATH: &str = "/api/epay/transaction/status/";

/// Default path of the hosted payment form.
pub const DEFAULT_FORM_PATH: &str = "/api/epay/main/v2/form";

const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_STATUS_RETRIES: u32 = 2;
const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 200;

/// Configuration for the payment gateway.
///
/// Custom `Debug` implementation redacts the signing secret.
#[derive(Clone)]
pub struct GatewayConfig {
    /// HMAC key shared with the gateway.
    pub secret: SigningSecret,
    /// Merchant product code.
    pub product_code: String,
    /// Gateway host, e.g. `https://rc-epay.esewa.com.np`.
    pub base_url: Url,
    /// Path of the status endpoint, relative to `base_url`.
    pub status_path: String,
    /// URL the browser form posts to.
    pub form_url: Url,
    /// Where the gateway redirects after a successful payment.
    pub success_url: Url,
    /// Where the gateway redirects after a failed or cancelled payment.
    pub failure_url: Url,
    /// Timeout for a status check, resends included.
    pub timeout: Duration,
    /// Resends of a status check whose connection was refused.
    pub status_retries: u32,
    /// Delay before the first resend; doubles after each.
    pub retry_base_delay: Duration,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("secret", &"[REDACTED]")
            .field("product_code", &self.product_code)
            .field("base_url", &self.base_url)
            .field("status_path", &self.status_path)
            .field("form_url", &self.form_url)
            .field("success_url", &self.success_url)
            .field("failure_url", &self.failure_url)
            .field("timeout", &self.timeout)
            .field("status_retries", &self.status_retries)
            .field("retry_base_delay", &self.retry_base_delay)
            .finish()
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `ESEWA_SECRET_KEY` (required, non-empty)
    /// - `ESEWA_PRODUCT_CODE` (required)
    /// - `ESEWA_BASE_URL` (required)
    /// - `ESEWA_STATUS_PATH` (default: `/api/epay/transaction/status/`)
    /// - `ESEWA_FORM_URL` (default: `{ESEWA_BASE_URL}/api/epay/main/v2/form`)
    /// - `ESEWA_TIMEOUT_SECS` (default: 10)
    /// - `ESEWA_STATUS_RETRIES` (default: 2)
    /// - `ESEWA_RETRY_BASE_DELAY_MS` (default: 200)
    /// - `PAYMENT_SUCCESS_URL`, `PAYMENT_FAILURE_URL` (required)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret = match lookup("ESEWA_SECRET_KEY") {
            Some(raw) => SigningSecret::new(raw.into_bytes(), "ESEWA_SECRET_KEY")?,
            None => return Err(CryptoError::MissingSecret("ESEWA_SECRET_KEY".into()).into()),
        };
        let product_code = required(&lookup, "ESEWA_PRODUCT_CODE")?;
        let base_url = parse_url("ESEWA_BASE_URL", &required(&lookup, "ESEWA_BASE_URL")?)?;
        let status_path = lookup("ESEWA_STATUS_PATH")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_STATUS_PATH.to_string());
        let form_url = match lookup("ESEWA_FORM_URL").filter(|s| !s.trim().is_empty()) {
            Some(raw) => parse_url("ESEWA_FORM_URL", &raw)?,
            None => base_url
                .join(DEFAULT_FORM_PATH)
                .map_err(|e| ConfigError::InvalidUrl("ESEWA_FORM_URL".into(), e.to_string()))?,
        };
        let timeout_secs = numeric(&lookup, "ESEWA_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?;
        let status_retries = numeric(&lookup, "ESEWA_STATUS_RETRIES", DEFAULT_STATUS_RETRIES)?;
        let retry_base_delay_ms = numeric(
            &lookup,
            "ESEWA_RETRY_BASE_DELAY_MS",
            DEFAULT_RETRY_BASE_DELAY_MS,
        )?;

        Ok(Self {
            secret,
            product_code,
            base_url,
            status_path,
            form_url,
            success_url: parse_url(
                "PAYMENT_SUCCESS_URL",
                &required(&lookup, "PAYMENT_SUCCESS_URL")?,
            )?,
            failure_url: parse_url(
                "PAYMENT_FAILURE_URL",
                &required(&lookup, "PAYMENT_FAILURE_URL")?,
            )?,
            timeout: Duration::from_secs(timeout_secs),
            status_retries,
            retry_base_delay: Duration::from_millis(retry_base_delay_ms),
        })
    }

    /// Full URL of the status endpoint.
    pub fn status_url(&self) -> Result<Url, ConfigError> {
        self.base_url
            .join(&self.status_path)
            .map_err(|e| ConfigError::InvalidUrl("ESEWA_STATUS_PATH".into(), e.to_string()))
    }
}

fn required<F>(lookup: &F, var: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(var)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ConfigError::Missing(var.to_string()))
}

fn numeric<F, T>(lookup: &F, var: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(var) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue(var.to_string(), raw)),
        None => Ok(default),
    }
}

fn parse_url(var: &str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw.trim()).map_err(|e| ConfigError::InvalidUrl(var.to_string(), e.to_string()))
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is unset or blank.
    #[error("{0} environment variable is required")]
    Missing(String),
    /// The signing secret is absent or unusable.
    #[error(transparent)]
    Secret(#[from] CryptoError),
    /// A URL variable did not parse.
    #[error("invalid URL for {0}: {1}")]
    InvalidUrl(String, String),
    /// A non-URL variable did not parse.
    #[error("invalid value for {0}: {1:?}")]
    InvalidValue(String, String),
}
