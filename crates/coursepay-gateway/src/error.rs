//! Gateway error types.

use crate::config::ConfigError;

/// Errors from gateway client construction, intent signing, and callback
/// decoding.
///
/// Status verification does not use this type; see
/// [`VerificationOutcome`](crate::VerificationOutcome).
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The redirect blob could not be decoded.
    #[error("malformed gateway callback: {reason}")]
    MalformedCallback {
        /// What failed (base64, JSON, or a field).
        reason: String,
    },

    /// HTTP client construction failed.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// The component is not usable in its current configuration.
    #[error("gateway not configured: {reason}")]
    NotConfigured {
        /// Why.
        reason: String,
    },
}

impl GatewayError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedCallback {
            reason: reason.into(),
        }
    }
}
