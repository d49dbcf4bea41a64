//! # Cryptographic Error Types

use thiserror::Error;

/// Errors from signing-secret loading and signature decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// The secret environment variable is not set.
    #[error("signing secret not configured: environment variable {0} is not set")]
    MissingSecret(String),

    /// The secret is set but empty (or whitespace only).
    #[error("signing secret in {0} is empty")]
    EmptySecret(String),

    /// The HMAC key could not be initialised.
    #[error("invalid HMAC key: {0}")]
    InvalidKey(String),

    /// A supplied signature is not valid base64.
    #[error("signature is not valid base64: {0}")]
    InvalidSignatureEncoding(String),
}
