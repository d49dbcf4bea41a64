//! # coursepay-crypto: Signature Codec
//!
//! The gateway authenticates an outbound payment intent by an HMAC-SHA256
//! signature over three fields in a fixed order:
//!
//! ```text
//! total_amount=<amount>,transaction_uuid=<uuid>,product_code=<code>
//! ```
//!
//! The MAC is base64-encoded (standard alphabet, padded). Field order and
//! formatting are part of the wire contract; [`SignedFields::canonical_message`]
//! is the only place the message is built.
//!
//! The signing secret is loaded once at startup via [`SigningSecret::from_env`].
//! A missing or empty secret is a [`CryptoError`] at that point, never a
//! per-request failure.

pub mod error;
pub mod signature;

pub use error::CryptoError;
pub use signature::{sign, verify, Signature, SignedFields, SigningSecret, SIGNED_FIELD_NAMES};
