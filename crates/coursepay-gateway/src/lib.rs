//! # coursepay-gateway: Payment Gateway Client
//!
//! Everything that talks to, or is shaped by, the eSewa-style gateway:
//!
//! - [`intent`] builds the signed outbound form payload the browser posts to
//!   the gateway. Pure, no I/O.
//! - [`callback`] decodes the base64 JSON blob the gateway appends to the
//!   success redirect.
//! - [`client`] performs the server-to-server status check. This is the only
//!   authoritative source for "did the money move".
//! - [`mock`] is a scripted [`PaymentGateway`] for tests and local runs.
//!
//! ## Failure classification
//!
//! [`PaymentGateway::verify_with_gateway`] never returns `Err`. Transport
//! errors, timeouts, non-2xx responses and malformed bodies all become
//! [`VerificationOutcome::Unavailable`] (retryable). Only a well-formed answer
//! whose `status` is not `COMPLETE` becomes [`VerificationOutcome::Rejected`].

pub mod callback;
pub mod client;
pub mod config;
pub mod error;
pub mod intent;
pub mod mock;
pub(crate) mod retry;

pub use callback::{decode_redirect_payload, RedirectPayload};
pub use client::{
    EsewaClient, GatewayVerification, PaymentGateway, VerificationOutcome, STATUS_COMPLETE,
};
pub use config::{ConfigError, GatewayConfig};
pub use error::GatewayError;
pub use intent::{build_intent, GatewayPayload, IntentSigner};
pub use mock::MockGateway;
