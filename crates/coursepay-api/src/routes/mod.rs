//! # API Route Modules
//!
//! - `payments`: initiation, signed intents, confirmation (explicit and
//!   gateway redirect), reads and administrative deletion.
//! - `enrollments`: read-only enrollment listing.

pub mod enrollments;
pub mod payments;
