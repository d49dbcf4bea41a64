#![deny(missing_docs)]

//! # coursepay-core: Foundational Types for Payment Settlement
//!
//! Every other crate in the workspace depends on this one. It has no internal
//! crate dependencies, only `serde`, `thiserror`, `chrono`, `uuid`, and
//! `rust_decimal` from the external ecosystem.
//!
//! ## Design Principles
//!
//! 1. **Newtype wrappers for identifiers.** You cannot pass a [`SubjectId`]
//!    where a [`UserId`] is expected.
//!
//! 2. **[`Amount`] has exactly one textual form.** The canonical decimal
//!    rendering is what gets signed outbound and compared inbound, so the two
//!    paths can never disagree about `1000` vs `1000.00`.
//!
//! 3. **Principals are typed.** The authentication boundary produces a
//!    [`Principal`] once; business logic never re-derives roles from strings.
//!
//! 4. **An [`Enrollment`] can only be granted from a completed [`Payment`].**
//!    [`Enrollment::grant`] refuses anything else.

pub mod amount;
pub mod enrollment;
pub mod error;
pub mod identity;
pub mod payment;
pub mod principal;

pub use amount::Amount;
pub use enrollment::{AccessStatus, Enrollment};
pub use error::ValidationError;
pub use identity::{EnrollmentId, PaymentId, SubjectId, TransactionUuid, UserId};
pub use payment::{Payment, PaymentStatus, VerificationStatus, DEFAULT_PAYMENT_METHOD};
pub use principal::{Principal, Role};
