//! # coursepay-settlement: Payment Settlement
//!
//! Turns a user's intent to buy a subject into an exactly-once enrollment.
//!
//! ## Components
//!
//! - [`store`]: ports for payments, enrollments and the subject catalog.
//!   Compare-and-swap on payment status and the `(user, subject)` uniqueness
//!   of enrollments are the only concurrency control.
//! - [`memory`]: in-memory adapters for tests and database-less runs.
//! - [`guard`]: who may read, confirm or delete what.
//! - [`orchestrator`]: the state machine
//!   `pending → completed | failed`.
//!
//! No in-process lock is held across a gateway or store call. Several
//! instances of the service may settle the same payment concurrently.

pub mod error;
pub mod guard;
pub mod memory;
pub mod orchestrator;
pub mod store;

pub use error::SettlementError;
pub use memory::{InMemoryCatalog, InMemoryEnrollmentStore, InMemoryPaymentStore};
pub use orchestrator::{
    Confirmation, ConfirmOutcome, DeletedPayment, SettlementConfig, SettlementOrchestrator,
    Stores,
};
pub use store::{
    EnrollmentStore, PaymentPatch, PaymentStore, StoreError, Subject, SubjectCatalog,
    ENROLLMENT_PAYMENT_FK,
};
