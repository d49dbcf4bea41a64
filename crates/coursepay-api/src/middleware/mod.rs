//! # Middleware
//!
//! - `metrics`: request and error counters, exposed at `GET /metrics`.

pub mod metrics;
