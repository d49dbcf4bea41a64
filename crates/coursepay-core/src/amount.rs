//! # Canonical Amounts
//!
//! A positive decimal amount with a single canonical textual form.
//!
//! The gateway signs `total_amount=<text>` and later reports the amount back.
//! If the outbound text were `1000.00` and the inbound comparison used `1000`,
//! signatures and equality checks would silently disagree. [`Amount`] removes
//! that freedom: values are normalized on construction (trailing fractional
//! zeros stripped) and [`Amount::canonical`] is the only rendering used on
//! the wire.
//!
//! Amounts serialize as JSON strings. Deserialization also accepts JSON
//! numbers because the gateway's status endpoint reports `total_amount` as a
//! float.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ValidationError;

/// Positive monetary amount in the settlement currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Amount(Decimal);

impl Amount {
    /// Maximum fractional digits (paisa precision).
    pub const MAX_SCALE: u32 = 2;

    /// Create an amount from a decimal, normalizing its representation.
    ///
    /// Rejects zero, negative values, and values finer than [`Self::MAX_SCALE`].
    pub fn new(value: Decimal) -> Result<Self, ValidationError> {
        if value <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveAmount(value.to_string()));
        }
        let normalized = value.normalize();
        if normalized.scale() > Self::MAX_SCALE {
            return Err(ValidationError::AmountPrecision {
                value: normalized.to_string(),
                max_scale: Self::MAX_SCALE,
            });
        }
        Ok(Self(normalized))
    }

    /// Parse a plain decimal string (`1000`, `1000.00`, `99.5`).
    ///
    /// Signs, exponents, digit separators and surrounding garbage are rejected
    /// rather than interpreted.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        let trimmed = s.trim();
        let well_formed = !trimmed.is_empty()
            && trimmed.chars().all(|c| c.is_ascii_digit() || c == '.')
            && trimmed.matches('.').count() <= 1
            && !trimmed.starts_with('.')
            && !trimmed.ends_with('.');
        if !well_formed {
            return Err(ValidationError::InvalidAmount(s.to_string()));
        }
        let value =
            Decimal::from_str(trimmed).map_err(|_| ValidationError::InvalidAmount(s.to_string()))?;
        Self::new(value)
    }

    /// Create an amount from whole currency units.
    pub fn from_units(units: u64) -> Result<Self, ValidationError> {
        Self::new(Decimal::from(units))
    }

    /// The canonical textual form used for signing and comparison.
    pub fn canonical(&self) -> String {
        self.0.to_string()
    }

    /// Access the underlying decimal value.
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Amount {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.canonical())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(AmountVisitor)
    }
}

struct AmountVisitor;

impl<'de> Visitor<'de> for AmountVisitor {
    type Value = Amount;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a positive decimal amount as a string or number")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Amount, E> {
        Amount::parse(v).map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Amount, E> {
        Amount::from_units(v).map_err(E::custom)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Amount, E> {
        Amount::new(Decimal::from(v)).map_err(E::custom)
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Amount, E> {
        // `Display` for f64 prints the shortest round-trip form without an
        // exponent, so 100.0 becomes "100" and 99.5 stays "99.5".
        if !v.is_finite() {
            return Err(E::custom(ValidationError::InvalidAmount(v.to_string())));
        }
        Amount::parse(&v.to_string()).map_err(E::custom)
    }
}
