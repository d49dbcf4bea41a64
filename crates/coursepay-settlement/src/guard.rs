//! # Authorization Guard
//!
//! Read-side and admin gates. A non-admin asking about a payment that is
//! missing gets the same [`SettlementError::Forbidden`] as one asking about
//! somebody else's payment, so ids cannot be probed for existence.

use coursepay_core::{Payment, Principal, UserId};

use crate::error::SettlementError;

/// May `principal` read `payment`?
///
/// `payment` is `None` when the lookup found nothing.
pub fn authorize_payment_read(
    principal: &Principal,
    payment: Option<Payment>,
) -> Result<Payment, SettlementError> {
    match payment {
        Some(p) if principal.acts_for(&p.user_id) => Ok(p),
        Some(_) => Err(SettlementError::Forbidden),
        None if principal.is_admin() => Err(SettlementError::PaymentNotFound),
        None => Err(SettlementError::Forbidden),
    }
}

/// Owner-only variant of [`authorize_payment_read`] for operations that act
/// as the paying user (building a checkout form).
pub fn authorize_payment_owner(
    principal: &Principal,
    payment: Option<Payment>,
) -> Result<Payment, SettlementError> {
    match payment {
        Some(p) if p.user_id == principal.id => Ok(p),
        Some(_) => Err(SettlementError::Forbidden),
        None if principal.is_admin() => Err(SettlementError::PaymentNotFound),
        None => Err(SettlementError::Forbidden),
    }
}

/// May `principal` submit a confirmation on behalf of `user_id`?
///
/// Admins relay gateway webhooks for any user.
pub fn authorize_confirmation(principal: &Principal, user_id: &UserId) -> Result<(), SettlementError> {
    if principal.acts_for(user_id) {
        Ok(())
    } else {
        Err(SettlementError::Forbidden)
    }
}

/// Admin-only gate.
pub fn require_admin(principal: &Principal) -> Result<(), SettlementError> {
    if principal.is_admin() {
        Ok(())
    } else {
        Err(SettlementError::Forbidden)
    }
}

/// The owner filter for list operations: `None` (everything) for admins.
pub fn visible_owner(principal: &Principal) -> Option<UserId> {
    if principal.is_admin() {
        None
    } else {
        Some(principal.id)
    }
}
