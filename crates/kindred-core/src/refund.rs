//! Refund workflow engine.
//!
//! A donor files a refund against one of their own payments; an admin later
//! approves or rejects it. Approval goes through the payment provider first
//! and only then marks the request approved, so a provider failure leaves the
//! request pending and retryable.
//!
//! Deciding is split in three so no store transaction is held across the
//! provider call: [`review`] validates, [`execute`] talks to the provider and
//! [`settle`] writes the outcome with a compare-and-swap on `pending`.

use std::str::FromStr;

use anyhow::anyhow;
use rust_decimal::Decimal;
use tracing::{info, warn};

use kindred_types::models::{Payment, RefundRequest, RefundStatus, fits_minor_units};

use crate::error::RefundError;
use crate::gateway::PaymentGateway;
use crate::store::RefundStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn outcome(self) -> RefundStatus {
        match self {
            Self::Approve => RefundStatus::Approved,
            Self::Reject => RefundStatus::Rejected,
        }
    }
}

impl FromStr for Decision {
    type Err = RefundError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approve" => Ok(Self::Approve),
            "reject" => Ok(Self::Reject),
            other => Err(RefundError::InvalidDecision(other.to_string())),
        }
    }
}

/// File a pending refund for `amount` against `payment_id` on behalf of
/// `user_id`. Overlapping requests against one payment are not checked.
pub fn request<S: RefundStore + ?Sized>(
    store: &S,
    user_id: i64,
    payment_id: i64,
    amount: Decimal,
) -> Result<RefundRequest, RefundError> {
    info!("User {} requesting a refund for payment {}", user_id, payment_id);

    let payment = store
        .payment_by_id(payment_id)?
        .filter(|p| p.user_id == user_id)
        .ok_or(RefundError::PaymentNotFound(payment_id))?;

    if amount <= Decimal::ZERO {
        return Err(RefundError::InvalidAmount);
    }

    if !fits_minor_units(amount) {
        return Err(RefundError::AmountPrecision(amount));
    }

    if amount > payment.amount {
        return Err(RefundError::AmountExceedsPayment {
            requested: amount,
            paid: payment.amount,
        });
    }

    Ok(store.insert_refund(user_id, payment_id, amount)?)
}

/// A pending refund cleared for a decision, with the payment it draws on.
#[derive(Debug, Clone)]
pub struct Review {
    pub refund: RefundRequest,
    pub payment: Payment,
    pub decision: Decision,
}

pub fn review<S: RefundStore + ?Sized>(
    store: &S,
    refund_id: i64,
    decision: &str,
) -> Result<Review, RefundError> {
    info!("Reviewing refund {}", refund_id);

    let refund = store
        .refund_by_id(refund_id)?
        .ok_or(RefundError::NotFound(refund_id))?;

    if refund.status.is_terminal() {
        return Err(RefundError::AlreadyProcessed(refund_id));
    }

    let decision: Decision = decision.parse()?;

    let payment = store.payment_by_id(refund.payment_id)?.ok_or_else(|| {
        anyhow!(
            "refund {} references missing payment {}",
            refund_id,
            refund.payment_id
        )
    })?;

    Ok(Review {
        refund,
        payment,
        decision,
    })
}

/// Carry out the external side of a decision. Rejections need no provider
/// call; approvals refund the payment and fail with `GatewayFailure` if the
/// provider does.
pub async fn execute(
    gateway: &dyn PaymentGateway,
    currency: &str,
    review: &Review,
) -> Result<(), RefundError> {
    if review.decision == Decision::Reject {
        return Ok(());
    }

    let receipt = gateway
        .refund_payment(&review.payment.provider_ref, review.refund.amount, currency)
        .await
        .map_err(|e| {
            warn!("Provider refund failed for refund {}: {}", review.refund.id, e);
            RefundError::GatewayFailure(e)
        })?;

    info!(
        "Provider refund processed for refund {} (state {})",
        review.refund.id, receipt.state
    );
    Ok(())
}

/// Record the decision. Fails with `AlreadyProcessed` if the request left
/// `pending` since it was reviewed.
pub fn settle<S: RefundStore + ?Sized>(
    store: &S,
    refund_id: i64,
    decision: Decision,
) -> Result<RefundRequest, RefundError> {
    if !store.settle_refund(refund_id, decision.outcome())? {
        return Err(RefundError::AlreadyProcessed(refund_id));
    }

    let refund = store
        .refund_by_id(refund_id)?
        .ok_or(RefundError::NotFound(refund_id))?;
    info!("Refund {} is now {}", refund_id, refund.status.as_str());
    Ok(refund)
}

pub fn list<S: RefundStore + ?Sized>(
    store: &S,
    status: Option<RefundStatus>,
) -> Result<Vec<RefundRequest>, RefundError> {
    Ok(store.list_refunds(status)?)
}
