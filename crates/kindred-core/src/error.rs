use rust_decimal::Decimal;
use thiserror::Error;

use kindred_types::models::TransitionError;

use crate::gateway::GatewayError;

/// Coarse taxonomy shared by every engine error, used to pick a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Deterministic rejection of the input given current state. Never retried.
    Validation,
    NotFound,
    /// The payment provider failed; state was left as it was.
    Gateway,
    Internal,
}

#[derive(Debug, Error)]
pub enum CampaignError {
    #[error("Campaign with name {0} already exists")]
    DuplicateName(String),

    #[error("Campaign needs to be a Draft")]
    InvalidInitialState,

    #[error("Exactly one state must be selected")]
    InvalidStateSelection,

    #[error("Campaign with Id {0} not found")]
    NotFound(i64),

    #[error("Campaign: {0} is a draft")]
    DraftCannotEnd(i64),

    #[error("Campaign: {0} is published")]
    PublishedCannotRevertToDraft(i64),

    #[error("Campaign: {0} has ended")]
    CampaignEnded(i64),

    #[error("Campaign with Id {0} is not a draft")]
    NotDraft(i64),

    #[error("Campaign with Id {0} is not published")]
    NotPublished(i64),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl CampaignError {
    pub fn from_transition(id: i64, err: TransitionError) -> Self {
        match err {
            TransitionError::DraftCannotEnd => Self::DraftCannotEnd(id),
            TransitionError::PublishedCannotRevertToDraft => Self::PublishedCannotRevertToDraft(id),
            TransitionError::Ended => Self::CampaignEnded(id),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NotFound(_) => ErrorClass::NotFound,
            Self::Store(_) => ErrorClass::Internal,
            _ => ErrorClass::Validation,
        }
    }

    /// Stable machine-readable code for response bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DuplicateName(_) => "DUPLICATE_NAME",
            Self::InvalidInitialState => "INVALID_INITIAL_STATE",
            Self::InvalidStateSelection => "INVALID_STATE_SELECTION",
            Self::NotFound(_) => "NOT_FOUND",
            Self::DraftCannotEnd(_) => "DRAFT_CANNOT_END",
            Self::PublishedCannotRevertToDraft(_) => "PUBLISHED_CANNOT_REVERT_TO_DRAFT",
            Self::CampaignEnded(_) => "CAMPAIGN_ENDED",
            Self::NotDraft(_) => "NOT_DRAFT",
            Self::NotPublished(_) => "NOT_PUBLISHED",
            Self::Store(_) => "INTERNAL_ERROR",
        }
    }
}

#[derive(Debug, Error)]
pub enum RefundError {
    #[error("Payment not found or does not belong to this user")]
    PaymentNotFound(i64),

    #[error("Refund amount exceeds the original payment")]
    AmountExceedsPayment { requested: Decimal, paid: Decimal },

    #[error("Refund amount must be greater than zero")]
    InvalidAmount,

    #[error("Refund amount must have at most two decimal places")]
    AmountPrecision(Decimal),

    #[error("Refund request not found")]
    NotFound(i64),

    #[error("Refund request is already processed")]
    AlreadyProcessed(i64),

    #[error("Invalid decision. Choose 'approve' or 'reject'.")]
    InvalidDecision(String),

    #[error("Payment provider refund failed")]
    GatewayFailure(#[source] GatewayError),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl RefundError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::PaymentNotFound(_) | Self::NotFound(_) => ErrorClass::NotFound,
            Self::GatewayFailure(_) => ErrorClass::Gateway,
            Self::Store(_) => ErrorClass::Internal,
            _ => ErrorClass::Validation,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::PaymentNotFound(_) => "PAYMENT_NOT_FOUND",
            Self::AmountExceedsPayment { .. } => "AMOUNT_EXCEEDS_PAYMENT",
            Self::InvalidAmount => "INVALID_AMOUNT",
            Self::AmountPrecision(_) => "INVALID_PRECISION",
            Self::NotFound(_) => "NOT_FOUND",
            Self::AlreadyProcessed(_) => "ALREADY_PROCESSED",
            Self::InvalidDecision(_) => "INVALID_DECISION",
            Self::GatewayFailure(_) => "GATEWAY_FAILURE",
            Self::Store(_) => "INTERNAL_ERROR",
        }
    }
}
