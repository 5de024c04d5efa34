use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// -- Campaigns --

/// Where a campaign sits in its lifecycle. Campaigns only ever move
/// Draft -> Published -> Ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignState {
    Draft,
    Published,
    Ended,
}

/// An illegal lifecycle move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("draft campaigns cannot be ended")]
    DraftCannotEnd,
    #[error("published campaigns cannot return to draft")]
    PublishedCannotRevertToDraft,
    #[error("campaign has ended")]
    Ended,
}

impl CampaignState {
    /// Collapse the three `is*` flags used on the wire and in storage.
    /// Returns `None` unless exactly one flag is set.
    pub fn from_flags(is_draft: bool, is_published: bool, is_ended: bool) -> Option<Self> {
        match (is_draft, is_published, is_ended) {
            (true, false, false) => Some(Self::Draft),
            (false, true, false) => Some(Self::Published),
            (false, false, true) => Some(Self::Ended),
            _ => None,
        }
    }

    /// `(is_draft, is_published, is_ended)`
    pub fn flags(self) -> (bool, bool, bool) {
        (
            self == Self::Draft,
            self == Self::Published,
            self == Self::Ended,
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Ended => "ended",
        }
    }

    /// Stay in draft. Only legal while still a draft.
    pub fn keep_draft(self) -> Result<Self, TransitionError> {
        match self {
            Self::Draft => Ok(Self::Draft),
            Self::Published => Err(TransitionError::PublishedCannotRevertToDraft),
            Self::Ended => Err(TransitionError::Ended),
        }
    }

    /// Draft -> Published. Re-publishing a published campaign is a no-op.
    pub fn publish(self) -> Result<Self, TransitionError> {
        match self {
            Self::Draft | Self::Published => Ok(Self::Published),
            Self::Ended => Err(TransitionError::Ended),
        }
    }

    /// Published -> Ended.
    pub fn end(self) -> Result<Self, TransitionError> {
        match self {
            Self::Draft => Err(TransitionError::DraftCannotEnd),
            Self::Published => Ok(Self::Ended),
            Self::Ended => Err(TransitionError::Ended),
        }
    }

    pub fn transition_to(self, target: Self) -> Result<Self, TransitionError> {
        match target {
            Self::Draft => self.keep_draft(),
            Self::Published => self.publish(),
            Self::Ended => self.end(),
        }
    }
}

impl fmt::Display for CampaignState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Campaign {
    pub id: i64,
    pub name: String,
    pub template: String,
    pub state: CampaignState,
}

// -- Payments --

/// Whether `amount` can be charged as written: at most two decimal places.
/// Trailing zeros do not count, so `10.500` qualifies.
pub fn fits_minor_units(amount: Decimal) -> bool {
    amount.normalize().scale() <= 2
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Success,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Payment {
    pub id: i64,
    pub user_id: i64,
    pub amount: Decimal,
    pub status: PaymentStatus,
    pub payment_method: String,
    pub provider_ref: String,
    pub created_at: DateTime<Utc>,
}

// -- Refunds --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefundStatus {
    Pending,
    Approved,
    Rejected,
}

impl RefundStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn is_terminal(self) -> bool {
        self != Self::Pending
    }
}

impl FromStr for RefundStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefundRequest {
    pub id: i64,
    pub user_id: i64,
    pub payment_id: i64,
    pub amount: Decimal,
    pub status: RefundStatus,
    pub admin_approved: bool,
    pub created_at: DateTime<Utc>,
}

/// A stored enum column held a value this build does not know.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown variant '{0}'")]
pub struct UnknownVariant(pub String);
