//! Request and response bodies. Campaign payloads use camelCase keys
//! (`isDraft`); account, payment and refund payloads use snake_case
//! (`access_token`, `payment_method`, `admin_approved`).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{Campaign, CampaignState, Payment, PaymentStatus, RefundRequest, RefundStatus};

// -- JWT Claims --

/// Claims carried by tokens this server issues at login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub email: String,
    #[serde(default)]
    pub roles: Vec<String>,
    pub exp: usize,
}

// -- Users --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserView {
    pub id: i64,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
}

// -- Campaigns --

/// Campaign payload for create and update. The lifecycle state travels as
/// three flags, exactly one of which must be set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignIn {
    pub name: String,
    pub template: String,
    #[serde(default = "default_true")]
    pub is_draft: bool,
    #[serde(default)]
    pub is_published: bool,
    #[serde(default)]
    pub is_ended: bool,
}

fn default_true() -> bool {
    true
}

impl CampaignIn {
    /// The single state the flags select, if they select exactly one.
    pub fn requested_state(&self) -> Option<CampaignState> {
        CampaignState::from_flags(self.is_draft, self.is_published, self.is_ended)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignView {
    pub id: i64,
    pub name: String,
    pub template: String,
    pub is_draft: bool,
    pub is_published: bool,
    pub is_ended: bool,
}

impl From<Campaign> for CampaignView {
    fn from(c: Campaign) -> Self {
        let (is_draft, is_published, is_ended) = c.state.flags();
        Self {
            id: c.id,
            name: c.name,
            template: c.template,
            is_draft,
            is_published,
            is_ended,
        }
    }
}

/// `?campaign_state=` filter on the admin listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateFilter {
    Draft,
    Published,
    Ended,
    #[default]
    All,
}

impl StateFilter {
    pub fn state(self) -> Option<CampaignState> {
        match self {
            Self::Draft => Some(CampaignState::Draft),
            Self::Published => Some(CampaignState::Published),
            Self::Ended => Some(CampaignState::Ended),
            Self::All => None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CampaignQuery {
    #[serde(default)]
    pub campaign_state: StateFilter,
}

// -- Payments --

#[derive(Debug, Deserialize)]
pub struct PaymentRequest {
    pub payment_method: String,
    pub amount: Decimal,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PaymentResponse {
    pub id: i64,
    pub provider_id: String,
    pub payment_method: String,
    pub amount: Decimal,
    pub status: PaymentStatus,
    pub redirect_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PaymentResponse {
    pub fn new(payment: Payment, redirect_url: Option<String>) -> Self {
        Self {
            id: payment.id,
            provider_id: payment.provider_ref,
            payment_method: payment.payment_method,
            amount: payment.amount,
            status: payment.status,
            redirect_url,
            created_at: payment.created_at,
        }
    }
}

// -- Refunds --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RefundApplication {
    pub payment_id: i64,
    pub amount: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct DecisionQuery {
    pub decision: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct RefundQuery {
    pub status: Option<RefundStatus>,
}

#[derive(Debug, Serialize)]
pub struct RefundOutcome {
    pub message: String,
    pub refund: RefundRequest,
}

// -- Errors --

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
    pub code: String,
}
