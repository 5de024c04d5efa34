use anyhow::Result;
use rust_decimal::Decimal;

use kindred_types::models::{Campaign, CampaignState, Payment, RefundRequest, RefundStatus};

/// Campaign persistence as seen by the lifecycle engine.
pub trait CampaignStore {
    fn campaign_by_id(&self, id: i64) -> Result<Option<Campaign>>;

    fn campaign_by_name(&self, name: &str) -> Result<Option<Campaign>>;

    /// Insert a campaign and return its new id.
    fn insert_campaign(&self, name: &str, template: &str, state: CampaignState) -> Result<i64>;

    /// Overwrite name, template and state of `campaign.id`.
    /// Returns the number of rows touched.
    fn update_campaign(&self, campaign: &Campaign) -> Result<usize>;

    fn delete_campaign(&self, id: i64) -> Result<usize>;

    /// All campaigns, or only those in `state`.
    fn list_campaigns(&self, state: Option<CampaignState>) -> Result<Vec<Campaign>>;
}

/// Payment and refund persistence as seen by the refund engine.
pub trait RefundStore {
    fn payment_by_id(&self, id: i64) -> Result<Option<Payment>>;

    fn insert_refund(&self, user_id: i64, payment_id: i64, amount: Decimal) -> Result<RefundRequest>;

    fn refund_by_id(&self, id: i64) -> Result<Option<RefundRequest>>;

    /// Move a refund out of `pending`. Returns `false` when the row was no
    /// longer pending, i.e. someone else settled it first.
    fn settle_refund(&self, id: i64, status: RefundStatus) -> Result<bool>;

    fn list_refunds(&self, status: Option<RefundStatus>) -> Result<Vec<RefundRequest>>;
}
