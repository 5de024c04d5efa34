//! In-memory store and scripted gateway for engine tests.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;

use kindred_types::models::{
    Campaign, CampaignState, Payment, PaymentStatus, RefundRequest, RefundStatus,
};

use crate::gateway::{CreatedPayment, GatewayError, PaymentGateway, RefundReceipt};
use crate::store::{CampaignStore, RefundStore};

#[derive(Default)]
pub struct MemoryStore {
    campaigns: RefCell<BTreeMap<i64, Campaign>>,
    payments: RefCell<BTreeMap<i64, Payment>>,
    refunds: RefCell<BTreeMap<i64, RefundRequest>>,
    next_id: Cell<i64>,
    drop_updates: Cell<bool>,
}

impl MemoryStore {
    fn next_id(&self) -> i64 {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        id
    }

    pub fn add_payment(&self, user_id: i64, amount: Decimal) -> i64 {
        let id = self.next_id();
        self.payments.borrow_mut().insert(
            id,
            Payment {
                id,
                user_id,
                amount,
                status: PaymentStatus::Success,
                payment_method: "paypal".to_string(),
                provider_ref: format!("PAY-{}", id),
                created_at: Utc::now(),
            },
        );
        id
    }

    /// Flags as they would be persisted for campaign `id`.
    pub fn raw_flags(&self, id: i64) -> Option<(bool, bool, bool)> {
        self.campaigns.borrow().get(&id).map(|c| c.state.flags())
    }

    /// Make every later campaign update report zero rows touched.
    pub fn drop_updates(&self) {
        self.drop_updates.set(true);
    }
}

impl CampaignStore for MemoryStore {
    fn campaign_by_id(&self, id: i64) -> Result<Option<Campaign>> {
        Ok(self.campaigns.borrow().get(&id).cloned())
    }

    fn campaign_by_name(&self, name: &str) -> Result<Option<Campaign>> {
        Ok(self
            .campaigns
            .borrow()
            .values()
            .find(|c| c.name == name)
            .cloned())
    }

    fn insert_campaign(&self, name: &str, template: &str, state: CampaignState) -> Result<i64> {
        let id = self.next_id();
        self.campaigns.borrow_mut().insert(
            id,
            Campaign {
                id,
                name: name.to_string(),
                template: template.to_string(),
                state,
            },
        );
        Ok(id)
    }

    fn update_campaign(&self, campaign: &Campaign) -> Result<usize> {
        if self.drop_updates.get() {
            return Ok(0);
        }
        let mut campaigns = self.campaigns.borrow_mut();
        match campaigns.get_mut(&campaign.id) {
            Some(slot) => {
                *slot = campaign.clone();
                Ok(1)
            }
            None => Ok(0),
        }
    }

    fn delete_campaign(&self, id: i64) -> Result<usize> {
        Ok(self.campaigns.borrow_mut().remove(&id).map_or(0, |_| 1))
    }

    fn list_campaigns(&self, state: Option<CampaignState>) -> Result<Vec<Campaign>> {
        Ok(self
            .campaigns
            .borrow()
            .values()
            .filter(|c| state.is_none_or(|s| c.state == s))
            .cloned()
            .collect())
    }
}

impl RefundStore for MemoryStore {
    fn payment_by_id(&self, id: i64) -> Result<Option<Payment>> {
        Ok(self.payments.borrow().get(&id).cloned())
    }

    fn insert_refund(&self, user_id: i64, payment_id: i64, amount: Decimal) -> Result<RefundRequest> {
        let id = self.next_id();
        let refund = RefundRequest {
            id,
            user_id,
            payment_id,
            amount,
            status: RefundStatus::Pending,
            admin_approved: false,
            created_at: Utc::now(),
        };
        self.refunds.borrow_mut().insert(id, refund.clone());
        Ok(refund)
    }

    fn refund_by_id(&self, id: i64) -> Result<Option<RefundRequest>> {
        Ok(self.refunds.borrow().get(&id).cloned())
    }

    fn settle_refund(&self, id: i64, status: RefundStatus) -> Result<bool> {
        let mut refunds = self.refunds.borrow_mut();
        match refunds.get_mut(&id) {
            Some(r) if r.status == RefundStatus::Pending => {
                r.status = status;
                r.admin_approved = status == RefundStatus::Approved;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn list_refunds(&self, status: Option<RefundStatus>) -> Result<Vec<RefundRequest>> {
        Ok(self
            .refunds
            .borrow()
            .values()
            .filter(|r| status.is_none_or(|s| r.status == s))
            .cloned()
            .collect())
    }
}

/// Gateway that records refund calls and either succeeds or always fails.
#[derive(Default)]
pub struct FakeGateway {
    fail: bool,
    refunds: AtomicUsize,
    last_refund: Mutex<Option<(String, Decimal)>>,
}

impl FakeGateway {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn refund_calls(&self) -> usize {
        self.refunds.load(Ordering::SeqCst)
    }

    pub fn last_refund(&self) -> Option<(String, Decimal)> {
        self.last_refund.lock().ok().and_then(|g| g.clone())
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_payment(
        &self,
        _method: &str,
        _amount: Decimal,
        _currency: &str,
    ) -> Result<CreatedPayment, GatewayError> {
        Err(GatewayError::NotConfigured)
    }

    async fn refund_payment(
        &self,
        provider_ref: &str,
        amount: Decimal,
        _currency: &str,
    ) -> Result<RefundReceipt, GatewayError> {
        self.refunds.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(GatewayError::Rejected {
                status: 500,
                body: "provider down".to_string(),
            });
        }
        if let Ok(mut last) = self.last_refund.lock() {
            *last = Some((provider_ref.to_string(), amount));
        }
        Ok(RefundReceipt {
            id: Some("REF-1".to_string()),
            state: "completed".to_string(),
        })
    }
}
