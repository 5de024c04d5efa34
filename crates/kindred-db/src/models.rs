//! Database row types. These map directly to SQLite rows and are converted
//! into `kindred-types` models at the edge of this crate.

use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;

use kindred_types::models::{Campaign, CampaignState, Payment, RefundRequest};

pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub hashed_password: String,
    pub created_at: String,
}

pub struct CampaignRow {
    pub id: i64,
    pub name: String,
    pub template: String,
    pub is_draft: bool,
    pub is_published: bool,
    pub is_ended: bool,
}

pub struct PaymentRow {
    pub id: i64,
    pub user_id: i64,
    pub amount: String,
    pub status: String,
    pub payment_method: String,
    pub provider_ref: String,
    pub created_at: String,
}

pub struct RefundRow {
    pub id: i64,
    pub user_id: i64,
    pub payment_id: i64,
    pub amount: String,
    pub status: String,
    pub admin_approved: bool,
    pub created_at: String,
}

impl TryFrom<CampaignRow> for Campaign {
    type Error = anyhow::Error;

    fn try_from(row: CampaignRow) -> Result<Self> {
        let state = CampaignState::from_flags(row.is_draft, row.is_published, row.is_ended)
            .ok_or_else(|| anyhow!("campaign {} has corrupt state flags", row.id))?;
        Ok(Self {
            id: row.id,
            name: row.name,
            template: row.template,
            state,
        })
    }
}

impl TryFrom<PaymentRow> for Payment {
    type Error = anyhow::Error;

    fn try_from(row: PaymentRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            amount: parse_amount(&row.amount)?,
            status: row.status.parse()?,
            payment_method: row.payment_method,
            provider_ref: row.provider_ref,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}

impl TryFrom<RefundRow> for RefundRequest {
    type Error = anyhow::Error;

    fn try_from(row: RefundRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            payment_id: row.payment_id,
            amount: parse_amount(&row.amount)?,
            status: row.status.parse()?,
            admin_approved: row.admin_approved,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}

fn parse_amount(raw: &str) -> Result<Decimal> {
    Decimal::from_str(raw).with_context(|| format!("corrupt amount '{}'", raw))
}

/// SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS" without timezone.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc()))
        .with_context(|| format!("corrupt timestamp '{}'", raw))
}
