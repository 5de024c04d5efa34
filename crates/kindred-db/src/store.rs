use anyhow::{Result, anyhow};
use rusqlite::Connection;
use rust_decimal::Decimal;

use kindred_core::store::{CampaignStore, RefundStore};
use kindred_types::models::{Campaign, CampaignState, Payment, RefundRequest, RefundStatus};

use crate::models::{CampaignRow, RefundRow};
use crate::queries::{OptionalExt, query_payment};

const CAMPAIGN_COLUMNS: &str = "id, name, template, is_draft, is_published, is_ended";
const REFUND_COLUMNS: &str = "id, user_id, payment_id, amount, status, admin_approved, created_at";

/// Engine-facing view of a connection or an open transaction.
pub struct SqlStore<'a> {
    conn: &'a Connection,
}

impl<'a> SqlStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn query_campaign(&self, filter: &str, param: &dyn rusqlite::ToSql) -> Result<Option<Campaign>> {
        let sql = format!("SELECT {} FROM campaigns WHERE {} = ?1", CAMPAIGN_COLUMNS, filter);
        let mut stmt = self.conn.prepare(&sql)?;
        let row = stmt.query_row([param], map_campaign_row).optional()?;
        row.map(Campaign::try_from).transpose()
    }
}

impl CampaignStore for SqlStore<'_> {
    fn campaign_by_id(&self, id: i64) -> Result<Option<Campaign>> {
        self.query_campaign("id", &id)
    }

    fn campaign_by_name(&self, name: &str) -> Result<Option<Campaign>> {
        self.query_campaign("name", &name)
    }

    fn insert_campaign(&self, name: &str, template: &str, state: CampaignState) -> Result<i64> {
        let (is_draft, is_published, is_ended) = state.flags();
        self.conn.execute(
            "INSERT INTO campaigns (name, template, is_draft, is_published, is_ended)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![name, template, is_draft, is_published, is_ended],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update_campaign(&self, campaign: &Campaign) -> Result<usize> {
        let (is_draft, is_published, is_ended) = campaign.state.flags();
        let rows = self.conn.execute(
            "UPDATE campaigns
             SET name = ?1, template = ?2, is_draft = ?3, is_published = ?4, is_ended = ?5
             WHERE id = ?6",
            rusqlite::params![
                campaign.name,
                campaign.template,
                is_draft,
                is_published,
                is_ended,
                campaign.id
            ],
        )?;
        Ok(rows)
    }

    fn delete_campaign(&self, id: i64) -> Result<usize> {
        Ok(self.conn.execute("DELETE FROM campaigns WHERE id = ?1", [id])?)
    }

    fn list_campaigns(&self, state: Option<CampaignState>) -> Result<Vec<Campaign>> {
        let filter = match state {
            None => "",
            Some(CampaignState::Draft) => " WHERE is_draft = 1",
            Some(CampaignState::Published) => " WHERE is_published = 1",
            Some(CampaignState::Ended) => " WHERE is_ended = 1",
        };
        let sql = format!("SELECT {} FROM campaigns{} ORDER BY id", CAMPAIGN_COLUMNS, filter);

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], map_campaign_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.into_iter().map(Campaign::try_from).collect()
    }
}

impl RefundStore for SqlStore<'_> {
    fn payment_by_id(&self, id: i64) -> Result<Option<Payment>> {
        query_payment(self.conn, id)
    }

    fn insert_refund(&self, user_id: i64, payment_id: i64, amount: Decimal) -> Result<RefundRequest> {
        self.conn.execute(
            "INSERT INTO refund_requests (user_id, payment_id, amount, status)
             VALUES (?1, ?2, ?3, 'pending')",
            rusqlite::params![user_id, payment_id, amount.to_string()],
        )?;
        let id = self.conn.last_insert_rowid();
        self.refund_by_id(id)?
            .ok_or_else(|| anyhow!("refund request {} vanished after insert", id))
    }

    fn refund_by_id(&self, id: i64) -> Result<Option<RefundRequest>> {
        let sql = format!("SELECT {} FROM refund_requests WHERE id = ?1", REFUND_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let row = stmt.query_row([id], map_refund_row).optional()?;
        row.map(RefundRequest::try_from).transpose()
    }

    fn settle_refund(&self, id: i64, status: RefundStatus) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE refund_requests SET status = ?1, admin_approved = ?2
             WHERE id = ?3 AND status = 'pending'",
            rusqlite::params![status.as_str(), status == RefundStatus::Approved, id],
        )?;
        Ok(rows == 1)
    }

    fn list_refunds(&self, status: Option<RefundStatus>) -> Result<Vec<RefundRequest>> {
        let rows = match status {
            Some(status) => {
                let sql = format!(
                    "SELECT {} FROM refund_requests WHERE status = ?1 ORDER BY id",
                    REFUND_COLUMNS
                );
                let mut stmt = self.conn.prepare(&sql)?;
                stmt.query_map([status.as_str()], map_refund_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            }
            None => {
                let sql = format!("SELECT {} FROM refund_requests ORDER BY id", REFUND_COLUMNS);
                let mut stmt = self.conn.prepare(&sql)?;
                stmt.query_map([], map_refund_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            }
        };
        rows.into_iter().map(RefundRequest::try_from).collect()
    }
}

fn map_campaign_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CampaignRow> {
    Ok(CampaignRow {
        id: row.get(0)?,
        name: row.get(1)?,
        template: row.get(2)?,
        is_draft: row.get(3)?,
        is_published: row.get(4)?,
        is_ended: row.get(5)?,
    })
}

fn map_refund_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RefundRow> {
    Ok(RefundRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        payment_id: row.get(2)?,
        amount: row.get(3)?,
        status: row.get(4)?,
        admin_approved: row.get(5)?,
        created_at: row.get(6)?,
    })
}
