use crate::Database;
use crate::models::{PaymentRow, UserRow};
use anyhow::Result;
use kindred_types::models::{Payment, PaymentStatus};
use rusqlite::Connection;
use rust_decimal::Decimal;

impl Database {
    // -- Users --

    /// Insert a user unless the e-mail or username is already in use. The
    /// lookups and the insert run under one connection lock, so two racing
    /// sign-ups with the same e-mail resolve to one `Created`.
    pub fn register_user(&self, username: &str, email: &str, password_hash: &str) -> Result<Registration> {
        self.with_conn(|conn| {
            if query_user(conn, UserKey::Email, email)?.is_some() {
                return Ok(Registration::EmailTaken);
            }
            if query_user(conn, UserKey::Username, username)?.is_some() {
                return Ok(Registration::UsernameTaken);
            }
            conn.execute(
                "INSERT INTO users (username, email, hashed_password) VALUES (?1, ?2, ?3)",
                (username, email, password_hash),
            )?;
            Ok(Registration::Created(conn.last_insert_rowid()))
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, UserKey::Email, email))
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, UserKey::Username, username))
    }

    // -- Payments --

    pub fn insert_payment(
        &self,
        user_id: i64,
        amount: Decimal,
        status: PaymentStatus,
        payment_method: &str,
        provider_ref: &str,
    ) -> Result<Payment> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO payments (user_id, amount, status, payment_method, provider_ref)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    user_id,
                    amount.to_string(),
                    status.as_str(),
                    payment_method,
                    provider_ref
                ],
            )?;
            let id = conn.last_insert_rowid();
            query_payment(conn, id)?
                .ok_or_else(|| anyhow::anyhow!("payment {} vanished after insert", id))
        })
    }

    pub fn get_payments_for_user(&self, user_id: i64) -> Result<Vec<Payment>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, amount, status, payment_method, provider_ref, created_at
                 FROM payments WHERE user_id = ?1 ORDER BY id",
            )?;
            let rows = stmt
                .query_map([user_id], map_payment_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(Payment::try_from).collect()
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Created(i64),
    EmailTaken,
    UsernameTaken,
}

enum UserKey {
    Email,
    Username,
}

fn query_user(conn: &Connection, key: UserKey, value: &str) -> Result<Option<UserRow>> {
    let sql = match key {
        UserKey::Email => "SELECT id, username, email, hashed_password, created_at FROM users WHERE email = ?1",
        UserKey::Username => "SELECT id, username, email, hashed_password, created_at FROM users WHERE username = ?1",
    };
    let mut stmt = conn.prepare(sql)?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                email: row.get(2)?,
                hashed_password: row.get(3)?,
                created_at: row.get(4)?,
            })
        })
        .optional()?;

    Ok(row)
}

pub(crate) fn query_payment(conn: &Connection, id: i64) -> Result<Option<Payment>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, amount, status, payment_method, provider_ref, created_at
         FROM payments WHERE id = ?1",
    )?;

    let row = stmt.query_row([id], map_payment_row).optional()?;
    row.map(Payment::try_from).transpose()
}

pub(crate) fn map_payment_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PaymentRow> {
    Ok(PaymentRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        amount: row.get(2)?,
        status: row.get(3)?,
        payment_method: row.get(4)?,
        provider_ref: row.get(5)?,
        created_at: row.get(6)?,
    })
}

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
