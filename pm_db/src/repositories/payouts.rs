//! ABOUTME: Payout repository tracking transfers of seller earnings
//! ABOUTME: Holds the balance aggregates used before a payout is requested

use pm_core::{now_iso8601, Error, Id, OrderStatus, PayoutStatus, Result};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, instrument, warn};

use crate::{map_db_error, PageRequest};

const PAYOUT_COLUMNS: &str = "id, seller_id, amount_cents, currency, status, destination_account, transfer_reference, failure_reason, created_at, updated_at";

/// Payout entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payout {
    pub id: String,
    pub seller_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub status: String,
    pub destination_account: String,
    pub transfer_reference: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Payout {
    pub fn status(&self) -> Result<PayoutStatus> {
        self.status.parse()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPayout {
    pub seller_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub destination_account: String,
}

/// Payout repository
pub struct PayoutRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> PayoutRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Record a pending payout if the seller can still afford it
    ///
    /// The in-flight check, the balance check and the insert run as one
    /// statement, so of two racing requests only one can claim the funds.
    /// `earnings_cutoff` is the newest `completed_at` that counts as
    /// available. A refused insert is a `Conflict`.
    #[instrument(skip(self, payout), fields(seller_id = %payout.seller_id, amount_cents = payout.amount_cents))]
    pub async fn create(&self, payout: &NewPayout, earnings_cutoff: &str) -> Result<Payout> {
        let now = now_iso8601();

        sqlx::query_as::<_, Payout>(&format!(
            r#"
            INSERT INTO payouts (id, seller_id, amount_cents, currency, status, destination_account, created_at, updated_at)
            SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7
            WHERE NOT EXISTS (
                SELECT 1 FROM payouts WHERE seller_id = ?2 AND status IN (?5, ?8)
            )
            AND ?3 <= (
                SELECT COALESCE(SUM(i.seller_amount_cents), 0)
                FROM order_items i
                JOIN orders o ON o.id = i.order_id
                WHERE i.seller_id = ?2 AND o.status = ?9 AND o.completed_at <= ?10
            ) - (
                SELECT COALESCE(SUM(amount_cents), 0)
                FROM payouts WHERE seller_id = ?2 AND status != ?11
            )
            RETURNING {}
            "#,
            PAYOUT_COLUMNS
        ))
        .bind(Id::new().to_string())
        .bind(&payout.seller_id)
        .bind(payout.amount_cents)
        .bind(&payout.currency)
        .bind(PayoutStatus::Pending.as_str())
        .bind(&payout.destination_account)
        .bind(&now)
        .bind(PayoutStatus::Processing.as_str())
        .bind(OrderStatus::Completed.as_str())
        .bind(earnings_cutoff)
        .bind(PayoutStatus::Failed.as_str())
        .fetch_optional(self.pool)
        .await
        .map_err(|e| map_db_error("Failed to create payout", e))?
        .ok_or_else(|| {
            warn!("Payout refused: another payout is in flight or the balance is too low");
            Error::Conflict("Balance changed or another payout is in flight".to_string())
        })
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: &str) -> Result<Option<Payout>> {
        sqlx::query_as::<_, Payout>(&format!(
            "SELECT {} FROM payouts WHERE id = ?1",
            PAYOUT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to find payout: {}", e)))
    }

    /// Payouts of one seller, or of everyone, newest first
    #[instrument(skip(self))]
    pub async fn list(&self, seller_id: Option<&str>, page: PageRequest) -> Result<Vec<Payout>> {
        sqlx::query_as::<_, Payout>(&format!(
            r#"
            SELECT {} FROM payouts
            WHERE (?1 IS NULL OR seller_id = ?1)
            ORDER BY created_at DESC
            LIMIT ?2 OFFSET ?3
            "#,
            PAYOUT_COLUMNS
        ))
        .bind(seller_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list payouts: {}", e)))
    }

    /// A payout of this seller that is still pending or processing
    #[instrument(skip(self))]
    pub async fn find_in_flight(&self, seller_id: &str) -> Result<Option<Payout>> {
        sqlx::query_as::<_, Payout>(&format!(
            "SELECT {} FROM payouts WHERE seller_id = ?1 AND status IN (?2, ?3) LIMIT 1",
            PAYOUT_COLUMNS
        ))
        .bind(seller_id)
        .bind(PayoutStatus::Pending.as_str())
        .bind(PayoutStatus::Processing.as_str())
        .fetch_optional(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to look up in-flight payouts: {}", e)))
    }

    /// Sum of payouts that still count against the balance (anything not failed)
    #[instrument(skip(self))]
    pub async fn reserved_total(&self, seller_id: &str) -> Result<i64> {
        sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount_cents), 0) FROM payouts WHERE seller_id = ?1 AND status != ?2",
        )
        .bind(seller_id)
        .bind(PayoutStatus::Failed.as_str())
        .fetch_one(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to sum payouts: {}", e)))
    }

    /// Move a payout from `expected` to `next`, storing the processor outcome
    #[instrument(skip(self, transfer_reference, failure_reason))]
    pub async fn transition(
        &self,
        id: &str,
        expected: PayoutStatus,
        next: PayoutStatus,
        transfer_reference: Option<&str>,
        failure_reason: Option<&str>,
    ) -> Result<Payout> {
        let payout = sqlx::query_as::<_, Payout>(&format!(
            r#"
            UPDATE payouts
            SET status = ?1,
                transfer_reference = COALESCE(?2, transfer_reference),
                failure_reason = COALESCE(?3, failure_reason),
                updated_at = ?4
            WHERE id = ?5 AND status = ?6
            RETURNING {}
            "#,
            PAYOUT_COLUMNS
        ))
        .bind(next.as_str())
        .bind(transfer_reference)
        .bind(failure_reason)
        .bind(now_iso8601())
        .bind(id)
        .bind(expected.as_str())
        .fetch_optional(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to update payout status: {}", e)))?
        .ok_or_else(|| Error::Conflict(format!("Payout is no longer {}", expected)))?;

        debug!("Payout {} moved {} -> {}", payout.id, expected, next);
        Ok(payout)
    }
}
