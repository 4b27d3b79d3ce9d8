//! ABOUTME: Invoice repository issuing yearly sequential invoice numbers
//! ABOUTME: One invoice per order and seller; voiding keeps the row

use pm_core::{numbering, now_iso8601, time::current_year, Error, Id, InvoiceStatus, Result};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, instrument, warn};

use crate::{map_db_error, PageRequest};

const INVOICE_COLUMNS: &str = "id, invoice_number, order_id, seller_id, buyer_id, subtotal_cents, platform_fee_cents, seller_amount_cents, currency, status, issued_at, voided_at";

/// Attempts at claiming the next sequence number
const NUMBER_ATTEMPTS: usize = 5;

/// Invoice entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub id: String,
    pub invoice_number: String,
    pub order_id: String,
    pub seller_id: String,
    pub buyer_id: String,
    pub subtotal_cents: i64,
    pub platform_fee_cents: i64,
    pub seller_amount_cents: i64,
    pub currency: String,
    pub status: String,
    pub issued_at: String,
    pub voided_at: Option<String>,
}

/// Amounts for one seller's share of an order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInvoice {
    pub order_id: String,
    pub seller_id: String,
    pub buyer_id: String,
    pub subtotal_cents: i64,
    pub platform_fee_cents: i64,
    pub seller_amount_cents: i64,
    pub currency: String,
}

/// Invoice repository
pub struct InvoiceRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> InvoiceRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Issue the invoice for (order, seller) unless one exists already
    ///
    /// Returns the invoice and whether it was created by this call.
    #[instrument(skip(self, invoice), fields(order_id = %invoice.order_id, seller_id = %invoice.seller_id))]
    pub async fn issue(&self, invoice: &NewInvoice) -> Result<(Invoice, bool)> {
        let mut last_error = None;

        for attempt in 1..=NUMBER_ATTEMPTS {
            match self.try_issue(invoice).await {
                Ok(result) => return Ok(result),
                Err(Error::Conflict(msg)) => {
                    warn!("Invoice number race (attempt {}): {}", attempt, msg);
                    last_error = Some(Error::Conflict(msg));
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error
            .unwrap_or_else(|| Error::Conflict("Could not allocate an invoice number".to_string())))
    }

    async fn try_issue(&self, invoice: &NewInvoice) -> Result<(Invoice, bool)> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::Database(format!("Failed to begin transaction: {}", e)))?;

        let existing = sqlx::query_as::<_, Invoice>(&format!(
            "SELECT {} FROM invoices WHERE order_id = ?1 AND seller_id = ?2",
            INVOICE_COLUMNS
        ))
        .bind(&invoice.order_id)
        .bind(&invoice.seller_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| Error::Database(format!("Failed to look up invoice: {}", e)))?;

        if let Some(existing) = existing {
            return Ok((existing, false));
        }

        let year = current_year();
        // Sequences past six digits are longer strings, so order by length first
        let last: Option<String> = sqlx::query_scalar(
            "SELECT invoice_number FROM invoices WHERE invoice_number LIKE ?1 ORDER BY length(invoice_number) DESC, invoice_number DESC LIMIT 1",
        )
        .bind(format!("{}%", numbering::invoice_year_prefix(year)))
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| Error::Database(format!("Failed to read invoice sequence: {}", e)))?;

        let sequence = last
            .as_deref()
            .and_then(|n| numbering::parse_invoice_sequence(n, year))
            .unwrap_or(0)
            + 1;
        let number = numbering::invoice_number(year, sequence);

        let created = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            INSERT INTO invoices (id, invoice_number, order_id, seller_id, buyer_id, subtotal_cents, platform_fee_cents, seller_amount_cents, currency, status, issued_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            RETURNING {}
            "#,
            INVOICE_COLUMNS
        ))
        .bind(Id::new().to_string())
        .bind(&number)
        .bind(&invoice.order_id)
        .bind(&invoice.seller_id)
        .bind(&invoice.buyer_id)
        .bind(invoice.subtotal_cents)
        .bind(invoice.platform_fee_cents)
        .bind(invoice.seller_amount_cents)
        .bind(&invoice.currency)
        .bind(InvoiceStatus::Issued.as_str())
        .bind(now_iso8601())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_db_error("Failed to create invoice", e))?;

        tx.commit()
            .await
            .map_err(|e| Error::Database(format!("Failed to commit transaction: {}", e)))?;

        debug!("Issued invoice {}", created.invoice_number);
        Ok((created, true))
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: &str) -> Result<Option<Invoice>> {
        sqlx::query_as::<_, Invoice>(&format!(
            "SELECT {} FROM invoices WHERE id = ?1",
            INVOICE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to find invoice: {}", e)))
    }

    #[instrument(skip(self))]
    pub async fn list_for_order(&self, order_id: &str) -> Result<Vec<Invoice>> {
        sqlx::query_as::<_, Invoice>(&format!(
            "SELECT {} FROM invoices WHERE order_id = ?1 ORDER BY invoice_number",
            INVOICE_COLUMNS
        ))
        .bind(order_id)
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list order invoices: {}", e)))
    }

    /// Invoices filtered by buyer and/or seller; no filter lists everything
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        buyer_id: Option<&str>,
        seller_id: Option<&str>,
        page: PageRequest,
    ) -> Result<Vec<Invoice>> {
        sqlx::query_as::<_, Invoice>(&format!(
            r#"
            SELECT {} FROM invoices
            WHERE (?1 IS NULL OR buyer_id = ?1) AND (?2 IS NULL OR seller_id = ?2)
            ORDER BY issued_at DESC
            LIMIT ?3 OFFSET ?4
            "#,
            INVOICE_COLUMNS
        ))
        .bind(buyer_id)
        .bind(seller_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list invoices: {}", e)))
    }

    /// Void every issued invoice of an order; returns how many changed
    #[instrument(skip(self))]
    pub async fn void_for_order(&self, order_id: &str) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE invoices SET status = ?1, voided_at = ?2 WHERE order_id = ?3 AND status = ?4",
        )
        .bind(InvoiceStatus::Void.as_str())
        .bind(now_iso8601())
        .bind(order_id)
        .bind(InvoiceStatus::Issued.as_str())
        .execute(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to void invoices: {}", e)))?;

        debug!("Voided {} invoices for order {}", result.rows_affected(), order_id);
        Ok(result.rows_affected())
    }
}
