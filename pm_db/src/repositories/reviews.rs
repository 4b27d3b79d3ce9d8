//! ABOUTME: Review repository for product ratings and their moderation
//! ABOUTME: One review per user and product, enforced by the schema

use pm_core::{now_iso8601, Error, Id, Result, ReviewStatus};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, instrument};

use crate::{map_db_error, PageRequest};

const REVIEW_COLUMNS: &str =
    "id, product_id, user_id, rating, comment, status, created_at, updated_at";

/// Review entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Review {
    pub id: String,
    pub product_id: String,
    pub user_id: String,
    pub rating: i64,
    pub comment: Option<String>,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Request to create a review
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateReviewRequest {
    pub product_id: String,
    pub user_id: String,
    pub rating: i64,
    pub comment: Option<String>,
}

/// Aggregate over a product's approved reviews
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct ReviewSummary {
    pub review_count: i64,
    pub average_rating: Option<f64>,
}

/// Review repository
pub struct ReviewRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ReviewRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a pending review; a second review by the same user is a conflict
    #[instrument(skip(self, request))]
    pub async fn create(&self, request: CreateReviewRequest) -> Result<Review> {
        let id = Id::new().to_string();
        let now = now_iso8601();

        debug!(
            "Creating review {} on product {} by {}",
            id, request.product_id, request.user_id
        );

        sqlx::query_as::<_, Review>(&format!(
            r#"
            INSERT INTO reviews (id, product_id, user_id, rating, comment, status, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
            RETURNING {}
            "#,
            REVIEW_COLUMNS
        ))
        .bind(&id)
        .bind(request.product_id)
        .bind(request.user_id)
        .bind(request.rating)
        .bind(request.comment)
        .bind(ReviewStatus::Pending.as_str())
        .bind(&now)
        .fetch_one(self.pool)
        .await
        .map_err(|e| map_db_error("Failed to create review", e))
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: &str) -> Result<Option<Review>> {
        sqlx::query_as::<_, Review>(&format!(
            "SELECT {} FROM reviews WHERE id = ?1",
            REVIEW_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to find review: {}", e)))
    }

    /// Reviews of one product in one status, newest first
    #[instrument(skip(self))]
    pub async fn list_for_product(
        &self,
        product_id: &str,
        status: ReviewStatus,
    ) -> Result<Vec<Review>> {
        sqlx::query_as::<_, Review>(&format!(
            "SELECT {} FROM reviews WHERE product_id = ?1 AND status = ?2 ORDER BY created_at DESC",
            REVIEW_COLUMNS
        ))
        .bind(product_id)
        .bind(status.as_str())
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list product reviews: {}", e)))
    }

    /// Count and mean rating of a product's approved reviews
    #[instrument(skip(self))]
    pub async fn summary(&self, product_id: &str) -> Result<ReviewSummary> {
        sqlx::query_as::<_, ReviewSummary>(
            r#"
            SELECT COUNT(*) AS review_count, AVG(rating) AS average_rating
            FROM reviews WHERE product_id = ?1 AND status = ?2
            "#,
        )
        .bind(product_id)
        .bind(ReviewStatus::Approved.as_str())
        .fetch_one(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to summarize reviews: {}", e)))
    }

    /// Moderation queue: reviews in `status`, oldest first
    #[instrument(skip(self))]
    pub async fn list_by_status(&self, status: ReviewStatus, page: PageRequest) -> Result<Vec<Review>> {
        sqlx::query_as::<_, Review>(&format!(
            "SELECT {} FROM reviews WHERE status = ?1 ORDER BY created_at ASC LIMIT ?2 OFFSET ?3",
            REVIEW_COLUMNS
        ))
        .bind(status.as_str())
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list reviews: {}", e)))
    }

    /// Record a moderation decision on a pending review
    #[instrument(skip(self))]
    pub async fn moderate(&self, id: &str, decision: ReviewStatus) -> Result<Review> {
        if decision == ReviewStatus::Pending {
            return Err(Error::Validation(
                "A moderation decision must approve or reject".to_string(),
            ));
        }

        sqlx::query_as::<_, Review>(&format!(
            r#"
            UPDATE reviews SET status = ?1, updated_at = ?2
            WHERE id = ?3 AND status = ?4
            RETURNING {}
            "#,
            REVIEW_COLUMNS
        ))
        .bind(decision.as_str())
        .bind(now_iso8601())
        .bind(id)
        .bind(ReviewStatus::Pending.as_str())
        .fetch_optional(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to moderate review: {}", e)))?
        .ok_or_else(|| Error::InvalidState("Review is not awaiting moderation".to_string()))
    }
}
