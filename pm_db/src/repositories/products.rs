//! ABOUTME: Product repository for the plan catalog and its moderation states
//! ABOUTME: Public queries only ever see published products

use pm_core::{now_iso8601, Error, Id, ProductStatus, Result};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use tracing::{debug, instrument};

use crate::{map_db_error, PageRequest};

const PRODUCT_COLUMNS: &str = "id, seller_id, title, description, price_cents, currency, file_url, status, rejection_reason, created_at, updated_at";

/// Product entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub id: String,
    pub seller_id: String,
    pub title: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub currency: String,
    pub file_url: String,
    pub status: String,
    pub rejection_reason: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Product {
    pub fn status(&self) -> Result<ProductStatus> {
        self.status.parse()
    }
}

/// Request to create a new product
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProductRequest {
    pub seller_id: String,
    pub title: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub currency: String,
    pub file_url: String,
}

/// Seller edits to a product; absent fields keep their value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProductRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price_cents: Option<i64>,
    pub file_url: Option<String>,
}

impl UpdateProductRequest {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.price_cents.is_none()
            && self.file_url.is_none()
    }
}

/// Product repository
pub struct ProductRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ProductRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a product awaiting review
    #[instrument(skip(self, request))]
    pub async fn create(&self, request: CreateProductRequest) -> Result<Product> {
        let id = Id::new().to_string();
        let now = now_iso8601();

        debug!("Creating product {} for seller {}", id, request.seller_id);

        sqlx::query_as::<_, Product>(&format!(
            r#"
            INSERT INTO products (id, seller_id, title, description, price_cents, currency, file_url, status, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
            RETURNING {}
            "#,
            PRODUCT_COLUMNS
        ))
        .bind(&id)
        .bind(request.seller_id)
        .bind(request.title)
        .bind(request.description)
        .bind(request.price_cents)
        .bind(request.currency)
        .bind(request.file_url)
        .bind(ProductStatus::PendingReview.as_str())
        .bind(&now)
        .fetch_one(self.pool)
        .await
        .map_err(|e| map_db_error("Failed to create product", e))
    }

    /// Find a product by ID regardless of status
    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: &str) -> Result<Option<Product>> {
        sqlx::query_as::<_, Product>(&format!(
            "SELECT {} FROM products WHERE id = ?1",
            PRODUCT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to find product: {}", e)))
    }

    /// Fetch every product whose id is in `ids`
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    pub async fn find_many(&self, ids: &[String]) -> Result<Vec<Product>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM products WHERE id IN (", PRODUCT_COLUMNS));
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");

        builder
            .build_query_as::<Product>()
            .fetch_all(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to load products: {}", e)))
    }

    /// Page through products in one status, newest first, with an optional title filter
    ///
    /// Returns the page and the total number of matches.
    #[instrument(skip(self))]
    pub async fn list_by_status(
        &self,
        status: ProductStatus,
        search: Option<&str>,
        page: PageRequest,
    ) -> Result<(Vec<Product>, i64)> {
        let search = search.map(str::trim).filter(|s| !s.is_empty()).map(str::to_lowercase);

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM products WHERE status = ?1 AND (?2 IS NULL OR instr(lower(title), ?2) > 0)",
        )
        .bind(status.as_str())
        .bind(search.as_deref())
        .fetch_one(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to count products: {}", e)))?;

        let products = sqlx::query_as::<_, Product>(&format!(
            r#"
            SELECT {} FROM products
            WHERE status = ?1 AND (?2 IS NULL OR instr(lower(title), ?2) > 0)
            ORDER BY created_at DESC
            LIMIT ?3 OFFSET ?4
            "#,
            PRODUCT_COLUMNS
        ))
        .bind(status.as_str())
        .bind(search.as_deref())
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list products: {}", e)))?;

        debug!("Found {} of {} {} products", products.len(), total, status);
        Ok((products, total))
    }

    /// All non-archived products of one seller
    #[instrument(skip(self))]
    pub async fn list_by_seller(&self, seller_id: &str) -> Result<Vec<Product>> {
        sqlx::query_as::<_, Product>(&format!(
            "SELECT {} FROM products WHERE seller_id = ?1 AND status != ?2 ORDER BY created_at DESC",
            PRODUCT_COLUMNS
        ))
        .bind(seller_id)
        .bind(ProductStatus::Archived.as_str())
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list seller products: {}", e)))
    }

    /// Apply seller edits and send the product back to review
    #[instrument(skip(self, request))]
    pub async fn update(&self, id: &str, request: UpdateProductRequest) -> Result<Product> {
        if request.is_empty() {
            return Err(Error::Validation("No fields to update".to_string()));
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::Database(format!("Failed to begin transaction: {}", e)))?;

        let current = sqlx::query_as::<_, Product>(&format!(
            "SELECT {} FROM products WHERE id = ?1",
            PRODUCT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| Error::Database(format!("Failed to find product: {}", e)))?
        .ok_or_else(|| Error::NotFound("Product not found".to_string()))?;

        let product = sqlx::query_as::<_, Product>(&format!(
            r#"
            UPDATE products
            SET title = ?1, description = ?2, price_cents = ?3, file_url = ?4,
                status = ?5, rejection_reason = NULL, updated_at = ?6
            WHERE id = ?7 AND status = ?8
            RETURNING {}
            "#,
            PRODUCT_COLUMNS
        ))
        .bind(request.title.unwrap_or(current.title))
        .bind(request.description.or(current.description))
        .bind(request.price_cents.unwrap_or(current.price_cents))
        .bind(request.file_url.unwrap_or(current.file_url))
        .bind(ProductStatus::PendingReview.as_str())
        .bind(now_iso8601())
        .bind(id)
        .bind(&current.status)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| Error::Database(format!("Failed to update product: {}", e)))?
        .ok_or_else(|| Error::Conflict("Product was modified concurrently".to_string()))?;

        tx.commit()
            .await
            .map_err(|e| Error::Database(format!("Failed to commit transaction: {}", e)))?;

        debug!("Updated product {}; back to review", product.id);
        Ok(product)
    }

    /// Move a product from `expected` to `next`, recording `reason` when given
    ///
    /// Fails with `Conflict` if the product is no longer in `expected`.
    #[instrument(skip(self, reason))]
    pub async fn transition(
        &self,
        id: &str,
        expected: ProductStatus,
        next: ProductStatus,
        reason: Option<&str>,
    ) -> Result<Product> {
        sqlx::query_as::<_, Product>(&format!(
            r#"
            UPDATE products SET status = ?1, rejection_reason = ?2, updated_at = ?3
            WHERE id = ?4 AND status = ?5
            RETURNING {}
            "#,
            PRODUCT_COLUMNS
        ))
        .bind(next.as_str())
        .bind(reason)
        .bind(now_iso8601())
        .bind(id)
        .bind(expected.as_str())
        .fetch_optional(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to update product status: {}", e)))?
        .ok_or_else(|| {
            Error::Conflict(format!("Product is no longer {}", expected))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{create_test_db, seed_product, seed_user};

    #[tokio::test]
    async fn test_new_products_await_review() {
        let db = create_test_db().await.unwrap();
        let seller = seed_user(&db, "seller@example.com", "seller").await;
        let product = seed_product(&db, &seller, "Oak Table", 2_500).await;

        assert_eq!(product.status().unwrap(), ProductStatus::PendingReview);

        let repo = ProductRepository::new(db.pool());
        let (published, total) = repo
            .list_by_status(ProductStatus::Published, None, PageRequest::new(0, 20))
            .await
            .unwrap();
        assert!(published.is_empty());
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn test_publish_search_and_paginate() {
        let db = create_test_db().await.unwrap();
        let seller = seed_user(&db, "seller@example.com", "seller").await;
        let repo = ProductRepository::new(db.pool());

        for title in ["Oak Table", "Pine Shelf", "Oak Bench"] {
            let product = seed_product(&db, &seller, title, 1_000).await;
            repo.transition(&product.id, ProductStatus::PendingReview, ProductStatus::Published, None)
                .await
                .unwrap();
        }

        let (oak, total) = repo
            .list_by_status(ProductStatus::Published, Some("OAK"), PageRequest::new(0, 20))
            .await
            .unwrap();
        assert_eq!(total, 2);
        assert!(oak.iter().all(|p| p.title.contains("Oak")));

        let (page, total) = repo
            .list_by_status(ProductStatus::Published, None, PageRequest::new(1, 2))
            .await
            .unwrap();
        assert_eq!(total, 3);
        assert_eq!(page.len(), 1);
    }

    #[tokio::test]
    async fn test_transition_requires_expected_status() {
        let db = create_test_db().await.unwrap();
        let seller = seed_user(&db, "seller@example.com", "seller").await;
        let product = seed_product(&db, &seller, "Desk", 4_000).await;
        let repo = ProductRepository::new(db.pool());

        let rejected = repo
            .transition(
                &product.id,
                ProductStatus::PendingReview,
                ProductStatus::Rejected,
                Some("blurry drawings"),
            )
            .await
            .unwrap();
        assert_eq!(rejected.rejection_reason.as_deref(), Some("blurry drawings"));

        let err = repo
            .transition(&product.id, ProductStatus::PendingReview, ProductStatus::Published, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn test_update_sends_back_to_review() {
        let db = create_test_db().await.unwrap();
        let seller = seed_user(&db, "seller@example.com", "seller").await;
        let product = seed_product(&db, &seller, "Chair", 1_500).await;
        let repo = ProductRepository::new(db.pool());

        repo.transition(
            &product.id,
            ProductStatus::PendingReview,
            ProductStatus::Rejected,
            Some("missing dimensions"),
        )
        .await
        .unwrap();

        let updated = repo
            .update(
                &product.id,
                UpdateProductRequest {
                    price_cents: Some(1_800),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.price_cents, 1_800);
        assert_eq!(updated.title, "Chair");
        assert_eq!(updated.status().unwrap(), ProductStatus::PendingReview);
        assert!(updated.rejection_reason.is_none());

        let empty = repo.update(&product.id, UpdateProductRequest::default()).await;
        assert!(matches!(empty, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_find_many_and_seller_listing() {
        let db = create_test_db().await.unwrap();
        let seller = seed_user(&db, "seller@example.com", "seller").await;
        let a = seed_product(&db, &seller, "A", 100).await;
        let b = seed_product(&db, &seller, "B", 200).await;
        let repo = ProductRepository::new(db.pool());

        let found = repo
            .find_many(&[a.id.clone(), b.id.clone(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert!(repo.find_many(&[]).await.unwrap().is_empty());

        repo.transition(&b.id, ProductStatus::PendingReview, ProductStatus::Archived, None)
            .await
            .unwrap();
        let mine = repo.list_by_seller(&seller).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, a.id);
    }
}
