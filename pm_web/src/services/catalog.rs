//! ABOUTME: Product catalog, seller listings, moderation and buyer reviews
//! ABOUTME: Only published products are visible to the public

use crate::{middleware::auth::AuthUser, AppState};
use pm_core::{money::validate_currency, Error, ProductStatus, Result, ReviewStatus};
use pm_db::{
    CreateProductRequest, CreateReviewRequest, OrderRepository, PageRequest, Product,
    ProductRepository, Review, ReviewRepository, ReviewSummary, UpdateProductRequest,
};
use tracing::{info, instrument, warn};

/// Product fields supplied by a seller
#[derive(Debug, Clone)]
pub struct NewListing {
    pub title: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub currency: Option<String>,
    pub file_url: String,
}

pub struct CatalogService<'a> {
    state: &'a AppState,
}

impl<'a> CatalogService<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    fn products(&self) -> ProductRepository<'a> {
        ProductRepository::new(self.state.db.pool())
    }

    fn reviews(&self) -> ReviewRepository<'a> {
        ReviewRepository::new(self.state.db.pool())
    }

    async fn require_product(&self, id: &str) -> Result<Product> {
        self.products()
            .find_by_id(id)
            .await?
            .ok_or_else(|| Error::NotFound("Product not found".to_string()))
    }

    /// Product owned by `seller`; anyone else's listing reads as missing
    async fn owned_product(&self, seller: &AuthUser, id: &str) -> Result<Product> {
        let product = self.require_product(id).await?;
        if product.seller_id != seller.id || product.status()? == ProductStatus::Archived {
            return Err(Error::NotFound("Product not found".to_string()));
        }
        Ok(product)
    }

    pub async fn list_published(
        &self,
        search: Option<&str>,
        page: PageRequest,
    ) -> Result<(Vec<Product>, i64)> {
        self.products()
            .list_by_status(ProductStatus::Published, search, page)
            .await
    }

    pub async fn get_published(&self, id: &str) -> Result<Product> {
        let product = self.require_product(id).await?;
        if product.status()? != ProductStatus::Published {
            return Err(Error::NotFound("Product not found".to_string()));
        }
        Ok(product)
    }

    pub async fn seller_products(&self, seller: &AuthUser) -> Result<Vec<Product>> {
        self.products().list_by_seller(&seller.id).await
    }

    #[instrument(skip(self, listing), fields(seller_id = %seller.id))]
    pub async fn create_product(&self, seller: &AuthUser, listing: NewListing) -> Result<Product> {
        let currency = listing
            .currency
            .map(|c| c.trim().to_ascii_uppercase())
            .unwrap_or_else(|| self.state.marketplace.default_currency.clone());
        validate_currency(&currency)?;

        let product = self
            .products()
            .create(CreateProductRequest {
                seller_id: seller.id.clone(),
                title: listing.title.trim().to_string(),
                description: listing.description,
                price_cents: listing.price_cents,
                currency,
                file_url: listing.file_url,
            })
            .await?;

        info!(product_id = %product.id, "Product submitted for review");
        Ok(product)
    }

    #[instrument(skip(self, changes), fields(seller_id = %seller.id))]
    pub async fn update_product(
        &self,
        seller: &AuthUser,
        id: &str,
        changes: UpdateProductRequest,
    ) -> Result<Product> {
        let product = self.owned_product(seller, id).await?;
        if !product.status()?.is_editable() {
            return Err(Error::InvalidState("Archived products cannot be edited".to_string()));
        }

        let product = self.products().update(id, changes).await?;
        info!(product_id = %product.id, "Product updated; back to review");
        Ok(product)
    }

    /// Soft delete; existing orders keep their snapshot
    #[instrument(skip(self), fields(seller_id = %seller.id))]
    pub async fn archive_product(&self, seller: &AuthUser, id: &str) -> Result<()> {
        let product = self.owned_product(seller, id).await?;
        let current = product.status()?;

        self.products()
            .transition(id, current, ProductStatus::Archived, None)
            .await?;

        info!(product_id = %id, "Product archived");
        Ok(())
    }

    pub async fn admin_list(
        &self,
        status: ProductStatus,
        page: PageRequest,
    ) -> Result<(Vec<Product>, i64)> {
        self.products().list_by_status(status, None, page).await
    }

    async fn moderatable(&self, id: &str) -> Result<Product> {
        let product = self.require_product(id).await?;
        let status = product.status()?;
        if !status.is_moderatable() {
            warn!(product_id = %id, status = %status, "Moderation refused");
            return Err(Error::InvalidState(format!(
                "Product is {} and not awaiting review",
                status
            )));
        }
        Ok(product)
    }

    #[instrument(skip(self))]
    pub async fn approve_product(&self, id: &str) -> Result<Product> {
        self.moderatable(id).await?;
        let product = self
            .products()
            .transition(id, ProductStatus::PendingReview, ProductStatus::Published, None)
            .await?;

        info!(product_id = %id, "Product published");
        Ok(product)
    }

    #[instrument(skip(self, reason))]
    pub async fn reject_product(&self, id: &str, reason: &str) -> Result<Product> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(Error::Validation("A rejection reason is required".to_string()));
        }

        self.moderatable(id).await?;
        let product = self
            .products()
            .transition(
                id,
                ProductStatus::PendingReview,
                ProductStatus::Rejected,
                Some(reason),
            )
            .await?;

        info!(product_id = %id, "Product rejected");
        Ok(product)
    }

    /// Buyers may review what they bought through a completed order, once
    #[instrument(skip(self, comment), fields(user_id = %buyer.id))]
    pub async fn submit_review(
        &self,
        buyer: &AuthUser,
        product_id: &str,
        rating: i64,
        comment: Option<String>,
    ) -> Result<Review> {
        if !(1..=5).contains(&rating) {
            return Err(Error::Validation("Rating must be between 1 and 5".to_string()));
        }

        self.get_published(product_id).await?;

        let purchased = OrderRepository::new(self.state.db.pool())
            .has_purchased(&buyer.id, product_id)
            .await?;
        if !purchased {
            warn!(product_id = %product_id, "Review without purchase refused");
            return Err(Error::Forbidden(
                "Only buyers of this product can review it".to_string(),
            ));
        }

        let review = self
            .reviews()
            .create(CreateReviewRequest {
                product_id: product_id.to_string(),
                user_id: buyer.id.clone(),
                rating,
                comment: comment.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()),
            })
            .await?;

        info!(review_id = %review.id, "Review submitted for moderation");
        Ok(review)
    }

    /// Approved reviews of a published product plus their aggregate
    pub async fn product_reviews(&self, product_id: &str) -> Result<(Vec<Review>, ReviewSummary)> {
        self.get_published(product_id).await?;

        let reviews = self.reviews();
        let approved = reviews
            .list_for_product(product_id, ReviewStatus::Approved)
            .await?;
        let summary = reviews.summary(product_id).await?;
        Ok((approved, summary))
    }

    pub async fn review_queue(&self, status: ReviewStatus, page: PageRequest) -> Result<Vec<Review>> {
        self.reviews().list_by_status(status, page).await
    }

    #[instrument(skip(self))]
    pub async fn moderate_review(&self, id: &str, decision: ReviewStatus) -> Result<Review> {
        let reviews = self.reviews();
        reviews
            .find_by_id(id)
            .await?
            .ok_or_else(|| Error::NotFound("Review not found".to_string()))?;

        let review = reviews.moderate(id, decision).await?;
        info!(review_id = %id, decision = %decision, "Review moderated");
        Ok(review)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{
        test_fixtures::{seed_published, seed_user, test_state},
        OrderService,
    };
    use pm_core::Role;

    fn listing(title: &str) -> NewListing {
        NewListing {
            title: title.to_string(),
            description: None,
            price_cents: 2_500,
            currency: None,
            file_url: "https://files.example.com/plan.pdf".to_string(),
        }
    }

    #[tokio::test]
    async fn test_listing_goes_through_review() {
        let state = test_state().await;
        let seller = seed_user(&state, "seller@example.com", Role::Seller).await;
        let catalog = CatalogService::new(&state);

        let product = catalog.create_product(&seller, listing("Desk")).await.unwrap();
        assert_eq!(product.status, "PENDING_REVIEW");
        assert_eq!(product.currency, "EUR");

        // Not public until approved
        assert!(matches!(
            catalog.get_published(&product.id).await,
            Err(Error::NotFound(_))
        ));

        catalog.approve_product(&product.id).await.unwrap();
        let public = catalog.get_published(&product.id).await.unwrap();
        assert_eq!(public.status, "PUBLISHED");

        // A second decision on a published product is refused
        assert!(matches!(
            catalog.reject_product(&product.id, "late").await,
            Err(Error::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_edit_resets_review_and_reason() {
        let state = test_state().await;
        let seller = seed_user(&state, "seller@example.com", Role::Seller).await;
        let catalog = CatalogService::new(&state);

        let product = catalog.create_product(&seller, listing("Shelf")).await.unwrap();
        let rejected = catalog
            .reject_product(&product.id, "Missing dimensions")
            .await
            .unwrap();
        assert_eq!(rejected.rejection_reason.as_deref(), Some("Missing dimensions"));

        let edited = catalog
            .update_product(
                &seller,
                &product.id,
                UpdateProductRequest {
                    description: Some("Now with dimensions".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(edited.status, "PENDING_REVIEW");
        assert!(edited.rejection_reason.is_none());
    }

    #[tokio::test]
    async fn test_non_owner_sees_not_found() {
        let state = test_state().await;
        let seller = seed_user(&state, "seller@example.com", Role::Seller).await;
        let other = seed_user(&state, "other@example.com", Role::Seller).await;
        let catalog = CatalogService::new(&state);

        let product = seed_published(&state, &seller, "Stool", 1_000).await;
        assert!(matches!(
            catalog.archive_product(&other, &product.id).await,
            Err(Error::NotFound(_))
        ));

        catalog.archive_product(&seller, &product.id).await.unwrap();
        assert!(catalog.seller_products(&seller).await.unwrap().is_empty());
        assert!(matches!(
            catalog.archive_product(&seller, &product.id).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_reject_requires_reason() {
        let state = test_state().await;
        let seller = seed_user(&state, "seller@example.com", Role::Seller).await;
        let catalog = CatalogService::new(&state);

        let product = catalog.create_product(&seller, listing("Bench")).await.unwrap();
        assert!(matches!(
            catalog.reject_product(&product.id, "   ").await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_reviews_require_completed_purchase() {
        let state = test_state().await;
        let seller = seed_user(&state, "seller@example.com", Role::Seller).await;
        let buyer = seed_user(&state, "buyer@example.com", Role::Buyer).await;
        let catalog = CatalogService::new(&state);
        let product = seed_published(&state, &seller, "Table", 4_000).await;

        assert!(matches!(
            catalog.submit_review(&buyer, &product.id, 5, None).await,
            Err(Error::Forbidden(_))
        ));

        let orders = OrderService::new(&state);
        let (order, _) = orders
            .create_order(&buyer, &[product.id.clone()])
            .await
            .unwrap();
        orders
            .confirm_payment(&buyer, &order.id, "pay_123")
            .await
            .unwrap();

        let review = catalog
            .submit_review(&buyer, &product.id, 5, Some("Great".to_string()))
            .await
            .unwrap();
        assert_eq!(review.status, "PENDING");

        assert!(matches!(
            catalog.submit_review(&buyer, &product.id, 4, None).await,
            Err(Error::Conflict(_))
        ));

        // Pending reviews stay hidden until approved
        let (visible, summary) = catalog.product_reviews(&product.id).await.unwrap();
        assert!(visible.is_empty());
        assert_eq!(summary.review_count, 0);

        catalog
            .moderate_review(&review.id, ReviewStatus::Approved)
            .await
            .unwrap();
        let (visible, summary) = catalog.product_reviews(&product.id).await.unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(summary.average_rating, Some(5.0));
    }

    #[tokio::test]
    async fn test_moderate_missing_review() {
        let state = test_state().await;
        let catalog = CatalogService::new(&state);
        assert!(matches!(
            catalog.moderate_review("missing", ReviewStatus::Approved).await,
            Err(Error::NotFound(_))
        ));
    }
}
