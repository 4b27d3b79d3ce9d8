//! ABOUTME: Order placement, payment confirmation, fulfilment and admin transitions
//! ABOUTME: Fees are split per item; completion issues invoices and refunds void them

use crate::{middleware::auth::AuthUser, services::InvoiceService, AppState};
use pm_core::{
    money::{format_cents, Totals},
    split_amount, Error, OrderStatus, ProductStatus, Result,
};
use pm_db::{NewOrder, NewOrderItem, Order, OrderItem, OrderRepository, PageRequest, ProductRepository};
use std::collections::HashSet;
use tracing::{info, instrument, warn};

/// Most products a single order may contain
pub const MAX_ORDER_ITEMS: usize = 50;

/// Purchased file of a completed order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub product_id: String,
    pub title: String,
    pub file_url: String,
}

pub struct OrderService<'a> {
    state: &'a AppState,
}

impl<'a> OrderService<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    fn repo(&self) -> OrderRepository<'a> {
        OrderRepository::new(self.state.db.pool())
    }

    async fn require(&self, id: &str) -> Result<Order> {
        self.repo()
            .find_by_id(id)
            .await?
            .ok_or_else(|| Error::NotFound("Order not found".to_string()))
    }

    /// Order owned by `buyer`; someone else's order reads as missing
    async fn owned(&self, buyer: &AuthUser, id: &str) -> Result<Order> {
        let order = self.require(id).await?;
        if order.buyer_id != buyer.id {
            return Err(Error::NotFound("Order not found".to_string()));
        }
        Ok(order)
    }

    #[instrument(skip(self, product_ids), fields(buyer_id = %buyer.id, items = product_ids.len()))]
    pub async fn create_order(
        &self,
        buyer: &AuthUser,
        product_ids: &[String],
    ) -> Result<(Order, Vec<OrderItem>)> {
        if product_ids.is_empty() || product_ids.len() > MAX_ORDER_ITEMS {
            return Err(Error::Validation(format!(
                "An order must contain between 1 and {} products",
                MAX_ORDER_ITEMS
            )));
        }

        let mut seen = HashSet::new();
        if let Some(dup) = product_ids.iter().find(|id| !seen.insert(id.as_str())) {
            return Err(Error::Validation(format!("Product {} is listed twice", dup)));
        }

        let products = ProductRepository::new(self.state.db.pool())
            .find_many(product_ids)
            .await?;

        // Keep the caller's ordering for the line items
        let mut ordered = Vec::with_capacity(product_ids.len());
        for id in product_ids {
            let product = products
                .iter()
                .find(|p| &p.id == id)
                .filter(|p| matches!(p.status(), Ok(ProductStatus::Published)))
                .ok_or_else(|| Error::NotFound(format!("Product {} not found", id)))?;

            if product.seller_id == buyer.id {
                return Err(Error::Validation(format!(
                    "Product {} is your own listing",
                    id
                )));
            }
            ordered.push(product);
        }

        let currency = ordered[0].currency.clone();
        if ordered.iter().any(|p| p.currency != currency) {
            return Err(Error::Validation(
                "All products of an order must share one currency".to_string(),
            ));
        }

        let owned = self.repo().owned_products(&buyer.id, product_ids).await?;
        if let Some(id) = owned.first() {
            warn!(product_id = %id, "Repeat purchase refused");
            return Err(Error::Conflict(format!("You already own product {}", id)));
        }

        let fee_bps = self.state.marketplace.platform_fee_bps;
        let mut totals = Totals::default();
        let mut items = Vec::with_capacity(ordered.len());
        for product in ordered {
            let split = split_amount(product.price_cents, fee_bps)?;
            totals.add(product.price_cents, split);
            items.push(NewOrderItem {
                product_id: product.id.clone(),
                seller_id: product.seller_id.clone(),
                title: product.title.clone(),
                price_cents: product.price_cents,
                platform_fee_cents: split.platform_fee_cents,
                seller_amount_cents: split.seller_amount_cents,
            });
        }

        let (order, items) = self
            .repo()
            .create(&NewOrder {
                buyer_id: buyer.id.clone(),
                currency,
                subtotal_cents: totals.subtotal_cents,
                platform_fee_cents: totals.platform_fee_cents,
                total_cents: totals.subtotal_cents,
                items,
            })
            .await?;

        self.state.metrics.order_event("created");
        info!(
            order_id = %order.id,
            order_number = %order.order_number,
            total = %format_cents(order.total_cents, &order.currency),
            "Order placed"
        );
        Ok((order, items))
    }

    pub async fn get_for_buyer(&self, buyer: &AuthUser, id: &str) -> Result<(Order, Vec<OrderItem>)> {
        let order = self.owned(buyer, id).await?;
        let items = self.repo().items(&order.id).await?;
        Ok((order, items))
    }

    pub async fn get(&self, id: &str) -> Result<(Order, Vec<OrderItem>)> {
        let order = self.require(id).await?;
        let items = self.repo().items(&order.id).await?;
        Ok((order, items))
    }

    pub async fn list_for_buyer(&self, buyer: &AuthUser, page: PageRequest) -> Result<Vec<Order>> {
        self.repo().list_by_buyer(&buyer.id, page).await
    }

    pub async fn list_all(
        &self,
        status: Option<OrderStatus>,
        page: PageRequest,
    ) -> Result<(Vec<Order>, i64)> {
        self.repo().list(status, page).await
    }

    /// Record the captured payment and fulfil the order
    #[instrument(skip(self, payment_reference), fields(buyer_id = %buyer.id))]
    pub async fn confirm_payment(
        &self,
        buyer: &AuthUser,
        id: &str,
        payment_reference: &str,
    ) -> Result<Order> {
        let payment_reference = payment_reference.trim();
        if payment_reference.is_empty() {
            return Err(Error::Validation("Payment reference must not be blank".to_string()));
        }

        let order = self.owned(buyer, id).await?;
        let status = order.status()?;
        if status != OrderStatus::Pending {
            warn!(order_id = %id, status = %status, "Payment confirmation refused");
            return Err(Error::InvalidState(format!(
                "Only pending orders can be paid; order is {}",
                status
            )));
        }

        let repo = self.repo();
        repo.transition(
            id,
            OrderStatus::Pending,
            OrderStatus::Processing,
            Some(payment_reference),
        )
        .await?;
        self.state.metrics.order_event("paid");
        info!(order_id = %id, "Payment recorded");

        self.fulfil(id).await
    }

    /// PROCESSING -> COMPLETED, then invoice every seller
    async fn fulfil(&self, id: &str) -> Result<Order> {
        let order = self
            .repo()
            .transition(id, OrderStatus::Processing, OrderStatus::Completed, None)
            .await?;
        self.after_completion(&order).await?;
        Ok(order)
    }

    async fn after_completion(&self, order: &Order) -> Result<()> {
        let items = self.repo().items(&order.id).await?;
        InvoiceService::new(self.state)
            .generate_for_order(order, &items)
            .await?;

        self.state.metrics.order_event("completed");
        info!(order_id = %order.id, "Order completed");
        Ok(())
    }

    #[instrument(skip(self), fields(buyer_id = %buyer.id))]
    pub async fn cancel_order(&self, buyer: &AuthUser, id: &str) -> Result<Order> {
        let order = self.owned(buyer, id).await?;
        let status = order.status()?;
        if status != OrderStatus::Pending {
            return Err(Error::InvalidState(format!(
                "Only pending orders can be cancelled; order is {}",
                status
            )));
        }

        let order = self
            .repo()
            .transition(id, OrderStatus::Pending, OrderStatus::Cancelled, None)
            .await?;
        self.state.metrics.order_event("cancelled");
        info!(order_id = %id, "Order cancelled by buyer");
        Ok(order)
    }

    /// Admin transition along the order lifecycle with its side effects
    #[instrument(skip(self))]
    pub async fn update_status(&self, id: &str, next: OrderStatus) -> Result<Order> {
        let order = self.require(id).await?;
        let current = order.status()?;
        if let Err(e) = current.ensure_transition(next) {
            warn!(order_id = %id, from = %current, to = %next, "Order transition refused");
            return Err(e);
        }

        let order = self.repo().transition(id, current, next, None).await?;
        match next {
            OrderStatus::Completed => self.after_completion(&order).await?,
            OrderStatus::Refunded => {
                InvoiceService::new(self.state).void_for_order(id).await?;
                self.state.metrics.order_event("refunded");
            }
            OrderStatus::Cancelled => self.state.metrics.order_event("cancelled"),
            _ => {}
        }

        info!(order_id = %id, from = %current, to = %next, "Order status changed");
        Ok(order)
    }

    pub async fn refund_order(&self, id: &str) -> Result<Order> {
        self.update_status(id, OrderStatus::Refunded).await
    }

    /// File locations of a completed order's products
    pub async fn downloads(&self, buyer: &AuthUser, id: &str) -> Result<Vec<Download>> {
        let (order, items) = self.get_for_buyer(buyer, id).await?;
        let status = order.status()?;
        if status != OrderStatus::Completed {
            return Err(Error::InvalidState(format!(
                "Downloads are available once the order is completed; order is {}",
                status
            )));
        }

        let ids: Vec<String> = items.iter().map(|i| i.product_id.clone()).collect();
        let products = ProductRepository::new(self.state.db.pool())
            .find_many(&ids)
            .await?;

        Ok(items
            .into_iter()
            .filter_map(|item| {
                products
                    .iter()
                    .find(|p| p.id == item.product_id)
                    .map(|p| Download {
                        product_id: item.product_id,
                        title: item.title,
                        file_url: p.file_url.clone(),
                    })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_fixtures::{seed_published, seed_user, test_state};
    use pm_core::Role;

    #[tokio::test]
    async fn test_create_order_splits_fees() {
        let state = test_state().await;
        let seller = seed_user(&state, "seller@example.com", Role::Seller).await;
        let buyer = seed_user(&state, "buyer@example.com", Role::Buyer).await;
        let p1 = seed_published(&state, &seller, "Desk", 1_995).await;
        let p2 = seed_published(&state, &seller, "Chair", 1_000).await;

        let (order, items) = OrderService::new(&state)
            .create_order(&buyer, &[p1.id.clone(), p2.id.clone()])
            .await
            .unwrap();

        assert_eq!(order.status, "PENDING");
        assert!(order.order_number.starts_with("ORD-"));
        assert_eq!(order.subtotal_cents, 2_995);
        assert_eq!(order.total_cents, 2_995);
        // 199.5 rounds half-up to 200
        assert_eq!(items[0].platform_fee_cents, 200);
        assert_eq!(items[0].seller_amount_cents, 1_795);
        assert_eq!(order.platform_fee_cents, 300);
        for item in &items {
            assert_eq!(item.platform_fee_cents + item.seller_amount_cents, item.price_cents);
        }
    }

    #[tokio::test]
    async fn test_create_order_refusals() {
        let state = test_state().await;
        let seller = seed_user(&state, "seller@example.com", Role::Seller).await;
        let buyer = seed_user(&state, "buyer@example.com", Role::Buyer).await;
        let product = seed_published(&state, &seller, "Desk", 1_000).await;
        let orders = OrderService::new(&state);

        assert!(matches!(
            orders.create_order(&buyer, &[]).await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            orders
                .create_order(&buyer, &[product.id.clone(), product.id.clone()])
                .await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            orders.create_order(&buyer, &["missing".to_string()]).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            orders.create_order(&seller, &[product.id.clone()]).await,
            Err(Error::Validation(_))
        ));

        let (order, _) = orders.create_order(&buyer, &[product.id.clone()]).await.unwrap();
        orders.confirm_payment(&buyer, &order.id, "pay_1").await.unwrap();
        assert!(matches!(
            orders.create_order(&buyer, &[product.id.clone()]).await,
            Err(Error::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_confirm_payment_completes_and_unlocks_downloads() {
        let state = test_state().await;
        let seller = seed_user(&state, "seller@example.com", Role::Seller).await;
        let buyer = seed_user(&state, "buyer@example.com", Role::Buyer).await;
        let product = seed_published(&state, &seller, "Wardrobe", 4_200).await;
        let orders = OrderService::new(&state);

        let (order, _) = orders.create_order(&buyer, &[product.id.clone()]).await.unwrap();
        assert!(matches!(
            orders.downloads(&buyer, &order.id).await,
            Err(Error::InvalidState(_))
        ));

        let completed = orders.confirm_payment(&buyer, &order.id, "pay_9").await.unwrap();
        assert_eq!(completed.status, "COMPLETED");
        assert_eq!(completed.payment_reference.as_deref(), Some("pay_9"));
        assert!(completed.paid_at.is_some());
        assert!(completed.completed_at.is_some());

        let downloads = orders.downloads(&buyer, &order.id).await.unwrap();
        assert_eq!(downloads.len(), 1);
        assert_eq!(downloads[0].file_url, product.file_url);

        // Paying twice is refused
        assert!(matches!(
            orders.confirm_payment(&buyer, &order.id, "pay_9").await,
            Err(Error::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_blank_payment_reference_is_refused() {
        let state = test_state().await;
        let seller = seed_user(&state, "seller@example.com", Role::Seller).await;
        let buyer = seed_user(&state, "buyer@example.com", Role::Buyer).await;
        let product = seed_published(&state, &seller, "Bookshelf", 2_000).await;
        let orders = OrderService::new(&state);

        let (order, _) = orders.create_order(&buyer, &[product.id]).await.unwrap();
        for reference in ["   ", "\t\n"] {
            assert!(matches!(
                orders.confirm_payment(&buyer, &order.id, reference).await,
                Err(Error::Validation(_))
            ));
        }

        let (unchanged, _) = orders.get_for_buyer(&buyer, &order.id).await.unwrap();
        assert_eq!(unchanged.status, "PENDING");
        assert!(unchanged.payment_reference.is_none());

        let completed = orders.confirm_payment(&buyer, &order.id, "  pay_7 ").await.unwrap();
        assert_eq!(completed.payment_reference.as_deref(), Some("pay_7"));
    }

    #[tokio::test]
    async fn test_other_buyers_cannot_see_order() {
        let state = test_state().await;
        let seller = seed_user(&state, "seller@example.com", Role::Seller).await;
        let buyer = seed_user(&state, "buyer@example.com", Role::Buyer).await;
        let other = seed_user(&state, "other@example.com", Role::Buyer).await;
        let product = seed_published(&state, &seller, "Crib", 3_000).await;
        let orders = OrderService::new(&state);

        let (order, _) = orders.create_order(&buyer, &[product.id]).await.unwrap();
        assert!(matches!(
            orders.get_for_buyer(&other, &order.id).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            orders.cancel_order(&other, &order.id).await,
            Err(Error::NotFound(_))
        ));

        let cancelled = orders.cancel_order(&buyer, &order.id).await.unwrap();
        assert_eq!(cancelled.status, "CANCELLED");
        assert!(matches!(
            orders.cancel_order(&buyer, &order.id).await,
            Err(Error::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_admin_transitions_and_refund_voids_invoices() {
        let state = test_state().await;
        let seller = seed_user(&state, "seller@example.com", Role::Seller).await;
        let buyer = seed_user(&state, "buyer@example.com", Role::Buyer).await;
        let product = seed_published(&state, &seller, "Shelf", 2_000).await;
        let orders = OrderService::new(&state);

        let (order, _) = orders.create_order(&buyer, &[product.id]).await.unwrap();

        // PENDING cannot jump to COMPLETED
        assert!(matches!(
            orders.update_status(&order.id, OrderStatus::Completed).await,
            Err(Error::InvalidState(_))
        ));

        orders
            .update_status(&order.id, OrderStatus::Processing)
            .await
            .unwrap();
        orders
            .update_status(&order.id, OrderStatus::Completed)
            .await
            .unwrap();

        let invoices = pm_db::InvoiceRepository::new(state.db.pool())
            .list_for_order(&order.id)
            .await
            .unwrap();
        assert_eq!(invoices.len(), 1);
        assert_eq!(invoices[0].status, "ISSUED");

        let refunded = orders.refund_order(&order.id).await.unwrap();
        assert_eq!(refunded.status, "REFUNDED");

        let invoices = pm_db::InvoiceRepository::new(state.db.pool())
            .list_for_order(&order.id)
            .await
            .unwrap();
        assert_eq!(invoices[0].status, "VOID");
        assert!(invoices[0].voided_at.is_some());

        assert!(matches!(
            orders.refund_order(&order.id).await,
            Err(Error::InvalidState(_))
        ));
    }
}
