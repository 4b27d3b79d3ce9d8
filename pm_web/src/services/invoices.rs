//! ABOUTME: Per-seller invoice generation, voiding and role-scoped access
//! ABOUTME: Buyers and sellers only ever see invoices they are party to

use crate::{middleware::auth::AuthUser, AppState};
use pm_core::{money::Totals, Error, Result, Role};
use pm_db::{Invoice, InvoiceRepository, NewInvoice, Order, OrderItem, PageRequest};
use std::collections::BTreeMap;
use tracing::{info, instrument};

pub struct InvoiceService<'a> {
    state: &'a AppState,
}

impl<'a> InvoiceService<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    fn repo(&self) -> InvoiceRepository<'a> {
        InvoiceRepository::new(self.state.db.pool())
    }

    /// Issue one invoice per seller of the order; sellers already invoiced are skipped
    #[instrument(skip(self, order, items), fields(order_id = %order.id))]
    pub async fn generate_for_order(&self, order: &Order, items: &[OrderItem]) -> Result<Vec<Invoice>> {
        let mut per_seller: BTreeMap<&str, Totals> = BTreeMap::new();
        for item in items {
            let totals = per_seller.entry(item.seller_id.as_str()).or_default();
            totals.subtotal_cents += item.price_cents;
            totals.platform_fee_cents += item.platform_fee_cents;
            totals.seller_amount_cents += item.seller_amount_cents;
        }

        let repo = self.repo();
        let mut invoices = Vec::with_capacity(per_seller.len());
        for (seller_id, totals) in per_seller {
            let (invoice, created) = repo
                .issue(&NewInvoice {
                    order_id: order.id.clone(),
                    seller_id: seller_id.to_string(),
                    buyer_id: order.buyer_id.clone(),
                    subtotal_cents: totals.subtotal_cents,
                    platform_fee_cents: totals.platform_fee_cents,
                    seller_amount_cents: totals.seller_amount_cents,
                    currency: order.currency.clone(),
                })
                .await?;

            if created {
                info!(invoice = %invoice.invoice_number, seller_id = %seller_id, "Invoice issued");
            }
            invoices.push(invoice);
        }

        Ok(invoices)
    }

    #[instrument(skip(self))]
    pub async fn void_for_order(&self, order_id: &str) -> Result<u64> {
        let voided = self.repo().void_for_order(order_id).await?;
        info!(order_id = %order_id, voided, "Invoices voided");
        Ok(voided)
    }

    fn is_visible(user: &AuthUser, invoice: &Invoice) -> bool {
        match user.role {
            Role::Admin => true,
            Role::Buyer => invoice.buyer_id == user.id,
            Role::Seller => invoice.seller_id == user.id,
        }
    }

    pub async fn list_for_user(&self, user: &AuthUser, page: PageRequest) -> Result<Vec<Invoice>> {
        let repo = self.repo();
        match user.role {
            Role::Admin => repo.list(None, None, page).await,
            Role::Buyer => repo.list(Some(&user.id), None, page).await,
            Role::Seller => repo.list(None, Some(&user.id), page).await,
        }
    }

    pub async fn get_for_user(&self, user: &AuthUser, id: &str) -> Result<Invoice> {
        self.repo()
            .find_by_id(id)
            .await?
            .filter(|invoice| Self::is_visible(user, invoice))
            .ok_or_else(|| Error::NotFound("Invoice not found".to_string()))
    }

    /// Invoices of one order the caller may see; none visible reads as missing
    pub async fn list_for_order(&self, user: &AuthUser, order_id: &str) -> Result<Vec<Invoice>> {
        let visible: Vec<Invoice> = self
            .repo()
            .list_for_order(order_id)
            .await?
            .into_iter()
            .filter(|invoice| Self::is_visible(user, invoice))
            .collect();

        if visible.is_empty() {
            return Err(Error::NotFound("No invoices for this order".to_string()));
        }
        Ok(visible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{
        test_fixtures::{seed_published, seed_user, test_state},
        OrderService,
    };

    #[tokio::test]
    async fn test_one_invoice_per_seller_and_idempotent() {
        let state = test_state().await;
        let alice = seed_user(&state, "alice@example.com", Role::Seller).await;
        let bob = seed_user(&state, "bob@example.com", Role::Seller).await;
        let buyer = seed_user(&state, "buyer@example.com", Role::Buyer).await;

        let a1 = seed_published(&state, &alice, "Chair", 1_000).await;
        let a2 = seed_published(&state, &alice, "Cabinet", 3_000).await;
        let b1 = seed_published(&state, &bob, "Bed", 5_000).await;

        let orders = OrderService::new(&state);
        let (order, _) = orders
            .create_order(&buyer, &[a1.id.clone(), a2.id.clone(), b1.id.clone()])
            .await
            .unwrap();
        let completed = orders.confirm_payment(&buyer, &order.id, "pay_1").await.unwrap();
        let items = pm_db::OrderRepository::new(state.db.pool())
            .items(&completed.id)
            .await
            .unwrap();

        let invoices = InvoiceService::new(&state);
        let issued = invoices.list_for_order(&buyer, &order.id).await.unwrap();
        assert_eq!(issued.len(), 2);

        let alice_invoice = issued.iter().find(|i| i.seller_id == alice.id).unwrap();
        assert_eq!(alice_invoice.subtotal_cents, 4_000);
        assert_eq!(alice_invoice.platform_fee_cents, 400);
        assert_eq!(alice_invoice.seller_amount_cents, 3_600);

        // Regenerating returns the same invoices
        let again = invoices.generate_for_order(&completed, &items).await.unwrap();
        assert_eq!(again.len(), 2);
        let mut numbers: Vec<_> = issued.iter().map(|i| i.invoice_number.clone()).collect();
        let mut again_numbers: Vec<_> = again.iter().map(|i| i.invoice_number.clone()).collect();
        numbers.sort();
        again_numbers.sort();
        assert_eq!(numbers, again_numbers);
    }

    #[tokio::test]
    async fn test_visibility_by_role() {
        let state = test_state().await;
        let seller = seed_user(&state, "seller@example.com", Role::Seller).await;
        let other_seller = seed_user(&state, "other@example.com", Role::Seller).await;
        let buyer = seed_user(&state, "buyer@example.com", Role::Buyer).await;
        let stranger = seed_user(&state, "stranger@example.com", Role::Buyer).await;
        let admin = seed_user(&state, "admin@example.com", Role::Admin).await;

        let product = seed_published(&state, &seller, "Lamp", 2_000).await;
        let orders = OrderService::new(&state);
        let (order, _) = orders.create_order(&buyer, &[product.id]).await.unwrap();
        orders.confirm_payment(&buyer, &order.id, "pay_2").await.unwrap();

        let invoices = InvoiceService::new(&state);
        let page = PageRequest::new(0, 20);
        let invoice = invoices.list_for_user(&buyer, page).await.unwrap().remove(0);

        assert_eq!(invoices.list_for_user(&seller, page).await.unwrap().len(), 1);
        assert_eq!(invoices.list_for_user(&admin, page).await.unwrap().len(), 1);
        assert!(invoices.list_for_user(&stranger, page).await.unwrap().is_empty());
        assert!(invoices.list_for_user(&other_seller, page).await.unwrap().is_empty());

        assert!(invoices.get_for_user(&seller, &invoice.id).await.is_ok());
        assert!(matches!(
            invoices.get_for_user(&stranger, &invoice.id).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            invoices.list_for_order(&stranger, &order.id).await,
            Err(Error::NotFound(_))
        ));
    }
}
