//! ABOUTME: Seller balances, payout requests and connected payout accounts
//! ABOUTME: Transfers go through the configured payment processor

use crate::{middleware::auth::AuthUser, AppState};
use pm_core::{
    money::format_cents, time::stamp_days_ago, Error, PayoutStatus, Result, Role,
};
use pm_db::{NewPayout, OrderRepository, PageRequest, Payout, PayoutRepository, UserRepository};
use pm_pay::{is_valid_account_id, TransferRequest, ACCOUNT_PREFIX};
use std::collections::HashMap;
use tracing::{info, instrument, warn};

/// Seller balance in cents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Balance {
    /// Seller share of every completed order
    pub earned_cents: i64,
    /// Part of `earned` past the hold period
    pub available_cents: i64,
    /// Part of `earned` still on hold
    pub pending_cents: i64,
    /// Payouts that are not failed
    pub paid_out_cents: i64,
    pub withdrawable_cents: i64,
}

pub struct PayoutService<'a> {
    state: &'a AppState,
}

impl<'a> PayoutService<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    fn repo(&self) -> PayoutRepository<'a> {
        PayoutRepository::new(self.state.db.pool())
    }

    /// Newest completion stamp whose sales are past the hold period
    fn earnings_cutoff(&self) -> String {
        stamp_days_ago(self.state.marketplace.payout_hold_days)
    }

    #[instrument(skip(self))]
    pub async fn balance(&self, seller_id: &str) -> Result<Balance> {
        self.balance_at(seller_id, &self.earnings_cutoff()).await
    }

    async fn balance_at(&self, seller_id: &str, cutoff: &str) -> Result<Balance> {
        let earnings = OrderRepository::new(self.state.db.pool())
            .seller_earnings(seller_id, cutoff)
            .await?;
        let paid_out = self.repo().reserved_total(seller_id).await?;

        Ok(Balance {
            earned_cents: earnings.earned_cents,
            available_cents: earnings.available_cents,
            pending_cents: earnings.earned_cents - earnings.available_cents,
            paid_out_cents: paid_out,
            withdrawable_cents: (earnings.available_cents - paid_out).max(0),
        })
    }

    /// Request a transfer of `amount_cents` (default: everything withdrawable)
    ///
    /// A declined transfer still returns the payout, in FAILED state.
    #[instrument(skip(self), fields(seller_id = %seller.id))]
    pub async fn request_payout(&self, seller: &AuthUser, amount_cents: Option<i64>) -> Result<Payout> {
        let user = UserRepository::new(self.state.db.pool())
            .find_by_id(&seller.id)
            .await?
            .ok_or_else(|| Error::NotFound("User not found".to_string()))?;

        let destination = user.payout_account_id.ok_or_else(|| {
            Error::Validation("Connect a payout account before requesting a payout".to_string())
        })?;

        let repo = self.repo();
        if let Some(in_flight) = repo.find_in_flight(&seller.id).await? {
            warn!(payout_id = %in_flight.id, "Payout already in flight");
            return Err(Error::Conflict(format!(
                "Payout {} is still {}",
                in_flight.id, in_flight.status
            )));
        }

        let cutoff = self.earnings_cutoff();
        let balance = self.balance_at(&seller.id, &cutoff).await?;
        let amount = amount_cents.unwrap_or(balance.withdrawable_cents);
        let currency = self.state.marketplace.default_currency.clone();
        let minimum = self.state.marketplace.min_payout_cents;

        if amount < minimum {
            return Err(Error::Validation(format!(
                "Minimum payout is {}",
                format_cents(minimum, &currency)
            )));
        }
        if amount > balance.withdrawable_cents {
            return Err(Error::Validation(format!(
                "Requested {} but only {} is withdrawable",
                format_cents(amount, &currency),
                format_cents(balance.withdrawable_cents, &currency)
            )));
        }

        // Re-checked atomically: a concurrent request may have claimed the funds
        let payout = repo
            .create(
                &NewPayout {
                    seller_id: seller.id.clone(),
                    amount_cents: amount,
                    currency: currency.clone(),
                    destination_account: destination.clone(),
                },
                &cutoff,
            )
            .await?;
        repo.transition(
            &payout.id,
            PayoutStatus::Pending,
            PayoutStatus::Processing,
            None,
            None,
        )
        .await?;

        let mut metadata = HashMap::new();
        metadata.insert("payout_id".to_string(), payout.id.clone());
        metadata.insert("seller_id".to_string(), seller.id.clone());

        let outcome = self
            .state
            .processor
            .create_transfer(TransferRequest {
                idempotency_key: payout.id.clone(),
                amount_cents: amount,
                currency: currency.clone(),
                destination,
                metadata,
            })
            .await;

        match outcome {
            Ok(receipt) => {
                let paid = repo
                    .transition(
                        &payout.id,
                        PayoutStatus::Processing,
                        PayoutStatus::Paid,
                        Some(&receipt.reference),
                        None,
                    )
                    .await?;
                self.state.metrics.payout_paid(amount);
                info!(
                    payout_id = %paid.id,
                    transfer = %receipt.reference,
                    amount = %format_cents(amount, &currency),
                    "Payout paid"
                );
                Ok(paid)
            }
            Err(e) => {
                let reason = e.to_string();
                let failed = repo
                    .transition(
                        &payout.id,
                        PayoutStatus::Processing,
                        PayoutStatus::Failed,
                        None,
                        Some(&reason),
                    )
                    .await?;
                self.state.metrics.payout_failed();
                warn!(payout_id = %failed.id, error = %reason, "Payout failed");
                Ok(failed)
            }
        }
    }

    #[instrument(skip(self, account_id), fields(seller_id = %seller.id))]
    pub async fn set_payout_account(&self, seller: &AuthUser, account_id: &str) -> Result<pm_db::User> {
        let account_id = account_id.trim();
        if !is_valid_account_id(account_id) {
            return Err(Error::Validation(format!(
                "Payout account must look like {}...",
                ACCOUNT_PREFIX
            )));
        }

        let user = UserRepository::new(self.state.db.pool())
            .set_payout_account(&seller.id, account_id)
            .await?;
        info!("Payout account connected");
        Ok(user)
    }

    /// Sellers see their own payouts, admins everything
    pub async fn list(&self, user: &AuthUser, page: PageRequest) -> Result<Vec<Payout>> {
        match user.role {
            Role::Admin => self.repo().list(None, page).await,
            _ => self.repo().list(Some(&user.id), page).await,
        }
    }

    pub async fn get(&self, user: &AuthUser, id: &str) -> Result<Payout> {
        self.repo()
            .find_by_id(id)
            .await?
            .filter(|p| user.is_admin() || p.seller_id == user.id)
            .ok_or_else(|| Error::NotFound("Payout not found".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{
        test_fixtures::{seed_published, seed_user, test_state},
        OrderService,
    };

    /// Seller with one completed 100.00 EUR sale (90.00 after fees)
    async fn seller_with_sale(state: &AppState) -> AuthUser {
        let seller = seed_user(state, "seller@example.com", Role::Seller).await;
        let buyer = seed_user(state, "buyer@example.com", Role::Buyer).await;
        let product = seed_published(state, &seller, "Kitchen", 10_000).await;

        let orders = OrderService::new(state);
        let (order, _) = orders.create_order(&buyer, &[product.id]).await.unwrap();
        orders.confirm_payment(&buyer, &order.id, "pay_1").await.unwrap();
        seller
    }

    #[tokio::test]
    async fn test_balance_after_sale() {
        let state = test_state().await;
        let seller = seller_with_sale(&state).await;

        let balance = PayoutService::new(&state).balance(&seller.id).await.unwrap();
        assert_eq!(balance.earned_cents, 9_000);
        assert_eq!(balance.available_cents, 9_000);
        assert_eq!(balance.pending_cents, 0);
        assert_eq!(balance.withdrawable_cents, 9_000);
    }

    #[tokio::test]
    async fn test_hold_period_keeps_funds_pending() {
        let mut state = test_state().await;
        state.marketplace.payout_hold_days = 7;
        let seller = seller_with_sale(&state).await;

        let balance = PayoutService::new(&state).balance(&seller.id).await.unwrap();
        assert_eq!(balance.earned_cents, 9_000);
        assert_eq!(balance.available_cents, 0);
        assert_eq!(balance.pending_cents, 9_000);
        assert_eq!(balance.withdrawable_cents, 0);
    }

    #[tokio::test]
    async fn test_payout_refusals_in_order() {
        let state = test_state().await;
        let seller = seller_with_sale(&state).await;
        let payouts = PayoutService::new(&state);

        // No account yet
        assert!(matches!(
            payouts.request_payout(&seller, None).await,
            Err(Error::Validation(_))
        ));

        assert!(matches!(
            payouts.set_payout_account(&seller, "bank-123").await,
            Err(Error::Validation(_))
        ));
        payouts.set_payout_account(&seller, "acct_seller").await.unwrap();

        // Below minimum
        assert!(matches!(
            payouts.request_payout(&seller, Some(500)).await,
            Err(Error::Validation(_))
        ));
        // Above balance
        assert!(matches!(
            payouts.request_payout(&seller, Some(9_001)).await,
            Err(Error::Validation(_))
        ));

        let paid = payouts.request_payout(&seller, Some(4_000)).await.unwrap();
        assert_eq!(paid.status, "PAID");
        assert!(paid.transfer_reference.unwrap().starts_with("tr_stub_"));

        let balance = payouts.balance(&seller.id).await.unwrap();
        assert_eq!(balance.paid_out_cents, 4_000);
        assert_eq!(balance.withdrawable_cents, 5_000);
    }

    #[tokio::test]
    async fn test_in_flight_payout_blocks_new_requests() {
        let state = test_state().await;
        let seller = seller_with_sale(&state).await;
        let payouts = PayoutService::new(&state);
        payouts.set_payout_account(&seller, "acct_seller").await.unwrap();

        payouts
            .repo()
            .create(
                &NewPayout {
                    seller_id: seller.id.clone(),
                    amount_cents: 1_000,
                    currency: "EUR".to_string(),
                    destination_account: "acct_seller".to_string(),
                },
                &payouts.earnings_cutoff(),
            )
            .await
            .unwrap();

        assert!(matches!(
            payouts.request_payout(&seller, Some(1_000)).await,
            Err(Error::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_declined_transfer_does_not_reduce_balance() {
        let state = test_state().await;
        let seller = seller_with_sale(&state).await;
        let payouts = PayoutService::new(&state);
        payouts.set_payout_account(&seller, "acct_fail_me").await.unwrap();

        let failed = payouts.request_payout(&seller, None).await.unwrap();
        assert_eq!(failed.status, "FAILED");
        assert_eq!(failed.amount_cents, 9_000);
        assert!(failed.failure_reason.is_some());

        let balance = payouts.balance(&seller.id).await.unwrap();
        assert_eq!(balance.paid_out_cents, 0);
        assert_eq!(balance.withdrawable_cents, 9_000);
    }

    #[tokio::test]
    async fn test_sellers_only_see_own_payouts() {
        let state = test_state().await;
        let seller = seller_with_sale(&state).await;
        let other = seed_user(&state, "other@example.com", Role::Seller).await;
        let admin = seed_user(&state, "admin@example.com", Role::Admin).await;
        let payouts = PayoutService::new(&state);
        payouts.set_payout_account(&seller, "acct_seller").await.unwrap();

        let paid = payouts.request_payout(&seller, None).await.unwrap();
        let page = PageRequest::new(0, 20);

        assert_eq!(payouts.list(&seller, page).await.unwrap().len(), 1);
        assert!(payouts.list(&other, page).await.unwrap().is_empty());
        assert_eq!(payouts.list(&admin, page).await.unwrap().len(), 1);
        assert!(payouts.get(&admin, &paid.id).await.is_ok());
        assert!(matches!(
            payouts.get(&other, &paid.id).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requests_cannot_overdraw() {
        let state = test_state().await;
        let seller = seller_with_sale(&state).await;
        PayoutService::new(&state)
            .set_payout_account(&seller, "acct_seller")
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let state = state.clone();
            let seller = seller.clone();
            handles.push(tokio::spawn(async move {
                PayoutService::new(&state)
                    .request_payout(&seller, Some(9_000))
                    .await
            }));
        }

        let mut paid = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(payout) => {
                    assert_eq!(payout.status, "PAID");
                    paid += 1;
                }
                Err(Error::Conflict(_)) | Err(Error::Validation(_)) => {}
                Err(other) => panic!("unexpected error: {}", other),
            }
        }
        assert_eq!(paid, 1);

        let balance = PayoutService::new(&state).balance(&seller.id).await.unwrap();
        assert_eq!(balance.paid_out_cents, 9_000);
        assert_eq!(balance.withdrawable_cents, 0);
        assert!(balance.paid_out_cents <= balance.earned_cents);
    }
}
