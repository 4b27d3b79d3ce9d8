//! ABOUTME: Stub payment processor with deterministic outcomes for testing
//! ABOUTME: No network calls; accounts containing "fail" are declined

use async_trait::async_trait;
use pm_core::{Error, Id, Result};
use tracing::debug;

use crate::{PaymentProcessor, TransferReceipt, TransferRequest};

/// Stub processor that settles transfers in-process
pub struct StubProcessor;

impl StubProcessor {
    pub fn new() -> Self {
        debug!("Creating stub payment processor");
        Self
    }
}

impl Default for StubProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentProcessor for StubProcessor {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn create_transfer(&self, request: TransferRequest) -> Result<TransferReceipt> {
        debug!(
            destination = %request.destination,
            amount_cents = request.amount_cents,
            "Stub transfer requested"
        );

        if request.amount_cents <= 0 {
            return Err(Error::Validation(
                "Transfer amount must be positive".to_string(),
            ));
        }

        if request.destination.contains("fail") {
            return Err(Error::External(format!(
                "Transfer to {} declined by processor",
                request.destination
            )));
        }

        Ok(TransferReceipt {
            reference: format!("tr_stub_{}", Id::new()),
            amount_cents: request.amount_cents,
            currency: request.currency,
            destination: request.destination,
        })
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn request(destination: &str, amount_cents: i64) -> TransferRequest {
        TransferRequest {
            idempotency_key: "payout_1".to_string(),
            amount_cents,
            currency: "EUR".to_string(),
            destination: destination.to_string(),
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_stub_transfer_succeeds() {
        let processor = StubProcessor::new();
        let receipt = processor
            .create_transfer(request("acct_seller", 2_500))
            .await
            .unwrap();
        assert!(receipt.reference.starts_with("tr_stub_"));
        assert_eq!(receipt.amount_cents, 2_500);
        assert_eq!(receipt.destination, "acct_seller");
    }

    #[tokio::test]
    async fn test_stub_transfer_declines_fail_accounts() {
        let processor = StubProcessor::new();
        let err = processor
            .create_transfer(request("acct_fail_me", 2_500))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::External(_)));
    }

    #[tokio::test]
    async fn test_stub_rejects_non_positive_amount() {
        let processor = StubProcessor::new();
        assert!(processor
            .create_transfer(request("acct_seller", 0))
            .await
            .is_err());
    }
}
