//! ABOUTME: Payment processor abstraction with stub and HTTP implementations
//! ABOUTME: Moves marketplace funds to sellers' connected accounts

use async_trait::async_trait;
use pm_core::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub mod stub;
#[cfg(feature = "payments_online")]
pub mod http;

pub use stub::StubProcessor;
#[cfg(feature = "payments_online")]
pub use http::HttpProcessor;

/// Prefix every connected account identifier carries
pub const ACCOUNT_PREFIX: &str = "acct_";

/// A transfer of funds to a connected account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    /// Caller-side identifier, sent as the idempotency key
    pub idempotency_key: String,
    pub amount_cents: i64,
    pub currency: String,
    /// Connected account receiving the funds
    pub destination: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Processor acknowledgement of a transfer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransferReceipt {
    pub reference: String,
    pub amount_cents: i64,
    pub currency: String,
    pub destination: String,
}

/// Configuration for processor clients
#[derive(Clone, Serialize, Deserialize)]
pub struct ProcessorConfig {
    pub use_online: bool,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_seconds: u64,
    pub max_retries: u32,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            use_online: false, // Default to stub for safety
            base_url: None,
            api_key: None,
            timeout_seconds: 30,
            max_retries: 3,
        }
    }
}

impl std::fmt::Debug for ProcessorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorConfig")
            .field("use_online", &self.use_online)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("timeout_seconds", &self.timeout_seconds)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

/// Trait for payment processor implementations
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Human-readable implementation name for logs
    fn name(&self) -> &'static str;

    /// Move funds to a connected account
    async fn create_transfer(&self, request: TransferRequest) -> Result<TransferReceipt>;

    /// Health check for the processor
    async fn health_check(&self) -> Result<()>;
}

/// Whether an account identifier has the connected-account shape
pub fn is_valid_account_id(account_id: &str) -> bool {
    account_id
        .strip_prefix(ACCOUNT_PREFIX)
        .map(|rest| {
            !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
        .unwrap_or(false)
}

/// Create a processor based on configuration
pub fn create_processor(config: ProcessorConfig) -> Arc<dyn PaymentProcessor> {
    if config.use_online {
        #[cfg(feature = "payments_online")]
        {
            info!("Creating HTTP payment processor");
            match HttpProcessor::new(config) {
                Ok(processor) => return Arc::new(processor),
                Err(e) => {
                    warn!("Failed to create HTTP payment processor, falling back to stub: {}", e);
                    return Arc::new(StubProcessor::new());
                }
            }
        }
        #[cfg(not(feature = "payments_online"))]
        {
            warn!("Online payments requested but payments_online feature not enabled, falling back to stub");
            Arc::new(StubProcessor::new())
        }
    } else {
        debug!("Creating stub payment processor");
        Arc::new(StubProcessor::new())
    }
}
