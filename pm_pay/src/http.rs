//! ABOUTME: HTTP payment processor client with authentication and retry logic
//! ABOUTME: Talks to a transfer API over JSON; 5xx and transport errors are retried

use async_trait::async_trait;
use pm_core::{Error, Result};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, warn};

use crate::{PaymentProcessor, ProcessorConfig, TransferReceipt, TransferRequest};

/// Transfer API client
pub struct HttpProcessor {
    client: Client,
    config: ProcessorConfig,
    base_url: String,
}

/// Wire format of a transfer request
#[derive(Debug, Serialize)]
struct TransferBody<'a> {
    amount: i64,
    currency: String,
    destination: &'a str,
    metadata: &'a HashMap<String, String>,
}

/// Wire format of a transfer response
#[derive(Debug, Deserialize)]
struct TransferResponse {
    id: String,
    amount: i64,
    currency: String,
    destination: String,
}

/// Outcome of one attempt: whether it is worth trying again
enum AttemptError {
    Retryable(Error),
    Final(Error),
}

impl HttpProcessor {
    pub fn new(config: ProcessorConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        let base_url = config
            .base_url
            .clone()
            .ok_or_else(|| Error::Config("payments.base_url is required".to_string()))?
            .trim_end_matches('/')
            .to_string();

        debug!("Created HTTP payment processor with base URL: {}", base_url);

        Ok(Self {
            client,
            config,
            base_url,
        })
    }

    /// Create authenticated request builder
    fn create_request(&self, endpoint: &str, idempotency_key: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'));
        let mut builder = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("Idempotency-Key", idempotency_key);

        if let Some(api_key) = &self.config.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", api_key));
        }

        builder
    }

    /// Execute a request with retry logic
    async fn execute_with_retry<T>(&self, request_builder: RequestBuilder) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = Duration::from_millis(100 * (1 << attempt.min(5)));
                debug!("Retrying transfer in {:?} (attempt {})", delay, attempt + 1);
                sleep(delay).await;
            }

            let request = match request_builder.try_clone() {
                Some(req) => req,
                None => {
                    error!("Failed to clone request for retry");
                    return Err(Error::Config(
                        "Unable to retry request - body not cloneable".to_string(),
                    ));
                }
            };

            match self.execute_request::<T>(request).await {
                Ok(response) => return Ok(response),
                Err(AttemptError::Final(e)) => return Err(e),
                Err(AttemptError::Retryable(e)) => {
                    warn!("Transfer attempt {} failed: {}", attempt + 1, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| Error::External("All transfer attempts failed".to_string())))
    }

    /// Execute a single HTTP request
    async fn execute_request<T>(&self, request: RequestBuilder) -> std::result::Result<T, AttemptError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let response = request.send().await.map_err(|e| {
            AttemptError::Retryable(Error::External(format!("HTTP request failed: {}", e)))
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let err = Error::External(format!(
                "Payment processor error ({}): {}",
                status, error_text
            ));
            return Err(if is_retryable(status) {
                AttemptError::Retryable(err)
            } else {
                AttemptError::Final(err)
            });
        }

        let response_text = response.text().await.map_err(|e| {
            AttemptError::Retryable(Error::External(format!("Failed to read response: {}", e)))
        })?;

        serde_json::from_str::<T>(&response_text).map_err(|e| {
            AttemptError::Final(Error::External(format!(
                "Failed to parse processor response: {}",
                e
            )))
        })
    }
}

/// Only 5xx responses are retried; every 4xx is final
fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error()
}

#[async_trait]
impl PaymentProcessor for HttpProcessor {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn create_transfer(&self, request: TransferRequest) -> Result<TransferReceipt> {
        if self.config.api_key.is_none() {
            return Err(Error::Config(
                "Payment processor API key not configured".to_string(),
            ));
        }

        let body = TransferBody {
            amount: request.amount_cents,
            currency: request.currency.to_lowercase(),
            destination: &request.destination,
            metadata: &request.metadata,
        };

        let builder = self
            .create_request("/v1/transfers", &request.idempotency_key)
            .json(&body);

        let response: TransferResponse = self.execute_with_retry(builder).await?;

        debug!(reference = %response.id, "Transfer accepted by processor");

        Ok(TransferReceipt {
            reference: response.id,
            amount_cents: response.amount,
            currency: response.currency.to_uppercase(),
            destination: response.destination,
        })
    }

    async fn health_check(&self) -> Result<()> {
        if self.config.api_key.is_none() {
            return Err(Error::Config(
                "Payment processor API key not configured".to_string(),
            ));
        }

        let url = format!("{}/v1/balance", self.base_url);
        let mut builder = self.client.get(&url);
        if let Some(api_key) = &self.config.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::External(format!("Processor health check failed: {}", e)))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Error::External(format!(
                "Processor health check returned {}",
                response.status()
            )))
        }
    }
}
