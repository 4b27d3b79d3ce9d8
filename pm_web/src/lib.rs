//! ABOUTME: Web API layer with authentication, routing and business services
//! ABOUTME: Provides the marketplace REST endpoints and OpenAPI documentation

use actix_web::HttpServer;
use pm_config::{Config, MarketplaceConfig, SecurityConfig};
use pm_core::Result;
use pm_db::Db;
use pm_obs::Metrics;
use pm_pay::PaymentProcessor;
use std::{fmt, sync::Arc};

pub mod auth;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod routing;
pub mod services;

pub use routing::{create_app, ApiDoc};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub security_config: SecurityConfig,
    pub marketplace: MarketplaceConfig,
    pub json_limit: usize,
    pub processor: Arc<dyn PaymentProcessor>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(
        db: Db,
        config: &Config,
        processor: Arc<dyn PaymentProcessor>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            db,
            security_config: config.security.clone(),
            marketplace: config.marketplace.clone(),
            json_limit: config.server.json_limit,
            processor,
            metrics,
        }
    }
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("db", &self.db)
            .field("security_config", &self.security_config)
            .field("marketplace", &self.marketplace)
            .field("json_limit", &self.json_limit)
            .field("processor", &self.processor.name())
            .finish()
    }
}

/// Start the web server
pub async fn start_server(bind_addr: &str, state: AppState) -> Result<()> {
    tracing::info!("Starting web server on {}", bind_addr);

    HttpServer::new(move || create_app(state.clone()))
        .bind(bind_addr)
        .map_err(|e| pm_core::Error::Config(format!("Failed to bind web server: {}", e)))?
        .run()
        .await
        .map_err(|e| pm_core::Error::Config(format!("Web server error: {}", e)))?;

    Ok(())
}
