//! ABOUTME: Observability services including health checks and metrics
//! ABOUTME: Exposes liveness, readiness and marketplace counters for scraping

use actix_web::{
    dev::{ServiceRequest, ServiceResponse},
    middleware::Logger,
    web, App, HttpResponse, HttpServer, Result as ActixResult,
};
use pm_core::{Error, Result};
use prometheus_client::{
    encoding::{text::encode, EncodeLabelSet},
    metrics::{counter::Counter, family::Family, histogram::Histogram},
    registry::Registry,
};
use serde_json::json;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

/// Readiness gate flipped once startup work (migrations, processor) is done
#[derive(Debug, Clone)]
pub struct ReadinessGate {
    ready: Arc<AtomicBool>,
}

impl ReadinessGate {
    /// A gate that starts closed
    pub fn new() -> Self {
        Self {
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Relaxed);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct RequestLabels {
    method: String,
    status: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct OrderLabels {
    event: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct PayoutLabels {
    outcome: String,
}

/// Metrics registry for Prometheus
#[derive(Debug)]
pub struct Metrics {
    registry: Arc<Mutex<Registry>>,
    http_requests_total: Family<RequestLabels, Counter>,
    http_request_duration_seconds: Histogram,
    orders_total: Family<OrderLabels, Counter>,
    payouts_total: Family<PayoutLabels, Counter>,
    payout_amount_cents_total: Counter,
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix("planmarket");

        let http_requests_total = Family::<RequestLabels, Counter>::default();
        registry.register(
            "http_requests",
            "HTTP requests by method and status",
            http_requests_total.clone(),
        );

        let http_request_duration_seconds =
            Histogram::new([0.005, 0.025, 0.1, 0.5, 1.0, 2.5].into_iter());
        registry.register(
            "http_request_duration_seconds",
            "HTTP request duration in seconds",
            http_request_duration_seconds.clone(),
        );

        let orders_total = Family::<OrderLabels, Counter>::default();
        registry.register(
            "orders",
            "Order lifecycle events",
            orders_total.clone(),
        );

        let payouts_total = Family::<PayoutLabels, Counter>::default();
        registry.register(
            "payouts",
            "Payout attempts by outcome",
            payouts_total.clone(),
        );

        let payout_amount_cents_total = Counter::default();
        registry.register(
            "payout_amount_cents",
            "Cents transferred to sellers",
            payout_amount_cents_total.clone(),
        );

        Self {
            registry: Arc::new(Mutex::new(registry)),
            http_requests_total,
            http_request_duration_seconds,
            orders_total,
            payouts_total,
            payout_amount_cents_total,
        }
    }

    /// Count one served request and its latency
    pub fn observe_request(&self, method: &str, status: u16, duration_secs: f64) {
        self.http_requests_total
            .get_or_create(&RequestLabels {
                method: method.to_string(),
                status: status.to_string(),
            })
            .inc();
        self.http_request_duration_seconds.observe(duration_secs);
    }

    /// Count an order event such as `created`, `completed` or `refunded`
    pub fn order_event(&self, event: &str) {
        self.orders_total
            .get_or_create(&OrderLabels {
                event: event.to_string(),
            })
            .inc();
    }

    pub fn payout_paid(&self, amount_cents: i64) {
        self.payouts_total
            .get_or_create(&PayoutLabels {
                outcome: "paid".to_string(),
            })
            .inc();
        self.payout_amount_cents_total
            .inc_by(u64::try_from(amount_cents).unwrap_or(0));
    }

    pub fn payout_failed(&self) {
        self.payouts_total
            .get_or_create(&PayoutLabels {
                outcome: "failed".to_string(),
            })
            .inc();
    }

    pub fn encode(&self) -> Result<String> {
        let registry = self
            .registry
            .lock()
            .map_err(|e| Error::Config(format!("Failed to lock metrics registry: {}", e)))?;

        let mut buffer = String::new();
        encode(&mut buffer, &registry)
            .map_err(|e| Error::Config(format!("Failed to encode metrics: {}", e)))?;

        Ok(buffer)
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Application state for observability endpoints
#[derive(Debug, Clone)]
pub struct ObsState {
    pub readiness: ReadinessGate,
    pub metrics: Arc<Metrics>,
}

impl ObsState {
    pub fn new() -> Self {
        Self::with_metrics(Arc::new(Metrics::new()))
    }

    /// Share a registry the API server also writes to
    pub fn with_metrics(metrics: Arc<Metrics>) -> Self {
        Self {
            readiness: ReadinessGate::new(),
            metrics,
        }
    }
}

impl Default for ObsState {
    fn default() -> Self {
        Self::new()
    }
}

async fn health() -> ActixResult<HttpResponse> {
    tracing::debug!("Health check requested");
    Ok(HttpResponse::Ok().json(json!({
        "status": "ok",
        "service": "planmarket"
    })))
}

async fn readiness(state: web::Data<ObsState>) -> ActixResult<HttpResponse> {
    let is_ready = state.readiness.is_ready();
    tracing::debug!("Readiness check requested, ready: {}", is_ready);

    if is_ready {
        Ok(HttpResponse::Ok().json(json!({
            "status": "ready"
        })))
    } else {
        Ok(HttpResponse::ServiceUnavailable().json(json!({
            "status": "not ready"
        })))
    }
}

async fn metrics(state: web::Data<ObsState>) -> ActixResult<HttpResponse> {
    match state.metrics.encode() {
        Ok(metrics_text) => Ok(HttpResponse::Ok()
            .content_type("application/openmetrics-text; version=1.0.0; charset=utf-8")
            .body(metrics_text)),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            Ok(HttpResponse::InternalServerError().json(json!({
                "error": "Failed to encode metrics"
            })))
        }
    }
}

/// Create observability service factory
pub fn create_service(
    state: ObsState,
) -> App<
    impl actix_web::dev::ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse<impl actix_web::body::MessageBody>,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    App::new()
        .app_data(web::Data::new(state))
        .wrap(Logger::default())
        .route("/healthz", web::get().to(health))
        .route("/readyz", web::get().to(readiness))
        .route("/metrics", web::get().to(metrics))
}

/// Start observability server
pub async fn start_server(bind_addr: &str, state: ObsState) -> Result<()> {
    tracing::info!("Starting observability server on {}", bind_addr);

    HttpServer::new(move || create_service(state.clone()))
        .bind(bind_addr)
        .map_err(|e| Error::Config(format!("Failed to bind observability server: {}", e)))?
        .run()
        .await
        .map_err(Error::Io)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test;

    #[actix_web::test]
    async fn test_health_endpoint() {
        let app = test::init_service(create_service(ObsState::new())).await;

        let req = test::TestRequest::get().uri("/healthz").to_request();
        let resp = test::call_service(&app, req).await;

        assert!(resp.status().is_success());
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "ok");
    }

    #[actix_web::test]
    async fn test_readiness_follows_gate() {
        let state = ObsState::new();
        let app = test::init_service(create_service(state.clone())).await;

        let req = test::TestRequest::get().uri("/readyz").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 503);

        state.readiness.set_ready(true);

        let req = test::TestRequest::get().uri("/readyz").to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "ready");
    }

    #[actix_web::test]
    async fn test_metrics_endpoint_exposes_marketplace_counters() {
        let state = ObsState::new();
        state.metrics.observe_request("GET", 200, 0.01);
        state.metrics.order_event("created");
        state.metrics.payout_paid(2_500);
        state.metrics.payout_failed();

        let app = test::init_service(create_service(state)).await;

        let req = test::TestRequest::get().uri("/metrics").to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());

        let body = test::read_body(resp).await;
        let body_str = std::str::from_utf8(&body).unwrap();

        assert!(body_str.contains("planmarket_http_requests_total{method=\"GET\",status=\"200\"} 1"));
        assert!(body_str.contains("planmarket_orders_total{event=\"created\"} 1"));
        assert!(body_str.contains("planmarket_payouts_total{outcome=\"paid\"} 1"));
        assert!(body_str.contains("planmarket_payouts_total{outcome=\"failed\"} 1"));
        assert!(body_str.contains("planmarket_payout_amount_cents_total 2500"));
    }

    #[::core::prelude::v1::test]
    fn test_readiness_gate_toggle() {
        let gate = ReadinessGate::new();
        assert!(!gate.is_ready());

        gate.set_ready(true);
        assert!(gate.is_ready());

        gate.set_ready(false);
        assert!(!gate.is_ready());
    }

    #[::core::prelude::v1::test]
    fn test_negative_payout_amount_does_not_panic() {
        let metrics = Metrics::new();
        metrics.payout_paid(-5);
        assert!(metrics.encode().unwrap().contains("planmarket_payout_amount_cents_total 0"));
    }
}
