//! ABOUTME: End-to-end smoke test for the planmarket backend
//! ABOUTME: Boots API and observability apps from one Config and shared metrics

use actix_web::{http::header, test};
use pm_config::Config;
use pm_core::Role;
use pm_db::{CreateUserRequest, Db, UserRepository};
use pm_obs::{Metrics, ObsState};
use pm_web::{auth::PasswordAuth, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;

/// Config the way `serve` would see it, pointed at a throwaway database
fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.environment = "test".to_string();
    config.database.path = dir
        .path()
        .join(format!("e2e_{}.db", test_support::unique_suffix()))
        .to_string_lossy()
        .to_string();
    config.security.jwt_secret = test_support::test_jwt_secret();
    config.marketplace.payout_hold_days = 0;
    config
}

/// Mirrors `planmarket create-admin` without the terminal prompt
async fn bootstrap_admin(db: &Db, email: &str, password: &str) {
    UserRepository::new(db.pool())
        .create(CreateUserRequest {
            username: "admin".to_string(),
            email: email.to_string(),
            password_hash: PasswordAuth::hash_password(password).unwrap(),
            role: Role::Admin.to_string(),
        })
        .await
        .unwrap();
}

#[actix_web::test]
async fn test_full_stack_smoke() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(&temp_dir);
    let db = Db::connect(&config.database.path, config.database.pool_size)
        .await
        .unwrap();
    db.health_check().await.unwrap();
    bootstrap_admin(&db, "admin@test.com", "testpass123").await;

    let metrics = Arc::new(Metrics::new());
    let processor = pm_pay::create_processor((&config.payments).into());
    assert_eq!(processor.name(), "stub");

    let obs_state = ObsState::with_metrics(metrics.clone());
    obs_state.readiness.set_ready(true);
    let web_state = AppState::new(db.clone(), &config, processor, metrics);

    let web = test::init_service(pm_web::create_app(web_state)).await;
    let obs = test::init_service(pm_obs::create_service(obs_state)).await;

    // Admin logs in with the bootstrapped credentials
    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .set_json(json!({"email": "admin@test.com", "password": "testpass123"}))
        .to_request();
    let resp = test::call_service(&web, req).await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["user"]["role"], "admin");
    let token = body["access_token"].as_str().unwrap().to_string();

    // A seller registers and lists a plan
    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(json!({
            "email": "seller@test.com",
            "username": "seller",
            "password": "sellerpass123",
            "role": "seller"
        }))
        .to_request();
    let resp = test::call_service(&web, req).await;
    assert_eq!(resp.status(), 201);
    let body: Value = test::read_body_json(resp).await;
    let seller_token = body["access_token"].as_str().unwrap().to_string();

    let req = test::TestRequest::post()
        .uri("/products")
        .insert_header((header::AUTHORIZATION, format!("Bearer {}", seller_token)))
        .set_json(json!({
            "title": "Cabin Plan",
            "description": "Two bedroom cabin",
            "price_cents": 2500,
            "file_url": "https://files.example.com/cabin.pdf"
        }))
        .to_request();
    let resp = test::call_service(&web, req).await;
    assert_eq!(resp.status(), 201);

    // Admin sees it in the moderation queue
    let req = test::TestRequest::get()
        .uri("/admin/products")
        .insert_header((header::AUTHORIZATION, format!("Bearer {}", token)))
        .to_request();
    let resp = test::call_service(&web, req).await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
    assert_eq!(body["items"][0]["status"], "PENDING_REVIEW");

    let req = test::TestRequest::get()
        .uri("/admin/orders")
        .insert_header((header::AUTHORIZATION, format!("Bearer {}", token)))
        .to_request();
    let resp = test::call_service(&web, req).await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["total"], 0);

    // Mirrors `planmarket deactivate-user`: the seller can no longer log in
    // and the token issued before deactivation stops working
    let users = UserRepository::new(db.pool());
    let seller = users.find_by_email("seller@test.com").await.unwrap().unwrap();
    users.deactivate(&seller.id).await.unwrap();

    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .set_json(json!({"email": "seller@test.com", "password": "sellerpass123"}))
        .to_request();
    let resp = test::call_service(&web, req).await;
    assert_eq!(resp.status(), 401);

    let req = test::TestRequest::get()
        .uri("/api/auth/me")
        .insert_header((header::AUTHORIZATION, format!("Bearer {}", seller_token)))
        .to_request();
    let resp = test::call_service(&web, req).await;
    assert_eq!(resp.status(), 401);

    let req = test::TestRequest::post()
        .uri("/products")
        .insert_header((header::AUTHORIZATION, format!("Bearer {}", seller_token)))
        .set_json(json!({
            "title": "Shed Plan",
            "price_cents": 1500,
            "file_url": "https://files.example.com/shed.pdf"
        }))
        .to_request();
    let resp = test::call_service(&web, req).await;
    assert_eq!(resp.status(), 401);

    let req = test::TestRequest::get()
        .uri("/api/payouts/balance")
        .insert_header((header::AUTHORIZATION, format!("Bearer {}", seller_token)))
        .to_request();
    let resp = test::call_service(&web, req).await;
    assert_eq!(resp.status(), 401);

    // Observability endpoints see the shared registry
    let req = test::TestRequest::get().uri("/healthz").to_request();
    let resp = test::call_service(&obs, req).await;
    assert!(resp.status().is_success());

    let req = test::TestRequest::get().uri("/readyz").to_request();
    let resp = test::call_service(&obs, req).await;
    assert!(resp.status().is_success());

    let req = test::TestRequest::get().uri("/metrics").to_request();
    let resp = test::call_service(&obs, req).await;
    assert!(resp.status().is_success());
    let body = test::read_body(resp).await;
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("planmarket_http_requests_total"));
    assert!(text.contains("status=\"201\""));
}
