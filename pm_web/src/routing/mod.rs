//! ABOUTME: Actix-web route configuration and app factory creation
//! ABOUTME: Centralizes all route definitions and middleware setup

pub mod admin;

use crate::{
    error::ApiError,
    middleware::{auth::RequireAuth, rbac::RequireRole},
    models,
    routes::{admin as admin_routes, auth as auth_routes, invoices, orders, payouts, products},
    AppState,
};
use actix_web::{dev::Service, web, App, HttpRequest, ResponseError};
use pm_core::MonotonicTimer;
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        auth_routes::register,
        auth_routes::login,
        auth_routes::me,
        products::list_products,
        products::my_products,
        products::get_product,
        products::create_product,
        products::update_product,
        products::archive_product,
        products::product_reviews,
        products::create_review,
        orders::create_order,
        orders::list_orders,
        orders::get_order,
        orders::confirm_payment,
        orders::cancel_order,
        orders::downloads,
        admin_routes::list_orders,
        admin_routes::get_order,
        admin_routes::update_order_status,
        admin_routes::refund_order,
        admin_routes::list_products,
        admin_routes::approve_product,
        admin_routes::reject_product,
        admin_routes::list_reviews,
        admin_routes::approve_review,
        admin_routes::reject_review,
        invoices::list_invoices,
        invoices::order_invoices,
        invoices::get_invoice,
        payouts::list_payouts,
        payouts::balance,
        payouts::request_payout,
        payouts::set_account,
        payouts::get_payout,
    ),
    components(
        schemas(
            models::LoginRequest,
            models::RegisterRequest,
            models::LoginResponse,
            models::UserInfo,
            models::CreateProductRequest,
            models::UpdateProductRequest,
            models::RejectRequest,
            models::ProductView,
            models::ProductPage,
            models::CreateReviewRequest,
            models::ReviewView,
            models::ProductReviews,
            models::CreateOrderRequest,
            models::ConfirmPaymentRequest,
            models::UpdateOrderStatusRequest,
            models::OrderItemView,
            models::OrderView,
            models::OrderPage,
            models::DownloadLink,
            models::InvoiceView,
            models::RequestPayoutRequest,
            models::PayoutAccountRequest,
            models::PayoutView,
            models::BalanceResponse,
        ),
    ),
    tags(
        (name = "auth", description = "Authentication endpoints"),
        (name = "products", description = "Catalog and reviews"),
        (name = "orders", description = "Buyer orders"),
        (name = "admin", description = "Admin endpoints"),
        (name = "invoices", description = "Per-seller invoices"),
        (name = "payouts", description = "Seller balances and payouts"),
    )
)]
pub struct ApiDoc;

/// Create the main web application service factory
pub fn create_app(
    state: AppState,
) -> App<
    impl actix_web::dev::ServiceFactory<
        actix_web::dev::ServiceRequest,
        Config = (),
        Response = actix_web::dev::ServiceResponse<impl actix_web::body::MessageBody>,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    let metrics = state.metrics.clone();

    let json_config = web::JsonConfig::default()
        .limit(state.json_limit)
        .error_handler(|err, _req| ApiError::bad_request(err.to_string()).into());
    let query_config = web::QueryConfig::default()
        .error_handler(|err, _req| ApiError::bad_request(err.to_string()).into());

    App::new()
        .app_data(web::Data::new(state))
        .app_data(json_config)
        .app_data(query_config)
        .wrap(actix_web::middleware::Logger::default())
        // Normalize paths: prefer no trailing slash
        .wrap(actix_web::middleware::NormalizePath::new(
            actix_web::middleware::TrailingSlash::Trim,
        ))
        .wrap_fn(move |req, srv| {
            let metrics = metrics.clone();
            let method = req.method().to_string();
            let timer = MonotonicTimer::new();
            let fut = srv.call(req);

            async move {
                let res = fut.await;
                let status = match &res {
                    Ok(response) => response.status().as_u16(),
                    Err(e) => e.as_response_error().status_code().as_u16(),
                };
                metrics.observe_request(&method, status, timer.elapsed_secs());
                res
            }
        })
        .service(SwaggerUi::new("/docs/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .service(
            web::scope("/api")
                .service(
                    web::scope("/auth")
                        .service(auth_routes::register)
                        .service(auth_routes::login)
                        // The AuthUser extractor authenticates /me
                        .service(auth_routes::me),
                )
                .service(
                    web::scope("/invoices")
                        .wrap(RequireAuth::new())
                        .service(invoices::list_invoices)
                        .service(invoices::order_invoices)
                        .service(invoices::get_invoice),
                )
                .service(
                    web::scope("/payouts")
                        .wrap(RequireRole::seller_or_admin())
                        .wrap(RequireAuth::new())
                        .service(payouts::list_payouts)
                        .service(payouts::request_payout)
                        .service(payouts::balance)
                        .service(payouts::set_account)
                        .service(payouts::get_payout),
                ),
        )
        // Public reads; writes authenticate through the AuthUser extractor
        .service(
            web::scope("/products")
                .service(products::list_products)
                .service(products::create_product)
                .service(products::my_products)
                .service(products::get_product)
                .service(products::update_product)
                .service(products::archive_product)
                .service(products::product_reviews)
                .service(products::create_review),
        )
        .service(
            web::scope("/orders")
                .wrap(RequireRole::buyer())
                .wrap(RequireAuth::new())
                .service(orders::create_order)
                .service(orders::list_orders)
                .service(orders::get_order)
                .service(orders::confirm_payment)
                .service(orders::cancel_order)
                .service(orders::downloads),
        )
        .service(
            web::scope("/admin")
                .configure(admin::configure_admin_routes)
                .wrap(RequireRole::admin())
                .wrap(RequireAuth::new()),
        )
        // Helpful 404 for unmatched paths (MUST be last)
        .default_service(web::to(|req: HttpRequest| async move {
            let p = req.path().to_string();
            info!(path = %p, "Unmatched route");
            ApiError::not_found(format!("No route for {}", p)).error_response()
        }))
}
