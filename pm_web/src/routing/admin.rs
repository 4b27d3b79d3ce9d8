//! ABOUTME: Admin route configuration for order oversight and moderation
//! ABOUTME: Auth and role middleware are applied at the parent scope

use crate::routes::admin;
use actix_web::web;

/// Register admin handlers; the caller wraps the scope in `RequireRole::admin()`
pub fn configure_admin_routes(cfg: &mut web::ServiceConfig) {
    cfg
        // Orders
        .service(admin::list_orders)
        .service(admin::get_order)
        .service(admin::update_order_status)
        .service(admin::refund_order)
        // Product moderation
        .service(admin::list_products)
        .service(admin::approve_product)
        .service(admin::reject_product)
        // Review moderation
        .service(admin::list_reviews)
        .service(admin::approve_review)
        .service(admin::reject_review);
}
