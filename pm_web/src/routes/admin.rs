//! ABOUTME: Admin endpoints for order oversight and catalog/review moderation
//! ABOUTME: Mounted behind the admin role check

use crate::{
    error::{validate, ApiResult},
    models::{
        OrderPage, OrderView, ProductPage, ProductView, RejectRequest, ReviewView, StatusQuery,
        UpdateOrderStatusRequest,
    },
    services::{CatalogService, OrderService},
    AppState,
};
use actix_web::{get, patch, post, web, HttpResponse};
use pm_core::{OrderStatus, ProductStatus, ReviewStatus};

#[utoipa::path(
    get,
    path = "/admin/orders",
    tag = "admin",
    params(StatusQuery),
    responses(
        (status = 200, description = "Orders", body = OrderPage),
        (status = 400, description = "Unknown status"),
    )
)]
#[get("/orders")]
pub async fn list_orders(
    state: web::Data<AppState>,
    query: web::Query<StatusQuery>,
) -> ApiResult<HttpResponse> {
    validate(&query.0)?;
    let status = query
        .status
        .as_deref()
        .map(str::parse::<OrderStatus>)
        .transpose()?;

    let (orders, total) = OrderService::new(&state)
        .list_all(status, query.request())
        .await?;

    let items = orders.into_iter().map(OrderView::summary).collect();
    Ok(HttpResponse::Ok().json(OrderPage::new(items, total, query.page, query.page_size)))
}

#[utoipa::path(
    get,
    path = "/admin/orders/{id}",
    tag = "admin",
    params(("id" = String, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order with items", body = OrderView),
        (status = 404, description = "Order not found"),
    )
)]
#[get("/orders/{id}")]
pub async fn get_order(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let (order, items) = OrderService::new(&state).get(&path).await?;
    Ok(HttpResponse::Ok().json(OrderView::with_items(order, items)))
}

#[utoipa::path(
    patch,
    path = "/admin/orders/{id}/status",
    tag = "admin",
    params(("id" = String, Path, description = "Order id")),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Order moved", body = OrderView),
        (status = 400, description = "Transition not allowed"),
        (status = 404, description = "Order not found"),
        (status = 409, description = "Order changed concurrently"),
    )
)]
#[patch("/orders/{id}/status")]
pub async fn update_order_status(
    state: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<UpdateOrderStatusRequest>,
) -> ApiResult<HttpResponse> {
    validate(&payload.0)?;
    let next: OrderStatus = payload.status.parse()?;

    let order = OrderService::new(&state).update_status(&path, next).await?;
    Ok(HttpResponse::Ok().json(OrderView::summary(order)))
}

#[utoipa::path(
    post,
    path = "/admin/orders/{id}/refund",
    tag = "admin",
    params(("id" = String, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order refunded", body = OrderView),
        (status = 400, description = "Order is not completed"),
        (status = 404, description = "Order not found"),
    )
)]
#[post("/orders/{id}/refund")]
pub async fn refund_order(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let order = OrderService::new(&state).refund_order(&path).await?;
    Ok(HttpResponse::Ok().json(OrderView::summary(order)))
}

/// Products by moderation status (default: awaiting review)
#[utoipa::path(
    get,
    path = "/admin/products",
    tag = "admin",
    params(StatusQuery),
    responses((status = 200, description = "Products", body = ProductPage))
)]
#[get("/products")]
pub async fn list_products(
    state: web::Data<AppState>,
    query: web::Query<StatusQuery>,
) -> ApiResult<HttpResponse> {
    validate(&query.0)?;
    let status = match query.status.as_deref() {
        Some(raw) => raw.parse::<ProductStatus>()?,
        None => ProductStatus::PendingReview,
    };

    let (products, total) = CatalogService::new(&state)
        .admin_list(status, query.request())
        .await?;

    let items = products.into_iter().map(ProductView::full).collect();
    Ok(HttpResponse::Ok().json(ProductPage::new(items, total, query.page, query.page_size)))
}

#[utoipa::path(
    post,
    path = "/admin/products/{id}/approve",
    tag = "admin",
    params(("id" = String, Path, description = "Product id")),
    responses(
        (status = 200, description = "Product published", body = ProductView),
        (status = 400, description = "Product not awaiting review"),
        (status = 404, description = "Product not found"),
    )
)]
#[post("/products/{id}/approve")]
pub async fn approve_product(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let product = CatalogService::new(&state).approve_product(&path).await?;
    Ok(HttpResponse::Ok().json(ProductView::full(product)))
}

#[utoipa::path(
    post,
    path = "/admin/products/{id}/reject",
    tag = "admin",
    params(("id" = String, Path, description = "Product id")),
    request_body = RejectRequest,
    responses(
        (status = 200, description = "Product rejected", body = ProductView),
        (status = 400, description = "Missing reason or product not awaiting review"),
        (status = 404, description = "Product not found"),
    )
)]
#[post("/products/{id}/reject")]
pub async fn reject_product(
    state: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<RejectRequest>,
) -> ApiResult<HttpResponse> {
    validate(&payload.0)?;
    let product = CatalogService::new(&state)
        .reject_product(&path, &payload.reason)
        .await?;
    Ok(HttpResponse::Ok().json(ProductView::full(product)))
}

/// Reviews by moderation status (default: pending)
#[utoipa::path(
    get,
    path = "/admin/reviews",
    tag = "admin",
    params(StatusQuery),
    responses((status = 200, description = "Reviews", body = [ReviewView]))
)]
#[get("/reviews")]
pub async fn list_reviews(
    state: web::Data<AppState>,
    query: web::Query<StatusQuery>,
) -> ApiResult<HttpResponse> {
    validate(&query.0)?;
    let status = match query.status.as_deref() {
        Some(raw) => raw.parse::<ReviewStatus>()?,
        None => ReviewStatus::Pending,
    };

    let reviews = CatalogService::new(&state)
        .review_queue(status, query.request())
        .await?;

    let views: Vec<ReviewView> = reviews.into_iter().map(ReviewView::from).collect();
    Ok(HttpResponse::Ok().json(views))
}

#[utoipa::path(
    post,
    path = "/admin/reviews/{id}/approve",
    tag = "admin",
    params(("id" = String, Path, description = "Review id")),
    responses(
        (status = 200, description = "Review approved", body = ReviewView),
        (status = 400, description = "Review already moderated"),
        (status = 404, description = "Review not found"),
    )
)]
#[post("/reviews/{id}/approve")]
pub async fn approve_review(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let review = CatalogService::new(&state)
        .moderate_review(&path, ReviewStatus::Approved)
        .await?;
    Ok(HttpResponse::Ok().json(ReviewView::from(review)))
}

#[utoipa::path(
    post,
    path = "/admin/reviews/{id}/reject",
    tag = "admin",
    params(("id" = String, Path, description = "Review id")),
    responses(
        (status = 200, description = "Review rejected", body = ReviewView),
        (status = 400, description = "Review already moderated"),
        (status = 404, description = "Review not found"),
    )
)]
#[post("/reviews/{id}/reject")]
pub async fn reject_review(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let review = CatalogService::new(&state)
        .moderate_review(&path, ReviewStatus::Rejected)
        .await?;
    Ok(HttpResponse::Ok().json(ReviewView::from(review)))
}
