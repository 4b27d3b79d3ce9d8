//! ABOUTME: Buyer order endpoints: checkout, payment confirmation and downloads
//! ABOUTME: Mounted behind the buyer role check

use crate::{
    error::{validate, ApiResult},
    middleware::auth::AuthUser,
    models::{
        ConfirmPaymentRequest, CreateOrderRequest, DownloadLink, OrderView, PageQuery,
    },
    services::OrderService,
    AppState,
};
use actix_web::{get, post, web, HttpResponse};

#[utoipa::path(
    post,
    path = "/orders",
    tag = "orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order placed", body = OrderView),
        (status = 400, description = "Invalid order"),
        (status = 404, description = "Unknown or unpublished product"),
        (status = 409, description = "Product already owned"),
    )
)]
#[post("")]
pub async fn create_order(
    state: web::Data<AppState>,
    user: AuthUser,
    payload: web::Json<CreateOrderRequest>,
) -> ApiResult<HttpResponse> {
    validate(&payload.0)?;

    let (order, items) = OrderService::new(&state)
        .create_order(&user, &payload.product_ids)
        .await?;

    Ok(HttpResponse::Created().json(OrderView::with_items(order, items)))
}

#[utoipa::path(
    get,
    path = "/orders",
    tag = "orders",
    params(PageQuery),
    responses((status = 200, description = "The caller's orders", body = [OrderView]))
)]
#[get("")]
pub async fn list_orders(
    state: web::Data<AppState>,
    user: AuthUser,
    query: web::Query<PageQuery>,
) -> ApiResult<HttpResponse> {
    validate(&query.0)?;

    let orders = OrderService::new(&state)
        .list_for_buyer(&user, query.request())
        .await?;

    let views: Vec<OrderView> = orders.into_iter().map(OrderView::summary).collect();
    Ok(HttpResponse::Ok().json(views))
}

#[utoipa::path(
    get,
    path = "/orders/{id}",
    tag = "orders",
    params(("id" = String, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order with items", body = OrderView),
        (status = 404, description = "Not one of the caller's orders"),
    )
)]
#[get("/{id}")]
pub async fn get_order(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let (order, items) = OrderService::new(&state).get_for_buyer(&user, &path).await?;
    Ok(HttpResponse::Ok().json(OrderView::with_items(order, items)))
}

#[utoipa::path(
    post,
    path = "/orders/{id}/confirm-payment",
    tag = "orders",
    params(("id" = String, Path, description = "Order id")),
    request_body = ConfirmPaymentRequest,
    responses(
        (status = 200, description = "Order paid and completed", body = OrderView),
        (status = 400, description = "Order is not pending"),
        (status = 404, description = "Not one of the caller's orders"),
        (status = 409, description = "Order changed concurrently"),
    )
)]
#[post("/{id}/confirm-payment")]
pub async fn confirm_payment(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<String>,
    payload: web::Json<ConfirmPaymentRequest>,
) -> ApiResult<HttpResponse> {
    validate(&payload.0)?;

    let service = OrderService::new(&state);
    let order = service
        .confirm_payment(&user, &path, &payload.payment_reference)
        .await?;
    let (order, items) = service.get_for_buyer(&user, &order.id).await?;

    Ok(HttpResponse::Ok().json(OrderView::with_items(order, items)))
}

#[utoipa::path(
    post,
    path = "/orders/{id}/cancel",
    tag = "orders",
    params(("id" = String, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order cancelled", body = OrderView),
        (status = 400, description = "Order is not pending"),
        (status = 404, description = "Not one of the caller's orders"),
    )
)]
#[post("/{id}/cancel")]
pub async fn cancel_order(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let order = OrderService::new(&state).cancel_order(&user, &path).await?;
    Ok(HttpResponse::Ok().json(OrderView::summary(order)))
}

#[utoipa::path(
    get,
    path = "/orders/{id}/downloads",
    tag = "orders",
    params(("id" = String, Path, description = "Order id")),
    responses(
        (status = 200, description = "Download links", body = [DownloadLink]),
        (status = 400, description = "Order not completed"),
        (status = 404, description = "Not one of the caller's orders"),
    )
)]
#[get("/{id}/downloads")]
pub async fn downloads(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let links: Vec<DownloadLink> = OrderService::new(&state)
        .downloads(&user, &path)
        .await?
        .into_iter()
        .map(DownloadLink::from)
        .collect();

    Ok(HttpResponse::Ok().json(links))
}
