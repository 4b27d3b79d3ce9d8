//! ABOUTME: Invoice endpoints scoped to the caller's role
//! ABOUTME: Buyers and sellers see their own invoices, admins see all

use crate::{
    error::{validate, ApiResult},
    middleware::auth::AuthUser,
    models::{InvoiceView, PageQuery},
    services::InvoiceService,
    AppState,
};
use actix_web::{get, web, HttpResponse};

#[utoipa::path(
    get,
    path = "/api/invoices",
    tag = "invoices",
    params(PageQuery),
    responses((status = 200, description = "Visible invoices", body = [InvoiceView]))
)]
#[get("")]
pub async fn list_invoices(
    state: web::Data<AppState>,
    user: AuthUser,
    query: web::Query<PageQuery>,
) -> ApiResult<HttpResponse> {
    validate(&query.0)?;

    let invoices: Vec<InvoiceView> = InvoiceService::new(&state)
        .list_for_user(&user, query.request())
        .await?
        .into_iter()
        .map(InvoiceView::from)
        .collect();

    Ok(HttpResponse::Ok().json(invoices))
}

#[utoipa::path(
    get,
    path = "/api/invoices/order/{order_id}",
    tag = "invoices",
    params(("order_id" = String, Path, description = "Order id")),
    responses(
        (status = 200, description = "Invoices of the order", body = [InvoiceView]),
        (status = 404, description = "No visible invoices"),
    )
)]
#[get("/order/{order_id}")]
pub async fn order_invoices(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let invoices: Vec<InvoiceView> = InvoiceService::new(&state)
        .list_for_order(&user, &path)
        .await?
        .into_iter()
        .map(InvoiceView::from)
        .collect();

    Ok(HttpResponse::Ok().json(invoices))
}

#[utoipa::path(
    get,
    path = "/api/invoices/{id}",
    tag = "invoices",
    params(("id" = String, Path, description = "Invoice id")),
    responses(
        (status = 200, description = "Invoice", body = InvoiceView),
        (status = 404, description = "Invoice not found"),
    )
)]
#[get("/{id}")]
pub async fn get_invoice(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let invoice = InvoiceService::new(&state).get_for_user(&user, &path).await?;
    Ok(HttpResponse::Ok().json(InvoiceView::from(invoice)))
}
