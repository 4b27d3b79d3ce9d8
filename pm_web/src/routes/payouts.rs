//! ABOUTME: Seller payout endpoints: balance, payout requests and payout account
//! ABOUTME: Admins may list and inspect payouts but not request them

use crate::{
    error::{validate, ApiResult},
    middleware::auth::AuthUser,
    models::{BalanceResponse, PageQuery, PayoutAccountRequest, PayoutView, RequestPayoutRequest, UserInfo},
    services::PayoutService,
    AppState,
};
use actix_web::{get, post, put, web, HttpResponse};
use pm_core::Role;

#[utoipa::path(
    get,
    path = "/api/payouts",
    tag = "payouts",
    params(PageQuery),
    responses((status = 200, description = "Payouts", body = [PayoutView]))
)]
#[get("")]
pub async fn list_payouts(
    state: web::Data<AppState>,
    user: AuthUser,
    query: web::Query<PageQuery>,
) -> ApiResult<HttpResponse> {
    validate(&query.0)?;

    let payouts: Vec<PayoutView> = PayoutService::new(&state)
        .list(&user, query.request())
        .await?
        .into_iter()
        .map(PayoutView::from)
        .collect();

    Ok(HttpResponse::Ok().json(payouts))
}

#[utoipa::path(
    get,
    path = "/api/payouts/balance",
    tag = "payouts",
    responses(
        (status = 200, description = "Seller balance", body = BalanceResponse),
        (status = 403, description = "Not a seller"),
    )
)]
#[get("/balance")]
pub async fn balance(state: web::Data<AppState>, user: AuthUser) -> ApiResult<HttpResponse> {
    user.require(&[Role::Seller])?;

    let balance = PayoutService::new(&state).balance(&user.id).await?;
    Ok(HttpResponse::Ok().json(BalanceResponse::from(balance)))
}

/// Request a payout; the returned status tells whether the transfer went through
#[utoipa::path(
    post,
    path = "/api/payouts",
    tag = "payouts",
    request_body = RequestPayoutRequest,
    responses(
        (status = 201, description = "Payout attempted", body = PayoutView),
        (status = 400, description = "No account, below minimum or above balance"),
        (status = 409, description = "Another payout is in flight"),
    )
)]
#[post("")]
pub async fn request_payout(
    state: web::Data<AppState>,
    user: AuthUser,
    payload: web::Json<RequestPayoutRequest>,
) -> ApiResult<HttpResponse> {
    user.require(&[Role::Seller])?;
    validate(&payload.0)?;

    let payout = PayoutService::new(&state)
        .request_payout(&user, payload.amount_cents)
        .await?;

    Ok(HttpResponse::Created().json(PayoutView::from(payout)))
}

#[utoipa::path(
    put,
    path = "/api/payouts/account",
    tag = "payouts",
    request_body = PayoutAccountRequest,
    responses(
        (status = 200, description = "Account connected", body = UserInfo),
        (status = 400, description = "Malformed account id"),
    )
)]
#[put("/account")]
pub async fn set_account(
    state: web::Data<AppState>,
    user: AuthUser,
    payload: web::Json<PayoutAccountRequest>,
) -> ApiResult<HttpResponse> {
    user.require(&[Role::Seller])?;
    validate(&payload.0)?;

    let updated = PayoutService::new(&state)
        .set_payout_account(&user, &payload.account_id)
        .await?;

    Ok(HttpResponse::Ok().json(UserInfo::from(updated)))
}

#[utoipa::path(
    get,
    path = "/api/payouts/{id}",
    tag = "payouts",
    params(("id" = String, Path, description = "Payout id")),
    responses(
        (status = 200, description = "Payout", body = PayoutView),
        (status = 404, description = "Payout not found"),
    )
)]
#[get("/{id}")]
pub async fn get_payout(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let payout = PayoutService::new(&state).get(&user, &path).await?;
    Ok(HttpResponse::Ok().json(PayoutView::from(payout)))
}
