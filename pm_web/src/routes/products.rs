//! ABOUTME: Catalog endpoints for browsing, seller listings and buyer reviews
//! ABOUTME: Public reads need no token; writes check the caller's role

use crate::{
    error::{validate, ApiResult},
    middleware::auth::AuthUser,
    models::{
        CreateProductRequest, CreateReviewRequest, ProductPage, ProductQuery, ProductReviews,
        ProductView, ReviewView, UpdateProductRequest,
    },
    services::{catalog::NewListing, CatalogService},
    AppState,
};
use actix_web::{delete, get, post, put, web, HttpResponse};
use pm_core::Role;
use pm_db::PageRequest;

/// Published products, newest first
#[utoipa::path(
    get,
    path = "/products",
    tag = "products",
    params(ProductQuery),
    responses(
        (status = 200, description = "Published products", body = ProductPage),
        (status = 400, description = "Invalid paging"),
    )
)]
#[get("")]
pub async fn list_products(
    state: web::Data<AppState>,
    query: web::Query<ProductQuery>,
) -> ApiResult<HttpResponse> {
    validate(&query.0)?;

    let (products, total) = CatalogService::new(&state)
        .list_published(
            query.search.as_deref(),
            PageRequest::new(query.page, query.page_size),
        )
        .await?;

    let items = products.into_iter().map(ProductView::public).collect();
    Ok(HttpResponse::Ok().json(ProductPage::new(items, total, query.page, query.page_size)))
}

/// The caller's own listings in every state but archived
#[utoipa::path(
    get,
    path = "/products/mine",
    tag = "products",
    responses(
        (status = 200, description = "Seller products", body = [ProductView]),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not a seller"),
    )
)]
#[get("/mine")]
pub async fn my_products(state: web::Data<AppState>, user: AuthUser) -> ApiResult<HttpResponse> {
    user.require(&[Role::Seller])?;

    let products = CatalogService::new(&state).seller_products(&user).await?;
    let views: Vec<ProductView> = products.into_iter().map(ProductView::full).collect();
    Ok(HttpResponse::Ok().json(views))
}

#[utoipa::path(
    get,
    path = "/products/{id}",
    tag = "products",
    params(("id" = String, Path, description = "Product id")),
    responses(
        (status = 200, description = "Published product", body = ProductView),
        (status = 404, description = "No such published product"),
    )
)]
#[get("/{id}")]
pub async fn get_product(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let product = CatalogService::new(&state).get_published(&path).await?;
    Ok(HttpResponse::Ok().json(ProductView::public(product)))
}

#[utoipa::path(
    post,
    path = "/products",
    tag = "products",
    request_body = CreateProductRequest,
    responses(
        (status = 201, description = "Product submitted for review", body = ProductView),
        (status = 400, description = "Invalid product"),
        (status = 403, description = "Not a seller"),
    )
)]
#[post("")]
pub async fn create_product(
    state: web::Data<AppState>,
    user: AuthUser,
    payload: web::Json<CreateProductRequest>,
) -> ApiResult<HttpResponse> {
    user.require(&[Role::Seller])?;
    let payload = payload.into_inner();
    validate(&payload)?;

    let product = CatalogService::new(&state)
        .create_product(
            &user,
            NewListing {
                title: payload.title,
                description: payload.description,
                price_cents: payload.price_cents,
                currency: payload.currency,
                file_url: payload.file_url,
            },
        )
        .await?;

    Ok(HttpResponse::Created().json(ProductView::full(product)))
}

#[utoipa::path(
    put,
    path = "/products/{id}",
    tag = "products",
    params(("id" = String, Path, description = "Product id")),
    request_body = UpdateProductRequest,
    responses(
        (status = 200, description = "Product updated and back in review", body = ProductView),
        (status = 400, description = "Invalid changes"),
        (status = 404, description = "Not one of the caller's products"),
    )
)]
#[put("/{id}")]
pub async fn update_product(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<String>,
    payload: web::Json<UpdateProductRequest>,
) -> ApiResult<HttpResponse> {
    user.require(&[Role::Seller])?;
    let payload = payload.into_inner();
    validate(&payload)?;

    let product = CatalogService::new(&state)
        .update_product(&user, &path, payload.into())
        .await?;

    Ok(HttpResponse::Ok().json(ProductView::full(product)))
}

#[utoipa::path(
    delete,
    path = "/products/{id}",
    tag = "products",
    params(("id" = String, Path, description = "Product id")),
    responses(
        (status = 204, description = "Product archived"),
        (status = 404, description = "Not one of the caller's products"),
    )
)]
#[delete("/{id}")]
pub async fn archive_product(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    user.require(&[Role::Seller])?;
    CatalogService::new(&state).archive_product(&user, &path).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    get,
    path = "/products/{id}/reviews",
    tag = "products",
    params(("id" = String, Path, description = "Product id")),
    responses(
        (status = 200, description = "Approved reviews", body = ProductReviews),
        (status = 404, description = "No such published product"),
    )
)]
#[get("/{id}/reviews")]
pub async fn product_reviews(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let product_id = path.into_inner();
    let (reviews, summary) = CatalogService::new(&state)
        .product_reviews(&product_id)
        .await?;

    Ok(HttpResponse::Ok().json(ProductReviews {
        product_id,
        review_count: summary.review_count,
        average_rating: summary.average_rating,
        reviews: reviews.into_iter().map(ReviewView::from).collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/products/{id}/reviews",
    tag = "products",
    params(("id" = String, Path, description = "Product id")),
    request_body = CreateReviewRequest,
    responses(
        (status = 201, description = "Review awaiting moderation", body = ReviewView),
        (status = 403, description = "Product not purchased"),
        (status = 409, description = "Already reviewed"),
    )
)]
#[post("/{id}/reviews")]
pub async fn create_review(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<String>,
    payload: web::Json<CreateReviewRequest>,
) -> ApiResult<HttpResponse> {
    user.require(&[Role::Buyer])?;
    let payload = payload.into_inner();
    validate(&payload)?;

    let review = CatalogService::new(&state)
        .submit_review(&user, &path, payload.rating, payload.comment)
        .await?;

    Ok(HttpResponse::Created().json(ReviewView::from(review)))
}
