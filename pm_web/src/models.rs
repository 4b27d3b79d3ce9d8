//! ABOUTME: Data models for web API with validation and OpenAPI schemas
//! ABOUTME: Defines request/response structures with serde and validation

use crate::services::{orders::Download, payouts::Balance};
use pm_db::{Invoice, Order, OrderItem, PageRequest, Payout, Product, Review, User};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

/// Largest page a list endpoint returns
pub const MAX_PAGE_SIZE: u32 = 100;

fn default_page_size() -> u32 {
    20
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

/// Request body for user login
#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,

    #[validate(length(min = 1))]
    pub password: String,
}

/// Request body for account registration
#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 50))]
    pub username: String,

    #[validate(email)]
    pub email: String,

    #[validate(length(min = 8, max = 128))]
    pub password: String,

    /// `buyer` (default) or `seller`
    pub role: Option<String>,
}

/// Response for successful login or registration
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub user: UserInfo,
}

/// User information response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserInfo {
    pub id: String,
    pub username: String,
    pub email: String,
    pub role: String,
    pub payout_account_id: Option<String>,
    pub is_active: bool,
    pub created_at: String,
}

impl From<User> for UserInfo {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            role: user.role,
            payout_account_id: user.payout_account_id,
            is_active: user.is_active,
            created_at: user.created_at,
        }
    }
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user ID
    pub email: String,
    pub role: String,
    pub exp: usize,
    pub iat: usize,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// RFC 7807 problem details body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub type_url: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    #[serde(flatten)]
    pub extensions: HashMap<String, serde_json::Value>,
}

impl ProblemDetails {
    pub fn new(type_url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            type_url: type_url.into(),
            title: title.into(),
            status: None,
            detail: None,
            instance: None,
            extensions: HashMap::new(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_extension(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extensions.insert(key.into(), value);
        self
    }

    /// 400 problem for a request the server refuses to process
    pub fn validation_error(detail: impl Into<String>) -> Self {
        Self::new(
            "https://datatracker.ietf.org/rfc/rfc7231.html#section-6.5.1",
            "Bad Request",
        )
        .with_status(400)
        .with_detail(detail)
    }
}

/// One failed field check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: String,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Paging
// ---------------------------------------------------------------------------

/// Zero-based paging parameters
#[derive(Debug, Clone, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    #[serde(default)]
    pub page: u32,
    #[serde(default = "default_page_size")]
    #[validate(range(min = 1, max = 100))]
    pub page_size: u32,
}

impl PageQuery {
    pub fn request(&self) -> PageRequest {
        PageRequest::new(self.page, self.page_size)
    }
}

impl Default for PageQuery {
    fn default() -> Self {
        Self {
            page: 0,
            page_size: default_page_size(),
        }
    }
}

fn total_pages(total: i64, page_size: u32) -> u32 {
    if page_size == 0 {
        return 0;
    }
    u32::try_from((total + i64::from(page_size) - 1) / i64::from(page_size)).unwrap_or(u32::MAX)
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Catalog listing parameters
#[derive(Debug, Clone, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ProductQuery {
    #[serde(default)]
    pub page: u32,
    #[serde(default = "default_page_size")]
    #[validate(range(min = 1, max = 100))]
    pub page_size: u32,
    /// Case-insensitive title filter
    #[validate(length(max = 100))]
    pub search: Option<String>,
}

/// Admin listing by moderation status
#[derive(Debug, Clone, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StatusQuery {
    pub status: Option<String>,
    #[serde(default)]
    pub page: u32,
    #[serde(default = "default_page_size")]
    #[validate(range(min = 1, max = 100))]
    pub page_size: u32,
}

impl StatusQuery {
    pub fn request(&self) -> PageRequest {
        PageRequest::new(self.page, self.page_size)
    }
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[validate(range(min = 1, max = 100_000_000))]
    pub price_cents: i64,
    /// Defaults to the marketplace currency
    #[validate(length(equal = 3))]
    pub currency: Option<String>,
    #[validate(url)]
    pub file_url: String,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateProductRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[validate(range(min = 1, max = 100_000_000))]
    pub price_cents: Option<i64>,
    #[validate(url)]
    pub file_url: Option<String>,
}

impl From<UpdateProductRequest> for pm_db::UpdateProductRequest {
    fn from(req: UpdateProductRequest) -> Self {
        Self {
            title: req.title,
            description: req.description,
            price_cents: req.price_cents,
            file_url: req.file_url,
        }
    }
}

/// Reason attached to a moderation rejection
#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct RejectRequest {
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
}

/// Product as shown over the API
///
/// `file_url` is only present for the owning seller and admins.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProductView {
    pub id: String,
    pub seller_id: String,
    pub title: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub currency: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl ProductView {
    /// Public view without the download location
    pub fn public(product: Product) -> Self {
        let mut view = Self::full(product);
        view.file_url = None;
        view.rejection_reason = None;
        view
    }

    pub fn full(product: Product) -> Self {
        Self {
            id: product.id,
            seller_id: product.seller_id,
            title: product.title,
            description: product.description,
            price_cents: product.price_cents,
            currency: product.currency,
            status: product.status,
            file_url: Some(product.file_url),
            rejection_reason: product.rejection_reason,
            created_at: product.created_at,
            updated_at: product.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProductPage {
    pub items: Vec<ProductView>,
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
}

impl ProductPage {
    pub fn new(items: Vec<ProductView>, total: i64, page: u32, page_size: u32) -> Self {
        Self {
            items,
            total,
            page,
            page_size,
            total_pages: total_pages(total, page_size),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateReviewRequest {
    #[validate(range(min = 1, max = 5))]
    pub rating: i64,
    #[validate(length(max = 2000))]
    pub comment: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReviewView {
    pub id: String,
    pub product_id: String,
    pub user_id: String,
    pub rating: i64,
    pub comment: Option<String>,
    pub status: String,
    pub created_at: String,
}

impl From<Review> for ReviewView {
    fn from(review: Review) -> Self {
        Self {
            id: review.id,
            product_id: review.product_id,
            user_id: review.user_id,
            rating: review.rating,
            comment: review.comment,
            status: review.status,
            created_at: review.created_at,
        }
    }
}

/// Approved reviews of a product with their aggregate
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProductReviews {
    pub product_id: String,
    pub review_count: i64,
    pub average_rating: Option<f64>,
    pub reviews: Vec<ReviewView>,
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, max = 50))]
    pub product_ids: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct ConfirmPaymentRequest {
    /// Reference of the captured payment at the processor
    #[validate(length(min = 1, max = 200))]
    pub payment_reference: String,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateOrderStatusRequest {
    #[validate(length(min = 1))]
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderItemView {
    pub id: String,
    pub product_id: String,
    pub seller_id: String,
    pub title: String,
    pub price_cents: i64,
    pub platform_fee_cents: i64,
    pub seller_amount_cents: i64,
}

impl From<OrderItem> for OrderItemView {
    fn from(item: OrderItem) -> Self {
        Self {
            id: item.id,
            product_id: item.product_id,
            seller_id: item.seller_id,
            title: item.title,
            price_cents: item.price_cents,
            platform_fee_cents: item.platform_fee_cents,
            seller_amount_cents: item.seller_amount_cents,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderView {
    pub id: String,
    pub order_number: String,
    pub buyer_id: String,
    pub status: String,
    pub subtotal_cents: i64,
    pub platform_fee_cents: i64,
    pub total_cents: i64,
    pub currency: String,
    pub payment_reference: Option<String>,
    pub paid_at: Option<String>,
    pub completed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<OrderItemView>>,
}

impl OrderView {
    pub fn summary(order: Order) -> Self {
        Self {
            id: order.id,
            order_number: order.order_number,
            buyer_id: order.buyer_id,
            status: order.status,
            subtotal_cents: order.subtotal_cents,
            platform_fee_cents: order.platform_fee_cents,
            total_cents: order.total_cents,
            currency: order.currency,
            payment_reference: order.payment_reference,
            paid_at: order.paid_at,
            completed_at: order.completed_at,
            created_at: order.created_at,
            updated_at: order.updated_at,
            items: None,
        }
    }

    pub fn with_items(order: Order, items: Vec<OrderItem>) -> Self {
        let mut view = Self::summary(order);
        view.items = Some(items.into_iter().map(OrderItemView::from).collect());
        view
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderPage {
    pub items: Vec<OrderView>,
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
}

impl OrderPage {
    pub fn new(items: Vec<OrderView>, total: i64, page: u32, page_size: u32) -> Self {
        Self {
            items,
            total,
            page,
            page_size,
            total_pages: total_pages(total, page_size),
        }
    }
}

/// Download location of one purchased plan
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DownloadLink {
    pub product_id: String,
    pub title: String,
    pub file_url: String,
}

impl From<Download> for DownloadLink {
    fn from(download: Download) -> Self {
        Self {
            product_id: download.product_id,
            title: download.title,
            file_url: download.file_url,
        }
    }
}

// ---------------------------------------------------------------------------
// Invoices
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct InvoiceView {
    pub id: String,
    pub invoice_number: String,
    pub order_id: String,
    pub seller_id: String,
    pub buyer_id: String,
    pub subtotal_cents: i64,
    pub platform_fee_cents: i64,
    pub seller_amount_cents: i64,
    pub currency: String,
    pub status: String,
    pub issued_at: String,
    pub voided_at: Option<String>,
}

impl From<Invoice> for InvoiceView {
    fn from(invoice: Invoice) -> Self {
        Self {
            id: invoice.id,
            invoice_number: invoice.invoice_number,
            order_id: invoice.order_id,
            seller_id: invoice.seller_id,
            buyer_id: invoice.buyer_id,
            subtotal_cents: invoice.subtotal_cents,
            platform_fee_cents: invoice.platform_fee_cents,
            seller_amount_cents: invoice.seller_amount_cents,
            currency: invoice.currency,
            status: invoice.status,
            issued_at: invoice.issued_at,
            voided_at: invoice.voided_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Payouts
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct RequestPayoutRequest {
    /// Defaults to the whole withdrawable balance
    #[validate(range(min = 1))]
    pub amount_cents: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct PayoutAccountRequest {
    #[validate(length(min = 1, max = 255))]
    pub account_id: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PayoutView {
    pub id: String,
    pub seller_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub status: String,
    pub destination_account: String,
    pub transfer_reference: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Payout> for PayoutView {
    fn from(payout: Payout) -> Self {
        Self {
            id: payout.id,
            seller_id: payout.seller_id,
            amount_cents: payout.amount_cents,
            currency: payout.currency,
            status: payout.status,
            destination_account: payout.destination_account,
            transfer_reference: payout.transfer_reference,
            failure_reason: payout.failure_reason,
            created_at: payout.created_at,
            updated_at: payout.updated_at,
        }
    }
}

/// Seller balance in cents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BalanceResponse {
    pub earned_cents: i64,
    pub available_cents: i64,
    pub pending_cents: i64,
    pub paid_out_cents: i64,
    pub withdrawable_cents: i64,
}

impl From<Balance> for BalanceResponse {
    fn from(balance: Balance) -> Self {
        Self {
            earned_cents: balance.earned_cents,
            available_cents: balance.available_cents,
            pending_cents: balance.pending_cents,
            paid_out_cents: balance.paid_out_cents,
            withdrawable_cents: balance.withdrawable_cents,
        }
    }
}
