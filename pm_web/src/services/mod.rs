//! ABOUTME: Business services sitting between HTTP handlers and repositories
//! ABOUTME: Each service borrows the shared AppState and returns core errors

pub mod catalog;
pub mod invoices;
pub mod orders;
pub mod payouts;

pub use catalog::CatalogService;
pub use invoices::InvoiceService;
pub use orders::OrderService;
pub use payouts::PayoutService;
