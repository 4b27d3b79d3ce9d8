//! ABOUTME: HTTP route handlers grouped by resource
//! ABOUTME: Handlers validate DTOs and delegate to the services layer

pub mod admin;
pub mod auth;
pub mod invoices;
pub mod orders;
pub mod payouts;
pub mod products;
