//! ABOUTME: Repository modules providing type-safe database operations
//! ABOUTME: Each repository handles the rows of one marketplace entity

pub mod invoices;
pub mod orders;
pub mod payouts;
pub mod products;
pub mod reviews;
pub mod users;
