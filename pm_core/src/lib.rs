//! ABOUTME: Core types, errors, IDs, money math and tracing utilities
//! ABOUTME: Foundation crate used by all other planmarket components

pub mod error;
pub mod id;
pub mod money;
pub mod numbering;
pub mod status;
pub mod telemetry;
pub mod time;

pub use error::{Error, Result};
pub use id::Id;
pub use money::{split_amount, FeeSplit};
pub use status::{InvoiceStatus, OrderStatus, PayoutStatus, ProductStatus, ReviewStatus, Role};
pub use crate::time::{now_iso8601, MonotonicTimer};

#[cfg(test)]
mod tests {
    use test_support::unique_suffix;

    #[test]
    fn test_cross_crate_usage() {
        let suffix = unique_suffix();
        assert_eq!(suffix.len(), 26);
    }
}
