//! Human-facing document numbers for orders and invoices

use crate::time::date_stamp;
use crate::Id;
use ::time::OffsetDateTime;

pub const ORDER_PREFIX: &str = "ORD";
pub const INVOICE_PREFIX: &str = "INV";

/// Characters of randomness appended to an order number
const ORDER_SUFFIX_LEN: usize = 8;

/// `ORD-YYYYMMDD-XXXXXXXX`; the suffix comes from a fresh ULID's random part
pub fn order_number(now: OffsetDateTime) -> String {
    format!(
        "{}-{}-{}",
        ORDER_PREFIX,
        date_stamp(now),
        Id::new().random_suffix(ORDER_SUFFIX_LEN)
    )
}

/// Order number stamped with today's date
pub fn next_order_number() -> String {
    order_number(OffsetDateTime::now_utc())
}

/// `INV-YYYY-NNNNNN`
pub fn invoice_number(year: i32, sequence: u32) -> String {
    format!("{}-{:04}-{:06}", INVOICE_PREFIX, year, sequence)
}

/// Prefix shared by every invoice number issued in `year`
pub fn invoice_year_prefix(year: i32) -> String {
    format!("{}-{:04}-", INVOICE_PREFIX, year)
}

/// Sequence part of an invoice number if it belongs to `year`
pub fn parse_invoice_sequence(number: &str, year: i32) -> Option<u32> {
    number
        .strip_prefix(&invoice_year_prefix(year))
        .filter(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
        .and_then(|rest| rest.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn test_order_number_shape() {
        let now = OffsetDateTime::from(UNIX_EPOCH + Duration::from_secs(1_609_459_200));
        let number = order_number(now);
        assert!(number.starts_with("ORD-20210101-"));
        assert_eq!(number.len(), "ORD-20210101-".len() + 8);
        assert_ne!(number, order_number(now));
    }

    #[test]
    fn test_invoice_number_roundtrip() {
        let number = invoice_number(2026, 42);
        assert_eq!(number, "INV-2026-000042");
        assert_eq!(parse_invoice_sequence(&number, 2026), Some(42));
    }

    #[test]
    fn test_invoice_sequence_other_year_or_garbage() {
        assert_eq!(parse_invoice_sequence("INV-2025-000042", 2026), None);
        assert_eq!(parse_invoice_sequence("INV-2026-", 2026), None);
        assert_eq!(parse_invoice_sequence("INV-2026-12a", 2026), None);
        assert_eq!(parse_invoice_sequence("ORD-2026-000001", 2026), None);
    }

    #[test]
    fn test_sequence_wider_than_padding() {
        assert_eq!(invoice_number(2026, 1_234_567), "INV-2026-1234567");
        assert_eq!(parse_invoice_sequence("INV-2026-1234567", 2026), Some(1_234_567));
    }
}
