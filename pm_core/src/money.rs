//! Integer-cent money math: platform fee splitting and display formatting

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Basis points in one whole (100%)
pub const BPS_DENOMINATOR: i64 = 10_000;

/// Upper bound accepted for a platform fee (50%)
pub const MAX_FEE_BPS: u32 = 5_000;

/// Result of splitting a sale between platform and seller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSplit {
    pub platform_fee_cents: i64,
    pub seller_amount_cents: i64,
}

/// Split `price_cents` into platform fee and seller share.
///
/// The fee is rounded half-up; the seller receives the exact remainder so the
/// two parts always add back to the price.
pub fn split_amount(price_cents: i64, fee_bps: u32) -> Result<FeeSplit> {
    if price_cents < 0 {
        return Err(Error::Validation(format!(
            "Price must not be negative, got {}",
            price_cents
        )));
    }
    if fee_bps > MAX_FEE_BPS {
        return Err(Error::Validation(format!(
            "Platform fee of {} bps exceeds the maximum of {}",
            fee_bps, MAX_FEE_BPS
        )));
    }

    let fee = price_cents
        .checked_mul(i64::from(fee_bps))
        .map(|scaled| (scaled + BPS_DENOMINATOR / 2) / BPS_DENOMINATOR)
        .ok_or_else(|| Error::Validation("Price too large".to_string()))?;

    Ok(FeeSplit {
        platform_fee_cents: fee,
        seller_amount_cents: price_cents - fee,
    })
}

/// Running totals of an order or invoice
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub subtotal_cents: i64,
    pub platform_fee_cents: i64,
    pub seller_amount_cents: i64,
}

impl Totals {
    pub fn add(&mut self, price_cents: i64, split: FeeSplit) {
        self.subtotal_cents += price_cents;
        self.platform_fee_cents += split.platform_fee_cents;
        self.seller_amount_cents += split.seller_amount_cents;
    }
}

/// Render cents as `"12.50 EUR"`
pub fn format_cents(amount_cents: i64, currency: &str) -> String {
    let sign = if amount_cents < 0 { "-" } else { "" };
    let abs = amount_cents.unsigned_abs();
    format!("{}{}.{:02} {}", sign, abs / 100, abs % 100, currency)
}

/// Validate an ISO 4217 style code (three ASCII uppercase letters)
pub fn validate_currency(code: &str) -> Result<()> {
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase()) {
        Ok(())
    } else {
        Err(Error::Validation(format!("Invalid currency code: {}", code)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ten_percent_split() {
        let split = split_amount(2_500, 1_000).unwrap();
        assert_eq!(split.platform_fee_cents, 250);
        assert_eq!(split.seller_amount_cents, 2_250);
    }

    #[test]
    fn test_half_up_rounding() {
        // 1005 * 10% = 100.5 -> 101
        assert_eq!(split_amount(1_005, 1_000).unwrap().platform_fee_cents, 101);
        // 1004 * 10% = 100.4 -> 100
        assert_eq!(split_amount(1_004, 1_000).unwrap().platform_fee_cents, 100);
    }

    #[test]
    fn test_parts_sum_to_price() {
        for price in [0_i64, 1, 7, 99, 100, 1_999, 123_457] {
            for bps in [0_u32, 1, 250, 1_000, 1_337, MAX_FEE_BPS] {
                let split = split_amount(price, bps).unwrap();
                assert_eq!(split.platform_fee_cents + split.seller_amount_cents, price);
                assert!(split.platform_fee_cents >= 0);
                assert!(split.seller_amount_cents >= 0);
            }
        }
    }

    #[test]
    fn test_split_rejects_bad_input() {
        assert!(split_amount(-1, 1_000).is_err());
        assert!(split_amount(100, MAX_FEE_BPS + 1).is_err());
        assert!(split_amount(i64::MAX, 1_000).is_err());
    }

    #[test]
    fn test_totals_accumulate() {
        let mut totals = Totals::default();
        totals.add(1_000, split_amount(1_000, 1_000).unwrap());
        totals.add(500, split_amount(500, 1_000).unwrap());
        assert_eq!(totals.subtotal_cents, 1_500);
        assert_eq!(totals.platform_fee_cents, 150);
        assert_eq!(totals.seller_amount_cents, 1_350);
    }

    #[test]
    fn test_format_cents() {
        assert_eq!(format_cents(1_250, "EUR"), "12.50 EUR");
        assert_eq!(format_cents(5, "USD"), "0.05 USD");
        assert_eq!(format_cents(-199, "EUR"), "-1.99 EUR");
    }

    #[test]
    fn test_validate_currency() {
        assert!(validate_currency("EUR").is_ok());
        assert!(validate_currency("eur").is_err());
        assert!(validate_currency("EURO").is_err());
    }
}
