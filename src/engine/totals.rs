use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::models::quote::LineItem;

use super::EngineError;

/// Derived quote amounts, all in cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteTotals {
    /// Line item sum minus discount.
    pub subtotal: i64,
    pub tax_amount: i64,
    pub total: i64,
    pub deposit_amount: Option<i64>,
}

/// Computes subtotal, tax, grand total and optional deposit for a quote.
///
/// Line item totals are summed as supplied; each one must already equal
/// `quantity * unit_price`. Rounding is half away from zero, applied once to
/// the exact decimal product.
pub fn compute_totals(
    line_items: &[LineItem],
    discount_amount: i64,
    tax_rate_percent: Decimal,
    deposit_percent: Option<Decimal>,
) -> Result<QuoteTotals, EngineError> {
    if line_items.is_empty() {
        return Err(EngineError::NoLineItems);
    }
    check_percent(tax_rate_percent, "tax rate")?;
    if let Some(percent) = deposit_percent {
        check_percent(percent, "deposit percentage")?;
    }
    if discount_amount < 0 {
        return Err(EngineError::NegativeDiscount);
    }

    let mut line_sum: i64 = 0;
    for (index, item) in line_items.iter().enumerate() {
        validate_line_item(index, item)?;
        line_sum = line_sum.checked_add(item.total).ok_or(EngineError::Overflow)?;
    }

    if discount_amount > line_sum {
        return Err(EngineError::DiscountExceedsSubtotal {
            discount: discount_amount,
            subtotal: line_sum,
        });
    }

    let subtotal = line_sum - discount_amount;
    let tax_amount = percent_of(subtotal, tax_rate_percent)?;
    let total = subtotal.checked_add(tax_amount).ok_or(EngineError::Overflow)?;
    let deposit_amount = deposit_percent
        .map(|percent| percent_of(total, percent))
        .transpose()?;

    Ok(QuoteTotals {
        subtotal,
        tax_amount,
        total,
        deposit_amount,
    })
}

pub fn validate_line_item(index: usize, item: &LineItem) -> Result<(), EngineError> {
    if item.description.trim().is_empty() {
        return Err(EngineError::InvalidLineItem { index, reason: "description is required" });
    }
    if item.quantity <= Decimal::ZERO {
        return Err(EngineError::InvalidLineItem { index, reason: "quantity must be positive" });
    }
    if item.unit_price <= 0 {
        return Err(EngineError::InvalidLineItem { index, reason: "unit price must be positive" });
    }
    if item.total <= 0 {
        return Err(EngineError::InvalidLineItem { index, reason: "total must be positive" });
    }

    let expected = Decimal::from(item.unit_price)
        .checked_mul(item.quantity)
        .ok_or(EngineError::Overflow)?;
    if expected != Decimal::from(item.total) {
        return Err(EngineError::LineItemTotalMismatch { index, total: item.total });
    }
    Ok(())
}

fn check_percent(value: Decimal, what: &'static str) -> Result<(), EngineError> {
    if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED {
        return Err(EngineError::PercentOutOfRange(what));
    }
    Ok(())
}

/// `round(amount * percent / 100)`, half away from zero.
fn percent_of(amount: i64, percent: Decimal) -> Result<i64, EngineError> {
    Decimal::from(amount)
        .checked_mul(percent)
        .and_then(|scaled| scaled.checked_div(Decimal::ONE_HUNDRED))
        .map(|exact| exact.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|rounded| rounded.to_i64())
        .ok_or(EngineError::Overflow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::str::FromStr;

    fn item(quantity: &str, unit_price: i64, total: i64) -> LineItem {
        LineItem {
            description: "Labour".to_string(),
            quantity: Decimal::from_str(quantity).unwrap(),
            unit_price,
            total,
            notes: None,
        }
    }

    fn gst() -> Decimal {
        Decimal::from(10)
    }

    #[test]
    fn single_item_with_gst() {
        let totals = compute_totals(&[item("1", 10_000, 10_000)], 0, gst(), None).unwrap();
        assert_eq!(
            totals,
            QuoteTotals { subtotal: 10_000, tax_amount: 1_000, total: 11_000, deposit_amount: None }
        );
    }

    #[test]
    fn discount_applies_before_tax() {
        let items = [item("1", 10_000, 10_000), item("2", 2_500, 5_000)];
        let totals = compute_totals(&items, 1_000, gst(), None).unwrap();
        assert_eq!(totals.subtotal, 14_000);
        assert_eq!(totals.tax_amount, 1_400);
        assert_eq!(totals.total, 15_400);
    }

    #[test]
    fn deposit_is_share_of_grand_total() {
        let totals =
            compute_totals(&[item("1", 10_000, 10_000)], 0, gst(), Some(Decimal::from(50))).unwrap();
        assert_eq!(totals.total, 11_000);
        assert_eq!(totals.deposit_amount, Some(5_500));
    }

    #[test]
    fn tax_rounds_half_away_from_zero() {
        // 12345 * 10% = 1234.5
        let totals = compute_totals(&[item("1", 12_345, 12_345)], 0, gst(), None).unwrap();
        assert_eq!(totals.tax_amount, 1_235);
        assert_eq!(totals.total, 13_580);

        // 12344 * 10% = 1234.4
        let totals = compute_totals(&[item("1", 12_344, 12_344)], 0, gst(), None).unwrap();
        assert_eq!(totals.tax_amount, 1_234);
    }

    #[test]
    fn deposit_rounds_half_away_from_zero() {
        // 1001 * 10% tax = 100.1 -> 100, total 1101, 50% = 550.5 -> 551
        let totals =
            compute_totals(&[item("1", 1_001, 1_001)], 0, gst(), Some(Decimal::from(50))).unwrap();
        assert_eq!(totals.total, 1_101);
        assert_eq!(totals.deposit_amount, Some(551));
    }

    #[test]
    fn fractional_quantity_and_rate() {
        let items = [item("1.5", 2_000, 3_000)];
        let rate = Decimal::from_str("12.5").unwrap();
        let totals = compute_totals(&items, 0, rate, None).unwrap();
        assert_eq!(totals.tax_amount, 375);
        assert_eq!(totals.total, 3_375);
    }

    #[test]
    fn zero_rate_means_no_tax() {
        let totals = compute_totals(&[item("3", 700, 2_100)], 100, Decimal::ZERO, None).unwrap();
        assert_eq!(totals, QuoteTotals { subtotal: 2_000, tax_amount: 0, total: 2_000, deposit_amount: None });
    }

    #[test]
    fn discount_equal_to_subtotal_yields_zero() {
        let totals = compute_totals(&[item("1", 5_000, 5_000)], 5_000, gst(), Some(Decimal::from(20))).unwrap();
        assert_eq!(totals, QuoteTotals { subtotal: 0, tax_amount: 0, total: 0, deposit_amount: Some(0) });
    }

    #[test]
    fn discount_above_subtotal_is_rejected() {
        let err = compute_totals(&[item("1", 5_000, 5_000)], 5_001, gst(), None).unwrap_err();
        assert_eq!(err, EngineError::DiscountExceedsSubtotal { discount: 5_001, subtotal: 5_000 });
    }

    #[test]
    fn negative_discount_is_rejected() {
        let err = compute_totals(&[item("1", 5_000, 5_000)], -1, gst(), None).unwrap_err();
        assert_eq!(err, EngineError::NegativeDiscount);
    }

    #[test]
    fn mismatched_line_total_is_rejected() {
        let items = [item("1", 100, 100), item("2", 1_000, 1_999)];
        let err = compute_totals(&items, 0, gst(), None).unwrap_err();
        assert_eq!(err, EngineError::LineItemTotalMismatch { index: 1, total: 1_999 });
    }

    #[test]
    fn line_item_field_checks() {
        let mut blank = item("1", 100, 100);
        blank.description = "  ".into();
        assert!(matches!(
            validate_line_item(0, &blank),
            Err(EngineError::InvalidLineItem { index: 0, .. })
        ));
        assert!(validate_line_item(0, &item("0", 100, 0)).is_err());
        assert!(validate_line_item(0, &item("1", -100, -100)).is_err());
    }

    #[test]
    fn empty_quote_is_rejected() {
        assert_eq!(compute_totals(&[], 0, gst(), None), Err(EngineError::NoLineItems));
    }

    #[test]
    fn percentages_out_of_range_are_rejected() {
        let items = [item("1", 100, 100)];
        assert_eq!(
            compute_totals(&items, 0, Decimal::from(101), None),
            Err(EngineError::PercentOutOfRange("tax rate"))
        );
        assert_eq!(
            compute_totals(&items, 0, gst(), Some(Decimal::from(-5))),
            Err(EngineError::PercentOutOfRange("deposit percentage"))
        );
    }

    #[test]
    fn overflow_is_reported() {
        let items = [item("1", i64::MAX, i64::MAX), item("1", 1, 1)];
        assert_eq!(compute_totals(&items, 0, gst(), None), Err(EngineError::Overflow));
    }

    proptest! {
        #[test]
        fn recomputing_is_idempotent(
            prices in proptest::collection::vec((1i64..1_000_000, 1u32..20), 1..8),
            discount_pct in 0u32..=100,
            rate in 0u32..=100,
            deposit in proptest::option::of(0u32..=100),
        ) {
            let items: Vec<LineItem> = prices
                .iter()
                .map(|(price, qty)| item(&qty.to_string(), *price, price * *qty as i64))
                .collect();
            let sum: i64 = items.iter().map(|i| i.total).sum();
            let discount = sum * discount_pct as i64 / 100;
            let deposit = deposit.map(Decimal::from);

            let first = compute_totals(&items, discount, Decimal::from(rate), deposit).unwrap();
            let second = compute_totals(&items, discount, Decimal::from(rate), deposit).unwrap();
            prop_assert_eq!(first, second);
            prop_assert_eq!(first.subtotal, sum - discount);
            prop_assert_eq!(first.total, first.subtotal + first.tax_amount);
            prop_assert!(first.tax_amount >= 0);
            if let Some(d) = first.deposit_amount {
                prop_assert!(d <= first.total);
            }
        }
    }
}
