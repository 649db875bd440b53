//! Order pricing. Pure: cart snapshot prices are authoritative, never the
//! live catalog price.

use rust_decimal::{Decimal, RoundingStrategy};
use crate::domain::aggregates::{CartLine, Pricing, Voucher};

/// Flat VAT applied to the subtotal (16%).
pub fn vat_rate() -> Decimal { Decimal::new(16, 2) }

pub fn compute(lines: &[CartLine], shipping_fee: Decimal, voucher: Option<&Voucher>) -> Pricing {
    let subtotal: Decimal = lines.iter().map(CartLine::line_total).sum();
    let tax = (subtotal * vat_rate()).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let gross = subtotal + shipping_fee + tax;
    let discount = voucher.map_or(Decimal::ZERO, |v| v.discount_for(subtotal, gross));
    Pricing { subtotal, shipping: shipping_fee, tax, discount, total: (gross - discount).max(Decimal::ZERO) }
}
