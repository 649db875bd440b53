//! Voucher

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::value_objects::VoucherCode;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum::EnumString, strum::Display, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DiscountType {
    Percentage,
    Fixed,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Voucher {
    pub id: Uuid,
    pub code: VoucherCode,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Why a voucher cannot be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum VoucherRejection {
    #[error("voucher not found")]
    NotFound,
    #[error("voucher is not active")]
    Inactive,
    #[error("voucher has expired")]
    Expired,
}

impl Voucher {
    /// Usable iff active and not past its expiry; the expiry instant itself
    /// is still valid.
    pub fn check_usable(&self, now: DateTime<Utc>) -> Result<(), VoucherRejection> {
        if !self.is_active { return Err(VoucherRejection::Inactive); }
        match self.expires_at {
            Some(expires_at) if now > expires_at => Err(VoucherRejection::Expired),
            _ => Ok(()),
        }
    }

    /// Discount for `subtotal`, never more than `ceiling` (the pre-discount
    /// order total) and never negative.
    pub fn discount_for(&self, subtotal: Decimal, ceiling: Decimal) -> Decimal {
        let raw = match self.discount_type {
            DiscountType::Percentage => (subtotal * self.discount_value / Decimal::ONE_HUNDRED)
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
            DiscountType::Fixed => self.discount_value,
        };
        raw.max(Decimal::ZERO).min(ceiling.max(Decimal::ZERO))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn voucher(discount_type: DiscountType, value: i64, expires_at: Option<DateTime<Utc>>) -> Voucher {
        Voucher { id: Uuid::new_v4(), code: VoucherCode::new("SAVE").unwrap(), discount_type, discount_value: Decimal::new(value, 0), is_active: true, expires_at }
    }

    #[test]
    fn test_expiry_boundary() {
        let now = Utc::now();
        assert_eq!(voucher(DiscountType::Fixed, 1, Some(now - Duration::seconds(1))).check_usable(now), Err(VoucherRejection::Expired));
        assert_eq!(voucher(DiscountType::Fixed, 1, Some(now + Duration::seconds(1))).check_usable(now), Ok(()));
        assert_eq!(voucher(DiscountType::Fixed, 1, None).check_usable(now + Duration::days(3650)), Ok(()));
    }

    #[test]
    fn test_inactive_rejected() {
        let mut v = voucher(DiscountType::Fixed, 1, None);
        v.is_active = false;
        assert_eq!(v.check_usable(Utc::now()), Err(VoucherRejection::Inactive));
    }

    #[test]
    fn test_discount_amounts() {
        let pct = voucher(DiscountType::Percentage, 10, None);
        assert_eq!(pct.discount_for(Decimal::new(1000, 0), Decimal::new(5000, 0)), Decimal::new(100, 0));
        let fixed = voucher(DiscountType::Fixed, 500, None);
        assert_eq!(fixed.discount_for(Decimal::new(100, 0), Decimal::new(300, 0)), Decimal::new(300, 0));
    }
}
