//! Voucher validation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::instrument;
use crate::domain::aggregates::{DiscountType, Voucher, VoucherRejection};
use crate::domain::value_objects::VoucherCode;
use crate::error::Result;
use crate::services::pricing;
use crate::store::{Store, StoreTx};

/// Strict check used inside the checkout transaction. Always reads the
/// voucher from the store the order is written to.
pub async fn validate(tx: &mut dyn StoreTx, code: &VoucherCode, now: DateTime<Utc>) -> Result<Voucher> {
    let voucher = tx.voucher(code).await?.ok_or(VoucherRejection::NotFound)?;
    voucher.check_usable(now)?;
    Ok(voucher)
}

/// What the storefront shows when a buyer types a code.
#[derive(Debug, Clone, Serialize)]
pub struct VoucherQuote {
    pub code: VoucherCode,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub expires_at: Option<DateTime<Utc>>,
    /// Present when the caller supplied a subtotal.
    pub discount_amount: Option<Decimal>,
}

/// Display-time lookup. Same rules as [`validate`], but the result is only
/// advisory: checkout re-validates.
#[instrument(skip(store))]
pub async fn quote(store: &dyn Store, code: &str, subtotal: Option<Decimal>, now: DateTime<Utc>) -> Result<VoucherQuote> {
    let code = VoucherCode::new(code)?;
    let mut tx = store.begin().await?;
    let voucher = validate(tx.as_mut(), &code, now).await?;
    let discount_amount = subtotal.map(|s| {
        let ceiling = s + s * pricing::vat_rate();
        voucher.discount_for(s, ceiling)
    });
    Ok(VoucherQuote {
        code: voucher.code, discount_type: voucher.discount_type, discount_value: voucher.discount_value,
        expires_at: voucher.expires_at, discount_amount,
    })
}
