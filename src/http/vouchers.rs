use axum::{extract::{Path, Query, State}, Json};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use crate::error::Result;
use crate::services::{vouchers, VoucherQuote};
use super::AppState;

#[derive(Debug, Deserialize)] pub struct QuoteParams { pub subtotal: Option<Decimal> }

pub async fn get_voucher(State(s): State<AppState>, Path(code): Path<String>, Query(p): Query<QuoteParams>) -> Result<Json<VoucherQuote>> {
    let quote = vouchers::quote(s.services.store.as_ref(), &code, p.subtotal, Utc::now()).await?;
    Ok(Json(quote))
}
