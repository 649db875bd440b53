use axum::{extract::{Path, State}, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;
use crate::domain::aggregates::{Order, PaymentMethod, TrackingStep};
use crate::domain::value_objects::VoucherCode;
use crate::error::Result;
use crate::services::{PlaceOrder, StatusUpdate, Viewer};
use super::auth::{AdminUser, AuthUser};
use super::{AppJson, AppState};

/// An order together with its buyer-facing tracking view.
#[derive(Debug, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub tracking: Vec<TrackingStep>,
}

impl From<Order> for OrderDetail {
    fn from(order: Order) -> Self {
        let tracking = order.tracking();
        Self { order, tracking }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CheckoutRequest {
    pub address_id: Uuid,
    pub payment_method: PaymentMethod,
    #[validate(length(max = 64))]
    pub voucher_code: Option<String>,
}

pub async fn checkout(State(s): State<AppState>, AuthUser(caller): AuthUser, AppJson(r): AppJson<CheckoutRequest>) -> Result<(StatusCode, Json<OrderDetail>)> {
    r.validate()?;
    let voucher_code = r.voucher_code.filter(|c| !c.trim().is_empty()).map(VoucherCode::new).transpose()?;
    let order = s.services.checkout.place_order(PlaceOrder {
        user_id: caller.user_id, address_id: r.address_id, payment_method: r.payment_method, voucher_code,
    }).await?;
    Ok((StatusCode::CREATED, Json(order.into())))
}

pub async fn list_orders(State(s): State<AppState>, AuthUser(caller): AuthUser) -> Result<Json<Vec<Order>>> {
    Ok(Json(s.services.orders.list_for_user(caller.user_id).await?))
}

pub async fn get_order(State(s): State<AppState>, AuthUser(caller): AuthUser, Path(order_number): Path<String>) -> Result<Json<OrderDetail>> {
    let viewer = if caller.is_admin() { Viewer::Admin } else { Viewer::Customer(caller.user_id) };
    let order = s.services.orders.get(&order_number, viewer).await?;
    Ok(Json(order.into()))
}

pub async fn update_order_status(State(s): State<AppState>, AdminUser(admin): AdminUser, Path(order_number): Path<String>, AppJson(update): AppJson<StatusUpdate>) -> Result<Json<OrderDetail>> {
    tracing::info!(admin = %admin.user_id, order_number = %order_number, "admin status update");
    let order = s.services.orders.update_status(&order_number, update).await?;
    Ok(Json(order.into()))
}
