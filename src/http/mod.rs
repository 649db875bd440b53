//! HTTP surface.

use axum::{extract::FromRequest, routing::{get, patch, post}, Json, Router};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use crate::error::AppError;
use crate::services::Services;

pub mod auth;
pub mod cart;
pub mod orders;
pub mod vouchers;
pub mod webhook;

#[derive(Clone)]
pub struct AppState {
    pub services: Arc<Services>,
}

impl AppState {
    pub fn new(services: Services) -> Self { Self { services: Arc::new(services) } }
}

/// `Json` whose rejections render through [`AppError`].
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "storefront"})) }))
        .route("/api/v1/cart", get(cart::get_cart))
        .route("/api/v1/cart/lines", post(cart::add_line).put(cart::set_quantity))
        .route("/api/v1/cart/lines/:product_id", axum::routing::delete(cart::remove_line))
        .route("/api/v1/vouchers/:code", get(vouchers::get_voucher))
        .route("/api/v1/checkout", post(orders::checkout))
        .route("/api/v1/orders", get(orders::list_orders))
        .route("/api/v1/orders/:order_number", get(orders::get_order))
        .route("/api/v1/admin/orders/:order_number", patch(orders::update_order_status))
        .route("/api/v1/webhooks/payments", post(webhook::payment_webhook))
        .layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()).with_state(state)
}
