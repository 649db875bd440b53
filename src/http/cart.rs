use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::request::Parts,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use uuid::Uuid;
use validator::Validate;
use crate::domain::aggregates::{Cart, CartLine};
use crate::domain::value_objects::GuestToken;
use crate::error::Result;
use crate::services::{AddLine, CartIdentity};
use super::auth::MaybeUser;
use super::{AppJson, AppState};

pub const CART_TOKEN_HEADER: &str = "x-cart-token";

/// Guest cart token presented by the client, if any.
pub struct CartToken(pub Option<GuestToken>);

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CartToken {
    type Rejection = Infallible;
    async fn from_request_parts(parts: &mut Parts, _: &S) -> std::result::Result<Self, Self::Rejection> {
        let token = parts.headers.get(CART_TOKEN_HEADER).and_then(|v| v.to_str().ok()).and_then(GuestToken::parse);
        Ok(CartToken(token))
    }
}

fn identity(MaybeUser(user): MaybeUser, CartToken(token): CartToken) -> CartIdentity {
    CartIdentity { user_id: user.map(|c| c.user_id), guest_token: token }
}

#[derive(Debug, Serialize)]
pub struct CartView {
    pub id: Uuid,
    pub lines: Vec<CartLine>,
    pub item_count: u32,
    pub subtotal: Decimal,
}

/// Guest responses carry the token back so the client can keep using it.
fn cart_response(cart: Cart) -> Response {
    let view = CartView {
        id: cart.id(),
        item_count: cart.lines().iter().map(|l| l.quantity).sum(),
        subtotal: cart.subtotal(),
        lines: cart.lines().to_vec(),
    };
    match cart.owner().guest_token() {
        Some(token) => ([(CART_TOKEN_HEADER, token.to_string())], Json(view)).into_response(),
        None => Json(view).into_response(),
    }
}

pub async fn get_cart(State(s): State<AppState>, user: MaybeUser, token: CartToken) -> Result<Response> {
    let cart = s.services.carts.get_or_create(&identity(user, token)).await?;
    Ok(cart_response(cart))
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddLineRequest {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    #[validate(range(min = 1, max = 999))]
    pub quantity: u32,
}

pub async fn add_line(State(s): State<AppState>, user: MaybeUser, token: CartToken, AppJson(r): AppJson<AddLineRequest>) -> Result<Response> {
    r.validate()?;
    let add = AddLine { product_id: r.product_id, variant_id: r.variant_id, quantity: r.quantity };
    let cart = s.services.carts.add_line(&identity(user, token), add).await?;
    Ok(cart_response(cart))
}

#[derive(Debug, Deserialize, Validate)]
pub struct SetQuantityRequest {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    #[validate(range(max = 999))]
    pub quantity: u32,
}

pub async fn set_quantity(State(s): State<AppState>, user: MaybeUser, token: CartToken, AppJson(r): AppJson<SetQuantityRequest>) -> Result<Response> {
    r.validate()?;
    let cart = s.services.carts.set_line_quantity(&identity(user, token), r.product_id, r.variant_id, r.quantity).await?;
    Ok(cart_response(cart))
}

#[derive(Debug, Deserialize)] pub struct VariantParam { pub variant_id: Option<Uuid> }

pub async fn remove_line(State(s): State<AppState>, user: MaybeUser, token: CartToken, Path(product_id): Path<Uuid>, Query(q): Query<VariantParam>) -> Result<Response> {
    let cart = s.services.carts.remove_line(&identity(user, token), product_id, q.variant_id).await?;
    Ok(cart_response(cart))
}
