//! Cart Aggregate

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;
use crate::domain::value_objects::GuestToken;

/// Who a cart belongs to. Exactly one owner, never both and never neither.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum CartOwner {
    User(Uuid),
    Guest(GuestToken),
}

impl CartOwner {
    /// Rebuilds an owner from the two nullable storage columns.
    pub fn from_columns(user_id: Option<Uuid>, guest_token: Option<String>) -> Option<Self> {
        match (user_id, guest_token) {
            (Some(id), None) => Some(Self::User(id)),
            (None, Some(token)) => GuestToken::parse(&token).map(Self::Guest),
            _ => None,
        }
    }

    pub fn user_id(&self) -> Option<Uuid> {
        match self { Self::User(id) => Some(*id), Self::Guest(_) => None }
    }

    pub fn guest_token(&self) -> Option<&GuestToken> {
        match self { Self::Guest(token) => Some(token), Self::User(_) => None }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub name: String,
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_options: Option<BTreeMap<String, String>>,
}

impl CartLine {
    pub fn line_total(&self) -> Decimal { self.unit_price * Decimal::from(self.quantity) }
    pub fn is(&self, product_id: Uuid, variant_id: Option<Uuid>) -> bool {
        self.product_id == product_id && self.variant_id == variant_id
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Cart {
    id: Uuid,
    owner: CartOwner,
    lines: Vec<CartLine>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Cart {
    pub fn new(owner: CartOwner) -> Self {
        let now = Utc::now();
        Self { id: Uuid::now_v7(), owner, lines: vec![], created_at: now, updated_at: now }
    }

    pub(crate) fn restore(id: Uuid, owner: CartOwner, lines: Vec<CartLine>, created_at: DateTime<Utc>, updated_at: DateTime<Utc>) -> Self {
        Self { id, owner, lines, created_at, updated_at }
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn owner(&self) -> &CartOwner { &self.owner }
    pub fn lines(&self) -> &[CartLine] { &self.lines }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }
    pub fn is_empty(&self) -> bool { self.lines.is_empty() }
    pub fn subtotal(&self) -> Decimal { self.lines.iter().map(CartLine::line_total).sum() }

    pub fn quantity_of(&self, product_id: Uuid, variant_id: Option<Uuid>) -> u32 {
        self.lines.iter().find(|l| l.is(product_id, variant_id)).map_or(0, |l| l.quantity)
    }

    /// Adds a line, summing quantities when the same product+variant is
    /// already present. The existing price snapshot is kept.
    pub fn add_line(&mut self, line: CartLine) -> Result<(), CartError> {
        if line.quantity == 0 { return Err(CartError::InvalidQuantity); }
        if let Some(existing) = self.lines.iter_mut().find(|l| l.is(line.product_id, line.variant_id)) {
            existing.quantity = existing.quantity.saturating_add(line.quantity);
        } else {
            self.lines.push(line);
        }
        self.touch();
        Ok(())
    }

    /// Overwrites a line's quantity; zero removes the line.
    pub fn set_quantity(&mut self, product_id: Uuid, variant_id: Option<Uuid>, quantity: u32) -> Result<(), CartError> {
        if quantity == 0 { return self.remove_line(product_id, variant_id); }
        let line = self.lines.iter_mut().find(|l| l.is(product_id, variant_id)).ok_or(CartError::LineNotFound)?;
        line.quantity = quantity;
        self.touch();
        Ok(())
    }

    pub fn remove_line(&mut self, product_id: Uuid, variant_id: Option<Uuid>) -> Result<(), CartError> {
        let before = self.lines.len();
        self.lines.retain(|l| !l.is(product_id, variant_id));
        if self.lines.len() == before { return Err(CartError::LineNotFound); }
        self.touch();
        Ok(())
    }

    pub fn clear(&mut self) { self.lines.clear(); self.touch(); }

    /// Takes purchased units out of the cart, dropping lines that reach zero.
    /// Lines added after the purchase are left alone.
    pub fn deduct(&mut self, product_id: Uuid, variant_id: Option<Uuid>, quantity: u32) {
        if let Some(line) = self.lines.iter_mut().find(|l| l.is(product_id, variant_id)) {
            line.quantity = line.quantity.saturating_sub(quantity);
        }
        self.lines.retain(|l| l.quantity > 0);
        self.touch();
    }

    /// Folds another cart's lines into this one (guest cart into user cart
    /// at login).
    pub fn absorb(&mut self, other: Cart) {
        for line in other.lines {
            if let Some(existing) = self.lines.iter_mut().find(|l| l.is(line.product_id, line.variant_id)) {
                existing.quantity = existing.quantity.saturating_add(line.quantity);
            } else {
                self.lines.push(line);
            }
        }
        self.touch();
    }

    /// Guest carts expire after `ttl` without activity; user carts never do.
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        matches!(self.owner, CartOwner::Guest(_)) && self.updated_at + ttl < now
    }

    /// Records a read as activity so a guest who only views the cart keeps it.
    pub fn mark_active(&mut self) { self.touch(); }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CartError {
    #[error("cart line not found")]
    LineNotFound,
    #[error("quantity must be at least 1")]
    InvalidQuantity,
}
