//! Persistence seam.
//!
//! Every operation runs inside a [`StoreTx`]. Nothing a transaction writes is
//! visible to other readers until [`StoreTx::commit`]; dropping a
//! transaction without committing rolls it back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;
use crate::domain::aggregates::{Address, Cart, CartOwner, Order, Product, Voucher};
use crate::domain::value_objects::{GuestToken, VoucherCode};
use crate::error::Result;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait Store: Send + Sync + 'static {
    async fn begin(&self) -> Result<Box<dyn StoreTx>>;
}

#[async_trait]
pub trait StoreTx: Send {
    /// Cart reads hold the row until commit so concurrent edits serialise.
    async fn lock_cart_by_user(&mut self, user_id: Uuid) -> Result<Option<Cart>>;
    async fn lock_cart_by_guest_token(&mut self, token: &GuestToken) -> Result<Option<Cart>>;
    /// Inserts an empty cart for `owner` unless one already exists, returning
    /// whichever cart now holds that owner key.
    async fn upsert_cart(&mut self, owner: &CartOwner) -> Result<Cart>;
    async fn save_cart(&mut self, cart: &Cart) -> Result<()>;
    async fn delete_cart(&mut self, cart_id: Uuid) -> Result<()>;
    async fn purge_guest_carts(&mut self, inactive_since: DateTime<Utc>) -> Result<u64>;

    async fn product(&mut self, product_id: Uuid) -> Result<Option<Product>>;
    async fn voucher(&mut self, code: &VoucherCode) -> Result<Option<Voucher>>;
    async fn address(&mut self, user_id: Uuid, address_id: Uuid) -> Result<Option<Address>>;
    async fn delivery_fee(&mut self, city: &str) -> Result<Option<Decimal>>;

    /// Decrements stock iff at least `quantity` is available. Returns false
    /// when the condition did not hold and nothing changed.
    async fn decrement_stock(&mut self, product_id: Uuid, variant_id: Option<Uuid>, quantity: u32) -> Result<bool>;
    async fn increment_stock(&mut self, product_id: Uuid, variant_id: Option<Uuid>, quantity: u32) -> Result<()>;

    async fn insert_order(&mut self, order: &Order) -> Result<()>;
    async fn order(&mut self, order_number: &str) -> Result<Option<Order>>;
    /// Like [`StoreTx::order`] but holds the order until commit.
    async fn lock_order(&mut self, order_number: &str) -> Result<Option<Order>>;
    async fn orders_for_user(&mut self, user_id: Uuid) -> Result<Vec<Order>>;
    /// Persists the mutable status fields only; items and identifiers are
    /// write-once.
    async fn save_order_status(&mut self, order: &Order) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;
}
