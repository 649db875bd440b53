//! In-process store.
//!
//! A transaction takes the single state lock and works on a copy that
//! replaces the shared state on commit, so transactions are serialised and
//! a dropped transaction leaves no trace.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;
use crate::domain::aggregates::{Address, Cart, CartOwner, Order, Product, Voucher};
use crate::domain::value_objects::{GuestToken, VoucherCode};
use crate::error::{AppError, Result};
use super::{Store, StoreTx};

#[derive(Clone, Debug, Default)]
struct MemoryState {
    carts: HashMap<Uuid, Cart>,
    products: HashMap<Uuid, Product>,
    vouchers: HashMap<VoucherCode, Voucher>,
    addresses: HashMap<Uuid, Address>,
    delivery_zones: HashMap<String, Decimal>,
    orders: BTreeMap<String, Order>,
}

impl MemoryState {
    fn cart_by_owner(&self, owner: &CartOwner) -> Option<&Cart> {
        self.carts.values().find(|c| c.owner() == owner)
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    pub async fn put_product(&self, product: Product) {
        self.state.lock().await.products.insert(product.id, product);
    }

    pub async fn put_voucher(&self, voucher: Voucher) {
        self.state.lock().await.vouchers.insert(voucher.code.clone(), voucher);
    }

    pub async fn put_address(&self, address: Address) {
        self.state.lock().await.addresses.insert(address.id, address);
    }

    pub async fn put_delivery_zone(&self, city: &str, fee: Decimal) {
        self.state.lock().await.delivery_zones.insert(city.trim().to_lowercase(), fee);
    }

    /// Current stock for a product, or for one of its variants.
    pub async fn stock(&self, product_id: Uuid, variant_id: Option<Uuid>) -> Option<u32> {
        let state = self.state.lock().await;
        let product = state.products.get(&product_id)?;
        match variant_id {
            None => Some(product.stock),
            Some(id) => product.variants.iter().find(|v| v.id == id).map(|v| v.stock),
        }
    }

    pub async fn set_stock(&self, product_id: Uuid, variant_id: Option<Uuid>, stock: u32) {
        let mut state = self.state.lock().await;
        let Some(product) = state.products.get_mut(&product_id) else { return };
        match variant_id {
            None => product.stock = stock,
            Some(id) => if let Some(variant) = product.variant_mut(id) { variant.stock = stock },
        }
    }

    pub async fn order_count(&self) -> usize { self.state.lock().await.orders.len() }

    pub async fn cart_count(&self) -> usize { self.state.lock().await.carts.len() }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx { guard, working }))
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn lock_cart_by_user(&mut self, user_id: Uuid) -> Result<Option<Cart>> {
        Ok(self.working.cart_by_owner(&CartOwner::User(user_id)).cloned())
    }

    async fn lock_cart_by_guest_token(&mut self, token: &GuestToken) -> Result<Option<Cart>> {
        Ok(self.working.cart_by_owner(&CartOwner::Guest(token.clone())).cloned())
    }

    async fn upsert_cart(&mut self, owner: &CartOwner) -> Result<Cart> {
        if let Some(existing) = self.working.cart_by_owner(owner) {
            return Ok(existing.clone());
        }
        let cart = Cart::new(owner.clone());
        self.working.carts.insert(cart.id(), cart.clone());
        Ok(cart)
    }

    async fn save_cart(&mut self, cart: &Cart) -> Result<()> {
        self.working.carts.insert(cart.id(), cart.clone());
        Ok(())
    }

    async fn delete_cart(&mut self, cart_id: Uuid) -> Result<()> {
        self.working.carts.remove(&cart_id);
        Ok(())
    }

    async fn purge_guest_carts(&mut self, inactive_since: DateTime<Utc>) -> Result<u64> {
        let before = self.working.carts.len();
        self.working.carts.retain(|_, c| c.owner().guest_token().is_none() || c.updated_at() >= inactive_since);
        Ok((before - self.working.carts.len()) as u64)
    }

    async fn product(&mut self, product_id: Uuid) -> Result<Option<Product>> {
        Ok(self.working.products.get(&product_id).cloned())
    }

    async fn voucher(&mut self, code: &VoucherCode) -> Result<Option<Voucher>> {
        Ok(self.working.vouchers.get(code).cloned())
    }

    async fn address(&mut self, user_id: Uuid, address_id: Uuid) -> Result<Option<Address>> {
        Ok(self.working.addresses.get(&address_id).filter(|a| a.user_id == user_id).cloned())
    }

    async fn delivery_fee(&mut self, city: &str) -> Result<Option<Decimal>> {
        Ok(self.working.delivery_zones.get(&city.trim().to_lowercase()).copied())
    }

    async fn decrement_stock(&mut self, product_id: Uuid, variant_id: Option<Uuid>, quantity: u32) -> Result<bool> {
        let Some(product) = self.working.products.get_mut(&product_id) else { return Ok(false) };
        let stock = match variant_id {
            None => &mut product.stock,
            Some(id) => match product.variant_mut(id) {
                Some(variant) => &mut variant.stock,
                None => return Ok(false),
            },
        };
        if *stock < quantity { return Ok(false); }
        *stock -= quantity;
        Ok(true)
    }

    async fn increment_stock(&mut self, product_id: Uuid, variant_id: Option<Uuid>, quantity: u32) -> Result<()> {
        let product = self.working.products.get_mut(&product_id)
            .ok_or_else(|| AppError::NotFound(format!("product {product_id}")))?;
        let stock = match variant_id {
            None => &mut product.stock,
            Some(id) => &mut product.variant_mut(id).ok_or_else(|| AppError::NotFound(format!("variant {id}")))?.stock,
        };
        *stock = stock.saturating_add(quantity);
        Ok(())
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        let key = order.order_number().to_string();
        if self.working.orders.contains_key(&key) {
            return Err(AppError::Conflict(format!("order number {key} already exists")));
        }
        let mut stored = order.clone();
        stored.events.clear();
        self.working.orders.insert(key, stored);
        Ok(())
    }

    async fn order(&mut self, order_number: &str) -> Result<Option<Order>> {
        Ok(self.working.orders.get(order_number).cloned())
    }

    async fn lock_order(&mut self, order_number: &str) -> Result<Option<Order>> {
        self.order(order_number).await
    }

    async fn orders_for_user(&mut self, user_id: Uuid) -> Result<Vec<Order>> {
        let mut orders: Vec<Order> = self.working.orders.values().filter(|o| o.user_id() == user_id).cloned().collect();
        orders.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        Ok(orders)
    }

    async fn save_order_status(&mut self, order: &Order) -> Result<()> {
        let stored = self.working.orders.get_mut(order.order_number().as_str())
            .ok_or_else(|| AppError::NotFound(format!("order {}", order.order_number())))?;
        stored.payment = order.payment.clone();
        stored.delivery_status = order.delivery_status;
        stored.timeline = order.timeline.clone();
        stored.updated_at = order.updated_at;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}
