//! Postgres store backed by sqlx.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{Postgres, Transaction};
use std::collections::BTreeMap;
use uuid::Uuid;
use crate::domain::aggregates::{
    Address, Cart, CartLine, CartOwner, Order, OrderLine, Payment, Pricing, Product, ShippingSnapshot, Timeline, Variant, Voucher,
};
use crate::domain::value_objects::{GuestToken, OrderNumber, VoucherCode};
use crate::error::{AppError, Result};
use super::{Store, StoreTx};

const CART_COLUMNS: &str = "id, user_id, guest_token, lines, created_at, updated_at";
const ORDER_COLUMNS: &str = "id, order_number, user_id, items, subtotal, shipping, tax, discount, total, shipping_address, \
    payment_method, payment_status, transaction_id, delivery_status, timeline, voucher_id, created_at, updated_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new().max_connections(max_connections).connect(url).await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await.map_err(|e| AppError::Internal(format!("migration failed: {e}")))
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        Ok(Box::new(PgTx { tx: self.pool.begin().await? }))
    }
}

pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[derive(sqlx::FromRow)]
struct CartRow {
    id: Uuid,
    user_id: Option<Uuid>,
    guest_token: Option<String>,
    lines: Json<Vec<CartLine>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CartRow> for Cart {
    type Error = AppError;
    fn try_from(row: CartRow) -> Result<Self> {
        let owner = CartOwner::from_columns(row.user_id, row.guest_token)
            .ok_or_else(|| AppError::Internal(format!("cart {} does not have exactly one owner", row.id)))?;
        Ok(Cart::restore(row.id, owner, row.lines.0, row.created_at, row.updated_at))
    }
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    name: String,
    price: Decimal,
    image_url: Option<String>,
    is_active: bool,
    stock: i32,
}

#[derive(sqlx::FromRow)]
struct VariantRow {
    id: Uuid,
    options: Json<BTreeMap<String, String>>,
    price: Option<Decimal>,
    stock: i32,
    is_active: bool,
}

#[derive(sqlx::FromRow)]
struct VoucherRow {
    id: Uuid,
    code: String,
    discount_type: String,
    discount_value: Decimal,
    is_active: bool,
    expires_at: Option<DateTime<Utc>>,
}

impl TryFrom<VoucherRow> for Voucher {
    type Error = AppError;
    fn try_from(row: VoucherRow) -> Result<Self> {
        Ok(Voucher {
            id: row.id,
            code: VoucherCode::new(row.code)?,
            discount_type: parse_column("discount_type", &row.discount_type)?,
            discount_value: row.discount_value,
            is_active: row.is_active,
            expires_at: row.expires_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    order_number: String,
    user_id: Uuid,
    items: Json<Vec<OrderLine>>,
    subtotal: Decimal,
    shipping: Decimal,
    tax: Decimal,
    discount: Decimal,
    total: Decimal,
    shipping_address: Json<ShippingSnapshot>,
    payment_method: String,
    payment_status: String,
    transaction_id: Option<String>,
    delivery_status: String,
    timeline: Json<Timeline>,
    voucher_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = AppError;
    fn try_from(row: OrderRow) -> Result<Self> {
        Ok(Order {
            id: row.id,
            order_number: OrderNumber::new(row.order_number),
            user_id: row.user_id,
            items: row.items.0,
            pricing: Pricing { subtotal: row.subtotal, shipping: row.shipping, tax: row.tax, discount: row.discount, total: row.total },
            shipping: row.shipping_address.0,
            payment: Payment {
                method: parse_column("payment_method", &row.payment_method)?,
                status: parse_column("payment_status", &row.payment_status)?,
                transaction_id: row.transaction_id,
            },
            delivery_status: parse_column("delivery_status", &row.delivery_status)?,
            timeline: row.timeline.0,
            voucher_id: row.voucher_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            events: vec![],
        })
    }
}

fn parse_column<T: std::str::FromStr>(column: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| AppError::Internal(format!("unexpected {column} value {value:?}")))
}

fn stock_from_column(stock: i32) -> u32 { u32::try_from(stock).unwrap_or(0) }

fn quantity_to_column(quantity: u32) -> Result<i32> {
    i32::try_from(quantity).map_err(|_| AppError::Validation(format!("quantity {quantity} is too large")))
}

#[async_trait]
impl StoreTx for PgTx {
    async fn lock_cart_by_user(&mut self, user_id: Uuid) -> Result<Option<Cart>> {
        sqlx::query_as::<_, CartRow>(&format!("SELECT {CART_COLUMNS} FROM carts WHERE user_id = $1 FOR UPDATE"))
            .bind(user_id).fetch_optional(&mut *self.tx).await?
            .map(Cart::try_from).transpose()
    }

    async fn lock_cart_by_guest_token(&mut self, token: &GuestToken) -> Result<Option<Cart>> {
        sqlx::query_as::<_, CartRow>(&format!("SELECT {CART_COLUMNS} FROM carts WHERE guest_token = $1 FOR UPDATE"))
            .bind(token.as_str()).fetch_optional(&mut *self.tx).await?
            .map(Cart::try_from).transpose()
    }

    async fn upsert_cart(&mut self, owner: &CartOwner) -> Result<Cart> {
        // The no-op DO UPDATE makes RETURNING yield the existing row when a
        // concurrent request created it first.
        let conflict = match owner { CartOwner::User(_) => "user_id", CartOwner::Guest(_) => "guest_token" };
        let sql = format!(
            "INSERT INTO carts (id, user_id, guest_token, lines, created_at, updated_at) VALUES ($1, $2, $3, '[]', $4, $4) \
             ON CONFLICT ({conflict}) DO UPDATE SET {conflict} = EXCLUDED.{conflict} RETURNING {CART_COLUMNS}"
        );
        sqlx::query_as::<_, CartRow>(&sql)
            .bind(Uuid::now_v7()).bind(owner.user_id()).bind(owner.guest_token().map(GuestToken::as_str)).bind(Utc::now())
            .fetch_one(&mut *self.tx).await?
            .try_into()
    }

    async fn save_cart(&mut self, cart: &Cart) -> Result<()> {
        sqlx::query("UPDATE carts SET lines = $2, updated_at = $3 WHERE id = $1")
            .bind(cart.id()).bind(Json(cart.lines())).bind(cart.updated_at())
            .execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn delete_cart(&mut self, cart_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM carts WHERE id = $1").bind(cart_id).execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn purge_guest_carts(&mut self, inactive_since: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM carts WHERE guest_token IS NOT NULL AND updated_at < $1")
            .bind(inactive_since).execute(&mut *self.tx).await?;
        Ok(result.rows_affected())
    }

    async fn product(&mut self, product_id: Uuid) -> Result<Option<Product>> {
        let Some(row) = sqlx::query_as::<_, ProductRow>("SELECT id, name, price, image_url, is_active, stock FROM products WHERE id = $1")
            .bind(product_id).fetch_optional(&mut *self.tx).await? else { return Ok(None) };
        let variants = sqlx::query_as::<_, VariantRow>(
            "SELECT id, options, price, stock, is_active FROM product_variants WHERE product_id = $1 ORDER BY id",
        ).bind(product_id).fetch_all(&mut *self.tx).await?;
        Ok(Some(Product {
            id: row.id, name: row.name, price: row.price, image: row.image_url, is_active: row.is_active, stock: stock_from_column(row.stock),
            variants: variants.into_iter().map(|v| Variant {
                id: v.id, options: v.options.0, price: v.price, stock: stock_from_column(v.stock), is_active: v.is_active,
            }).collect(),
        }))
    }

    async fn voucher(&mut self, code: &VoucherCode) -> Result<Option<Voucher>> {
        sqlx::query_as::<_, VoucherRow>("SELECT id, code, discount_type, discount_value, is_active, expires_at FROM vouchers WHERE code = $1")
            .bind(code.as_str()).fetch_optional(&mut *self.tx).await?
            .map(Voucher::try_from).transpose()
    }

    async fn address(&mut self, user_id: Uuid, address_id: Uuid) -> Result<Option<Address>> {
        Ok(sqlx::query_as::<_, Address>("SELECT id, user_id, recipient, phone, line1, line2, city FROM addresses WHERE id = $1 AND user_id = $2")
            .bind(address_id).bind(user_id).fetch_optional(&mut *self.tx).await?)
    }

    async fn delivery_fee(&mut self, city: &str) -> Result<Option<Decimal>> {
        Ok(sqlx::query_scalar::<_, Decimal>("SELECT fee FROM delivery_zones WHERE LOWER(city) = LOWER($1)")
            .bind(city.trim()).fetch_optional(&mut *self.tx).await?)
    }

    async fn decrement_stock(&mut self, product_id: Uuid, variant_id: Option<Uuid>, quantity: u32) -> Result<bool> {
        let quantity = quantity_to_column(quantity)?;
        let result = match variant_id {
            None => sqlx::query("UPDATE products SET stock = stock - $2 WHERE id = $1 AND stock >= $2")
                .bind(product_id).bind(quantity).execute(&mut *self.tx).await?,
            Some(variant_id) => sqlx::query("UPDATE product_variants SET stock = stock - $3 WHERE id = $2 AND product_id = $1 AND stock >= $3")
                .bind(product_id).bind(variant_id).bind(quantity).execute(&mut *self.tx).await?,
        };
        Ok(result.rows_affected() == 1)
    }

    async fn increment_stock(&mut self, product_id: Uuid, variant_id: Option<Uuid>, quantity: u32) -> Result<()> {
        let quantity = quantity_to_column(quantity)?;
        let result = match variant_id {
            None => sqlx::query("UPDATE products SET stock = stock + $2 WHERE id = $1")
                .bind(product_id).bind(quantity).execute(&mut *self.tx).await?,
            Some(variant_id) => sqlx::query("UPDATE product_variants SET stock = stock + $3 WHERE id = $2 AND product_id = $1")
                .bind(product_id).bind(variant_id).bind(quantity).execute(&mut *self.tx).await?,
        };
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("stock record for product {product_id}")));
        }
        Ok(())
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        let pricing = order.pricing();
        sqlx::query(&format!("INSERT INTO orders ({ORDER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)"))
            .bind(order.id()).bind(order.order_number().as_str()).bind(order.user_id()).bind(Json(order.items()))
            .bind(pricing.subtotal).bind(pricing.shipping).bind(pricing.tax).bind(pricing.discount).bind(pricing.total)
            .bind(Json(order.shipping()))
            .bind(order.payment().method.as_ref()).bind(order.payment().status.as_ref()).bind(order.payment().transaction_id.as_deref())
            .bind(order.delivery_status().as_ref()).bind(Json(order.timeline()))
            .bind(order.voucher_id()).bind(order.created_at()).bind(order.updated_at)
            .execute(&mut *self.tx).await
            .map_err(|e| match e {
                sqlx::Error::Database(db) if db.is_unique_violation() => AppError::Conflict(format!("order number {} already exists", order.order_number())),
                other => AppError::from(other),
            })?;
        Ok(())
    }

    async fn order(&mut self, order_number: &str) -> Result<Option<Order>> {
        sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE order_number = $1"))
            .bind(order_number).fetch_optional(&mut *self.tx).await?
            .map(Order::try_from).transpose()
    }

    async fn lock_order(&mut self, order_number: &str) -> Result<Option<Order>> {
        sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE order_number = $1 FOR UPDATE"))
            .bind(order_number).fetch_optional(&mut *self.tx).await?
            .map(Order::try_from).transpose()
    }

    async fn orders_for_user(&mut self, user_id: Uuid) -> Result<Vec<Order>> {
        sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC"))
            .bind(user_id).fetch_all(&mut *self.tx).await?
            .into_iter().map(Order::try_from).collect()
    }

    async fn save_order_status(&mut self, order: &Order) -> Result<()> {
        let result = sqlx::query(
            "UPDATE orders SET payment_status = $2, transaction_id = $3, delivery_status = $4, timeline = $5, updated_at = $6 WHERE id = $1",
        )
            .bind(order.id()).bind(order.payment().status.as_ref()).bind(order.payment().transaction_id.as_deref())
            .bind(order.delivery_status().as_ref()).bind(Json(order.timeline())).bind(order.updated_at)
            .execute(&mut *self.tx).await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("order {}", order.order_number())));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
