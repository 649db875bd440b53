//! Cart store operations.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;
use crate::domain::aggregates::{Cart, CartLine, CartOwner};
use crate::domain::value_objects::GuestToken;
use crate::error::{AppError, Result};
use crate::store::{Store, StoreTx};

/// Who is asking for a cart: an optional authenticated user and an optional
/// guest token presented by the client.
#[derive(Clone, Debug, Default)]
pub struct CartIdentity {
    pub user_id: Option<Uuid>,
    pub guest_token: Option<GuestToken>,
}

#[derive(Clone, Debug)]
pub struct AddLine {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub quantity: u32,
}

#[derive(Clone)]
pub struct CartService {
    store: Arc<dyn Store>,
    guest_cart_ttl: Duration,
}

impl CartService {
    pub fn new(store: Arc<dyn Store>, guest_cart_ttl: Duration) -> Self {
        Self { store, guest_cart_ttl }
    }

    /// Returns the caller's cart, creating it on first use and folding a
    /// guest cart into the user's cart once the guest has logged in.
    #[instrument(skip(self))]
    pub async fn get_or_create(&self, identity: &CartIdentity) -> Result<Cart> {
        let mut tx = self.store.begin().await?;
        let cart = self.resolve(tx.as_mut(), identity).await?;
        tx.commit().await?;
        Ok(cart)
    }

    /// Adds units of a product (or variant). Stock is only soft-checked here;
    /// checkout makes the binding reservation.
    #[instrument(skip(self))]
    pub async fn add_line(&self, identity: &CartIdentity, add: AddLine) -> Result<Cart> {
        if add.quantity == 0 { return Err(AppError::Validation("quantity must be at least 1".into())); }
        let mut tx = self.store.begin().await?;
        let mut cart = self.resolve(tx.as_mut(), identity).await?;
        let product = tx.product(add.product_id).await?
            .ok_or_else(|| AppError::NotFound(format!("product {}", add.product_id)))?;
        let item = product.select(add.variant_id)?;
        let wanted = cart.quantity_of(add.product_id, add.variant_id).saturating_add(add.quantity);
        if wanted > item.available() {
            return Err(AppError::InsufficientStock { product_id: product.id, variant_id: add.variant_id, name: product.name.clone(), requested: wanted });
        }
        cart.add_line(CartLine {
            product_id: product.id,
            variant_id: add.variant_id,
            quantity: add.quantity,
            unit_price: item.unit_price(),
            name: product.name.clone(),
            image: product.image.clone(),
            variant_options: item.variant.map(|v| v.options.clone()),
        })?;
        tx.save_cart(&cart).await?;
        tx.commit().await?;
        Ok(cart)
    }

    /// Overwrites a line's quantity; zero removes the line.
    #[instrument(skip(self))]
    pub async fn set_line_quantity(&self, identity: &CartIdentity, product_id: Uuid, variant_id: Option<Uuid>, quantity: u32) -> Result<Cart> {
        let mut tx = self.store.begin().await?;
        let mut cart = self.resolve(tx.as_mut(), identity).await?;
        if quantity > cart.quantity_of(product_id, variant_id) {
            if let Some(product) = tx.product(product_id).await? {
                let available = product.select(variant_id)?.available();
                if quantity > available {
                    return Err(AppError::InsufficientStock { product_id, variant_id, name: product.name.clone(), requested: quantity });
                }
            }
        }
        cart.set_quantity(product_id, variant_id, quantity)?;
        tx.save_cart(&cart).await?;
        tx.commit().await?;
        Ok(cart)
    }

    #[instrument(skip(self))]
    pub async fn remove_line(&self, identity: &CartIdentity, product_id: Uuid, variant_id: Option<Uuid>) -> Result<Cart> {
        let mut tx = self.store.begin().await?;
        let mut cart = self.resolve(tx.as_mut(), identity).await?;
        cart.remove_line(product_id, variant_id)?;
        tx.save_cart(&cart).await?;
        tx.commit().await?;
        Ok(cart)
    }

    /// Deletes guest carts that have been idle longer than the retention
    /// window.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut tx = self.store.begin().await?;
        let purged = tx.purge_guest_carts(now - self.guest_cart_ttl).await?;
        tx.commit().await?;
        if purged > 0 { info!(purged, "expired guest carts removed"); }
        Ok(purged)
    }

    async fn live_guest_cart(&self, tx: &mut dyn StoreTx, token: &GuestToken) -> Result<Option<Cart>> {
        match tx.lock_cart_by_guest_token(token).await? {
            Some(cart) if cart.is_expired(Utc::now(), self.guest_cart_ttl) => {
                debug!(cart_id = %cart.id(), "guest cart expired");
                tx.delete_cart(cart.id()).await?;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    async fn resolve(&self, tx: &mut dyn StoreTx, identity: &CartIdentity) -> Result<Cart> {
        let guest = match &identity.guest_token {
            Some(token) => self.live_guest_cart(tx, token).await?,
            None => None,
        };
        match identity.user_id {
            Some(user_id) => {
                let mut cart = match tx.lock_cart_by_user(user_id).await? {
                    Some(cart) => cart,
                    None => tx.upsert_cart(&CartOwner::User(user_id)).await?,
                };
                if let Some(guest) = guest {
                    info!(user_id = %user_id, guest_cart = %guest.id(), lines = guest.lines().len(), "merging guest cart");
                    let guest_id = guest.id();
                    cart.absorb(guest);
                    tx.delete_cart(guest_id).await?;
                    tx.save_cart(&cart).await?;
                }
                Ok(cart)
            }
            None => match guest {
                Some(mut cart) => {
                    cart.mark_active();
                    tx.save_cart(&cart).await?;
                    Ok(cart)
                }
                None => {
                    // A presented token is reused so concurrent first requests
                    // from one session land on the same row.
                    let token = identity.guest_token.clone().unwrap_or_else(GuestToken::mint);
                    tx.upsert_cart(&CartOwner::Guest(token)).await
                }
            },
        }
    }
}
