//! Catalog view consumed by the cart and checkout.
//!
//! The catalog itself is owned elsewhere; this is the narrow read model the
//! core needs: activity, price, snapshot fields and the stock pool.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub image: Option<String>,
    pub is_active: bool,
    pub stock: u32,
    pub variants: Vec<Variant>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Variant {
    pub id: Uuid,
    pub options: BTreeMap<String, String>,
    /// Overrides the product price when set.
    pub price: Option<Decimal>,
    pub stock: u32,
    pub is_active: bool,
}

/// The purchasable unit a cart line points at, resolved from a product and
/// an optional variant selection.
#[derive(Clone, Debug)]
pub struct Purchasable<'a> {
    pub product: &'a Product,
    pub variant: Option<&'a Variant>,
}

impl Purchasable<'_> {
    pub fn unit_price(&self) -> Decimal {
        self.variant.and_then(|v| v.price).unwrap_or(self.product.price)
    }
    pub fn available(&self) -> u32 {
        self.variant.map_or(self.product.stock, |v| v.stock)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProductError {
    #[error("product is not available for sale")]
    Inactive,
    #[error("a variant must be selected for this product")]
    VariantRequired,
    #[error("variant {0} does not belong to this product")]
    UnknownVariant(Uuid),
    #[error("this product has no variants")]
    NoVariants,
}

impl Product {
    pub fn requires_variant(&self) -> bool { !self.variants.is_empty() }

    /// Resolves a selection to something that can go into a cart.
    pub fn select(&self, variant_id: Option<Uuid>) -> Result<Purchasable<'_>, ProductError> {
        if !self.is_active { return Err(ProductError::Inactive); }
        match variant_id {
            None if self.requires_variant() => Err(ProductError::VariantRequired),
            None => Ok(Purchasable { product: self, variant: None }),
            Some(_) if !self.requires_variant() => Err(ProductError::NoVariants),
            Some(id) => {
                let variant = self.variants.iter().find(|v| v.id == id).ok_or(ProductError::UnknownVariant(id))?;
                if !variant.is_active { return Err(ProductError::Inactive); }
                Ok(Purchasable { product: self, variant: Some(variant) })
            }
        }
    }

    pub fn variant_mut(&mut self, variant_id: Uuid) -> Option<&mut Variant> {
        self.variants.iter_mut().find(|v| v.id == variant_id)
    }
}
