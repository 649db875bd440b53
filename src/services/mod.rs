//! Application services. Each public operation opens one store transaction,
//! applies domain rules and commits; notifications go out after commit.

pub mod cart;
pub mod checkout;
pub mod inventory;
pub mod orders;
pub mod pricing;
pub mod vouchers;
pub mod webhook;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;
use crate::config::Config;
use crate::notify::Notifier;
use crate::store::Store;

pub use cart::{AddLine, CartIdentity, CartService};
pub use checkout::{CheckoutService, PlaceOrder};
pub use orders::{OrderService, StatusUpdate, Viewer};
pub use vouchers::VoucherQuote;
pub use webhook::{WebhookOutcome, WebhookService};

/// The service set shared by every request handler.
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn Store>,
    pub carts: CartService,
    pub checkout: CheckoutService,
    pub orders: OrderService,
    pub webhooks: WebhookService,
}

impl Services {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>, config: &Config) -> Self {
        Self {
            carts: CartService::new(Arc::clone(&store), config.guest_cart_ttl),
            checkout: CheckoutService::new(Arc::clone(&store), Arc::clone(&notifier), config.cart_clear_policy),
            orders: OrderService::new(Arc::clone(&store), Arc::clone(&notifier)),
            webhooks: WebhookService::new(Arc::clone(&store), notifier, config.payment_webhook_secret.clone(), config.cart_clear_policy),
            store,
        }
    }
}
