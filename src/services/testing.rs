//! Seeded in-memory storefront shared by the service and router tests.

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;
use crate::config::{CartClearPolicy, Config, LogFormat};
use crate::domain::aggregates::{Address, DiscountType, PaymentMethod, Product, Variant, Voucher};
use crate::domain::value_objects::VoucherCode;
use crate::notify::LogNotifier;
use crate::services::{AddLine, CartIdentity, CartService, CheckoutService, OrderService, PlaceOrder, Services, WebhookService};
use crate::store::MemoryStore;

pub const WEBHOOK_SECRET: &str = "sk_test_storefront";

pub fn config(cart_clear_policy: CartClearPolicy) -> Config {
    Config {
        database_url: None,
        database_max_connections: 1,
        nats_url: None,
        port: 0,
        payment_webhook_secret: WEBHOOK_SECRET.into(),
        cart_clear_policy,
        guest_cart_ttl: Duration::days(30),
        cart_sweep_interval_secs: 3600,
        log_format: LogFormat::Pretty,
    }
}

pub struct Fixture {
    pub store: MemoryStore,
    pub services: Services,
    pub carts: CartService,
    pub checkout: CheckoutService,
    pub orders: OrderService,
    pub webhooks: WebhookService,
    pub user_id: Uuid,
    /// Address in a city with a delivery zone (fee 200).
    pub address_id: Uuid,
    /// Address in a city nobody delivers to.
    pub remote_address: Uuid,
    /// Price 400, stock 10.
    pub mug: Uuid,
    /// Price 200, stock 1.
    pub lamp: Uuid,
    /// Sized product; only the medium variant is stocked.
    pub tee: Uuid,
    pub tee_medium: Uuid,
    /// Id of the active `FLAT100` voucher. `OLDNEWS` is expired.
    pub flat100: Uuid,
}

impl Fixture {
    pub async fn new() -> Self { Self::with_policy(CartClearPolicy::Placement).await }

    pub async fn with_policy(policy: CartClearPolicy) -> Self {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        let (mug, lamp, tee, tee_medium) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let (address_id, remote_address, flat100) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        store.put_product(simple(mug, "Coffee Mug", 400, 10)).await;
        store.put_product(simple(lamp, "Desk Lamp", 200, 1)).await;
        store.put_product(Product {
            id: tee, name: "Logo Tee".into(), price: Decimal::new(1500, 0), image: Some("/img/tee.png".into()), is_active: true, stock: 0,
            variants: vec![Variant {
                id: tee_medium, options: BTreeMap::from([("size".to_string(), "M".to_string())]),
                price: None, stock: 4, is_active: true,
            }],
        }).await;

        store.put_address(address(address_id, user_id, "Nairobi")).await;
        store.put_address(address(remote_address, user_id, "Kisumu")).await;
        store.put_delivery_zone("Nairobi", Decimal::new(200, 0)).await;

        store.put_voucher(Voucher {
            id: flat100, code: VoucherCode::new("FLAT100").unwrap(), discount_type: DiscountType::Fixed,
            discount_value: Decimal::new(100, 0), is_active: true, expires_at: None,
        }).await;
        store.put_voucher(Voucher {
            id: Uuid::new_v4(), code: VoucherCode::new("OLDNEWS").unwrap(), discount_type: DiscountType::Percentage,
            discount_value: Decimal::new(50, 0), is_active: true, expires_at: Some(Utc::now() - Duration::days(1)),
        }).await;

        let services = Services::new(Arc::new(store.clone()), Arc::new(LogNotifier), &config(policy));
        Self {
            carts: services.carts.clone(),
            checkout: services.checkout.clone(),
            orders: services.orders.clone(),
            webhooks: services.webhooks.clone(),
            services,
            store, user_id, address_id, remote_address, mug, lamp, tee, tee_medium, flat100,
        }
    }

    pub fn identity(&self) -> CartIdentity {
        CartIdentity { user_id: Some(self.user_id), guest_token: None }
    }

    pub async fn fill_cart(&self, lines: &[(Uuid, u32)]) {
        for &(product_id, quantity) in lines {
            self.carts.add_line(&self.identity(), AddLine { product_id, variant_id: None, quantity }).await.unwrap();
        }
    }

    pub fn place(&self, payment_method: PaymentMethod, voucher_code: Option<VoucherCode>) -> PlaceOrder {
        PlaceOrder { user_id: self.user_id, address_id: self.address_id, payment_method, voucher_code }
    }
}

fn simple(id: Uuid, name: &str, price: i64, stock: u32) -> Product {
    Product { id, name: name.into(), price: Decimal::new(price, 0), image: None, is_active: true, stock, variants: vec![] }
}

fn address(id: Uuid, user_id: Uuid, city: &str) -> Address {
    Address { id, user_id, recipient: "Wanjiku M.".into(), phone: Some("+254700000000".into()), line1: "12 Moi Avenue".into(), line2: None, city: city.into() }
}
