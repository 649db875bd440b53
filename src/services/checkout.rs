//! Checkout: turns the caller's cart into an order in one transaction.

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use crate::config::CartClearPolicy;
use crate::domain::aggregates::{NewOrder, Order, OrderLine, PaymentMethod, ShippingSnapshot};
use crate::domain::value_objects::VoucherCode;
use crate::error::{AppError, Result};
use crate::notify::{self, Notifier};
use crate::services::{inventory, pricing, vouchers};
use crate::store::Store;

#[derive(Clone, Debug)]
pub struct PlaceOrder {
    pub user_id: Uuid,
    pub address_id: Uuid,
    pub payment_method: PaymentMethod,
    pub voucher_code: Option<VoucherCode>,
}

#[derive(Clone)]
pub struct CheckoutService {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    cart_clear_policy: CartClearPolicy,
}

impl CheckoutService {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>, cart_clear_policy: CartClearPolicy) -> Self {
        Self { store, notifier, cart_clear_policy }
    }

    /// Validates the voucher, prices the cart, reserves stock and writes the
    /// order. Any failure leaves stock, vouchers and the cart untouched.
    #[instrument(skip(self), fields(user_id = %req.user_id))]
    pub async fn place_order(&self, req: PlaceOrder) -> Result<Order> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;

        let mut cart = tx.lock_cart_by_user(req.user_id).await?
            .ok_or_else(|| AppError::NotFound("cart".into()))?;
        if cart.is_empty() {
            return Err(AppError::Validation("cart is empty".into()));
        }
        let address = tx.address(req.user_id, req.address_id).await?
            .ok_or_else(|| AppError::NotFound(format!("address {}", req.address_id)))?;
        let shipping_fee = tx.delivery_fee(&address.city).await?
            .ok_or_else(|| AppError::Validation(format!("no delivery to {}", address.city)))?;
        let voucher = match &req.voucher_code {
            Some(code) => Some(vouchers::validate(tx.as_mut(), code, now).await?),
            None => None,
        };

        let pricing = pricing::compute(cart.lines(), shipping_fee, voucher.as_ref());
        let items: Vec<OrderLine> = cart.lines().iter().map(OrderLine::from).collect();
        inventory::reserve(tx.as_mut(), &items).await?;

        let mut order = Order::place(NewOrder {
            user_id: req.user_id,
            items,
            pricing,
            shipping: ShippingSnapshot::from(&address),
            payment_method: req.payment_method,
            voucher_id: voucher.as_ref().map(|v| v.id),
        }, now);
        tx.insert_order(&order).await?;

        if self.clears_at_placement(req.payment_method) {
            cart.clear();
            tx.save_cart(&cart).await?;
        }
        tx.commit().await?;

        info!(order_number = %order.order_number(), total = %order.pricing().total, method = %req.payment_method, "order placed");
        notify::dispatch(Arc::clone(&self.notifier), order.take_events());
        Ok(order)
    }

    fn clears_at_placement(&self, method: PaymentMethod) -> bool {
        !(self.cart_clear_policy == CartClearPolicy::Payment && method.requires_confirmation())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{DeliveryStatus, PaymentStatus, VoucherRejection};
    use crate::services::cart::AddLine;
    use crate::services::testing::Fixture;
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn test_place_order_prices_reserves_and_clears_cart() {
        let fx = Fixture::new().await;
        fx.fill_cart(&[(fx.mug, 2)]).await;
        let order = fx.checkout.place_order(fx.place(PaymentMethod::CashOnDelivery, None)).await.unwrap();

        // 2 x 400 + 16% VAT + 200 shipping
        assert_eq!(order.pricing().subtotal, Decimal::new(800, 0));
        assert_eq!(order.pricing().tax, Decimal::new(128, 0));
        assert_eq!(order.pricing().total, Decimal::new(1128, 0));
        assert_eq!(order.delivery_status(), DeliveryStatus::Confirmed);
        assert_eq!(order.payment().status, PaymentStatus::Pending);
        assert_eq!(order.shipping().city, "Nairobi");
        assert_eq!(fx.store.stock(fx.mug, None).await, Some(8));
        assert!(fx.carts.get_or_create(&fx.identity()).await.unwrap().is_empty());
        assert_eq!(fx.store.order_count().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_checkouts_of_one_cart_place_one_order() {
        let fx = Fixture::new().await;
        fx.fill_cart(&[(fx.mug, 2)]).await;
        let (a, b) = tokio::join!(
            fx.checkout.place_order(fx.place(PaymentMethod::CashOnDelivery, None)),
            fx.checkout.place_order(fx.place(PaymentMethod::CashOnDelivery, None)),
        );
        let (placed, rejected): (Vec<_>, Vec<_>) = [a, b].into_iter().partition(|r| r.is_ok());
        assert_eq!(placed.len(), 1);
        assert!(matches!(rejected[0], Err(AppError::Validation(_))));
        assert_eq!(fx.store.order_count().await, 1);
        assert_eq!(fx.store.stock(fx.mug, None).await, Some(8));
    }

    #[tokio::test]
    async fn test_variant_line_reserves_variant_stock() {
        let fx = Fixture::new().await;
        fx.carts.add_line(&fx.identity(), AddLine { product_id: fx.tee, variant_id: Some(fx.tee_medium), quantity: 3 }).await.unwrap();
        let order = fx.checkout.place_order(fx.place(PaymentMethod::Card, None)).await.unwrap();
        assert_eq!(order.items()[0].variant_id, Some(fx.tee_medium));
        assert_eq!(fx.store.stock(fx.tee, Some(fx.tee_medium)).await, Some(1));
        assert_eq!(fx.store.stock(fx.tee, None).await, Some(0));
    }

    #[tokio::test]
    async fn test_short_variant_stock_rolls_back() {
        let fx = Fixture::new().await;
        fx.fill_cart(&[(fx.mug, 1)]).await;
        fx.carts.add_line(&fx.identity(), AddLine { product_id: fx.tee, variant_id: Some(fx.tee_medium), quantity: 2 }).await.unwrap();
        fx.store.set_stock(fx.tee, Some(fx.tee_medium), 1).await;

        let err = fx.checkout.place_order(fx.place(PaymentMethod::Card, None)).await.unwrap_err();
        assert!(matches!(err, AppError::InsufficientStock { variant_id: Some(v), .. } if v == fx.tee_medium));
        assert_eq!(fx.store.stock(fx.mug, None).await, Some(10));
        assert_eq!(fx.store.stock(fx.tee, Some(fx.tee_medium)).await, Some(1));
        assert_eq!(fx.store.order_count().await, 0);
    }

    #[tokio::test]
    async fn test_failed_reservation_rolls_back_everything() {
        let fx = Fixture::new().await;
        fx.fill_cart(&[(fx.mug, 3), (fx.lamp, 1)]).await;
        fx.store.set_stock(fx.lamp, None, 0).await;

        let err = fx.checkout.place_order(fx.place(PaymentMethod::Card, None)).await.unwrap_err();
        match err {
            AppError::InsufficientStock { product_id, name, .. } => {
                assert_eq!(product_id, fx.lamp);
                assert_eq!(name, "Desk Lamp");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(fx.store.stock(fx.mug, None).await, Some(10));
        assert_eq!(fx.store.order_count().await, 0);
        assert_eq!(fx.carts.get_or_create(&fx.identity()).await.unwrap().lines().len(), 2);
    }

    #[tokio::test]
    async fn test_voucher_applied_and_recorded() {
        let fx = Fixture::new().await;
        fx.fill_cart(&[(fx.mug, 2), (fx.lamp, 1)]).await;
        let code = VoucherCode::new("flat100").unwrap();
        let order = fx.checkout.place_order(fx.place(PaymentMethod::Card, Some(code))).await.unwrap();
        assert_eq!(order.pricing().subtotal, Decimal::new(1000, 0));
        assert_eq!(order.pricing().discount, Decimal::new(100, 0));
        assert_eq!(order.pricing().total, Decimal::new(1260, 0));
        assert_eq!(order.voucher_id(), Some(fx.flat100));
    }

    #[tokio::test]
    async fn test_rejected_voucher_places_nothing() {
        let fx = Fixture::new().await;
        fx.fill_cart(&[(fx.mug, 1)]).await;
        let code = VoucherCode::new("OLDNEWS").unwrap();
        let err = fx.checkout.place_order(fx.place(PaymentMethod::Card, Some(code))).await.unwrap_err();
        assert!(matches!(err, AppError::VoucherRejected(VoucherRejection::Expired)));
        assert_eq!(fx.store.stock(fx.mug, None).await, Some(10));
        assert_eq!(fx.store.order_count().await, 0);
    }

    #[tokio::test]
    async fn test_empty_cart_and_unknown_zone() {
        let fx = Fixture::new().await;
        fx.carts.get_or_create(&fx.identity()).await.unwrap();
        assert!(matches!(fx.checkout.place_order(fx.place(PaymentMethod::Card, None)).await, Err(AppError::Validation(_))));

        fx.carts.add_line(&fx.identity(), AddLine { product_id: fx.mug, variant_id: None, quantity: 1 }).await.unwrap();
        let req = PlaceOrder { address_id: fx.remote_address, ..fx.place(PaymentMethod::Card, None) };
        assert!(matches!(fx.checkout.place_order(req).await, Err(AppError::Validation(_))));
        let req = PlaceOrder { address_id: Uuid::new_v4(), ..fx.place(PaymentMethod::Card, None) };
        assert!(matches!(fx.checkout.place_order(req).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_payment_policy_keeps_card_cart() {
        let fx = Fixture::with_policy(CartClearPolicy::Payment).await;
        fx.fill_cart(&[(fx.mug, 1)]).await;
        fx.checkout.place_order(fx.place(PaymentMethod::Card, None)).await.unwrap();
        assert_eq!(fx.carts.get_or_create(&fx.identity()).await.unwrap().quantity_of(fx.mug, None), 1);

        fx.checkout.place_order(fx.place(PaymentMethod::CashOnDelivery, None)).await.unwrap();
        assert!(fx.carts.get_or_create(&fx.identity()).await.unwrap().is_empty());
    }
}
