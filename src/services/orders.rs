//! Order reads and the admin status-update path.

use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use crate::domain::aggregates::{DeliveryStatus, Order, PaymentStatus};
use crate::error::{AppError, Result};
use crate::notify::{self, Notifier};
use crate::services::inventory;
use crate::store::Store;

/// The only order fields an admin may change.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatusUpdate {
    pub delivery_status: Option<DeliveryStatus>,
    pub payment_status: Option<PaymentStatus>,
}

/// Whose view of an order is being requested.
#[derive(Clone, Copy, Debug)]
pub enum Viewer {
    Customer(Uuid),
    Admin,
}

#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
}

impl OrderService {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Applies delivery and payment changes together and persists them in
    /// one write. The first move into `Cancelled` returns the order's stock.
    #[instrument(skip(self))]
    pub async fn update_status(&self, order_number: &str, update: StatusUpdate) -> Result<Order> {
        if update.delivery_status.is_none() && update.payment_status.is_none() {
            return Err(AppError::Validation("nothing to update".into()));
        }
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let mut order = tx.lock_order(order_number).await?
            .ok_or_else(|| AppError::NotFound(format!("order {order_number}")))?;

        if let Some(status) = update.delivery_status {
            let change = order.apply_delivery_status(status, now)?;
            if change.newly_cancelled {
                inventory::release(tx.as_mut(), order.items()).await?;
                info!(order_number, "order cancelled, stock released");
            }
        }
        if let Some(status) = update.payment_status {
            order.apply_payment_status(status, now);
        }
        tx.save_order_status(&order).await?;
        tx.commit().await?;

        info!(order_number, delivery = %order.delivery_status(), payment = %order.payment().status, "order status updated");
        notify::dispatch(Arc::clone(&self.notifier), order.take_events());
        Ok(order)
    }

    /// Customers only see their own orders; anything else is reported as
    /// missing.
    pub async fn get(&self, order_number: &str, viewer: Viewer) -> Result<Order> {
        let mut tx = self.store.begin().await?;
        let order = tx.order(order_number).await?
            .filter(|o| match viewer {
                Viewer::Admin => true,
                Viewer::Customer(user_id) => o.user_id() == user_id,
            })
            .ok_or_else(|| AppError::NotFound(format!("order {order_number}")))?;
        Ok(order)
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Order>> {
        let mut tx = self.store.begin().await?;
        tx.orders_for_user(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{EventStatus, PaymentMethod};
    use crate::services::cart::AddLine;
    use crate::services::testing::Fixture;

    #[tokio::test]
    async fn test_cancel_restocks_exactly_once() {
        let fx = Fixture::new().await;
        fx.fill_cart(&[(fx.mug, 3)]).await;
        let order = fx.checkout.place_order(fx.place(PaymentMethod::CashOnDelivery, None)).await.unwrap();
        let number = order.order_number().to_string();
        assert_eq!(fx.store.stock(fx.mug, None).await, Some(7));

        let cancel = StatusUpdate { delivery_status: Some(DeliveryStatus::Cancelled), ..Default::default() };
        let cancelled = fx.orders.update_status(&number, cancel).await.unwrap();
        assert_eq!(cancelled.delivery_status(), DeliveryStatus::Cancelled);
        assert_eq!(fx.store.stock(fx.mug, None).await, Some(10));

        let again = fx.orders.update_status(&number, cancel).await.unwrap();
        assert_eq!(fx.store.stock(fx.mug, None).await, Some(10));
        let cancellations = again.timeline().events().iter().filter(|e| e.title == "Order Cancelled").count();
        assert_eq!(cancellations, 1);

        let reopen = StatusUpdate { delivery_status: Some(DeliveryStatus::Processing), ..Default::default() };
        assert!(matches!(fx.orders.update_status(&number, reopen).await, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_cancel_restocks_variant() {
        let fx = Fixture::new().await;
        fx.carts.add_line(&fx.identity(), AddLine { product_id: fx.tee, variant_id: Some(fx.tee_medium), quantity: 3 }).await.unwrap();
        let order = fx.checkout.place_order(fx.place(PaymentMethod::CashOnDelivery, None)).await.unwrap();
        assert_eq!(fx.store.stock(fx.tee, Some(fx.tee_medium)).await, Some(1));

        let cancel = StatusUpdate { delivery_status: Some(DeliveryStatus::Cancelled), ..Default::default() };
        fx.orders.update_status(order.order_number().as_str(), cancel).await.unwrap();
        assert_eq!(fx.store.stock(fx.tee, Some(fx.tee_medium)).await, Some(4));
        assert_eq!(fx.store.stock(fx.tee, None).await, Some(0));
    }

    #[tokio::test]
    async fn test_combined_update_is_single_write() {
        let fx = Fixture::new().await;
        fx.fill_cart(&[(fx.mug, 1)]).await;
        let order = fx.checkout.place_order(fx.place(PaymentMethod::CashOnDelivery, None)).await.unwrap();
        let number = order.order_number().to_string();
        let update = StatusUpdate { delivery_status: Some(DeliveryStatus::InTransit), payment_status: Some(PaymentStatus::Completed) };
        fx.orders.update_status(&number, update).await.unwrap();

        let stored = fx.orders.get(&number, Viewer::Admin).await.unwrap();
        assert_eq!(stored.delivery_status(), DeliveryStatus::InTransit);
        assert_eq!(stored.payment().status, PaymentStatus::Completed);
        let current: Vec<_> = stored.timeline().events().iter().filter(|e| e.status == EventStatus::Current).collect();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].title, "In Transit");
    }

    #[tokio::test]
    async fn test_backward_move_reactivates_existing_stage() {
        let fx = Fixture::new().await;
        fx.fill_cart(&[(fx.mug, 1)]).await;
        let order = fx.checkout.place_order(fx.place(PaymentMethod::CashOnDelivery, None)).await.unwrap();
        let number = order.order_number().to_string();
        for status in [DeliveryStatus::Processing, DeliveryStatus::InTransit, DeliveryStatus::Processing] {
            let update = StatusUpdate { delivery_status: Some(status), ..Default::default() };
            fx.orders.update_status(&number, update).await.unwrap();
        }
        let stored = fx.orders.get(&number, Viewer::Admin).await.unwrap();
        let processing = stored.timeline().events().iter().filter(|e| e.title == "Processing").count();
        assert_eq!(processing, 1);
        assert_eq!(stored.timeline().current().unwrap().title, "Processing");
    }

    #[tokio::test]
    async fn test_unknown_order_and_empty_update() {
        let fx = Fixture::new().await;
        let cancel = StatusUpdate { delivery_status: Some(DeliveryStatus::Cancelled), ..Default::default() };
        assert!(matches!(fx.orders.update_status("ORD-000000-NOPE00", cancel).await, Err(AppError::NotFound(_))));
        assert!(matches!(fx.orders.update_status("ORD-000000-NOPE00", StatusUpdate::default()).await, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_customers_only_see_their_own_orders() {
        let fx = Fixture::new().await;
        fx.fill_cart(&[(fx.mug, 1)]).await;
        let order = fx.checkout.place_order(fx.place(PaymentMethod::Card, None)).await.unwrap();
        let number = order.order_number().to_string();
        assert!(fx.orders.get(&number, Viewer::Customer(fx.user_id)).await.is_ok());
        assert!(matches!(fx.orders.get(&number, Viewer::Customer(Uuid::new_v4())).await, Err(AppError::NotFound(_))));
        assert_eq!(fx.orders.list_for_user(fx.user_id).await.unwrap().len(), 1);
        assert!(fx.orders.list_for_user(Uuid::new_v4()).await.unwrap().is_empty());
    }
}
