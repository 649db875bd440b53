//! Payment provider webhook reconciliation.
//!
//! Deliveries are at-least-once and may arrive out of order. The order row is
//! locked for the duration of the update and a completed payment is never
//! touched again, so duplicates are harmless.

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha512;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use crate::config::CartClearPolicy;
use crate::domain::aggregates::{DeliveryStatus, PaymentMethod};
use crate::error::{AppError, Result};
use crate::notify::{self, Notifier};
use crate::store::Store;

type HmacSha512 = Hmac<Sha512>;

pub const SIGNATURE_HEADER: &str = "x-paystack-signature";
pub const CHARGE_SUCCEEDED: &str = "charge.success";

#[derive(Debug, Deserialize)]
struct PaymentEvent {
    event: String,
    #[serde(default)]
    data: Option<ChargeData>,
}

#[derive(Debug, Deserialize)]
struct ChargeData {
    reference: String,
    #[serde(default)]
    metadata: Option<ChargeMetadata>,
}

#[derive(Debug, Deserialize)]
struct ChargeMetadata {
    order_id: Option<String>,
}

/// What a delivery did. Every variant is acknowledged to the provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Applied { order_number: String },
    AlreadyApplied { order_number: String },
    Ignored { event: String },
}

/// Lowercase hex HMAC-SHA512 of `body`, as the provider computes it.
pub fn sign(secret: &str, body: &[u8]) -> Result<String> {
    let mut mac = HmacSha512::new_from_slice(secret.as_bytes()).map_err(|e| AppError::Internal(e.to_string()))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of a hex signature. Malformed hex never matches.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else { return false };
    let Ok(mut mac) = HmacSha512::new_from_slice(secret.as_bytes()) else { return false };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

#[derive(Clone)]
pub struct WebhookService {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    secret: String,
    cart_clear_policy: CartClearPolicy,
}

impl WebhookService {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>, secret: impl Into<String>, cart_clear_policy: CartClearPolicy) -> Self {
        Self { store, notifier, secret: secret.into(), cart_clear_policy }
    }

    /// Verifies and applies one provider delivery. The signature is checked
    /// before anything is parsed or read from storage.
    #[instrument(skip_all)]
    pub async fn handle_payment_event(&self, raw_body: &[u8], signature: Option<&str>) -> Result<WebhookOutcome> {
        let verified = signature.is_some_and(|sig| verify_signature(&self.secret, raw_body, sig));
        if !verified {
            warn!(present = signature.is_some(), "payment webhook signature rejected");
            return Err(AppError::InvalidSignature);
        }

        let event: PaymentEvent = serde_json::from_slice(raw_body)
            .map_err(|e| AppError::Validation(format!("malformed payment event: {e}")))?;
        if event.event != CHARGE_SUCCEEDED {
            info!(event = %event.event, "payment event ignored");
            return Ok(WebhookOutcome::Ignored { event: event.event });
        }
        let Some((reference, order_number)) = event.data.and_then(|d| {
            let order_id = d.metadata.and_then(|m| m.order_id)?;
            Some((d.reference, order_id))
        }) else {
            warn!("charge event carries no order id");
            return Ok(WebhookOutcome::Ignored { event: event.event });
        };

        self.apply_charge(&order_number, &reference).await
    }

    async fn apply_charge(&self, order_number: &str, reference: &str) -> Result<WebhookOutcome> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let Some(mut order) = tx.lock_order(order_number).await? else {
            return Err(AppError::UnknownOrder(order_number.to_string()));
        };

        if !order.confirm_payment(reference, now)? {
            info!(order_number, reference, "duplicate payment confirmation");
            return Ok(WebhookOutcome::AlreadyApplied { order_number: order_number.to_string() });
        }
        tx.save_order_status(&order).await?;

        if self.cart_clear_policy == CartClearPolicy::Payment && order.payment().method == PaymentMethod::Card {
            if let Some(mut cart) = tx.lock_cart_by_user(order.user_id()).await? {
                for item in order.items() {
                    cart.deduct(item.product_id, item.variant_id, item.quantity);
                }
                tx.save_cart(&cart).await?;
            }
        }
        tx.commit().await?;

        if order.delivery_status() == DeliveryStatus::Cancelled {
            error!(order_number, reference, total = %order.pricing().total, "payment captured on cancelled order, refund required");
        } else {
            info!(order_number, reference, delivery = %order.delivery_status(), "payment confirmed");
        }
        notify::dispatch(Arc::clone(&self.notifier), order.take_events());
        Ok(WebhookOutcome::Applied { order_number: order_number.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{DeliveryStatus, PaymentStatus};
    use crate::notify::LogNotifier;
    use crate::services::orders::{StatusUpdate, Viewer};
    use crate::services::testing::{Fixture, WEBHOOK_SECRET};
    use crate::store::StoreTx;
    use async_trait::async_trait;
    use serde_json::json;

    fn charge(order_number: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "event": "charge.success",
            "data": { "reference": "T-100", "metadata": { "order_id": order_number } }
        })).unwrap()
    }

    struct UnreachableStore;

    #[async_trait]
    impl Store for UnreachableStore {
        async fn begin(&self) -> Result<Box<dyn StoreTx>> {
            panic!("storage touched before signature verification");
        }
    }

    #[test]
    fn test_signature_roundtrip_and_malformed_hex() {
        let body = b"{\"event\":\"charge.success\"}";
        let sig = sign("secret", body).unwrap();
        assert_eq!(sig.len(), 128);
        assert!(verify_signature("secret", body, &sig));
        assert!(!verify_signature("other", body, &sig));
        assert!(!verify_signature("secret", body, "not-hex"));
        assert!(!verify_signature("secret", body, ""));
    }

    #[tokio::test]
    async fn test_tampered_body_rejected_before_storage() {
        let service = WebhookService::new(Arc::new(UnreachableStore), Arc::new(LogNotifier), WEBHOOK_SECRET, CartClearPolicy::Placement);
        let body = charge("ORD-260101-AAAAAA");
        let sig = sign(WEBHOOK_SECRET, &body).unwrap();
        let mut tampered = body.clone();
        tampered.extend_from_slice(b" ");
        assert!(matches!(service.handle_payment_event(&tampered, Some(&sig)).await, Err(AppError::InvalidSignature)));
        assert!(matches!(service.handle_payment_event(&body, None).await, Err(AppError::InvalidSignature)));
    }

    #[tokio::test]
    async fn test_duplicate_delivery_is_a_no_op() {
        let fx = Fixture::new().await;
        fx.fill_cart(&[(fx.mug, 2)]).await;
        let order = fx.checkout.place_order(fx.place(PaymentMethod::Card, None)).await.unwrap();
        let number = order.order_number().to_string();
        let body = charge(&number);
        let sig = sign(WEBHOOK_SECRET, &body).unwrap();

        let first = fx.webhooks.handle_payment_event(&body, Some(&sig)).await.unwrap();
        assert_eq!(first, WebhookOutcome::Applied { order_number: number.clone() });
        let after_first = fx.orders.get(&number, Viewer::Admin).await.unwrap();

        let second = fx.webhooks.handle_payment_event(&body, Some(&sig)).await.unwrap();
        assert_eq!(second, WebhookOutcome::AlreadyApplied { order_number: number.clone() });
        let after_second = fx.orders.get(&number, Viewer::Admin).await.unwrap();

        assert_eq!(after_second.payment().status, PaymentStatus::Completed);
        assert_eq!(after_second.payment().transaction_id.as_deref(), Some("T-100"));
        assert_eq!(after_second.delivery_status(), DeliveryStatus::Processing);
        assert_eq!(after_second.timeline(), after_first.timeline());
        assert_eq!(after_second.timeline().events().len(), 2);
        assert_eq!(fx.store.stock(fx.mug, None).await, Some(8));
    }

    #[tokio::test]
    async fn test_payment_on_cancelled_order_stays_cancelled() {
        let fx = Fixture::new().await;
        fx.fill_cart(&[(fx.mug, 2)]).await;
        let order = fx.checkout.place_order(fx.place(PaymentMethod::Card, None)).await.unwrap();
        let number = order.order_number().to_string();
        let cancel = StatusUpdate { delivery_status: Some(DeliveryStatus::Cancelled), ..Default::default() };
        fx.orders.update_status(&number, cancel).await.unwrap();

        let body = charge(&number);
        let sig = sign(WEBHOOK_SECRET, &body).unwrap();
        let outcome = fx.webhooks.handle_payment_event(&body, Some(&sig)).await.unwrap();
        assert_eq!(outcome, WebhookOutcome::Applied { order_number: number.clone() });

        let paid = fx.orders.get(&number, Viewer::Admin).await.unwrap();
        assert_eq!(paid.delivery_status(), DeliveryStatus::Cancelled);
        assert_eq!(paid.payment().status, PaymentStatus::Completed);
        assert_eq!(fx.store.stock(fx.mug, None).await, Some(10));
    }

    #[tokio::test]
    async fn test_unknown_order_reported() {
        let fx = Fixture::new().await;
        let body = charge("ORD-000000-GHOST0");
        let sig = sign(WEBHOOK_SECRET, &body).unwrap();
        assert!(matches!(fx.webhooks.handle_payment_event(&body, Some(&sig)).await, Err(AppError::UnknownOrder(_))));
    }

    #[tokio::test]
    async fn test_other_events_ignored() {
        let fx = Fixture::new().await;
        let body = serde_json::to_vec(&json!({ "event": "transfer.success", "data": { "reference": "X" } })).unwrap();
        let sig = sign(WEBHOOK_SECRET, &body).unwrap();
        let outcome = fx.webhooks.handle_payment_event(&body, Some(&sig)).await.unwrap();
        assert_eq!(outcome, WebhookOutcome::Ignored { event: "transfer.success".into() });

        let garbage = b"not json".to_vec();
        let sig = sign(WEBHOOK_SECRET, &garbage).unwrap();
        assert!(matches!(fx.webhooks.handle_payment_event(&garbage, Some(&sig)).await, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_deferred_cart_clearing_on_payment() {
        let fx = Fixture::with_policy(CartClearPolicy::Payment).await;
        fx.fill_cart(&[(fx.mug, 2)]).await;
        let order = fx.checkout.place_order(fx.place(PaymentMethod::Card, None)).await.unwrap();
        fx.fill_cart(&[(fx.lamp, 1)]).await;

        let body = charge(order.order_number().as_str());
        let sig = sign(WEBHOOK_SECRET, &body).unwrap();
        fx.webhooks.handle_payment_event(&body, Some(&sig)).await.unwrap();

        let cart = fx.carts.get_or_create(&fx.identity()).await.unwrap();
        assert_eq!(cart.quantity_of(fx.mug, None), 0);
        assert_eq!(cart.quantity_of(fx.lamp, None), 1);
    }
}
