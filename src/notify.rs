//! Outbound notifications. Fire-and-forget: failures are logged and never
//! reach the caller.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;
use crate::domain::events::OrderEvent;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "user_id", rename_all = "snake_case")]
pub enum NotifyTarget {
    User(Uuid),
    Admins,
}

impl NotifyTarget {
    pub fn subject(&self) -> String {
        match self {
            Self::User(id) => format!("notifications.user.{id}"),
            Self::Admins => "notifications.admins".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub url: String,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification transport error: {0}")]
    Transport(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn notify(&self, target: &NotifyTarget, notification: &Notification) -> Result<(), NotifyError>;
}

/// Publishes notifications as JSON on NATS for the delivery service to pick up.
#[derive(Clone)]
pub struct NatsNotifier {
    client: async_nats::Client,
}

impl NatsNotifier {
    pub async fn connect(url: &str) -> Result<Self, NotifyError> {
        let client = async_nats::connect(url).await.map_err(|e| NotifyError::Transport(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Notifier for NatsNotifier {
    async fn notify(&self, target: &NotifyTarget, notification: &Notification) -> Result<(), NotifyError> {
        let payload = serde_json::to_vec(notification)?;
        self.client.publish(target.subject(), payload.into()).await.map_err(|e| NotifyError::Transport(e.to_string()))
    }
}

/// Used when no broker is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, target: &NotifyTarget, notification: &Notification) -> Result<(), NotifyError> {
        tracing::info!(subject = %target.subject(), title = %notification.title, "notification");
        Ok(())
    }
}

/// Who hears about an order event, and what they are told.
pub fn notifications_for(event: &OrderEvent) -> Vec<(NotifyTarget, Notification)> {
    let number = event.order_number();
    let url = format!("/orders/{number}");
    match event {
        OrderEvent::Placed { user_id, total, .. } => vec![
            (NotifyTarget::User(*user_id), Notification {
                title: "Order confirmed".into(), body: format!("Your order {number} has been received."), url: url.clone(),
            }),
            (NotifyTarget::Admins, Notification {
                title: "New order".into(), body: format!("Order {number} was placed for {total}."), url: format!("/admin{url}"),
            }),
        ],
        OrderEvent::PaymentCompleted { user_id, .. } => vec![(NotifyTarget::User(*user_id), Notification {
            title: "Payment received".into(), body: format!("We have received payment for order {number}."), url,
        })],
        OrderEvent::DeliveryStatusChanged { user_id, status, .. } => vec![(NotifyTarget::User(*user_id), Notification {
            title: "Order update".into(), body: format!("Order {number}: {}.", status.stage().title), url,
        })],
        OrderEvent::Cancelled { user_id, .. } => vec![(NotifyTarget::User(*user_id), Notification {
            title: "Order cancelled".into(), body: format!("Order {number} has been cancelled."), url,
        })],
    }
}

/// Sends the notifications for committed events in the background.
pub fn dispatch(notifier: Arc<dyn Notifier>, events: Vec<OrderEvent>) {
    for (target, notification) in events.iter().flat_map(notifications_for) {
        let notifier = Arc::clone(&notifier);
        tokio::spawn(async move {
            if let Err(e) = notifier.notify(&target, &notification).await {
                tracing::warn!(error = %e, subject = %target.subject(), "notification failed");
            }
        });
    }
}
