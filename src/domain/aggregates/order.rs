//! Order Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;
use crate::domain::aggregates::cart::CartLine;
use crate::domain::aggregates::timeline::{DeliveryStatus, EventStatus, Timeline};
use crate::domain::events::OrderEvent;
use crate::domain::value_objects::OrderNumber;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum::EnumString, strum::Display, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentMethod {
    Card,
    CashOnDelivery,
}

impl PaymentMethod {
    /// Card payments wait for the provider; cash on delivery is confirmed
    /// straight away.
    pub fn initial_delivery_status(self) -> DeliveryStatus {
        match self {
            Self::Card => DeliveryStatus::Pending,
            Self::CashOnDelivery => DeliveryStatus::Confirmed,
        }
    }
    pub fn requires_confirmation(self) -> bool { matches!(self, Self::Card) }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, strum::EnumString, strum::Display, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Completed,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pricing {
    pub subtotal: Decimal,
    pub shipping: Decimal,
    pub tax: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
}

/// Immutable post-purchase counterpart of a cart line.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub name: String,
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_options: Option<BTreeMap<String, String>>,
    pub unit_price: Decimal,
    pub quantity: u32,
    pub line_total: Decimal,
}

impl From<&CartLine> for OrderLine {
    fn from(line: &CartLine) -> Self {
        Self {
            product_id: line.product_id, variant_id: line.variant_id, name: line.name.clone(), image: line.image.clone(),
            variant_options: line.variant_options.clone(), unit_price: line.unit_price, quantity: line.quantity,
            line_total: line.line_total(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Address {
    pub id: Uuid,
    pub user_id: Uuid,
    pub recipient: String,
    pub phone: Option<String>,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingSnapshot {
    pub recipient: String,
    pub phone: Option<String>,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
}

impl From<&Address> for ShippingSnapshot {
    fn from(a: &Address) -> Self {
        Self { recipient: a.recipient.clone(), phone: a.phone.clone(), line1: a.line1.clone(), line2: a.line2.clone(), city: a.city.clone() }
    }
}

/// Everything checkout has decided before the order exists.
#[derive(Clone, Debug)]
pub struct NewOrder {
    pub user_id: Uuid,
    pub items: Vec<OrderLine>,
    pub pricing: Pricing,
    pub shipping: ShippingSnapshot,
    pub payment_method: PaymentMethod,
    pub voucher_id: Option<Uuid>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Order {
    pub(crate) id: Uuid,
    pub(crate) order_number: OrderNumber,
    pub(crate) user_id: Uuid,
    pub(crate) items: Vec<OrderLine>,
    pub(crate) pricing: Pricing,
    pub(crate) shipping: ShippingSnapshot,
    pub(crate) payment: Payment,
    pub(crate) delivery_status: DeliveryStatus,
    pub(crate) timeline: Timeline,
    pub(crate) voucher_id: Option<Uuid>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub(crate) events: Vec<OrderEvent>,
}

/// Outcome of a delivery transition that callers may need to act on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeliveryChange {
    pub newly_cancelled: bool,
}

/// One row of the buyer-facing tracking view.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TrackingStep {
    pub title: String,
    pub description: String,
    pub status: EventStatus,
    pub timestamp: Option<DateTime<Utc>>,
}

impl Order {
    pub fn place(new: NewOrder, now: DateTime<Utc>) -> Self {
        let status = new.payment_method.initial_delivery_status();
        let mut order = Self {
            id: Uuid::now_v7(), order_number: OrderNumber::generate(now), user_id: new.user_id, items: new.items,
            pricing: new.pricing, shipping: new.shipping,
            payment: Payment { method: new.payment_method, status: PaymentStatus::Pending, transaction_id: None },
            delivery_status: status, timeline: Timeline::starting_at(status, now), voucher_id: new.voucher_id,
            created_at: now, updated_at: now, events: vec![],
        };
        order.raise_event(OrderEvent::Placed { order_number: order.order_number.clone(), user_id: order.user_id, total: order.pricing.total });
        order
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn order_number(&self) -> &OrderNumber { &self.order_number }
    pub fn user_id(&self) -> Uuid { self.user_id }
    pub fn items(&self) -> &[OrderLine] { &self.items }
    pub fn pricing(&self) -> &Pricing { &self.pricing }
    pub fn shipping(&self) -> &ShippingSnapshot { &self.shipping }
    pub fn payment(&self) -> &Payment { &self.payment }
    pub fn delivery_status(&self) -> DeliveryStatus { self.delivery_status }
    pub fn timeline(&self) -> &Timeline { &self.timeline }
    pub fn voucher_id(&self) -> Option<Uuid> { self.voucher_id }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }

    /// Moves the order to `status`, keeping the timeline consistent.
    pub fn apply_delivery_status(&mut self, status: DeliveryStatus, now: DateTime<Utc>) -> Result<DeliveryChange, OrderError> {
        let previous = self.delivery_status;
        if previous == DeliveryStatus::Cancelled && status != DeliveryStatus::Cancelled {
            return Err(OrderError::AlreadyCancelled);
        }
        if previous == DeliveryStatus::Delivered && status == DeliveryStatus::Cancelled {
            return Err(OrderError::CannotCancelDelivered);
        }
        self.timeline.advance(status, now);
        let mut change = DeliveryChange::default();
        if status == DeliveryStatus::Cancelled {
            self.timeline.record_cancellation(now);
            change.newly_cancelled = previous != DeliveryStatus::Cancelled;
        }
        self.delivery_status = status;
        self.touch(now);
        if change.newly_cancelled {
            self.raise_event(OrderEvent::Cancelled { order_number: self.order_number.clone(), user_id: self.user_id });
        } else if previous != status {
            self.raise_event(OrderEvent::DeliveryStatusChanged { order_number: self.order_number.clone(), user_id: self.user_id, status });
        }
        Ok(change)
    }

    /// Direct payment status write; the timeline is not touched.
    pub fn apply_payment_status(&mut self, status: PaymentStatus, now: DateTime<Utc>) {
        self.payment.status = status;
        self.touch(now);
    }

    /// Applies a provider's payment confirmation. Returns `Ok(false)` when the
    /// payment was already completed, in which case nothing changes.
    pub fn confirm_payment(&mut self, transaction_id: impl Into<String>, now: DateTime<Utc>) -> Result<bool, OrderError> {
        if self.payment.status == PaymentStatus::Completed { return Ok(false); }
        self.payment.status = PaymentStatus::Completed;
        self.payment.transaction_id = Some(transaction_id.into());
        self.touch(now);
        self.raise_event(OrderEvent::PaymentCompleted { order_number: self.order_number.clone(), user_id: self.user_id });
        if matches!(self.delivery_status, DeliveryStatus::Pending | DeliveryStatus::Confirmed) {
            self.apply_delivery_status(DeliveryStatus::Processing, now)?;
        }
        Ok(true)
    }

    /// Recorded timeline followed by the stages still ahead of the order.
    pub fn tracking(&self) -> Vec<TrackingStep> {
        let mut steps: Vec<TrackingStep> = self.timeline.events().iter().map(|e| TrackingStep {
            title: e.title.clone(), description: e.description.clone(), status: e.status, timestamp: Some(e.timestamp),
        }).collect();
        if self.delivery_status == DeliveryStatus::Cancelled { return steps; }
        let position = DeliveryStatus::PROGRESSION.iter().position(|s| *s == self.delivery_status).unwrap_or(0);
        for status in DeliveryStatus::PROGRESSION.iter().skip(position + 1) {
            let stage = status.stage();
            if self.timeline.contains(stage.title) { continue; }
            steps.push(TrackingStep { title: stage.title.into(), description: stage.description.into(), status: EventStatus::Upcoming, timestamp: None });
        }
        steps
    }

    pub fn take_events(&mut self) -> Vec<OrderEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: OrderEvent) { self.events.push(e); }
    fn touch(&mut self, now: DateTime<Utc>) { self.updated_at = now; }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderError {
    #[error("order is cancelled and cannot change delivery status")]
    AlreadyCancelled,
    #[error("a delivered order cannot be cancelled")]
    CannotCancelDelivered,
}
