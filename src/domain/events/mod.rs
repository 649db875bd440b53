//! Domain events
use crate::domain::aggregates::DeliveryStatus;
use crate::domain::value_objects::OrderNumber;
use rust_decimal::Decimal;
use uuid::Uuid;

/// Raised by the order aggregate and drained after the owning transaction
/// commits.
#[derive(Clone, Debug, PartialEq)]
pub enum OrderEvent {
    Placed { order_number: OrderNumber, user_id: Uuid, total: Decimal },
    PaymentCompleted { order_number: OrderNumber, user_id: Uuid },
    DeliveryStatusChanged { order_number: OrderNumber, user_id: Uuid, status: DeliveryStatus },
    Cancelled { order_number: OrderNumber, user_id: Uuid },
}

impl OrderEvent {
    pub fn order_number(&self) -> &OrderNumber {
        match self {
            Self::Placed { order_number, .. }
            | Self::PaymentCompleted { order_number, .. }
            | Self::DeliveryStatusChanged { order_number, .. }
            | Self::Cancelled { order_number, .. } => order_number,
        }
    }
}
