//! Fulfilment timeline kept alongside an order's delivery status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, strum::EnumString, strum::Display, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Confirmed,
    Processing,
    InTransit,
    Delivered,
    Cancelled,
}

/// Canonical title and description for a delivery stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Stage {
    pub title: &'static str,
    pub description: &'static str,
}

const CANCELLATION: Stage = Stage {
    title: "Order Cancelled",
    description: "The order was cancelled and will not be fulfilled.",
};

impl DeliveryStatus {
    /// The forward path an order normally travels.
    pub const PROGRESSION: [DeliveryStatus; 5] = [
        DeliveryStatus::Pending,
        DeliveryStatus::Confirmed,
        DeliveryStatus::Processing,
        DeliveryStatus::InTransit,
        DeliveryStatus::Delivered,
    ];

    pub fn stage(self) -> Stage {
        match self {
            Self::Pending => Stage { title: "Order Placed", description: "We have received your order and are waiting for payment confirmation." },
            Self::Confirmed => Stage { title: "Order Confirmed", description: "Your order has been confirmed and will be prepared for dispatch." },
            Self::Processing => Stage { title: "Processing", description: "Your order is being prepared." },
            Self::InTransit => Stage { title: "In Transit", description: "Your order is on its way." },
            Self::Delivered => Stage { title: "Delivered", description: "Your order has been delivered." },
            Self::Cancelled => Stage { title: "Cancelled", description: "This order has been cancelled." },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Completed,
    Current,
    Upcoming,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub title: String,
    pub description: String,
    pub status: EventStatus,
    pub timestamp: DateTime<Utc>,
}

impl TimelineEvent {
    fn new(stage: Stage, status: EventStatus, timestamp: DateTime<Utc>) -> Self {
        Self { title: stage.title.to_string(), description: stage.description.to_string(), status, timestamp }
    }
}

/// Ordered stage history. At most one event is `Current`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timeline(Vec<TimelineEvent>);

impl Timeline {
    pub fn starting_at(status: DeliveryStatus, now: DateTime<Utc>) -> Self {
        Self(vec![TimelineEvent::new(status.stage(), EventStatus::Current, now)])
    }

    pub fn events(&self) -> &[TimelineEvent] { &self.0 }

    pub fn current(&self) -> Option<&TimelineEvent> {
        self.0.iter().find(|e| e.status == EventStatus::Current)
    }

    pub fn contains(&self, title: &str) -> bool { self.0.iter().any(|e| e.title == title) }

    /// Completes the current event, then reactivates the stage's existing
    /// entry or appends a new one as current.
    pub fn advance(&mut self, status: DeliveryStatus, now: DateTime<Utc>) {
        for event in self.0.iter_mut().filter(|e| e.status == EventStatus::Current) {
            event.status = EventStatus::Completed;
        }
        let stage = status.stage();
        match self.0.iter_mut().find(|e| e.title == stage.title) {
            Some(existing) => {
                existing.status = EventStatus::Current;
                existing.timestamp = now;
            }
            None => self.0.push(TimelineEvent::new(stage, EventStatus::Current, now)),
        }
    }

    /// Appends the one-time cancellation record. Returns false when it is
    /// already present.
    pub fn record_cancellation(&mut self, now: DateTime<Utc>) -> bool {
        if self.contains(CANCELLATION.title) { return false; }
        self.0.push(TimelineEvent::new(CANCELLATION, EventStatus::Completed, now));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn currents(t: &Timeline) -> usize {
        t.events().iter().filter(|e| e.status == EventStatus::Current).count()
    }

    #[test]
    fn test_single_current_across_transitions() {
        let now = Utc::now();
        let mut t = Timeline::starting_at(DeliveryStatus::Pending, now);
        let path = [
            DeliveryStatus::Confirmed, DeliveryStatus::Processing, DeliveryStatus::Confirmed,
            DeliveryStatus::InTransit, DeliveryStatus::Processing, DeliveryStatus::Delivered,
        ];
        for status in path {
            t.advance(status, now);
            assert!(currents(&t) <= 1, "more than one current event after {status}");
            assert_eq!(t.current().unwrap().title, status.stage().title);
        }
        // Backward moves reactivate entries instead of duplicating them.
        assert_eq!(t.events().len(), 5);
    }

    #[test]
    fn test_cancellation_recorded_once() {
        let now = Utc::now();
        let mut t = Timeline::starting_at(DeliveryStatus::Confirmed, now);
        t.advance(DeliveryStatus::Cancelled, now);
        assert!(t.record_cancellation(now));
        t.advance(DeliveryStatus::Cancelled, now);
        assert!(!t.record_cancellation(now));
        assert_eq!(t.events().iter().filter(|e| e.title == "Order Cancelled").count(), 1);
        assert_eq!(currents(&t), 1);
    }
}
