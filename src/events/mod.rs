use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

// Analytics events emitted by the fulfillment pipeline. Purely
// observational: no pipeline behavior depends on delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    CheckoutPageViewed {
        plan_id: Uuid,
        coupon_code: Option<String>,
    },
    PurchaseInitiated {
        transaction_id: Uuid,
        plan_id: Uuid,
        coupon_id: Option<Uuid>,
        total_price: i64,
    },
    PaymentSucceeded {
        transaction_id: Uuid,
    },
    SubscriptionCreated {
        subscription_id: Uuid,
        transaction_id: Uuid,
        product_id: Uuid,
    },
    CouponRedeemed {
        coupon_id: Uuid,
        transaction_id: Uuid,
    },
    BookArtifactRequested {
        transaction_id: Uuid,
        product_id: Uuid,
        filename: String,
    },
    PurchaseCompleted {
        transaction_id: Uuid,
    },
    /// Generic event for custom messages
    Generic {
        message: String,
        timestamp: DateTime<Utc>,
        metadata: serde_json::Value,
    },
}

impl Event {
    /// The analytics event name reported downstream.
    pub fn name(&self) -> &'static str {
        match self {
            Event::CheckoutPageViewed { .. } => "checkout_page_viewed",
            Event::PurchaseInitiated { .. } => "purchase_initiated",
            Event::PaymentSucceeded { .. } => "payment_success",
            Event::SubscriptionCreated { .. } => "subscription_created",
            Event::CouponRedeemed { .. } => "coupon_redeemed",
            Event::BookArtifactRequested { .. } => "book_artifact_requested",
            Event::PurchaseCompleted { .. } => "purchase_completed",
            Event::Generic { .. } => "generic",
        }
    }
}

// Drains pipeline events and forwards them to the analytics sink. The
// sink here is the structured log stream; a real exporter subscribes to
// the same channel.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        let payload = match serde_json::to_value(&event) {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to serialize analytics event: {}", e);
                continue;
            }
        };

        info!(
            target: "analytics",
            event = event.name(),
            payload = %payload,
            "Analytics event"
        );
    }

    warn!("Event processing loop has ended");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names_match_analytics_contract() {
        let event = Event::PaymentSucceeded {
            transaction_id: Uuid::new_v4(),
        };
        assert_eq!(event.name(), "payment_success");

        let event = Event::PurchaseCompleted {
            transaction_id: Uuid::new_v4(),
        };
        assert_eq!(event.name(), "purchase_completed");
    }

    #[tokio::test]
    async fn send_fails_when_receiver_dropped() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);
        let result = sender
            .send(Event::CheckoutPageViewed {
                plan_id: Uuid::new_v4(),
                coupon_code: None,
            })
            .await;
        assert!(result.is_err());
    }
}
