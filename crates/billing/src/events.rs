//! Decoded Stripe notification events
//!
//! Only the event types this service reacts to are given a typed schema.
//! Everything else decodes to [`EventPayload::Unhandled`] and is acknowledged
//! without further processing.

use serde::{Deserialize, Serialize};

use crate::error::{BillingError, BillingResult};

pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";

/// An authenticated inbound notification
#[derive(Debug, Clone)]
pub struct NotificationEvent {
    pub id: String,
    pub event_type: String,
    pub payload: EventPayload,
    /// `data.object` exactly as delivered, including fields not modelled here
    pub raw_object: serde_json::Value,
}

#[derive(Debug, Clone)]
pub enum EventPayload {
    CheckoutSessionCompleted(CheckoutSession),
    Unhandled,
}

/// The subset of a Stripe Checkout Session this service reads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub payment_link: Option<String>,
    #[serde(default)]
    pub client_reference_id: Option<String>,
    pub mode: CheckoutMode,
    #[serde(default)]
    pub subscription: Option<String>,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutMode {
    Payment,
    Setup,
    Subscription,
    #[serde(other)]
    Unknown,
}

impl CheckoutSession {
    /// Subscription id, but only for sessions created in subscription mode
    pub fn cancellable_subscription(&self) -> Option<&str> {
        match (self.mode, self.subscription.as_deref()) {
            (CheckoutMode::Subscription, Some(id)) if !id.is_empty() => Some(id),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct EventEnvelope {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: EventData,
}

#[derive(Deserialize)]
struct EventData {
    object: serde_json::Value,
}

impl NotificationEvent {
    /// Decode an event from the exact bytes Stripe delivered
    pub fn from_slice(payload: &[u8]) -> BillingResult<Self> {
        let envelope: EventEnvelope = serde_json::from_slice(payload)
            .map_err(|e| BillingError::WebhookPayloadInvalid(e.to_string()))?;

        let payload = match envelope.event_type.as_str() {
            CHECKOUT_SESSION_COMPLETED => {
                let session = CheckoutSession::deserialize(&envelope.data.object)
                    .map_err(|e| {
                        BillingError::WebhookPayloadInvalid(format!(
                            "Invalid checkout session object: {}",
                            e
                        ))
                    })?;
                EventPayload::CheckoutSessionCompleted(session)
            }
            _ => EventPayload::Unhandled,
        };

        Ok(Self {
            id: envelope.id,
            event_type: envelope.event_type,
            payload,
            raw_object: envelope.data.object,
        })
    }
}
