//! Stripe webhook endpoint
//!
//! Only authentication failures are reported back to Stripe. Once an event is
//! verified it is acknowledged with 200, whatever remediation did, so Stripe
//! does not redeliver an event that was already acted on.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    Json,
};
use serde::Serialize;

use crate::{error::ApiResult, state::AppState};

const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

/// Handle Stripe webhook events
///
/// The body is taken as raw bytes: the signature covers the exact payload.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<WebhookAck>> {
    tracing::info!(body_len = body.len(), "Stripe webhook received");

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let event = state.webhooks.verify_event(&body, signature)?;
    let event_id = event.id.clone();

    let outcome = state.webhooks.handle_event(event).await;
    tracing::debug!(event_id = %event_id, outcome = ?outcome, "Stripe webhook processed");

    Ok(Json(WebhookAck { received: true }))
}
