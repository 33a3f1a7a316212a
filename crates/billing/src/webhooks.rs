//! Stripe webhook handling
//!
//! Verifies the `Stripe-Signature` header over the raw request body, decodes
//! the event and runs completed checkout sessions through the reference
//! policy. Non-compliant subscription purchases are cancelled and refunded.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use time::OffsetDateTime;

use crate::client::{StripeClient, StripeConfig};
use crate::dashboard::{dashboard_url, DashboardObject};
use crate::error::{BillingError, BillingResult};
use crate::events::{CheckoutSession, EventPayload, NotificationEvent};
use crate::policy::{PolicyConfig, ReferencePolicy, RefundDecision, RemediationReason};
use crate::remediation::{RemediationError, RemediationExecutor, RemediationReceipt};

type HmacSha256 = Hmac<Sha256>;

/// Lowercase hex HMAC-SHA256 of `"{timestamp}.{payload}"`, as Stripe signs it
pub fn compute_signature(secret: &str, timestamp: i64, payload: &[u8]) -> BillingResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| {
        tracing::error!("Invalid webhook secret key");
        BillingError::WebhookSignatureInvalid
    })?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Parsed `t=...,v1=...,v1=...` header
#[derive(Debug)]
struct SignatureHeader<'a> {
    timestamp: i64,
    signatures: Vec<&'a str>,
}

fn parse_signature_header(header: &str) -> BillingResult<SignatureHeader<'_>> {
    let mut timestamp: Option<i64> = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = value.parse().ok(),
            "v1" => signatures.push(value),
            _ => {}
        }
    }

    match timestamp {
        Some(timestamp) if !signatures.is_empty() => Ok(SignatureHeader {
            timestamp,
            signatures,
        }),
        _ => Err(BillingError::WebhookHeaderMalformed),
    }
}

/// Checks webhook signatures against the shared secret
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
    tolerance_secs: i64,
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>, tolerance_secs: i64) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs,
        }
    }

    pub fn from_config(config: &StripeConfig) -> Self {
        Self::new(config.webhook_secret.clone(), config.webhook_tolerance_secs)
    }

    /// Verify against the current clock
    pub fn verify(&self, payload: &[u8], signature: Option<&str>) -> BillingResult<()> {
        self.verify_at(payload, signature, OffsetDateTime::now_utc().unix_timestamp())
    }

    pub fn verify_at(&self, payload: &[u8], signature: Option<&str>, now: i64) -> BillingResult<()> {
        let header = match signature {
            Some(value) if !value.trim().is_empty() => value,
            _ => return Err(BillingError::WebhookSignatureMissing),
        };
        let header = parse_signature_header(header)?;

        let expected = compute_signature(&self.secret, header.timestamp, payload)?;
        let matched = header
            .signatures
            .iter()
            .any(|candidate| bool::from(candidate.as_bytes().ct_eq(expected.as_bytes())));
        if !matched {
            return Err(BillingError::WebhookSignatureInvalid);
        }

        let age_secs = now.saturating_sub(header.timestamp);
        if age_secs.unsigned_abs() > self.tolerance_secs.unsigned_abs() {
            return Err(BillingError::WebhookTimestampExpired {
                age_secs,
                tolerance_secs: self.tolerance_secs,
            });
        }

        Ok(())
    }
}

/// Pretty JSON of the session as Stripe sent it
fn render_session(raw_session: &serde_json::Value) -> String {
    serde_json::to_string_pretty(raw_session).unwrap_or_else(|_| raw_session.to_string())
}

/// What happened to a verified event
#[derive(Debug)]
pub enum EventOutcome {
    /// Event type this service does not react to
    Ignored,
    NotMonitored,
    Compliant,
    Remediated(RemediationReceipt),
    RemediationFailed {
        reason: RemediationReason,
        error: RemediationError,
    },
}

/// Webhook handler for Stripe events
#[derive(Clone)]
pub struct WebhookHandler {
    verifier: WebhookVerifier,
    policy: ReferencePolicy,
    executor: RemediationExecutor,
}

impl WebhookHandler {
    pub fn new(verifier: WebhookVerifier, policy: ReferencePolicy, executor: RemediationExecutor) -> Self {
        Self {
            verifier,
            policy,
            executor,
        }
    }

    /// Wire the handler to the live Stripe API
    pub fn from_stripe(stripe: StripeClient, policy: PolicyConfig) -> Self {
        let config = stripe.config().clone();
        let executor = RemediationExecutor::new(std::sync::Arc::new(stripe))
            .with_request_timeout(config.request_timeout);

        Self::new(
            WebhookVerifier::from_config(&config),
            ReferencePolicy::new(policy),
            executor,
        )
    }

    /// Verify and parse a Stripe webhook event
    pub fn verify_event(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> BillingResult<NotificationEvent> {
        self.verifier.verify(payload, signature).map_err(|e| {
            tracing::warn!(
                payload_len = payload.len(),
                error = %e,
                "Webhook signature verification failed"
            );
            e
        })?;

        let event = NotificationEvent::from_slice(payload).map_err(|e| {
            tracing::error!(error = %e, "Failed to parse webhook event JSON");
            e
        })?;

        tracing::info!(
            event_type = %event.event_type,
            event_id = %event.id,
            "Stripe webhook event verified"
        );

        Ok(event)
    }

    /// Handle a verified event. Failures are logged here and never returned.
    pub async fn handle_event(&self, event: NotificationEvent) -> EventOutcome {
        match event.payload {
            EventPayload::CheckoutSessionCompleted(session) => {
                self.handle_checkout_completed(&event.id, &session, &event.raw_object)
                    .await
            }
            EventPayload::Unhandled => {
                tracing::debug!(
                    event_type = %event.event_type,
                    event_id = %event.id,
                    "Received unhandled Stripe event type"
                );
                EventOutcome::Ignored
            }
        }
    }

    async fn handle_checkout_completed(
        &self,
        event_id: &str,
        session: &CheckoutSession,
        raw_session: &serde_json::Value,
    ) -> EventOutcome {
        tracing::info!(
            event_id = %event_id,
            session_id = %session.id,
            url = %dashboard_url(DashboardObject::CheckoutSession, &session.id),
            "Checkout session completed"
        );
        if tracing::enabled!(tracing::Level::DEBUG) {
            tracing::debug!(
                session_id = %session.id,
                "Full session object:\n{}",
                render_session(raw_session)
            );
        }

        let reason = match self.policy.classify(session) {
            RefundDecision::NotMonitored => {
                tracing::info!(
                    session_id = %session.id,
                    payment_link = ?session.payment_link,
                    "Skipping check: not a monitored payment link"
                );
                return EventOutcome::NotMonitored;
            }
            RefundDecision::Compliant => {
                let subscription = session.subscription.as_deref().unwrap_or_default();
                tracing::info!(
                    session_id = %session.id,
                    client_reference_id = ?session.client_reference_id,
                    subscription = %subscription,
                    url = %dashboard_url(DashboardObject::Subscription, subscription),
                    "Valid client_reference_id provided, subscription will continue"
                );
                return EventOutcome::Compliant;
            }
            RefundDecision::Remediate(reason) => reason,
        };

        let payment_link = session.payment_link.as_deref().unwrap_or_default();
        tracing::warn!(
            session_id = %session.id,
            payment_link = %payment_link,
            url = %dashboard_url(DashboardObject::PaymentLink, payment_link),
            reason = %reason,
            expected_prefix = %self.policy.required_prefix(),
            client_reference_id = ?session.client_reference_id,
            "Processing refund and cancellation"
        );

        match self.executor.remediate(session).await {
            Ok(receipt) => {
                tracing::info!(
                    session_id = %session.id,
                    subscription_id = %receipt.subscription_id,
                    refund_id = %receipt.refund_id,
                    url = %dashboard_url(DashboardObject::Refund, &receipt.refund_id),
                    "Refund issued"
                );
                tracing::info!(
                    refund_id = %receipt.refund_id,
                    charge_url = %dashboard_url(DashboardObject::Charge, &receipt.charge_id),
                    "Refund details: Amount: {:.2} {}",
                    receipt.amount as f64 / 100.0,
                    receipt.currency.to_uppercase()
                );
                EventOutcome::Remediated(receipt)
            }
            Err(error) => {
                match &error {
                    RemediationError::NotSubscription => {
                        tracing::error!(
                            session_id = %session.id,
                            mode = ?session.mode,
                            "This is not a subscription or subscription ID is missing"
                        );
                    }
                    RemediationError::StepFailed {
                        step,
                        subscription_cancelled,
                        source,
                    } => {
                        tracing::error!(
                            session_id = %session.id,
                            subscription = ?session.subscription,
                            step = %step,
                            subscription_cancelled = subscription_cancelled,
                            error = %source,
                            "Error processing subscription cancellation and refund"
                        );
                        if *subscription_cancelled {
                            tracing::error!(
                                session_id = %session.id,
                                subscription = ?session.subscription,
                                "Subscription was cancelled but no refund was issued. \
                                 Manual reconciliation required."
                            );
                        }
                    }
                }
                EventOutcome::RemediationFailed { reason, error }
            }
        }
    }
}
