//! Cancel-and-refund remediation for non-compliant checkout sessions
//!
//! The sequence is strictly ordered:
//!
//! 1. Retrieve the subscription (snapshot taken before cancellation mutates it)
//! 2. Cancel immediately, invoicing now and prorating unused time
//! 3. Retrieve the latest invoice named by the snapshot from step 1
//! 4. Refund the invoice's charge under a key derived from the session id
//!
//! A failing step aborts the rest. Nothing is retried; a cancelled
//! subscription whose refund failed is reported for manual reconciliation.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::client::{
    CancelOptions, InvoiceSnapshot, PaymentGateway, RefundRecord, SubscriptionSnapshot,
    DEFAULT_REQUEST_TIMEOUT,
};
use crate::dashboard::{dashboard_url, DashboardObject};
use crate::error::{BillingError, BillingResult};
use crate::events::CheckoutSession;

/// Idempotency key for the refund issued on behalf of a checkout session
pub fn refund_idempotency_key(session_id: &str) -> String {
    format!("refund_{}", session_id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemediationStep {
    RetrieveSubscription,
    CancelSubscription,
    RetrieveInvoice,
    CreateRefund,
}

impl RemediationStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemediationStep::RetrieveSubscription => "retrieve_subscription",
            RemediationStep::CancelSubscription => "cancel_subscription",
            RemediationStep::RetrieveInvoice => "retrieve_invoice",
            RemediationStep::CreateRefund => "create_refund",
        }
    }
}

impl fmt::Display for RemediationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record of a completed cancellation and refund
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemediationReceipt {
    pub subscription_id: String,
    pub invoice_id: String,
    pub charge_id: String,
    pub refund_id: String,
    /// Refunded amount in minor units
    pub amount: i64,
    pub currency: String,
    pub idempotency_key: String,
}

#[derive(Debug, Error)]
pub enum RemediationError {
    /// Only subscription-mode sessions can be cancelled and refunded
    #[error("not a subscription or subscription id missing")]
    NotSubscription,

    #[error("remediation step {step} failed: {source}")]
    StepFailed {
        step: RemediationStep,
        /// True when the subscription is already cancelled but the refund is missing
        subscription_cancelled: bool,
        #[source]
        source: BillingError,
    },
}

impl RemediationError {
    pub fn step(&self) -> Option<RemediationStep> {
        match self {
            RemediationError::NotSubscription => None,
            RemediationError::StepFailed { step, .. } => Some(*step),
        }
    }

    pub fn is_partial(&self) -> bool {
        matches!(
            self,
            RemediationError::StepFailed {
                subscription_cancelled: true,
                ..
            }
        )
    }
}

/// Drives the cancel-and-refund sequence against a [`PaymentGateway`]
#[derive(Clone)]
pub struct RemediationExecutor {
    gateway: Arc<dyn PaymentGateway>,
    request_timeout: Duration,
}

impl RemediationExecutor {
    pub fn new(gateway: Arc<dyn PaymentGateway>) -> Self {
        Self {
            gateway,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub async fn remediate(
        &self,
        session: &CheckoutSession,
    ) -> Result<RemediationReceipt, RemediationError> {
        let subscription_id = session
            .cancellable_subscription()
            .ok_or(RemediationError::NotSubscription)?;

        let snapshot: SubscriptionSnapshot = self
            .step(
                RemediationStep::RetrieveSubscription,
                false,
                self.gateway.retrieve_subscription(subscription_id),
            )
            .await?;

        let cancelled = self
            .step(
                RemediationStep::CancelSubscription,
                false,
                self.gateway
                    .cancel_subscription(subscription_id, CancelOptions::IMMEDIATE_WITH_PRORATION),
            )
            .await?;

        tracing::info!(
            session_id = %session.id,
            subscription_id = %cancelled.id,
            status = %cancelled.status,
            url = %dashboard_url(DashboardObject::Subscription, &cancelled.id),
            "Subscription cancelled"
        );

        let invoice_id = snapshot.latest_invoice.as_deref().ok_or_else(|| {
            RemediationError::StepFailed {
                step: RemediationStep::RetrieveInvoice,
                subscription_cancelled: true,
                source: BillingError::MissingReference("subscription has no latest invoice"),
            }
        })?;

        let invoice: InvoiceSnapshot = self
            .step(
                RemediationStep::RetrieveInvoice,
                true,
                self.gateway.retrieve_invoice(invoice_id),
            )
            .await?;

        tracing::info!(
            session_id = %session.id,
            invoice_id = %invoice.id,
            amount_paid = ?invoice.amount_paid,
            url = %dashboard_url(DashboardObject::Invoice, &invoice.id),
            "Latest invoice retrieved"
        );

        let charge_id = invoice
            .charge
            .as_deref()
            .ok_or_else(|| RemediationError::StepFailed {
                step: RemediationStep::CreateRefund,
                subscription_cancelled: true,
                source: BillingError::MissingReference("latest invoice has no charge"),
            })?;

        let idempotency_key = refund_idempotency_key(&session.id);
        let refund: RefundRecord = self
            .step(
                RemediationStep::CreateRefund,
                true,
                self.gateway.create_refund(charge_id, &idempotency_key),
            )
            .await?;

        Ok(RemediationReceipt {
            subscription_id: cancelled.id,
            invoice_id: invoice.id,
            charge_id: refund.charge.unwrap_or_else(|| charge_id.to_string()),
            refund_id: refund.id,
            amount: refund.amount,
            currency: refund.currency,
            idempotency_key,
        })
    }

    /// Run one remote call under the request timeout, attributing failure to `step`
    async fn step<T, F>(
        &self,
        step: RemediationStep,
        subscription_cancelled: bool,
        call: F,
    ) -> Result<T, RemediationError>
    where
        F: Future<Output = BillingResult<T>>,
    {
        let result = match tokio::time::timeout(self.request_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(BillingError::Timeout(self.request_timeout)),
        };

        result.map_err(|source| RemediationError::StepFailed {
            step,
            subscription_cancelled,
            source,
        })
    }
}
