//! In-memory payment gateway for tests
//!
//! Records every call in order and answers from a fixed fixture. Refunds are
//! keyed by idempotency key the way Stripe does, so a repeated key returns the
//! original refund instead of creating a second one.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::client::{
    CancelOptions, InvoiceSnapshot, PaymentGateway, RefundRecord, SubscriptionSnapshot,
};
use crate::error::{BillingError, BillingResult};
use crate::remediation::RemediationStep;

pub const TEST_REFUND_AMOUNT: i64 = 2500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    RetrieveSubscription(String),
    CancelSubscription {
        subscription_id: String,
        options: CancelOptions,
    },
    RetrieveInvoice(String),
    CreateRefund {
        charge_id: String,
        idempotency_key: String,
    },
}

#[derive(Default)]
struct Recorded {
    calls: Vec<GatewayCall>,
    refunds: HashMap<String, RefundRecord>,
}

pub struct RecordingGateway {
    subscription_id: String,
    latest_invoice: Option<String>,
    invoice_after_cancel: Option<String>,
    charge: Option<String>,
    fail_at: Option<RemediationStep>,
    delay: Option<Duration>,
    recorded: Mutex<Recorded>,
}

impl RecordingGateway {
    pub fn with_subscription(subscription_id: &str, invoice_id: &str, charge_id: &str) -> Self {
        Self {
            subscription_id: subscription_id.to_string(),
            latest_invoice: Some(invoice_id.to_string()),
            invoice_after_cancel: None,
            charge: Some(charge_id.to_string()),
            fail_at: None,
            delay: None,
            recorded: Mutex::new(Recorded::default()),
        }
    }

    pub fn without_invoice(subscription_id: &str) -> Self {
        Self {
            latest_invoice: None,
            charge: None,
            ..Self::with_subscription(subscription_id, "", "")
        }
    }

    pub fn with_uncharged_invoice(subscription_id: &str, invoice_id: &str) -> Self {
        Self {
            charge: None,
            ..Self::with_subscription(subscription_id, invoice_id, "")
        }
    }

    /// Latest invoice reported by the cancellation response
    pub fn latest_invoice_after_cancel(mut self, invoice_id: &str) -> Self {
        self.invoice_after_cancel = Some(invoice_id.to_string());
        self
    }

    pub fn fail_at(mut self, step: RemediationStep) -> Self {
        self.fail_at = Some(step);
        self
    }

    /// Delay every call, for timeout tests
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.recorded().calls.clone()
    }

    /// Distinct refunds created, after idempotent replays are collapsed
    pub fn refund_count(&self) -> usize {
        self.recorded().refunds.len()
    }

    fn recorded(&self) -> MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn enter(&self, step: RemediationStep, call: GatewayCall) -> BillingResult<()> {
        self.recorded().calls.push(call);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_at == Some(step) {
            return Err(BillingError::StripeApi(format!(
                "simulated failure at {}",
                step
            )));
        }
        Ok(())
    }

    fn snapshot(&self, latest_invoice: Option<String>, status: &str) -> SubscriptionSnapshot {
        SubscriptionSnapshot {
            id: self.subscription_id.clone(),
            status: status.to_string(),
            latest_invoice,
        }
    }
}

#[async_trait]
impl PaymentGateway for RecordingGateway {
    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> BillingResult<SubscriptionSnapshot> {
        self.enter(
            RemediationStep::RetrieveSubscription,
            GatewayCall::RetrieveSubscription(subscription_id.to_string()),
        )
        .await?;

        if subscription_id != self.subscription_id {
            return Err(BillingError::StripeApi(format!(
                "No such subscription: '{}'",
                subscription_id
            )));
        }
        Ok(self.snapshot(self.latest_invoice.clone(), "active"))
    }

    async fn cancel_subscription(
        &self,
        subscription_id: &str,
        options: CancelOptions,
    ) -> BillingResult<SubscriptionSnapshot> {
        self.enter(
            RemediationStep::CancelSubscription,
            GatewayCall::CancelSubscription {
                subscription_id: subscription_id.to_string(),
                options,
            },
        )
        .await?;

        let latest = self
            .invoice_after_cancel
            .clone()
            .or_else(|| self.latest_invoice.clone());
        Ok(self.snapshot(latest, "canceled"))
    }

    async fn retrieve_invoice(&self, invoice_id: &str) -> BillingResult<InvoiceSnapshot> {
        self.enter(
            RemediationStep::RetrieveInvoice,
            GatewayCall::RetrieveInvoice(invoice_id.to_string()),
        )
        .await?;

        Ok(InvoiceSnapshot {
            id: invoice_id.to_string(),
            charge: self.charge.clone(),
            amount_paid: Some(TEST_REFUND_AMOUNT),
        })
    }

    async fn create_refund(
        &self,
        charge_id: &str,
        idempotency_key: &str,
    ) -> BillingResult<RefundRecord> {
        self.enter(
            RemediationStep::CreateRefund,
            GatewayCall::CreateRefund {
                charge_id: charge_id.to_string(),
                idempotency_key: idempotency_key.to_string(),
            },
        )
        .await?;

        let mut recorded = self.recorded();
        let next_id = recorded.refunds.len() + 1;
        let refund = recorded
            .refunds
            .entry(idempotency_key.to_string())
            .or_insert_with(|| RefundRecord {
                id: format!("re_test_{}", next_id),
                amount: TEST_REFUND_AMOUNT,
                currency: "usd".to_string(),
                charge: Some(charge_id.to_string()),
            });
        Ok(refund.clone())
    }
}
