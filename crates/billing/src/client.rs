//! Stripe client and the payment gateway seam
//!
//! [`PaymentGateway`] lists the four remote operations remediation needs.
//! [`StripeClient`] implements it with `async-stripe`; tests substitute an
//! in-memory gateway.

use std::time::Duration;

use async_trait::async_trait;
use stripe::{
    CancelSubscription, ChargeId, CreateRefund, Expandable, Invoice, InvoiceId, Refund,
    RequestStrategy, Subscription, SubscriptionId,
};

use crate::error::{BillingError, BillingResult};

/// Default tolerance for webhook timestamps, matching Stripe's libraries
pub const DEFAULT_WEBHOOK_TOLERANCE_SECS: i64 = 300;

/// Default bound on a single Stripe API call
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Stripe credentials and request settings
#[derive(Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    pub webhook_tolerance_secs: i64,
    pub request_timeout: Duration,
}

impl StripeConfig {
    pub fn new(secret_key: impl Into<String>, webhook_secret: impl Into<String>) -> Self {
        Self {
            secret_key: secret_key.into(),
            webhook_secret: webhook_secret.into(),
            webhook_tolerance_secs: DEFAULT_WEBHOOK_TOLERANCE_SECS,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("secret_key", &"[redacted]")
            .field("webhook_secret", &"[redacted]")
            .field("webhook_tolerance_secs", &self.webhook_tolerance_secs)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Subscription state as seen at the time of a call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionSnapshot {
    pub id: String,
    pub status: String,
    pub latest_invoice: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceSnapshot {
    pub id: String,
    pub charge: Option<String>,
    pub amount_paid: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundRecord {
    pub id: String,
    /// Amount in the currency's minor unit
    pub amount: i64,
    /// Lower-case ISO currency code
    pub currency: String,
    pub charge: Option<String>,
}

/// Flags sent with an immediate cancellation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelOptions {
    pub invoice_now: bool,
    pub prorate: bool,
}

impl CancelOptions {
    /// Invoice immediately and prorate unused time
    pub const IMMEDIATE_WITH_PRORATION: CancelOptions = CancelOptions {
        invoice_now: true,
        prorate: true,
    };
}

/// Remote payment operations used by remediation
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn retrieve_subscription(&self, subscription_id: &str)
        -> BillingResult<SubscriptionSnapshot>;

    async fn cancel_subscription(
        &self,
        subscription_id: &str,
        options: CancelOptions,
    ) -> BillingResult<SubscriptionSnapshot>;

    async fn retrieve_invoice(&self, invoice_id: &str) -> BillingResult<InvoiceSnapshot>;

    /// Refund a charge in full. The idempotency key makes redelivery safe.
    async fn create_refund(
        &self,
        charge_id: &str,
        idempotency_key: &str,
    ) -> BillingResult<RefundRecord>;
}

/// Thin wrapper around the `async-stripe` client
#[derive(Clone)]
pub struct StripeClient {
    inner: stripe::Client,
    config: StripeConfig,
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> Self {
        let inner = stripe::Client::new(config.secret_key.clone());
        Self { inner, config }
    }

    pub fn inner(&self) -> &stripe::Client {
        &self.inner
    }

    pub fn config(&self) -> &StripeConfig {
        &self.config
    }
}

fn parse_subscription_id(id: &str) -> BillingResult<SubscriptionId> {
    id.parse()
        .map_err(|e| BillingError::InvalidInput(format!("Invalid subscription ID: {}", e)))
}

fn subscription_snapshot(subscription: &Subscription) -> SubscriptionSnapshot {
    SubscriptionSnapshot {
        id: subscription.id.to_string(),
        status: subscription.status.as_str().to_string(),
        latest_invoice: subscription.latest_invoice.as_ref().map(|i| match i {
            Expandable::Id(id) => id.to_string(),
            Expandable::Object(invoice) => invoice.id.to_string(),
        }),
    }
}

#[async_trait]
impl PaymentGateway for StripeClient {
    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> BillingResult<SubscriptionSnapshot> {
        let sub_id = parse_subscription_id(subscription_id)?;
        let subscription = Subscription::retrieve(self.inner(), &sub_id, &[]).await?;

        Ok(subscription_snapshot(&subscription))
    }

    async fn cancel_subscription(
        &self,
        subscription_id: &str,
        options: CancelOptions,
    ) -> BillingResult<SubscriptionSnapshot> {
        let sub_id = parse_subscription_id(subscription_id)?;

        let params = CancelSubscription {
            cancellation_details: None,
            invoice_now: Some(options.invoice_now),
            prorate: Some(options.prorate),
        };

        let subscription = Subscription::cancel(self.inner(), &sub_id, params).await?;

        Ok(subscription_snapshot(&subscription))
    }

    async fn retrieve_invoice(&self, invoice_id: &str) -> BillingResult<InvoiceSnapshot> {
        let id: InvoiceId = invoice_id
            .parse()
            .map_err(|e| BillingError::InvalidInput(format!("Invalid invoice ID: {}", e)))?;

        let invoice = Invoice::retrieve(self.inner(), &id, &[]).await?;

        let charge = invoice.charge.as_ref().map(|c| match c {
            Expandable::Id(id) => id.to_string(),
            Expandable::Object(charge) => charge.id.to_string(),
        });

        Ok(InvoiceSnapshot {
            id: invoice.id.to_string(),
            charge,
            amount_paid: invoice.amount_paid,
        })
    }

    async fn create_refund(
        &self,
        charge_id: &str,
        idempotency_key: &str,
    ) -> BillingResult<RefundRecord> {
        let charge: ChargeId = charge_id
            .parse()
            .map_err(|e| BillingError::InvalidInput(format!("Invalid charge ID: {}", e)))?;

        let mut params = CreateRefund::new();
        params.charge = Some(charge);

        // Stripe replays the original response for a repeated key
        let client = self
            .inner
            .clone()
            .with_strategy(RequestStrategy::Idempotent(idempotency_key.to_string()));

        let refund = Refund::create(&client, params).await?;

        Ok(RefundRecord {
            id: refund.id.to_string(),
            amount: refund.amount,
            currency: refund.currency.to_string(),
            charge: refund.charge.as_ref().map(|c| match c {
                Expandable::Id(id) => id.to_string(),
                Expandable::Object(charge) => charge.id.to_string(),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_debug_redacts_secrets() {
        let config = StripeConfig::new("sk_test_secret", "whsec_secret");
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("sk_test_secret"));
        assert!(!rendered.contains("whsec_secret"));
        assert!(rendered.contains("[redacted]"));
    }

    #[test]
    fn test_config_defaults() {
        let config = StripeConfig::new("sk", "whsec");
        assert_eq!(config.webhook_tolerance_secs, 300);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_invalid_ids_are_rejected_before_any_request() {
        assert!(matches!(
            parse_subscription_id("not-a-subscription"),
            Err(BillingError::InvalidInput(_))
        ));
        assert!(parse_subscription_id("sub_1").is_ok());
    }
}
