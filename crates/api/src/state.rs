//! Application state

use std::sync::Arc;

use linkguard_billing::{StripeClient, WebhookHandler};

use crate::config::Config;

/// Shared application state. Everything in here is immutable after startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub webhooks: Arc<WebhookHandler>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let stripe = StripeClient::new(config.stripe_config());
        tracing::info!(
            request_timeout = ?config.stripe_timeout,
            "Stripe client initialized"
        );

        if config.monitored_payment_links.is_empty() {
            tracing::warn!(
                "No monitored payment links configured (MONITORED_PAYMENT_LINKS) - \
                 every checkout session will be skipped"
            );
        } else {
            tracing::info!(
                monitored_payment_links = ?config.monitored_payment_links,
                reference_id_prefix = %config.reference_id_prefix,
                "Reference policy configured"
            );
        }

        let webhooks = WebhookHandler::from_stripe(stripe, config.policy_config());

        Self::with_handler(config, webhooks)
    }

    /// Build state around an existing handler (tests inject a fake gateway this way)
    pub fn with_handler(config: Config, webhooks: WebhookHandler) -> Self {
        Self {
            config: Arc::new(config),
            webhooks: Arc::new(webhooks),
        }
    }
}
