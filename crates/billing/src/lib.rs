// Billing crate clippy configuration
#![allow(clippy::result_large_err)] // RemediationError carries the failing step's BillingError
// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! LinkGuard Billing Module
//!
//! Enforces the client reference policy on Stripe payment links.
//!
//! ## Features
//!
//! - **Webhook Authentication**: Verify `Stripe-Signature` over the raw body
//! - **Event Decoding**: Typed checkout sessions, everything else ignored
//! - **Reference Policy**: Monitored payment links require a prefixed `client_reference_id`
//! - **Remediation**: Cancel the subscription and refund its latest invoice, idempotently

pub mod client;
pub mod dashboard;
pub mod error;
pub mod events;
pub mod policy;
pub mod remediation;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod webhooks;

#[cfg(test)]
mod edge_case_tests;

// Client
pub use client::{
    CancelOptions, InvoiceSnapshot, PaymentGateway, RefundRecord, StripeClient, StripeConfig,
    SubscriptionSnapshot,
};

// Error
pub use error::{BillingError, BillingResult};

// Events
pub use events::{CheckoutMode, CheckoutSession, EventPayload, NotificationEvent};

// Policy
pub use policy::{PolicyConfig, ReferencePolicy, RefundDecision, RemediationReason};

// Remediation
pub use remediation::{
    refund_idempotency_key, RemediationError, RemediationExecutor, RemediationReceipt,
    RemediationStep,
};

// Webhooks
pub use webhooks::{compute_signature, EventOutcome, WebhookHandler, WebhookVerifier};
