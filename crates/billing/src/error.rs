//! Billing error types

use std::time::Duration;

use thiserror::Error;

pub type BillingResult<T> = Result<T, BillingError>;

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("No stripe-signature header value was provided")]
    WebhookSignatureMissing,

    #[error("Unable to extract timestamp and signatures from header")]
    WebhookHeaderMalformed,

    #[error("No signatures found matching the expected signature for payload")]
    WebhookSignatureInvalid,

    #[error("Timestamp outside the tolerance zone ({age_secs}s old, tolerance {tolerance_secs}s)")]
    WebhookTimestampExpired { age_secs: i64, tolerance_secs: i64 },

    #[error("Webhook payload is not a valid event: {0}")]
    WebhookPayloadInvalid(String),

    #[error("Stripe API error: {0}")]
    StripeApi(String),

    #[error("Stripe request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    MissingReference(&'static str),
}

impl BillingError {
    /// Whether this error means the inbound notification could not be trusted.
    pub fn is_authentication_error(&self) -> bool {
        matches!(
            self,
            BillingError::WebhookSignatureMissing
                | BillingError::WebhookHeaderMalformed
                | BillingError::WebhookSignatureInvalid
                | BillingError::WebhookTimestampExpired { .. }
                | BillingError::WebhookPayloadInvalid(_)
        )
    }
}

impl From<stripe::StripeError> for BillingError {
    fn from(err: stripe::StripeError) -> Self {
        BillingError::StripeApi(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authentication_errors_are_classified() {
        assert!(BillingError::WebhookSignatureMissing.is_authentication_error());
        assert!(BillingError::WebhookSignatureInvalid.is_authentication_error());
        assert!(BillingError::WebhookTimestampExpired {
            age_secs: 900,
            tolerance_secs: 300
        }
        .is_authentication_error());
        assert!(!BillingError::StripeApi("boom".to_string()).is_authentication_error());
        assert!(!BillingError::Timeout(Duration::from_secs(1)).is_authentication_error());
    }
}
