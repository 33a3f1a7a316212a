// Test file - these are expected patterns in test code
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! Edge Case Tests for the Refund Policy Engine
//!
//! Tests boundary conditions across the pipeline:
//! - Signature tolerance window (LG-W01 to LG-W03)
//! - Reference policy corner cases (LG-P01 to LG-P04)
//! - Duplicate and concurrent delivery (LG-D01 to LG-D02)

#[cfg(test)]
mod signature_window_tests {
    use crate::webhooks::{compute_signature, WebhookVerifier};
    use crate::BillingError;

    const SECRET: &str = "whsec_edge";
    const NOW: i64 = 1_800_000_000;

    fn header_at(timestamp: i64, payload: &[u8]) -> String {
        format!(
            "t={},v1={}",
            timestamp,
            compute_signature(SECRET, timestamp, payload).unwrap()
        )
    }

    // =========================================================================
    // LG-W01: Timestamp exactly at the tolerance edge - accepted
    // =========================================================================
    #[test]
    fn test_timestamp_at_tolerance_edge() {
        let verifier = WebhookVerifier::new(SECRET, 300);
        let header = header_at(NOW - 300, b"{}");
        assert!(verifier.verify_at(b"{}", Some(&header), NOW).is_ok());
    }

    // =========================================================================
    // LG-W02: Timestamp far in the future - rejected like a stale one
    // =========================================================================
    #[test]
    fn test_future_timestamp_outside_window() {
        let verifier = WebhookVerifier::new(SECRET, 300);
        let header = header_at(NOW + 301, b"{}");
        let err = verifier.verify_at(b"{}", Some(&header), NOW).unwrap_err();
        assert!(matches!(err, BillingError::WebhookTimestampExpired { .. }));
    }

    // =========================================================================
    // LG-W03: Replaying a captured delivery with a new timestamp - rejected
    // =========================================================================
    #[test]
    fn test_timestamp_swap_invalidates_signature() {
        let verifier = WebhookVerifier::new(SECRET, 300);
        let signature = compute_signature(SECRET, NOW - 3600, b"{}").unwrap();
        let header = format!("t={},v1={}", NOW, signature);
        let err = verifier.verify_at(b"{}", Some(&header), NOW).unwrap_err();
        assert!(matches!(err, BillingError::WebhookSignatureInvalid));
    }
}

#[cfg(test)]
mod policy_tests {
    use crate::events::{CheckoutMode, CheckoutSession};
    use crate::policy::{PolicyConfig, ReferencePolicy, RefundDecision, RemediationReason};

    fn session(reference: &str) -> CheckoutSession {
        CheckoutSession {
            id: "cs_edge".to_string(),
            payment_link: Some("plink_X".to_string()),
            client_reference_id: Some(reference.to_string()),
            mode: CheckoutMode::Subscription,
            subscription: Some("sub_edge".to_string()),
            customer: None,
            amount_total: None,
            currency: None,
        }
    }

    // =========================================================================
    // LG-P01: Leading whitespace is not stripped before the prefix check
    // =========================================================================
    #[test]
    fn test_leading_whitespace_fails_prefix() {
        let policy = ReferencePolicy::new(PolicyConfig::new(["plink_X"], "sfx_"));
        assert_eq!(
            policy.classify(&session(" sfx_123")),
            RefundDecision::Remediate(RemediationReason::InvalidReferencePrefix)
        );
    }

    // =========================================================================
    // LG-P02: Prefix appearing later in the id does not count
    // =========================================================================
    #[test]
    fn test_prefix_must_be_at_start() {
        let policy = ReferencePolicy::new(PolicyConfig::new(["plink_X"], "sfx_"));
        assert!(policy.classify(&session("abc_sfx_123")).should_remediate());
    }

    // =========================================================================
    // LG-P03: Non-ASCII reference ids are compared byte-for-byte
    // =========================================================================
    #[test]
    fn test_unicode_reference_ids() {
        let policy = ReferencePolicy::new(PolicyConfig::new(["plink_X"], "sfx_"));
        assert_eq!(policy.classify(&session("sfx_ünïcode")), RefundDecision::Compliant);
        assert!(policy.classify(&session("ſfx_123")).should_remediate());
    }

    // =========================================================================
    // LG-P04: No monitored links configured - nothing is ever remediated
    // =========================================================================
    #[test]
    fn test_empty_monitored_set() {
        let policy = ReferencePolicy::new(PolicyConfig::new(Vec::<String>::new(), "sfx_"));
        assert_eq!(policy.classify(&session("")), RefundDecision::NotMonitored);
    }
}

#[cfg(test)]
mod delivery_tests {
    use std::sync::Arc;

    use time::OffsetDateTime;

    use crate::policy::{PolicyConfig, ReferencePolicy};
    use crate::remediation::RemediationExecutor;
    use crate::test_utils::{GatewayCall, RecordingGateway};
    use crate::webhooks::{compute_signature, EventOutcome, WebhookHandler, WebhookVerifier};

    const SECRET: &str = "whsec_delivery";

    fn handler(gateway: Arc<RecordingGateway>) -> WebhookHandler {
        WebhookHandler::new(
            WebhookVerifier::new(SECRET, 300),
            ReferencePolicy::new(PolicyConfig::new(["plink_X"], "sfx_")),
            RemediationExecutor::new(gateway),
        )
    }

    fn signed_delivery() -> (Vec<u8>, String) {
        let payload = serde_json::to_vec(&serde_json::json!({
            "id": "evt_dup",
            "type": "checkout.session.completed",
            "data": { "object": {
                "id": "cs_dup",
                "payment_link": "plink_X",
                "client_reference_id": "wrong_1",
                "mode": "subscription",
                "subscription": "sub_1"
            }}
        }))
        .unwrap();
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let header = format!(
            "t={},v1={}",
            now,
            compute_signature(SECRET, now, &payload).unwrap()
        );
        (payload, header)
    }

    // =========================================================================
    // LG-D01: Same event delivered twice - one refund, same idempotency key
    // =========================================================================
    #[tokio::test]
    async fn test_redelivery_produces_single_refund() {
        let gateway = Arc::new(RecordingGateway::with_subscription("sub_1", "in_1", "ch_1"));
        let handler = handler(gateway.clone());
        let (payload, header) = signed_delivery();

        for _ in 0..2 {
            let event = handler.verify_event(&payload, Some(&header)).unwrap();
            assert!(matches!(
                handler.handle_event(event).await,
                EventOutcome::Remediated(_)
            ));
        }

        assert_eq!(gateway.refund_count(), 1);
        let keys: Vec<_> = gateway
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                GatewayCall::CreateRefund {
                    idempotency_key, ..
                } => Some(idempotency_key),
                _ => None,
            })
            .collect();
        assert_eq!(keys, vec!["refund_cs_dup", "refund_cs_dup"]);
    }

    // =========================================================================
    // LG-D02: 10 concurrent deliveries of one event - still one refund
    // =========================================================================
    #[tokio::test]
    async fn test_concurrent_duplicates_share_idempotency_key() {
        let gateway = Arc::new(RecordingGateway::with_subscription("sub_1", "in_1", "ch_1"));
        let handler = Arc::new(handler(gateway.clone()));
        let (payload, header) = signed_delivery();

        let mut handles = vec![];
        for _ in 0..10 {
            let handler = Arc::clone(&handler);
            let payload = payload.clone();
            let header = header.clone();
            handles.push(tokio::spawn(async move {
                let event = handler.verify_event(&payload, Some(&header)).unwrap();
                handler.handle_event(event).await
            }));
        }

        for handle in handles {
            let outcome = handle.await.unwrap();
            assert!(matches!(outcome, EventOutcome::Remediated(_)));
        }

        assert_eq!(gateway.refund_count(), 1);
    }
}
