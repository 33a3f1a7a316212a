//! Client reference policy for monitored payment links
//!
//! Purchases made through a monitored payment link must carry a
//! `client_reference_id` beginning with the configured prefix. The check is a
//! literal, case-sensitive starts-with test; anything may follow the prefix.

use std::collections::HashSet;
use std::fmt;

use crate::events::CheckoutSession;

/// Policy settings, built once at startup
#[derive(Debug, Clone)]
pub struct PolicyConfig {
    pub monitored_payment_links: HashSet<String>,
    pub required_prefix: String,
}

impl PolicyConfig {
    pub fn new<I, S>(monitored_payment_links: I, required_prefix: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            monitored_payment_links: monitored_payment_links.into_iter().map(Into::into).collect(),
            required_prefix: required_prefix.into(),
        }
    }
}

/// Why a session must be remediated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemediationReason {
    MissingReferenceId,
    InvalidReferencePrefix,
}

impl RemediationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemediationReason::MissingReferenceId => "missing reference id",
            RemediationReason::InvalidReferencePrefix => "invalid reference id prefix",
        }
    }
}

impl fmt::Display for RemediationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefundDecision {
    /// The session was not bought through a monitored payment link
    NotMonitored,
    /// Monitored link with a valid reference id
    Compliant,
    Remediate(RemediationReason),
}

impl RefundDecision {
    pub fn should_remediate(&self) -> bool {
        matches!(self, RefundDecision::Remediate(_))
    }

    /// Human-readable cause, empty when nothing needs to happen
    pub fn reason(&self) -> &'static str {
        match self {
            RefundDecision::Remediate(reason) => reason.as_str(),
            RefundDecision::NotMonitored | RefundDecision::Compliant => "",
        }
    }
}

/// Eligibility classifier for completed checkout sessions
#[derive(Debug, Clone)]
pub struct ReferencePolicy {
    config: PolicyConfig,
}

impl ReferencePolicy {
    pub fn new(config: PolicyConfig) -> Self {
        Self { config }
    }

    pub fn required_prefix(&self) -> &str {
        &self.config.required_prefix
    }

    pub fn is_monitored(&self, payment_link: Option<&str>) -> bool {
        payment_link.is_some_and(|link| self.config.monitored_payment_links.contains(link))
    }

    pub fn classify(&self, session: &CheckoutSession) -> RefundDecision {
        if !self.is_monitored(session.payment_link.as_deref()) {
            return RefundDecision::NotMonitored;
        }

        match session.client_reference_id.as_deref() {
            None | Some("") => RefundDecision::Remediate(RemediationReason::MissingReferenceId),
            Some(reference) if !reference.starts_with(self.config.required_prefix.as_str()) => {
                RefundDecision::Remediate(RemediationReason::InvalidReferencePrefix)
            }
            Some(_) => RefundDecision::Compliant,
        }
    }
}
