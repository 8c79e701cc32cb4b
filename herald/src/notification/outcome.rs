//! Per-delivery outcome bookkeeping and the notification summary.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Envelope, Priority};

/// Why a delivery, or the whole notification, sent nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SuppressionReason {
    /// Required scenarios were not selected.
    NoScenario,
    Snoozed,
    TransportDisabled,
    /// The delivery does not accept the notification's priority.
    Priority,
    DeliveryCondition,
    NoTarget,
    Unknown,
    Duplicate,
}

impl SuppressionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoScenario => "NO_SCENARIO",
            Self::Snoozed => "SNOOZED",
            Self::TransportDisabled => "TRANSPORT_DISABLED",
            Self::Priority => "PRIORITY",
            Self::DeliveryCondition => "DELIVERY_CONDITION",
            Self::NoTarget => "NO_TARGET",
            Self::Unknown => "UNKNOWN",
            Self::Duplicate => "DUPLICATE",
        }
    }
}

impl fmt::Display for SuppressionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to one delivery.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeliveryOutcome {
    pub delivered: Vec<Envelope>,
    pub undelivered: Vec<Envelope>,
    /// Envelopes held back as duplicates, never attempted.
    pub duplicates: Vec<Envelope>,
    /// Set when the delivery as a whole sent nothing on purpose.
    pub suppressed: Option<SuppressionReason>,
    /// Failed transport calls.
    pub errors: usize,
    pub error: Option<String>,
    /// Dispatched as a fallback.
    pub fallback: bool,
}

impl DeliveryOutcome {
    pub fn new(fallback: bool) -> Self {
        Self {
            fallback,
            ..Default::default()
        }
    }

    pub fn suppressed(reason: SuppressionReason, fallback: bool) -> Self {
        Self {
            suppressed: Some(reason),
            fallback,
            ..Default::default()
        }
    }

    /// Envelopes that were attempted and failed.
    pub fn failed_count(&self) -> usize {
        self.undelivered.len()
    }

    pub fn delivered_count(&self) -> usize {
        self.delivered.len()
    }

    /// Whether the delivery as a whole sent nothing on purpose.
    pub fn is_suppressed(&self) -> bool {
        self.suppressed.is_some()
    }
}

/// Counts of one delivery's outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliverySummary {
    pub delivered: usize,
    pub undelivered: usize,
    pub duplicates: usize,
    pub errors: usize,
    pub suppressed: Option<SuppressionReason>,
    pub error: Option<String>,
    pub fallback: bool,
}

impl From<&DeliveryOutcome> for DeliverySummary {
    fn from(outcome: &DeliveryOutcome) -> Self {
        Self {
            delivered: outcome.delivered.len(),
            undelivered: outcome.undelivered.len(),
            duplicates: outcome.duplicates.len(),
            errors: outcome.errors,
            suppressed: outcome.suppressed,
            error: outcome.error.clone(),
            fallback: outcome.fallback,
        }
    }
}

/// Serializable record of a completed notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationSummary {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub priority: Priority,
    pub title: Option<String>,
    pub message: Option<String>,
    pub selected_scenarios: Vec<String>,
    pub selection: Vec<String>,
    pub delivered: usize,
    pub failed: usize,
    pub suppressed: usize,
    pub errors: usize,
    pub dupe: bool,
    pub suppression: Option<SuppressionReason>,
    pub deliveries: BTreeMap<String, DeliverySummary>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reason_wire_names() {
        assert_eq!(
            serde_json::to_value(SuppressionReason::NoScenario).unwrap(),
            json!("NO_SCENARIO")
        );
        assert_eq!(
            serde_json::to_value(SuppressionReason::TransportDisabled).unwrap(),
            json!(SuppressionReason::TransportDisabled.as_str())
        );
        assert_eq!(SuppressionReason::DeliveryCondition.to_string(), "DELIVERY_CONDITION");
    }

    #[test]
    fn test_outcome_summary() {
        let mut outcome = DeliveryOutcome::new(true);
        outcome.delivered.push(Envelope::builder("n", "email").build());
        outcome.undelivered.push(Envelope::builder("n", "email").build());
        outcome.errors = 1;

        let summary = DeliverySummary::from(&outcome);
        assert_eq!(summary.delivered, 1);
        assert_eq!(summary.undelivered, 1);
        assert_eq!(summary.errors, 1);
        assert!(summary.fallback);
        assert!(!outcome.is_suppressed());
        assert!(DeliveryOutcome::suppressed(SuppressionReason::Snoozed, false).is_suppressed());
    }

    #[test]
    fn test_partial_duplicates_are_not_suppression() {
        let mut outcome = DeliveryOutcome::new(false);
        outcome.delivered.push(Envelope::builder("n", "email").build());
        outcome.duplicates.push(Envelope::builder("n", "email").build());
        assert!(!outcome.is_suppressed());

        outcome.suppressed = Some(SuppressionReason::Duplicate);
        assert!(outcome.is_suppressed());
    }
}
