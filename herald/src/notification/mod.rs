//! Notification routing.
//!
//! A [`Notification`] takes one [`NotificationRequest`] through the whole
//! pipeline:
//!
//! 1. [`Notification::initialize`] (no side effects): occupancy, scenario
//!    selection, delivery selection, global snooze check, scenario media
//!    and action groups.
//! 2. [`Notification::deliver`]: per selected delivery, target resolution,
//!    envelope generation, duplicate check and transport call, then
//!    fallback dispatch.
//!
//! After delivery the notification is a read-only record of what happened.

mod dispatch;
mod envelope;
mod outcome;
mod priority;
mod request;
mod resolution;
mod selection;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

pub use envelope::{Envelope, EnvelopeBuilder};
pub use outcome::{DeliveryOutcome, DeliverySummary, NotificationSummary, SuppressionReason};
pub use priority::Priority;
pub use request::{DeliveryOverride, DeliverySelection, NotificationRequest};

use crate::conditions::ConditionVariables;
use crate::context::HeraldContext;
use crate::delivery::Delivery;
use crate::directory::Recipient;
use crate::scenario::Scenario;
use crate::target::Target;
use crate::{Error, Result};

/// One notification on its way through the router.
pub struct Notification {
    ctx: Arc<HeraldContext>,
    id: String,
    created_at: DateTime<Utc>,
    request: NotificationRequest,
    initialized: bool,
    /// Result of the one dispatch run, once it has happened.
    delivered: Option<bool>,
    recipients: Vec<Recipient>,
    vars: ConditionVariables,
    selected_scenarios: Vec<Arc<Scenario>>,
    selection: Vec<Arc<Delivery>>,
    /// Deliveries reached only through recipient preferences, with the
    /// recipients that asked for them.
    personal: HashMap<String, Vec<String>>,
    enabled_snapshot: HashSet<String>,
    suppression: Option<SuppressionReason>,
    media: Map<String, Value>,
    action_groups: Vec<String>,
    outcomes: BTreeMap<String, DeliveryOutcome>,
    /// Addresses already used by earlier deliveries.
    claimed: Target,
    dupe: bool,
}

impl Notification {
    /// Create a notification.
    ///
    /// Fails when the context has nothing to deliver through or the request
    /// fixes an empty delivery list.
    pub fn new(ctx: Arc<HeraldContext>, request: NotificationRequest) -> Result<Self> {
        if ctx.deliveries.is_empty() {
            return Err(Error::config("No deliveries are configured"));
        }
        if matches!(&request.delivery, DeliverySelection::Fixed(names) if names.is_empty()) {
            return Err(Error::validation("Fixed delivery selection names no delivery"));
        }

        Ok(Self {
            ctx,
            id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            request,
            initialized: false,
            delivered: None,
            recipients: Vec::new(),
            vars: ConditionVariables::default(),
            selected_scenarios: Vec::new(),
            selection: Vec::new(),
            personal: HashMap::new(),
            enabled_snapshot: HashSet::new(),
            suppression: None,
            media: Map::new(),
            action_groups: Vec::new(),
            outcomes: BTreeMap::new(),
            claimed: Target::new(),
            dupe: false,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn request(&self) -> &NotificationRequest {
        &self.request
    }

    pub fn priority(&self) -> Priority {
        self.request.priority
    }

    /// Selected delivery names, in dispatch order.
    pub fn selection(&self) -> Vec<&str> {
        self.selection.iter().map(|d| d.name.as_str()).collect()
    }

    pub fn selected_scenarios(&self) -> Vec<&str> {
        self.selected_scenarios.iter().map(|s| s.name()).collect()
    }

    /// Reason the whole notification was held back, if it was.
    pub fn suppression(&self) -> Option<SuppressionReason> {
        self.suppression
    }

    pub fn media(&self) -> &Map<String, Value> {
        &self.media
    }

    pub fn action_groups(&self) -> &[String] {
        &self.action_groups
    }

    pub fn outcome(&self, delivery: &str) -> Option<&DeliveryOutcome> {
        self.outcomes.get(delivery)
    }

    pub fn outcomes(&self) -> &BTreeMap<String, DeliveryOutcome> {
        &self.outcomes
    }

    pub fn delivered_count(&self) -> usize {
        self.outcomes.values().map(DeliveryOutcome::delivered_count).sum()
    }

    /// Envelopes attempted without success.
    pub fn failed_count(&self) -> usize {
        self.outcomes.values().map(DeliveryOutcome::failed_count).sum()
    }

    /// Transport calls that raised an error.
    pub fn error_count(&self) -> usize {
        self.outcomes.values().map(|o| o.errors).sum()
    }

    /// Deliveries that sent nothing on purpose.
    pub fn suppressed_count(&self) -> usize {
        self.outcomes.values().filter(|o| o.is_suppressed()).count()
    }

    /// Whether any envelope was held back as a duplicate.
    pub fn dupe(&self) -> bool {
        self.dupe
    }

    pub fn delivered_envelopes(&self) -> Vec<&Envelope> {
        self.outcomes.values().flat_map(|o| &o.delivered).collect()
    }

    pub fn undelivered_envelopes(&self) -> Vec<&Envelope> {
        self.outcomes.values().flat_map(|o| &o.undelivered).collect()
    }

    pub fn summary(&self) -> NotificationSummary {
        NotificationSummary {
            id: self.id.clone(),
            created_at: self.created_at,
            priority: self.request.priority,
            title: self.request.title.clone(),
            message: self.request.message.clone(),
            selected_scenarios: self
                .selected_scenarios()
                .into_iter()
                .map(str::to_string)
                .collect(),
            selection: self.selection().into_iter().map(str::to_string).collect(),
            delivered: self.delivered_count(),
            failed: self.failed_count(),
            suppressed: self.suppressed_count(),
            errors: self.error_count(),
            dupe: self.dupe,
            suppression: self.suppression,
            deliveries: self
                .outcomes
                .iter()
                .map(|(name, outcome)| (name.clone(), DeliverySummary::from(outcome)))
                .collect(),
        }
    }
}
