//! Registry of validated deliveries.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::{Delivery, DeliveryConfig, SelectionTag};
use crate::conditions::ConditionEvaluator;
use crate::config::ConfigIssue;
use crate::transport::Transport;

/// All configured deliveries plus their transports and live enabled state.
pub struct DeliveryRegistry {
    deliveries: Vec<Arc<Delivery>>,
    transports: HashMap<String, Arc<dyn Transport>>,
    enabled: RwLock<HashMap<String, bool>>,
    issues: Vec<ConfigIssue>,
}

impl DeliveryRegistry {
    /// Validate and register deliveries in order.
    ///
    /// A delivery that fails validation is dropped and reported as an
    /// issue; the rest still load.
    pub fn new(
        configs: Vec<DeliveryConfig>,
        transports: Vec<Arc<dyn Transport>>,
        evaluator: &dyn ConditionEvaluator,
    ) -> Self {
        let transports: HashMap<String, Arc<dyn Transport>> = transports
            .into_iter()
            .map(|t| (t.name().to_string(), t))
            .collect();

        let mut deliveries: Vec<Arc<Delivery>> = Vec::with_capacity(configs.len());
        let mut issues = Vec::new();

        for config in configs {
            let problem = Self::validate(&config, &deliveries, &transports, evaluator);
            if let Some(message) = problem {
                let issue = ConfigIssue::new("delivery", &config.name, message);
                warn!(delivery = %config.name, "Dropping delivery: {}", issue.message);
                issues.push(issue);
                continue;
            }
            deliveries.push(Arc::new(Delivery::from(config)));
        }

        let enabled = deliveries
            .iter()
            .map(|d| (d.name.clone(), d.enabled))
            .collect();

        info!(
            deliveries = deliveries.len(),
            issues = issues.len(),
            "Delivery registry loaded"
        );

        Self {
            deliveries,
            transports,
            enabled: RwLock::new(enabled),
            issues,
        }
    }

    fn validate(
        config: &DeliveryConfig,
        registered: &[Arc<Delivery>],
        transports: &HashMap<String, Arc<dyn Transport>>,
        evaluator: &dyn ConditionEvaluator,
    ) -> Option<String> {
        if config.name.trim().is_empty() {
            return Some("Delivery name is empty".to_string());
        }
        if Delivery::is_reserved_name(&config.name) {
            return Some(format!("'{}' is a reserved name", config.name));
        }
        if registered.iter().any(|d| d.name == config.name) {
            return Some(format!("Duplicate delivery name '{}'", config.name));
        }
        let Some(transport) = transports.get(&config.transport) else {
            return Some(format!("Unknown transport '{}'", config.transport));
        };
        if let Some(action) = &config.action {
            if !transport.supports_action(action) {
                return Some(format!(
                    "Transport '{}' does not support action '{}'",
                    config.transport, action
                ));
            }
        }
        if let Some(condition) = &config.condition {
            if let Err(e) = evaluator.validate(condition) {
                return Some(format!("Invalid condition: {}", e));
            }
        }
        None
    }

    pub fn get(&self, name: &str) -> Option<Arc<Delivery>> {
        self.deliveries.iter().find(|d| d.name == name).cloned()
    }

    /// Deliveries in registration order.
    pub fn deliveries(&self) -> &[Arc<Delivery>] {
        &self.deliveries
    }

    pub fn names(&self) -> Vec<String> {
        self.deliveries.iter().map(|d| d.name.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.deliveries.is_empty()
    }

    pub fn transport(&self, name: &str) -> Option<Arc<dyn Transport>> {
        self.transports.get(name).cloned()
    }

    pub fn transport_for(&self, delivery: &Delivery) -> Option<Arc<dyn Transport>> {
        self.transport(&delivery.transport)
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled.read().get(name).copied().unwrap_or(false)
    }

    /// Enable a delivery; returns whether the state changed.
    pub fn enable(&self, name: &str) -> bool {
        self.set_enabled(name, true)
    }

    /// Disable a delivery; returns whether the state changed.
    pub fn disable(&self, name: &str) -> bool {
        self.set_enabled(name, false)
    }

    fn set_enabled(&self, name: &str, value: bool) -> bool {
        let mut enabled = self.enabled.write();
        match enabled.get_mut(name) {
            Some(state) if *state != value => {
                *state = value;
                info!(delivery = %name, enabled = value, "Delivery toggled");
                true
            }
            Some(_) => false,
            None => {
                debug!(delivery = %name, "Toggle for unknown delivery ignored");
                false
            }
        }
    }

    /// Names of the deliveries enabled right now, read once.
    pub fn snapshot(&self) -> HashSet<String> {
        self.enabled
            .read()
            .iter()
            .filter(|(_, enabled)| **enabled)
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn tagged(&self, tag: SelectionTag, enabled: &HashSet<String>) -> Vec<Arc<Delivery>> {
        self.deliveries
            .iter()
            .filter(|d| d.has_tag(tag) && enabled.contains(&d.name))
            .cloned()
            .collect()
    }

    /// Deliveries tagged `default` that are in the enabled snapshot.
    pub fn default_deliveries(&self, enabled: &HashSet<String>) -> Vec<Arc<Delivery>> {
        self.tagged(SelectionTag::Default, enabled)
    }

    /// Deliveries tagged `fallback` that are in the enabled snapshot.
    pub fn fallback_by_default(&self, enabled: &HashSet<String>) -> Vec<Arc<Delivery>> {
        self.tagged(SelectionTag::Fallback, enabled)
    }

    /// Deliveries tagged `fallback_on_error` that are in the enabled snapshot.
    pub fn fallback_on_error(&self, enabled: &HashSet<String>) -> Vec<Arc<Delivery>> {
        self.tagged(SelectionTag::FallbackOnError, enabled)
    }

    pub fn issues(&self) -> &[ConfigIssue] {
        &self.issues
    }
}
