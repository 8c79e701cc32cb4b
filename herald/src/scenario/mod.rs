//! Scenarios: condition-gated rules that tune deliveries.
//!
//! A scenario is selected for a notification when its condition holds or
//! when the caller applies it by name. A selected scenario can switch
//! deliveries on or off and layer extra data, targets, media and action
//! groups onto them.
//!
//! Customization keys are either literal delivery names or regex patterns
//! (full match). The kind of each key is decided once at load; at lookup a
//! literal always wins, and patterns are tried in key order.

mod registry;

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use registry::ScenarioRegistry;

use crate::conditions::{ConditionEvaluator, ConditionVariables, evaluate_or_false};
use crate::config::ConfigIssue;
use crate::target::{Target, TargetData};

/// How a scenario tunes one delivery.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryCustomization {
    /// `Some(true)` switches the delivery on, `Some(false)` off, `None`
    /// leaves selection alone.
    pub enabled: Option<bool>,
    pub data: Option<TargetData>,
    pub target: Option<Target>,
}

/// Configuration of one scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    pub name: String,
    pub enabled: bool,
    pub condition: Option<String>,
    /// Delivery name or pattern to customization.
    pub delivery: BTreeMap<String, DeliveryCustomization>,
    pub media: Map<String, Value>,
    pub action_groups: Vec<String>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            enabled: true,
            condition: None,
            delivery: BTreeMap::new(),
            media: Map::new(),
            action_groups: Vec::new(),
        }
    }
}

/// A validated scenario.
#[derive(Debug)]
pub struct Scenario {
    name: String,
    enabled: AtomicBool,
    condition: Option<String>,
    literal: HashMap<String, DeliveryCustomization>,
    patterns: Vec<(Regex, DeliveryCustomization)>,
    enabling: Vec<String>,
    disabling: Vec<String>,
    relevant: Vec<String>,
    media: Map<String, Value>,
    action_groups: Vec<String>,
}

impl Scenario {
    /// Build a scenario against the known delivery names (in registration
    /// order) and action group names.
    ///
    /// Problems are returned alongside the scenario; the caller decides
    /// whether to keep it.
    pub fn new(
        config: ScenarioConfig,
        deliveries: &[String],
        action_groups: &[String],
        evaluator: &dyn ConditionEvaluator,
    ) -> (Self, Vec<ConfigIssue>) {
        let mut issues = Vec::new();
        let mut issue = |message: String| {
            issues.push(ConfigIssue::new("scenario", &config.name, message));
        };

        if config.name.trim().is_empty() {
            issue("Scenario name is empty".to_string());
        }

        if let Some(condition) = &config.condition {
            if let Err(e) = evaluator.validate(condition) {
                issue(format!("Invalid condition: {}", e));
            }
        }

        for group in &config.action_groups {
            if !action_groups.contains(group) {
                issue(format!("Unknown action group '{}'", group));
            }
        }

        let mut literal = HashMap::new();
        let mut patterns = Vec::new();
        for (key, customization) in config.delivery {
            if deliveries.contains(&key) {
                literal.insert(key, customization);
                continue;
            }
            match Regex::new(&format!("^(?:{})$", key)) {
                Ok(pattern) if deliveries.iter().any(|d| pattern.is_match(d)) => {
                    patterns.push((pattern, customization));
                }
                Ok(_) => issue(format!("'{}' matches no delivery", key)),
                Err(e) => issue(format!("'{}' is neither a delivery nor a pattern: {}", key, e)),
            }
        }

        let mut scenario = Self {
            name: config.name,
            enabled: AtomicBool::new(config.enabled),
            condition: config.condition,
            literal,
            patterns,
            enabling: Vec::new(),
            disabling: Vec::new(),
            relevant: Vec::new(),
            media: config.media,
            action_groups: config.action_groups,
        };

        for delivery in deliveries {
            let Some(customization) = scenario.customization_for(delivery) else {
                continue;
            };
            match customization.enabled {
                Some(true) => scenario.enabling.push(delivery.clone()),
                Some(false) => scenario.disabling.push(delivery.clone()),
                None => {}
            }
            scenario.relevant.push(delivery.clone());
        }

        (scenario, issues)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn condition(&self) -> Option<&str> {
        self.condition.as_deref()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Set the enabled flag; returns whether it changed.
    pub fn set_enabled(&self, enabled: bool) -> bool {
        self.enabled.swap(enabled, Ordering::Relaxed) != enabled
    }

    /// Customization for a delivery: the literal entry, else the first
    /// matching pattern.
    pub fn customization_for(&self, delivery: &str) -> Option<&DeliveryCustomization> {
        self.literal.get(delivery).or_else(|| {
            self.patterns
                .iter()
                .find(|(pattern, _)| pattern.is_match(delivery))
                .map(|(_, customization)| customization)
        })
    }

    /// Deliveries this scenario switches on.
    pub fn enabling_deliveries(&self) -> &[String] {
        &self.enabling
    }

    /// Deliveries this scenario switches off.
    pub fn disabling_deliveries(&self) -> &[String] {
        &self.disabling
    }

    /// Deliveries with any customization.
    pub fn relevant_deliveries(&self) -> &[String] {
        &self.relevant
    }

    pub fn media(&self) -> &Map<String, Value> {
        &self.media
    }

    pub fn action_groups(&self) -> &[String] {
        &self.action_groups
    }

    /// Whether the scenario activates itself for these variables.
    ///
    /// A scenario without a condition never does; it can only be applied
    /// explicitly.
    pub async fn evaluate(
        &self,
        evaluator: &dyn ConditionEvaluator,
        vars: &ConditionVariables,
    ) -> bool {
        if !self.is_enabled() {
            return false;
        }
        match &self.condition {
            Some(condition) => {
                evaluate_or_false(evaluator, condition, vars, &format!("scenario {}", self.name))
                    .await
            }
            None => false,
        }
    }
}
