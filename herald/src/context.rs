//! The process-wide dependency bundle handed to every notification.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::conditions::{ConditionEvaluator, SimpleConditionEvaluator};
use crate::config::{ConfigIssue, HeraldConfig};
use crate::delivery::DeliveryRegistry;
use crate::directory::{RecipientDirectory, StaticDirectory};
use crate::dupe::DupeChecker;
use crate::scenario::ScenarioRegistry;
use crate::snooze::Snoozer;
use crate::transport::Transport;

/// Shared state and collaborators of the routing engine.
///
/// Built once per process. The duplicate checker and snoozer are mutated
/// by every notification and synchronize internally.
pub struct HeraldContext {
    pub deliveries: DeliveryRegistry,
    pub scenarios: ScenarioRegistry,
    pub dupes: DupeChecker,
    pub snoozer: Snoozer,
    pub directory: Arc<dyn RecipientDirectory>,
    pub evaluator: Arc<dyn ConditionEvaluator>,
    pub action_groups: BTreeMap<String, Vec<Value>>,
}

impl HeraldContext {
    /// Build a context with explicit collaborators.
    pub fn new(
        config: &HeraldConfig,
        transports: Vec<Arc<dyn Transport>>,
        directory: Arc<dyn RecipientDirectory>,
        evaluator: Arc<dyn ConditionEvaluator>,
    ) -> Self {
        let deliveries =
            DeliveryRegistry::new(config.deliveries.clone(), transports, evaluator.as_ref());
        let action_group_names: Vec<String> = config.action_groups.keys().cloned().collect();
        let scenarios = ScenarioRegistry::new(
            config.scenarios.clone(),
            &deliveries,
            &action_group_names,
            evaluator.as_ref(),
        );

        Self {
            deliveries,
            scenarios,
            dupes: DupeChecker::new(&config.dupe),
            snoozer: Snoozer::new(&config.snooze),
            directory,
            evaluator,
            action_groups: config.action_groups.clone(),
        }
    }

    /// Build a context from configuration alone: configured transports, the
    /// static recipient directory and the built-in condition evaluator.
    pub fn from_config(config: &HeraldConfig) -> Self {
        let transports = config.transports.iter().map(|t| t.build()).collect();
        Self::new(
            config,
            transports,
            Arc::new(StaticDirectory::new(config.recipients.clone())),
            Arc::new(SimpleConditionEvaluator::new()),
        )
    }

    /// Every configuration issue found while loading.
    pub fn issues(&self) -> Vec<ConfigIssue> {
        self.deliveries
            .issues()
            .iter()
            .chain(self.scenarios.issues())
            .cloned()
            .collect()
    }
}
