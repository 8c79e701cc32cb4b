//! Registry of validated scenarios.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{Scenario, ScenarioConfig};
use crate::conditions::{ConditionEvaluator, ConditionVariables};
use crate::config::ConfigIssue;
use crate::delivery::DeliveryRegistry;

pub struct ScenarioRegistry {
    scenarios: Vec<Arc<Scenario>>,
    issues: Vec<ConfigIssue>,
}

impl ScenarioRegistry {
    /// Validate scenarios against the loaded deliveries and action groups.
    ///
    /// Scenarios with any issue are left out.
    pub fn new(
        configs: Vec<ScenarioConfig>,
        deliveries: &DeliveryRegistry,
        action_groups: &[String],
        evaluator: &dyn ConditionEvaluator,
    ) -> Self {
        let delivery_names = deliveries.names();
        let mut scenarios: Vec<Arc<Scenario>> = Vec::new();
        let mut issues = Vec::new();

        for config in configs {
            if scenarios.iter().any(|s| s.name() == config.name) {
                let issue = ConfigIssue::new("scenario", &config.name, "Duplicate scenario name");
                warn!(scenario = %config.name, "Dropping scenario: {}", issue.message);
                issues.push(issue);
                continue;
            }

            let (scenario, problems) =
                Scenario::new(config, &delivery_names, action_groups, evaluator);
            if problems.is_empty() {
                scenarios.push(Arc::new(scenario));
            } else {
                for problem in &problems {
                    warn!(scenario = %problem.unit, "Dropping scenario: {}", problem.message);
                }
                issues.extend(problems);
            }
        }

        info!(
            scenarios = scenarios.len(),
            issues = issues.len(),
            "Scenario registry loaded"
        );

        Self { scenarios, issues }
    }

    pub fn get(&self, name: &str) -> Option<Arc<Scenario>> {
        self.scenarios.iter().find(|s| s.name() == name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.scenarios.iter().map(|s| s.name().to_string()).collect()
    }

    pub fn scenarios(&self) -> &[Arc<Scenario>] {
        &self.scenarios
    }

    /// Enable a scenario; returns whether the state changed.
    pub fn enable(&self, name: &str) -> bool {
        self.get(name).is_some_and(|s| s.set_enabled(true))
    }

    /// Disable a scenario; returns whether the state changed.
    pub fn disable(&self, name: &str) -> bool {
        self.get(name).is_some_and(|s| s.set_enabled(false))
    }

    pub fn issues(&self) -> &[ConfigIssue] {
        &self.issues
    }

    /// Scenarios selected for a notification.
    ///
    /// Every scenario whose condition holds, plus the explicitly applied
    /// ones (which skip the condition but not the enabled flag). A
    /// non-empty constrain list then keeps only constrained or applied
    /// scenarios.
    pub async fn select(
        &self,
        evaluator: &dyn ConditionEvaluator,
        vars: &ConditionVariables,
    ) -> Vec<Arc<Scenario>> {
        let mut selected: Vec<Arc<Scenario>> = Vec::new();

        for scenario in &self.scenarios {
            let applied = vars.applied_scenarios.iter().any(|n| n == scenario.name());
            let chosen = if applied {
                scenario.is_enabled()
            } else {
                scenario.evaluate(evaluator, vars).await
            };
            if chosen {
                selected.push(scenario.clone());
            }
        }

        for name in &vars.applied_scenarios {
            if self.get(name).is_none() {
                debug!(scenario = %name, "Applied scenario is not configured");
            }
        }

        if !vars.constrain_scenarios.is_empty() {
            selected.retain(|s| {
                vars.constrain_scenarios.iter().any(|n| n == s.name())
                    || vars.applied_scenarios.iter().any(|n| n == s.name())
            });
        }

        selected
    }
}
