//! Condition evaluation.
//!
//! Scenarios and deliveries may carry a condition expression. Evaluating it
//! against live system state is the job of a [`ConditionEvaluator`]; this
//! crate only builds the read-only [`ConditionVariables`] snapshot and
//! treats evaluator errors as "condition false" for that one call.

mod simple;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

pub use simple::SimpleConditionEvaluator;

use crate::Result;
use crate::notification::Priority;

/// Who is home and who is away when the notification is raised.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OccupancySummary {
    pub home: Vec<String>,
    pub away: Vec<String>,
}

/// Read-only variables a condition can refer to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConditionVariables {
    pub applied_scenarios: Vec<String>,
    pub required_scenarios: Vec<String>,
    pub constrain_scenarios: Vec<String>,
    /// Scenarios selected so far; empty while scenarios are being evaluated.
    pub selected_scenarios: Vec<String>,
    pub priority: Priority,
    pub message: Option<String>,
    pub title: Option<String>,
    pub occupancy: OccupancySummary,
}

impl ConditionVariables {
    /// Look up a variable by dotted path, e.g. `occupancy.home`.
    pub fn lookup(&self, path: &str) -> Option<Value> {
        let root = serde_json::to_value(self).ok()?;
        path.split('.')
            .try_fold(&root, |value, segment| value.get(segment))
            .cloned()
    }
}

/// Evaluates condition expressions.
#[async_trait]
pub trait ConditionEvaluator: Send + Sync {
    /// Evaluate an expression against the variables.
    async fn evaluate(&self, expr: &str, vars: &ConditionVariables) -> Result<bool>;

    /// Check an expression's syntax without evaluating it.
    fn validate(&self, expr: &str) -> Result<()> {
        let _ = expr;
        Ok(())
    }
}

/// Evaluate a condition, logging errors and treating them as false.
pub async fn evaluate_or_false(
    evaluator: &dyn ConditionEvaluator,
    expr: &str,
    vars: &ConditionVariables,
    context: &str,
) -> bool {
    match evaluator.evaluate(expr, vars).await {
        Ok(result) => result,
        Err(e) => {
            warn!(condition = %expr, context = %context, "Condition evaluation failed: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lookup_paths() {
        let vars = ConditionVariables {
            applied_scenarios: vec!["alarm".into()],
            priority: Priority::High,
            occupancy: OccupancySummary {
                home: vec!["person.a".into()],
                away: vec![],
            },
            ..Default::default()
        };

        assert_eq!(vars.lookup("priority"), Some(json!("high")));
        assert_eq!(vars.lookup("occupancy.home"), Some(json!(["person.a"])));
        assert_eq!(vars.lookup("applied_scenarios"), Some(json!(["alarm"])));
        assert_eq!(vars.lookup("nope"), None);
    }
}
