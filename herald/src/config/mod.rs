//! Configuration model and loader.
//!
//! The whole system is configured from one JSON document. Loading only
//! parses it; semantic validation happens when the registries are built,
//! where a bad unit is dropped and reported as a [`ConfigIssue`] instead of
//! failing the load.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::Result;
use crate::delivery::DeliveryConfig;
use crate::directory::RecipientConfig;
use crate::dupe::DupeConfig;
use crate::logging::LoggingOptions;
use crate::scenario::ScenarioConfig;
use crate::snooze::SnoozeConfig;
use crate::transport::TransportConfig;

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_ENV: &str = "HERALD_CONFIG";

/// Configuration file used when the environment does not name one.
pub const DEFAULT_CONFIG_PATH: &str = "herald.json";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HeraldConfig {
    /// Deliveries in registration order.
    pub deliveries: Vec<DeliveryConfig>,
    pub scenarios: Vec<ScenarioConfig>,
    pub action_groups: BTreeMap<String, Vec<Value>>,
    pub recipients: Vec<RecipientConfig>,
    pub transports: Vec<TransportConfig>,
    pub dupe: DupeConfig,
    pub snooze: SnoozeConfig,
    pub logging: LoggingOptions,
}

impl HeraldConfig {
    /// Parse configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a configuration file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path).await?;
        let config = Self::from_json(&contents)?;
        debug!(
            path = %path.display(),
            deliveries = config.deliveries.len(),
            scenarios = config.scenarios.len(),
            "Configuration loaded"
        );
        Ok(config)
    }
}

/// A non-fatal problem with one configured unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigIssue {
    /// `delivery`, `scenario`, ...
    pub unit_kind: String,
    pub unit: String,
    pub message: String,
}

impl ConfigIssue {
    pub fn new(
        unit_kind: impl Into<String>,
        unit: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            unit_kind: unit_kind.into(),
            unit: unit.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} '{}': {}", self.unit_kind, self.unit, self.message)
    }
}
