//! Deliveries: statically configured, named channels.
//!
//! A [`Delivery`] binds a transport to a selection policy (tags, rank,
//! priority allow-list, occupancy filter, condition) and a target policy.
//! Deliveries are validated once at load and owned by the
//! [`DeliveryRegistry`]; only their enabled state changes at runtime.

mod registry;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use registry::DeliveryRegistry;

use crate::directory::OccupancyFilter;
use crate::notification::Priority;
use crate::target::{Target, TargetData};

/// Names that cannot be used for a delivery.
pub const RESERVED_DELIVERY_NAMES: [&str; 2] = ["all", "default"];

/// How a delivery gets picked for a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionTag {
    /// Only when a caller names it.
    Explicit,
    /// Whenever the caller does not pick deliveries explicitly.
    Default,
    /// When nothing else delivered.
    Fallback,
    /// When some other delivery failed.
    FallbackOnError,
    /// When a scenario switches it on.
    ByScenario,
}

/// Ordering hint among the selected deliveries.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Rank {
    First,
    #[default]
    Any,
    Last,
}

/// When a delivery's own static target is used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetUsage {
    /// Only the static target, nothing else is resolved.
    Fixed,
    /// Always add the static target.
    MergeAlways,
    /// Add the static target when something else resolved.
    MergeOnDeliveryTargets,
    /// Use the static target when nothing else resolved.
    OnNoDeliveryTargets,
    /// Add the static target when the caller gave no target.
    #[default]
    OnNoActionTargets,
}

/// What an empty resolution means for a delivery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetRequired {
    /// Nothing to address is recorded as `NO_TARGET`.
    #[default]
    Always,
    /// Nothing to address is recorded as `UNKNOWN`.
    Optional,
    /// Targets are not resolved; one untargeted envelope is sent.
    Never,
}

/// Configuration of one delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    pub name: String,
    /// Name of the transport this delivery sends through.
    pub transport: String,
    /// Transport-specific action, checked against the transport at load.
    pub action: Option<String>,
    pub enabled: bool,
    pub occupancy: OccupancyFilter,
    pub condition: Option<String>,
    pub selection: Vec<SelectionTag>,
    /// Priorities this delivery accepts.
    pub priority: Vec<Priority>,
    pub rank: Rank,
    pub target_usage: TargetUsage,
    pub target: Option<Value>,
    pub data: Option<TargetData>,
    /// Skip addresses an earlier delivery of the same notification claimed.
    pub unique_targets: bool,
    pub target_required: TargetRequired,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            transport: String::new(),
            action: None,
            enabled: true,
            occupancy: OccupancyFilter::All,
            condition: None,
            selection: vec![SelectionTag::Default],
            priority: Priority::ALL.to_vec(),
            rank: Rank::Any,
            target_usage: TargetUsage::OnNoActionTargets,
            target: None,
            data: None,
            unique_targets: false,
            target_required: TargetRequired::Always,
        }
    }
}

/// A validated delivery.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub name: String,
    pub transport: String,
    pub action: Option<String>,
    /// Enabled state at load; the registry tracks the live state.
    pub enabled: bool,
    pub occupancy: OccupancyFilter,
    pub condition: Option<String>,
    pub selection: Vec<SelectionTag>,
    pub priorities: Vec<Priority>,
    pub rank: Rank,
    pub target_usage: TargetUsage,
    pub target: Target,
    pub data: TargetData,
    pub unique_targets: bool,
    pub target_required: TargetRequired,
}

impl Delivery {
    pub fn has_tag(&self, tag: SelectionTag) -> bool {
        self.selection.contains(&tag)
    }

    pub fn accepts_priority(&self, priority: Priority) -> bool {
        self.priorities.contains(&priority)
    }

    /// Whether `name` is reserved, ignoring case.
    pub fn is_reserved_name(name: &str) -> bool {
        RESERVED_DELIVERY_NAMES
            .iter()
            .any(|reserved| reserved.eq_ignore_ascii_case(name.trim()))
    }
}

impl From<DeliveryConfig> for Delivery {
    fn from(config: DeliveryConfig) -> Self {
        Self {
            name: config.name,
            transport: config.transport,
            action: config.action,
            enabled: config.enabled,
            occupancy: config.occupancy,
            condition: config.condition,
            selection: config.selection,
            priorities: config.priority,
            rank: config.rank,
            target_usage: config.target_usage,
            target: config
                .target
                .as_ref()
                .map(Target::from_value)
                .unwrap_or_default(),
            data: config.data.unwrap_or_default(),
            unique_targets: config.unique_targets,
            target_required: config.target_required,
        }
    }
}
