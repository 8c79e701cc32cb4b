//! Snooze and silence registry.
//!
//! A snooze suppresses notifications for a scope (a delivery, a transport,
//! a priority, a mobile target, a camera, or everything) either for everyone
//! or for one recipient, optionally until an expiry. Registering the same
//! `(target, recipient scope)` again replaces the previous snooze. Expired
//! snoozes stop matching immediately but are only removed by [`Snoozer::purge`].

mod command;

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub use command::{CommandScope, SnoozeAction, SnoozeCommand, parse_command};

use crate::notification::Priority;
use crate::target::{CategoryKey, Target, TargetCategory};

/// Default snooze duration (1 hour).
const DEFAULT_SNOOZE_TTL_SECS: u64 = 3600;

/// Default command prefix.
const DEFAULT_COMMAND_PREFIX: &str = "HERALD";

/// Snooze configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnoozeConfig {
    /// Duration used when a snooze gives none.
    pub default_ttl_secs: u64,
    /// Prefix of structured command strings.
    pub command_prefix: String,
}

impl Default for SnoozeConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: DEFAULT_SNOOZE_TTL_SECS,
            command_prefix: DEFAULT_COMMAND_PREFIX.to_string(),
        }
    }
}

/// What a snooze applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SnoozeTarget {
    /// Every notification.
    Everything,
    /// Every notification below the top priority.
    NonCritical,
    Delivery(String),
    Transport(String),
    Priority(Priority),
    /// A single direct address, usually a mobile app id.
    Mobile(String),
    /// A camera entity address.
    Camera(String),
}

impl SnoozeTarget {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Everything => "everything",
            Self::NonCritical => "non_critical",
            Self::Delivery(_) => "delivery",
            Self::Transport(_) => "transport",
            Self::Priority(_) => "priority",
            Self::Mobile(_) => "mobile",
            Self::Camera(_) => "camera",
        }
    }

    pub fn id(&self) -> Option<String> {
        match self {
            Self::Everything | Self::NonCritical => None,
            Self::Delivery(id) | Self::Transport(id) | Self::Mobile(id) | Self::Camera(id) => {
                Some(id.clone())
            }
            Self::Priority(p) => Some(p.to_string()),
        }
    }

    pub fn is_global(&self) -> bool {
        matches!(self, Self::Everything | Self::NonCritical)
    }
}

/// Who a snooze applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientScope {
    Everyone,
    /// A single person id.
    User(String),
}

/// A registered snooze.
#[derive(Debug, Clone)]
pub struct Snooze {
    pub target: SnoozeTarget,
    pub scope: RecipientScope,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
}

impl Snooze {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|expiry| now < expiry)
    }

    pub fn is_active(&self) -> bool {
        self.is_active_at(Utc::now())
    }

    /// Whether this snooze covers a delivery at a priority, ignoring scope.
    fn covers(&self, delivery: &str, transport: &str, priority: Priority) -> bool {
        match &self.target {
            SnoozeTarget::Everything => true,
            SnoozeTarget::NonCritical => priority < Priority::TOP,
            SnoozeTarget::Delivery(name) => name == delivery,
            SnoozeTarget::Transport(name) => name == transport,
            SnoozeTarget::Priority(p) => *p == priority,
            SnoozeTarget::Mobile(_) | SnoozeTarget::Camera(_) => false,
        }
    }
}

/// Serializable view of an active snooze.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnoozeSummary {
    pub target_type: String,
    pub target_id: Option<String>,
    pub recipient: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
}

impl From<&Snooze> for SnoozeSummary {
    fn from(snooze: &Snooze) -> Self {
        Self {
            target_type: snooze.target.type_name().to_string(),
            target_id: snooze.target.id(),
            recipient: match &snooze.scope {
                RecipientScope::Everyone => None,
                RecipientScope::User(person) => Some(person.clone()),
            },
            created_at: snooze.created_at,
            expires_at: snooze.expires_at,
            reason: snooze.reason.clone(),
        }
    }
}

type SnoozeKey = (SnoozeTarget, RecipientScope);

/// Process-wide snooze registry.
///
/// Backed by a concurrent map so every notification can read it while
/// commands register or lift snoozes.
pub struct Snoozer {
    snoozes: DashMap<SnoozeKey, Snooze>,
    default_ttl: Duration,
    command_prefix: String,
}

impl Snoozer {
    pub fn new(config: &SnoozeConfig) -> Self {
        Self {
            snoozes: DashMap::new(),
            default_ttl: Duration::from_secs(config.default_ttl_secs),
            command_prefix: config.command_prefix.clone(),
        }
    }

    /// Create or replace a snooze. `None` uses the configured default TTL.
    pub fn register_snooze(
        &self,
        target: SnoozeTarget,
        scope: RecipientScope,
        ttl: Option<Duration>,
        reason: Option<String>,
    ) {
        let now = Utc::now();
        let ttl = ttl.unwrap_or(self.default_ttl);
        let expires_at = TimeDelta::from_std(ttl)
            .ok()
            .and_then(|delta| now.checked_add_signed(delta));
        self.insert(target, scope, now, expires_at, reason);
    }

    /// Create or replace a snooze that never expires.
    pub fn silence(&self, target: SnoozeTarget, scope: RecipientScope, reason: Option<String>) {
        self.insert(target, scope, Utc::now(), None, reason);
    }

    fn insert(
        &self,
        target: SnoozeTarget,
        scope: RecipientScope,
        created_at: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
        reason: Option<String>,
    ) {
        info!(
            target_type = target.type_name(),
            target_id = ?target.id(),
            scope = ?scope,
            expires_at = ?expires_at,
            "Snooze registered"
        );
        let snooze = Snooze {
            target: target.clone(),
            scope: scope.clone(),
            created_at,
            expires_at,
            reason,
        };
        self.snoozes.insert((target, scope), snooze);
    }

    /// Lift a snooze. Returns whether one was registered.
    pub fn normal(&self, target: &SnoozeTarget, scope: &RecipientScope) -> bool {
        let removed = self
            .snoozes
            .remove(&(target.clone(), scope.clone()))
            .is_some();
        if removed {
            info!(target_type = target.type_name(), target_id = ?target.id(), "Snooze lifted");
        }
        removed
    }

    /// Remove every expired snooze, returning how many went.
    pub fn purge(&self) -> usize {
        let now = Utc::now();
        let before = self.snoozes.len();
        self.snoozes.retain(|_, snooze| snooze.is_active_at(now));
        let purged = before.saturating_sub(self.snoozes.len());
        if purged > 0 {
            debug!(purged, "Purged expired snoozes");
        }
        purged
    }

    /// Remove every snooze, returning how many went.
    pub fn clear(&self) -> usize {
        let count = self.snoozes.len();
        self.snoozes.clear();
        count
    }

    /// Summaries of the active snoozes.
    pub fn export(&self) -> Vec<SnoozeSummary> {
        let now = Utc::now();
        let mut summaries: Vec<SnoozeSummary> = self
            .snoozes
            .iter()
            .filter(|entry| entry.is_active_at(now))
            .map(|entry| SnoozeSummary::from(entry.value()))
            .collect();
        summaries.sort_by_key(|s| s.created_at);
        summaries
    }

    /// Snapshot of the active snoozes.
    pub fn active(&self) -> Vec<Snooze> {
        let now = Utc::now();
        self.snoozes
            .iter()
            .filter(|entry| entry.is_active_at(now))
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.active().len()
    }

    /// Whether an everyone-scoped global snooze silences this priority.
    pub fn is_global_snooze(&self, priority: Priority) -> bool {
        self.active().iter().any(|snooze| {
            snooze.scope == RecipientScope::Everyone
                && match snooze.target {
                    SnoozeTarget::Everything => true,
                    SnoozeTarget::NonCritical => priority < Priority::TOP,
                    _ => false,
                }
        })
    }

    /// Whether an everyone-scoped snooze on the delivery, its transport or
    /// the priority suppresses the whole delivery.
    pub fn is_delivery_snoozed(&self, delivery: &str, transport: &str, priority: Priority) -> bool {
        self.active().iter().any(|snooze| {
            snooze.scope == RecipientScope::Everyone
                && !snooze.target.is_global()
                && snooze.covers(delivery, transport, priority)
        })
    }

    /// Remove the addresses an active snooze covers for this delivery.
    ///
    /// Recipient-scoped snoozes drop the person id; mobile and camera
    /// snoozes drop the matching direct address.
    pub fn filter_target(
        &self,
        target: &Target,
        delivery: &str,
        transport: &str,
        priority: Priority,
    ) -> Target {
        let mut filtered = target.clone();
        for snooze in self.active() {
            if let SnoozeTarget::Mobile(address) | SnoozeTarget::Camera(address) = &snooze.target {
                filtered.remove_address(address);
                continue;
            }
            if let RecipientScope::User(person) = &snooze.scope {
                if snooze.covers(delivery, transport, priority) {
                    let person_key = CategoryKey::Known(TargetCategory::Person);
                    filtered.retain(|key, address| !(key == &person_key && address == person));
                }
            }
        }
        filtered
    }

    /// Apply a structured command string on behalf of the issuing recipients.
    ///
    /// Malformed commands are logged and reported as `false`.
    pub fn handle_command(&self, command: &str, recipients: &[String]) -> bool {
        let parsed = match parse_command(&self.command_prefix, command) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(command = %command, "Rejected snooze command: {}", e);
                return false;
            }
        };

        let scopes: Vec<RecipientScope> = match parsed.scope {
            CommandScope::Everyone => vec![RecipientScope::Everyone],
            CommandScope::User if recipients.is_empty() => {
                warn!(command = %command, "User-scoped snooze command without an issuing recipient");
                return false;
            }
            CommandScope::User => recipients
                .iter()
                .map(|person| RecipientScope::User(person.clone()))
                .collect(),
        };

        for scope in scopes {
            match parsed.action {
                SnoozeAction::Snooze => self.register_snooze(
                    parsed.target.clone(),
                    scope,
                    parsed.ttl,
                    Some(format!("command {command}")),
                ),
                SnoozeAction::Silence => self.silence(
                    parsed.target.clone(),
                    scope,
                    Some(format!("command {command}")),
                ),
                SnoozeAction::Normal => {
                    self.normal(&parsed.target, &scope);
                }
            }
        }
        true
    }
}

impl Default for Snoozer {
    fn default() -> Self {
        Self::new(&SnoozeConfig::default())
    }
}
