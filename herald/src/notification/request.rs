//! Inbound notification requests.
//!
//! Callers describe delivery choices loosely: a name or list of names picks
//! deliveries explicitly, a mapping tunes deliveries while keeping the
//! defaults, and nothing at all means "the usual". The loose shape is
//! classified once into [`DeliverySelection`] when the request is parsed.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::warn;

use super::Priority;
use crate::target::{Target, TargetData};

/// Per-call adjustment of one delivery.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct DeliveryOverride {
    /// `Some(false)` disables, `Some(true)` enables even a disabled
    /// delivery, `None` enables it if it is enabled in the registry.
    pub enabled: Option<bool>,
    pub data: Option<TargetData>,
    pub target: Option<Target>,
}

/// How the caller picked deliveries.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum DeliverySelection {
    /// Defaults plus whatever scenarios and recipients switch on.
    #[default]
    Implicit,
    /// Only the named deliveries plus scenario and recipient choices.
    Explicit(Vec<String>),
    /// Like implicit, with per-delivery adjustments.
    Tuned(BTreeMap<String, DeliveryOverride>),
    /// Exactly these deliveries, nothing else considered.
    Fixed(Vec<String>),
}

impl DeliverySelection {
    /// Whether default-tagged deliveries take part.
    pub fn includes_defaults(&self) -> bool {
        matches!(self, Self::Implicit | Self::Tuned(_))
    }

    /// Override for a delivery, if the caller gave one.
    pub fn override_for(&self, delivery: &str) -> Option<DeliveryOverride> {
        match self {
            Self::Explicit(names) if names.iter().any(|n| n == delivery) => {
                Some(DeliveryOverride::default())
            }
            Self::Tuned(overrides) => overrides.get(delivery).cloned(),
            _ => None,
        }
    }

    /// Classify the loose `delivery` value of a request.
    pub fn classify(value: Option<&Value>, fixed: bool) -> Self {
        let names = || value.map(names_of).unwrap_or_default();
        if fixed {
            return Self::Fixed(names());
        }
        match value {
            None | Some(Value::Null) => Self::Implicit,
            Some(Value::Object(map)) => Self::Tuned(
                map.iter()
                    .map(|(name, entry)| (name.clone(), parse_override(name, entry)))
                    .collect(),
            ),
            Some(_) => Self::Explicit(names()),
        }
    }
}

fn names_of(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        Value::Object(map) => map.keys().cloned().collect(),
        _ => Vec::new(),
    }
}

fn parse_override(name: &str, entry: &Value) -> DeliveryOverride {
    if entry.is_null() {
        return DeliveryOverride::default();
    }
    match serde_json::from_value(entry.clone()) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(delivery = %name, "Ignoring malformed delivery override: {}", e);
            DeliveryOverride::default()
        }
    }
}

/// Wire form of a request.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawRequest {
    message: Option<String>,
    title: Option<String>,
    priority: Priority,
    target: Option<Target>,
    data: TargetData,
    delivery: Option<Value>,
    delivery_selection: Option<String>,
    required_scenarios: Vec<String>,
    applied_scenarios: Vec<String>,
    constrain_scenarios: Vec<String>,
    recipients: Option<Vec<String>>,
    media: Map<String, Value>,
    action_groups: Vec<String>,
}

/// A request to notify.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "RawRequest")]
pub struct NotificationRequest {
    pub message: Option<String>,
    pub title: Option<String>,
    pub priority: Priority,
    /// Explicit addressing; `None` means "the default recipients".
    pub target: Option<Target>,
    /// Extra data layered over each delivery's own data.
    pub data: TargetData,
    pub delivery: DeliverySelection,
    pub required_scenarios: Vec<String>,
    pub applied_scenarios: Vec<String>,
    pub constrain_scenarios: Vec<String>,
    /// Restricts default recipients to these person ids.
    pub recipients: Option<Vec<String>>,
    pub media: Map<String, Value>,
    pub action_groups: Vec<String>,
}

impl From<RawRequest> for NotificationRequest {
    fn from(raw: RawRequest) -> Self {
        let fixed = raw
            .delivery_selection
            .as_deref()
            .is_some_and(|mode| mode.eq_ignore_ascii_case("fixed"));
        Self {
            message: raw.message,
            title: raw.title,
            priority: raw.priority,
            target: raw.target.filter(|t| !t.is_empty()),
            data: raw.data,
            delivery: DeliverySelection::classify(raw.delivery.as_ref(), fixed),
            required_scenarios: raw.required_scenarios,
            applied_scenarios: raw.applied_scenarios,
            constrain_scenarios: raw.constrain_scenarios,
            recipients: raw.recipients,
            media: raw.media,
            action_groups: raw.action_groups,
        }
    }
}

impl NotificationRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn target(mut self, target: Target) -> Self {
        self.target = Some(target);
        self
    }

    pub fn data(mut self, data: TargetData) -> Self {
        self.data = data;
        self
    }

    pub fn deliveries<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.delivery = DeliverySelection::Explicit(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn fixed<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.delivery = DeliverySelection::Fixed(names.into_iter().map(Into::into).collect());
        self
    }

    /// Add a per-delivery override, switching to tuned selection.
    pub fn tune(mut self, delivery: impl Into<String>, adjustment: DeliveryOverride) -> Self {
        let mut overrides = match std::mem::take(&mut self.delivery) {
            DeliverySelection::Tuned(overrides) => overrides,
            _ => BTreeMap::new(),
        };
        overrides.insert(delivery.into(), adjustment);
        self.delivery = DeliverySelection::Tuned(overrides);
        self
    }

    pub fn apply_scenario(mut self, name: impl Into<String>) -> Self {
        self.applied_scenarios.push(name.into());
        self
    }

    pub fn require_scenario(mut self, name: impl Into<String>) -> Self {
        self.required_scenarios.push(name.into());
        self
    }

    pub fn constrain_scenario(mut self, name: impl Into<String>) -> Self {
        self.constrain_scenarios.push(name.into());
        self
    }

    pub fn recipients<I, S>(mut self, people: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.recipients = Some(people.into_iter().map(Into::into).collect());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> NotificationRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_delivery_shape_selects_mode() {
        assert_eq!(
            parse(json!({"message": "hi"})).delivery,
            DeliverySelection::Implicit
        );
        assert_eq!(
            parse(json!({"delivery": "email"})).delivery,
            DeliverySelection::Explicit(vec!["email".into()])
        );
        assert_eq!(
            parse(json!({"delivery": ["email", "sms"]})).delivery,
            DeliverySelection::Explicit(vec!["email".into(), "sms".into()])
        );
        assert_eq!(
            parse(json!({"delivery": ["email"], "delivery_selection": "FIXED"})).delivery,
            DeliverySelection::Fixed(vec!["email".into()])
        );
    }

    #[test]
    fn test_tuned_overrides() {
        let request = parse(json!({
            "priority": "high",
            "delivery": {
                "email": {"enabled": false},
                "sms": null,
                "push": {"data": {"sound": "chime"}, "target": "mobile_app_pixel"},
                "bad": {"enabled": "perhaps"}
            }
        }));
        assert_eq!(request.priority, Priority::High);
        assert!(request.delivery.includes_defaults());

        let delivery = &request.delivery;
        assert_eq!(delivery.override_for("email").unwrap().enabled, Some(false));
        assert_eq!(delivery.override_for("sms").unwrap(), DeliveryOverride::default());
        assert_eq!(delivery.override_for("bad").unwrap(), DeliveryOverride::default());
        let push = delivery.override_for("push").unwrap();
        assert_eq!(push.data.unwrap()["sound"], "chime");
        assert_eq!(push.target.unwrap().len(), 1);
        assert!(delivery.override_for("chime").is_none());
    }

    #[test]
    fn test_empty_target_is_no_target() {
        let request = parse(json!({"target": []}));
        assert!(request.target.is_none());
    }

    #[test]
    fn test_builder() {
        let request = NotificationRequest::new("Door open")
            .title("Security")
            .tune("email", DeliveryOverride::default())
            .tune(
                "sms",
                DeliveryOverride {
                    enabled: Some(true),
                    ..Default::default()
                },
            )
            .apply_scenario("alarm")
            .recipients(["person.alice"]);

        match &request.delivery {
            DeliverySelection::Tuned(overrides) => assert_eq!(overrides.len(), 2),
            other => panic!("unexpected selection {:?}", other),
        }
        assert_eq!(request.applied_scenarios, vec!["alarm"]);
        assert!(!DeliverySelection::Explicit(vec![]).includes_defaults());
    }
}
