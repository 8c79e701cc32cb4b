//! End-to-end routing tests.
//!
//! These run whole notifications through the router with a recording
//! transport, the config-backed recipient directory and the built-in
//! condition evaluator.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};

use herald::config::HeraldConfig;
use herald::conditions::{ConditionEvaluator, ConditionVariables, SimpleConditionEvaluator};
use herald::directory::StaticDirectory;
use herald::notification::{
    DeliveryOverride, Envelope, Notification, NotificationRequest, Priority, SuppressionReason,
};
use herald::snooze::{RecipientScope, SnoozeTarget};
use herald::target::{Target, TargetCategory};
use herald::transport::Transport;
use herald::{Error, HeraldContext, Result};

/// Transport that records what it is asked to send.
struct Recorder {
    name: String,
    enabled: bool,
    batch: bool,
    fail_for: Vec<String>,
    sent: Mutex<Vec<Envelope>>,
}

impl Recorder {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            enabled: true,
            batch: false,
            fail_for: Vec::new(),
            sent: Mutex::new(Vec::new()),
        }
    }

    fn failing_for(mut self, address: &str) -> Self {
        self.fail_for.push(address.to_string());
        self
    }

    fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    fn batched(mut self) -> Self {
        self.batch = true;
        self
    }

    fn sent(&self) -> Vec<Envelope> {
        self.sent.lock().clone()
    }

    fn sent_for(&self, delivery: &str) -> Vec<Envelope> {
        self.sent()
            .into_iter()
            .filter(|e| e.delivery == delivery)
            .collect()
    }
}

#[async_trait]
impl Transport for Recorder {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn batch_targets(&self) -> bool {
        self.batch
    }

    async fn deliver(&self, envelope: &Envelope) -> Result<bool> {
        let failing = envelope
            .target
            .addresses()
            .any(|(_, address)| self.fail_for.iter().any(|f| f == address));
        if failing {
            return Err(Error::transport("connection refused"));
        }
        self.sent.lock().push(envelope.clone());
        Ok(true)
    }
}

/// Evaluator that fails on every call.
struct Broken;

#[async_trait]
impl ConditionEvaluator for Broken {
    async fn evaluate(&self, _expr: &str, _vars: &ConditionVariables) -> Result<bool> {
        Err(Error::evaluation("state store offline"))
    }
}

fn household() -> Value {
    json!([
        {
            "person_id": "person.alice",
            "home": true,
            "email": "alice@example.com",
            "mobile": ["alice_pixel"]
        },
        {
            "person_id": "person.bob",
            "home": false,
            "email": "bob@example.com"
        }
    ])
}

fn config(mut value: Value) -> HeraldConfig {
    if value.get("recipients").is_none() {
        value["recipients"] = household();
    }
    serde_json::from_value(value).expect("Invalid test configuration")
}

fn context_with(
    config: &HeraldConfig,
    transports: Vec<Arc<Recorder>>,
    evaluator: Arc<dyn ConditionEvaluator>,
) -> Arc<HeraldContext> {
    let transports: Vec<Arc<dyn Transport>> = transports
        .into_iter()
        .map(|t| t as Arc<dyn Transport>)
        .collect();
    let directory = Arc::new(StaticDirectory::new(config.recipients.clone()));
    Arc::new(HeraldContext::new(config, transports, directory, evaluator))
}

fn context(config: &HeraldConfig, transports: Vec<Arc<Recorder>>) -> Arc<HeraldContext> {
    context_with(config, transports, Arc::new(SimpleConditionEvaluator::new()))
}

async fn send(ctx: &Arc<HeraldContext>, request: NotificationRequest) -> (Notification, bool) {
    let mut notification =
        Notification::new(ctx.clone(), request).expect("Failed to create notification");
    let delivered = notification.deliver().await;
    (notification, delivered)
}

fn addresses(envelopes: &[Envelope]) -> Vec<String> {
    let mut all: Vec<String> = envelopes
        .iter()
        .flat_map(|e| e.target.addresses().map(|(_, a)| a.to_string()).collect::<Vec<_>>())
        .collect();
    all.sort();
    all
}

mod selection_tests {
    use super::*;

    #[tokio::test]
    async fn test_default_delivery_reaches_default_recipients() {
        let transport = Arc::new(Recorder::new("mail"));
        let config = config(json!({
            "deliveries": [{"name": "email", "transport": "mail"}]
        }));
        let ctx = context(&config, vec![transport.clone()]);

        let (notification, delivered) = send(&ctx, NotificationRequest::new("Hello")).await;

        assert!(delivered);
        assert_eq!(notification.delivered_count(), 3);
        assert_eq!(
            addresses(&transport.sent()),
            vec!["alice@example.com", "bob@example.com", "mobile_app_alice_pixel"]
        );
    }

    #[tokio::test]
    async fn test_by_scenario_delivery_needs_a_scenario() {
        let transport = Arc::new(Recorder::new("mail"));
        let config = config(json!({
            "deliveries": [
                {"name": "email", "transport": "mail"},
                {"name": "siren", "transport": "mail", "selection": ["by_scenario"]}
            ],
            "scenarios": [{
                "name": "alarm",
                "condition": "priority == critical",
                "delivery": {"siren": {"enabled": true}}
            }]
        }));
        let ctx = context(&config, vec![transport]);

        let (quiet, _) = send(&ctx, NotificationRequest::new("Door open")).await;
        assert_eq!(quiet.selection(), vec!["email"]);

        let (loud, _) = send(
            &ctx,
            NotificationRequest::new("Intruder").priority(Priority::Critical),
        )
        .await;
        assert_eq!(loud.selected_scenarios(), vec!["alarm"]);
        assert_eq!(loud.selection(), vec!["email", "siren"]);
    }

    #[tokio::test]
    async fn test_rank_orders_selection() {
        let transport = Arc::new(Recorder::new("mail"));
        let config = config(json!({
            "deliveries": [
                {"name": "d", "transport": "mail", "rank": "last"},
                {"name": "b", "transport": "mail"},
                {"name": "c", "transport": "mail", "rank": "any"},
                {"name": "a", "transport": "mail", "rank": "first"}
            ]
        }));
        let ctx = context(&config, vec![transport]);

        let (notification, _) = send(&ctx, NotificationRequest::new("ranked")).await;
        assert_eq!(notification.selection(), vec!["a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn test_constrain_drops_unlisted_scenarios() {
        let transport = Arc::new(Recorder::new("mail"));
        let config = config(json!({
            "deliveries": [
                {"name": "email", "transport": "mail"},
                {"name": "special", "transport": "mail", "selection": ["by_scenario"]}
            ],
            "scenarios": [{
                "name": "z",
                "condition": "true",
                "delivery": {"special": {"enabled": true}}
            }]
        }));
        let ctx = context(&config, vec![transport]);

        let request = NotificationRequest::new("constrained")
            .constrain_scenario("x")
            .apply_scenario("y");
        let (notification, _) = send(&ctx, request).await;

        assert!(notification.selected_scenarios().is_empty());
        assert_eq!(notification.selection(), vec!["email"]);
    }

    #[tokio::test]
    async fn test_scenario_can_disable_default() {
        let transport = Arc::new(Recorder::new("mail"));
        let config = config(json!({
            "deliveries": [
                {"name": "email", "transport": "mail"},
                {"name": "chime", "transport": "mail"}
            ],
            "scenarios": [{
                "name": "night",
                "condition": "true",
                "delivery": {"chime": {"enabled": false}}
            }]
        }));
        let ctx = context(&config, vec![transport]);

        let (notification, _) = send(&ctx, NotificationRequest::new("shh")).await;
        assert_eq!(notification.selection(), vec!["email"]);
    }

    #[tokio::test]
    async fn test_required_scenario_missing_suppresses_everything() {
        let transport = Arc::new(Recorder::new("mail"));
        let config = config(json!({
            "deliveries": [
                {"name": "email", "transport": "mail"},
                {"name": "backup", "transport": "mail", "selection": ["fallback"]}
            ],
            "scenarios": [{"name": "alarm", "condition": "priority == critical"}]
        }));
        let ctx = context(&config, vec![transport.clone()]);

        let (notification, delivered) =
            send(&ctx, NotificationRequest::new("maybe").require_scenario("alarm")).await;

        assert!(!delivered);
        assert_eq!(notification.suppression(), Some(SuppressionReason::NoScenario));
        assert!(notification.selection().is_empty());
        assert!(notification.outcomes().is_empty());
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_explicit_and_tuned_selection() {
        let transport = Arc::new(Recorder::new("mail"));
        let config = config(json!({
            "deliveries": [
                {"name": "email", "transport": "mail"},
                {"name": "sms", "transport": "mail", "selection": ["explicit"]},
                {"name": "spare", "transport": "mail", "enabled": false}
            ]
        }));
        let ctx = context(&config, vec![transport]);

        let (explicit, _) = send(&ctx, NotificationRequest::new("x").deliveries(["sms", "spare"])).await;
        assert_eq!(explicit.selection(), vec!["sms"]);

        let (tuned, _) = send(
            &ctx,
            NotificationRequest::new("y")
                .tune("email", DeliveryOverride { enabled: Some(false), ..Default::default() })
                .tune("spare", DeliveryOverride::default()),
        )
        .await;
        assert!(tuned.selection().is_empty());

        let (forced, _) = send(
            &ctx,
            NotificationRequest::new("z")
                .tune("spare", DeliveryOverride { enabled: Some(true), ..Default::default() }),
        )
        .await;
        assert_eq!(forced.selection(), vec!["email", "spare"]);
    }

    #[tokio::test]
    async fn test_fixed_selection_bypasses_everything() {
        let transport = Arc::new(Recorder::new("mail"));
        let config = config(json!({
            "deliveries": [
                {"name": "email", "transport": "mail"},
                {"name": "spare", "transport": "mail", "enabled": false}
            ]
        }));
        let ctx = context(&config, vec![transport.clone()]);

        let request: NotificationRequest = serde_json::from_value(json!({
            "message": "only spare",
            "delivery": "spare",
            "delivery_selection": "fixed",
            "target": "ops@example.com"
        }))
        .unwrap();
        let (notification, delivered) = send(&ctx, request).await;

        assert!(delivered);
        assert_eq!(notification.selection(), vec!["spare"]);
        assert_eq!(addresses(&transport.sent()), vec!["ops@example.com"]);
    }

    #[tokio::test]
    async fn test_recipient_preference_only_reaches_that_recipient() {
        let transport = Arc::new(Recorder::new("mail"));
        let config = config(json!({
            "deliveries": [
                {"name": "email", "transport": "mail"},
                {"name": "digest", "transport": "mail", "selection": ["explicit"]}
            ],
            "recipients": [
                {"person_id": "person.alice", "email": "alice@example.com"},
                {
                    "person_id": "person.bob",
                    "email": "bob@example.com",
                    "deliveries": {"digest": {"enabled": true}}
                }
            ]
        }));
        let ctx = context(&config, vec![transport.clone()]);

        let (notification, _) = send(&ctx, NotificationRequest::new("weekly")).await;

        assert_eq!(notification.selection(), vec!["email", "digest"]);
        assert_eq!(addresses(&transport.sent_for("digest")), vec!["bob@example.com"]);
        assert_eq!(transport.sent_for("email").len(), 2);
    }

    #[tokio::test]
    async fn test_scenario_media_and_action_groups() {
        let transport = Arc::new(Recorder::new("mail"));
        let config = config(json!({
            "deliveries": [{"name": "email", "transport": "mail"}],
            "action_groups": {"door": [{"action": "UNLOCK"}], "lights": [{"action": "ON"}]},
            "scenarios": [{
                "name": "doorbell",
                "condition": "true",
                "media": {"camera": "camera.porch", "clip": true},
                "action_groups": ["door", "lights"]
            }]
        }));
        let ctx = context(&config, vec![transport.clone()]);

        let request: NotificationRequest = serde_json::from_value(json!({
            "message": "ding",
            "media": {"camera": "camera.gate"},
            "action_groups": ["lights", "garage"]
        }))
        .unwrap();
        let (notification, _) = send(&ctx, request).await;

        assert_eq!(notification.media()["camera"], "camera.gate");
        assert_eq!(notification.media()["clip"], true);
        assert_eq!(notification.action_groups(), ["lights", "door"]);
        assert!(transport.sent().iter().all(|e| e.action_groups == ["lights", "door"]));
    }

    #[tokio::test]
    async fn test_failing_evaluator_means_condition_false() {
        let transport = Arc::new(Recorder::new("mail"));
        let config = config(json!({
            "deliveries": [
                {"name": "email", "transport": "mail", "condition": "priority >= low"}
            ],
            "scenarios": [{"name": "alarm", "condition": "true"}]
        }));
        let ctx = context_with(&config, vec![transport], Arc::new(Broken));

        let (notification, delivered) = send(&ctx, NotificationRequest::new("x")).await;

        assert!(!delivered);
        assert!(notification.selected_scenarios().is_empty());
        assert_eq!(
            notification.outcome("email").unwrap().suppressed,
            Some(SuppressionReason::DeliveryCondition)
        );
    }

    #[test]
    fn test_context_without_deliveries_fails_fast() {
        let config = config(json!({}));
        let ctx = context(&config, vec![]);
        assert!(Notification::new(ctx, NotificationRequest::new("x")).is_err());
    }
}

mod resolution_tests {
    use super::*;

    #[tokio::test]
    async fn test_unique_targets_skip_claimed_addresses() {
        let transport = Arc::new(Recorder::new("mail"));
        let config = config(json!({
            "deliveries": [
                {"name": "a", "transport": "mail"},
                {"name": "b", "transport": "mail", "unique_targets": true}
            ]
        }));
        let ctx = context(&config, vec![transport.clone()]);

        let request = NotificationRequest::new("hi")
            .target(Target::from_addresses(["one@example.com", "two@example.com"]))
            .tune(
                "b",
                DeliveryOverride {
                    target: Some(Target::from("three@example.com")),
                    ..Default::default()
                },
            );
        let (_, delivered) = send(&ctx, request).await;

        assert!(delivered);
        assert_eq!(
            addresses(&transport.sent_for("a")),
            vec!["one@example.com", "two@example.com"]
        );
        assert_eq!(addresses(&transport.sent_for("b")), vec!["three@example.com"]);
    }

    #[tokio::test]
    async fn test_target_usage_second_pass_resolves_people() {
        let transport = Arc::new(Recorder::new("mail"));
        let config = config(json!({
            "deliveries": [{
                "name": "email",
                "transport": "mail",
                "target_usage": "merge_always",
                "target": {"person": ["person.bob"]}
            }]
        }));
        let ctx = context(&config, vec![transport.clone()]);

        let request = NotificationRequest::new("hi").target(Target::from("ops@example.com"));
        send(&ctx, request).await;

        assert_eq!(
            addresses(&transport.sent()),
            vec!["bob@example.com", "ops@example.com"]
        );
    }

    #[tokio::test]
    async fn test_static_target_only_without_call_target() {
        let transport = Arc::new(Recorder::new("mail"));
        let config = config(json!({
            "deliveries": [{
                "name": "email",
                "transport": "mail",
                "occupancy": "none",
                "target": "ops@example.com"
            }]
        }));
        let ctx = context(&config, vec![transport.clone()]);

        send(&ctx, NotificationRequest::new("implicit")).await;
        assert_eq!(addresses(&transport.sent()), vec!["ops@example.com"]);

        send(
            &ctx,
            NotificationRequest::new("explicit").target(Target::from("me@example.com")),
        )
        .await;
        assert_eq!(
            addresses(&transport.sent()),
            vec!["me@example.com", "ops@example.com"]
        );
    }

    #[tokio::test]
    async fn test_empty_resolution_reasons() {
        let transport = Arc::new(Recorder::new("mail"));
        let config = config(json!({
            "deliveries": [
                {"name": "strict", "transport": "mail", "occupancy": "none"},
                {"name": "relaxed", "transport": "mail", "occupancy": "none", "target_required": "optional"},
                {"name": "broadcast", "transport": "mail", "occupancy": "none", "target_required": "never"}
            ]
        }));
        let ctx = context(&config, vec![transport.clone()]);

        let (notification, delivered) = send(&ctx, NotificationRequest::new("hi")).await;

        assert!(delivered);
        assert_eq!(
            notification.outcome("strict").unwrap().suppressed,
            Some(SuppressionReason::NoTarget)
        );
        assert_eq!(
            notification.outcome("relaxed").unwrap().suppressed,
            Some(SuppressionReason::Unknown)
        );
        let broadcast = transport.sent_for("broadcast");
        assert_eq!(broadcast.len(), 1);
        assert!(broadcast[0].target.is_empty());
    }

    #[tokio::test]
    async fn test_occupancy_filter_limits_default_recipients() {
        let transport = Arc::new(Recorder::new("mail"));
        let config = config(json!({
            "deliveries": [{"name": "email", "transport": "mail", "occupancy": "only_out"}]
        }));
        let ctx = context(&config, vec![transport.clone()]);

        send(&ctx, NotificationRequest::new("while you were out")).await;
        assert_eq!(addresses(&transport.sent()), vec!["bob@example.com"]);
    }

    #[tokio::test]
    async fn test_recipients_override_limits_default_recipients() {
        let transport = Arc::new(Recorder::new("mail"));
        let config = config(json!({
            "deliveries": [{"name": "email", "transport": "mail"}]
        }));
        let ctx = context(&config, vec![transport.clone()]);

        send(&ctx, NotificationRequest::new("hi").recipients(["person.bob"])).await;
        assert_eq!(addresses(&transport.sent()), vec!["bob@example.com"]);
    }

    #[tokio::test]
    async fn test_data_layers_and_target_specific_data() {
        let transport = Arc::new(Recorder::new("mail"));
        let config = config(json!({
            "deliveries": [{
                "name": "email",
                "transport": "mail",
                "data": {"sound": "delivery", "color": "red"}
            }],
            "recipients": [
                {"person_id": "person.alice", "email": "alice@example.com"},
                {"person_id": "person.bob", "email": "bob@example.com", "data": {"lang": "fr"}}
            ],
            "scenarios": [{
                "name": "night",
                "condition": "true",
                "delivery": {"email": {"data": {"sound": "scenario"}}}
            }]
        }));
        let ctx = context(&config, vec![transport.clone()]);

        let mut call_data = serde_json::Map::new();
        call_data.insert("sound".to_string(), json!("call"));
        call_data.insert("lang".to_string(), json!("en"));
        send(&ctx, NotificationRequest::new("hi").data(call_data)).await;

        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        for envelope in &sent {
            assert_eq!(envelope.data["sound"], "scenario");
            assert_eq!(envelope.data["color"], "red");
            let expected_lang = if envelope.target.category(TargetCategory::Email) == ["bob@example.com"] {
                "fr"
            } else {
                "en"
            };
            assert_eq!(envelope.data["lang"], expected_lang);
        }
    }

    #[tokio::test]
    async fn test_batched_transport_gets_one_envelope() {
        let transport = Arc::new(Recorder::new("mail").batched());
        let config = config(json!({
            "deliveries": [{"name": "email", "transport": "mail"}]
        }));
        let ctx = context(&config, vec![transport.clone()]);

        send(&ctx, NotificationRequest::new("hi")).await;

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].target.len(), 3);
    }
}

mod dispatch_tests {
    use super::*;

    #[tokio::test]
    async fn test_transport_error_does_not_stop_siblings() {
        let transport = Arc::new(Recorder::new("mail").failing_for("two@example.com"));
        let config = config(json!({
            "deliveries": [{"name": "email", "transport": "mail"}]
        }));
        let ctx = context(&config, vec![transport.clone()]);

        let request = NotificationRequest::new("hi").target(Target::from_addresses([
            "one@example.com",
            "two@example.com",
            "three@example.com",
        ]));
        let (notification, delivered) = send(&ctx, request).await;

        assert!(delivered);
        assert_eq!(notification.delivered_count(), 2);
        assert_eq!(notification.error_count(), 1);
        let failed = notification.undelivered_envelopes();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].errors, 1);
        assert!(failed[0].last_error.is_some());
    }

    #[tokio::test]
    async fn test_global_snooze_suppresses_without_fallback() {
        let transport = Arc::new(Recorder::new("mail"));
        let config = config(json!({
            "deliveries": [
                {"name": "email", "transport": "mail"},
                {"name": "push", "transport": "mail"},
                {"name": "backup", "transport": "mail", "selection": ["fallback"], "target": "ops@example.com"}
            ]
        }));
        let ctx = context(&config, vec![transport.clone()]);
        ctx.snoozer
            .silence(SnoozeTarget::Everything, RecipientScope::Everyone, None);

        let (notification, delivered) = send(&ctx, NotificationRequest::new("hi")).await;

        assert!(!delivered);
        assert_eq!(notification.suppression(), Some(SuppressionReason::Snoozed));
        assert_eq!(notification.selection(), vec!["email", "push"]);
        for name in ["email", "push"] {
            assert_eq!(
                notification.outcome(name).unwrap().suppressed,
                Some(SuppressionReason::Snoozed)
            );
        }
        assert!(notification.outcome("backup").is_none());
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_non_critical_snooze_lets_critical_through() {
        let transport = Arc::new(Recorder::new("mail"));
        let config = config(json!({
            "deliveries": [{"name": "email", "transport": "mail"}]
        }));
        let ctx = context(&config, vec![transport.clone()]);
        assert!(ctx.snoozer.handle_command("HERALD_SNOOZE_EVERYONE_NONCRITICAL", &[]));

        let (_, quiet) = send(&ctx, NotificationRequest::new("meh")).await;
        assert!(!quiet);

        let (_, loud) = send(
            &ctx,
            NotificationRequest::new("fire").priority(Priority::Critical),
        )
        .await;
        assert!(loud);
    }

    #[tokio::test]
    async fn test_scoped_snoozes_filter_addresses() {
        let transport = Arc::new(Recorder::new("mail"));
        let config = config(json!({
            "deliveries": [
                {"name": "email", "transport": "mail"},
                {"name": "push", "transport": "mail"}
            ]
        }));
        let ctx = context(&config, vec![transport.clone()]);

        assert!(ctx.snoozer.handle_command(
            "HERALD_SNOOZE_USER_DELIVERY_email_600",
            &["person.alice".to_string()]
        ));
        ctx.snoozer.register_snooze(
            SnoozeTarget::Mobile("mobile_app_alice_pixel".to_string()),
            RecipientScope::Everyone,
            None,
            None,
        );

        send(&ctx, NotificationRequest::new("hi")).await;

        assert_eq!(addresses(&transport.sent_for("email")), vec!["bob@example.com"]);
        assert_eq!(
            addresses(&transport.sent_for("push")),
            vec!["alice@example.com", "bob@example.com"]
        );
    }

    #[tokio::test]
    async fn test_delivery_snooze_and_lift() {
        let transport = Arc::new(Recorder::new("mail"));
        let config = config(json!({
            "deliveries": [{"name": "email", "transport": "mail"}]
        }));
        let ctx = context(&config, vec![transport.clone()]);

        assert!(ctx.snoozer.handle_command("HERALD_SNOOZE_EVERYONE_DELIVERY_email", &[]));
        let (snoozed, _) = send(&ctx, NotificationRequest::new("one")).await;
        assert_eq!(
            snoozed.outcome("email").unwrap().suppressed,
            Some(SuppressionReason::Snoozed)
        );

        assert!(ctx.snoozer.handle_command("HERALD_NORMAL_EVERYONE_DELIVERY_email", &[]));
        assert_eq!(ctx.snoozer.active_count(), 0);
        let (_, delivered) = send(&ctx, NotificationRequest::new("two")).await;
        assert!(delivered);
    }

    #[tokio::test]
    async fn test_duplicate_is_held_back_without_fallback() {
        let transport = Arc::new(Recorder::new("mail"));
        let config = config(json!({
            "deliveries": [
                {"name": "email", "transport": "mail"},
                {"name": "backup", "transport": "mail", "selection": ["fallback"], "target": "ops@example.com"}
            ]
        }));
        let ctx = context(&config, vec![transport.clone()]);
        let request = || {
            NotificationRequest::new("Washer done")
                .title("Laundry")
                .target(Target::from("alice@example.com"))
        };

        let (_, first) = send(&ctx, request()).await;
        assert!(first);

        let (second, delivered) = send(&ctx, request()).await;
        assert!(!delivered);
        assert!(second.dupe());
        assert_eq!(
            second.outcome("email").unwrap().suppressed,
            Some(SuppressionReason::Duplicate)
        );
        assert!(second.outcome("backup").is_none());

        let (_, urgent) = send(&ctx, request().priority(Priority::High)).await;
        assert!(urgent);
        assert_eq!(transport.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_second_deliver_returns_recorded_result() {
        let transport = Arc::new(Recorder::new("mail"));
        let config = config(json!({
            "deliveries": [{"name": "email", "transport": "mail"}]
        }));
        let ctx = context(&config, vec![transport.clone()]);
        let request = NotificationRequest::new("once").target(Target::from("alice@example.com"));
        let mut notification = Notification::new(ctx, request).unwrap();

        assert!(notification.deliver().await);
        assert!(notification.deliver().await);

        assert_eq!(transport.sent().len(), 1);
        assert_eq!(notification.delivered_count(), 1);
        assert!(!notification.dupe());
        assert_eq!(notification.outcome("email").unwrap().suppressed, None);
    }

    #[tokio::test]
    async fn test_partial_duplicate_still_counts_as_sent() {
        let transport = Arc::new(Recorder::new("mail"));
        let config = config(json!({
            "deliveries": [{"name": "email", "transport": "mail"}]
        }));
        let ctx = context(&config, vec![transport.clone()]);

        send(&ctx, NotificationRequest::new("hi").target(Target::from("alice@example.com"))).await;
        let (second, delivered) = send(
            &ctx,
            NotificationRequest::new("hi")
                .target(Target::from_addresses(["alice@example.com", "bob@example.com"])),
        )
        .await;

        assert!(delivered);
        assert!(second.dupe());
        assert_eq!(second.delivered_count(), 1);
        assert_eq!(second.suppressed_count(), 0);
        assert_eq!(second.outcome("email").unwrap().duplicates.len(), 1);
    }

    #[tokio::test]
    async fn test_fallback_when_nothing_delivered() {
        let transport = Arc::new(Recorder::new("mail"));
        let config = config(json!({
            "deliveries": [
                {"name": "email", "transport": "mail", "priority": ["high", "critical"]},
                {"name": "backup", "transport": "mail", "selection": ["fallback"], "target_usage": "fixed", "target": "ops@example.com"}
            ]
        }));
        let ctx = context(&config, vec![transport.clone()]);

        let (notification, delivered) = send(&ctx, NotificationRequest::new("hi")).await;

        assert!(delivered);
        assert_eq!(
            notification.outcome("email").unwrap().suppressed,
            Some(SuppressionReason::Priority)
        );
        let backup = notification.outcome("backup").unwrap();
        assert!(backup.fallback);
        assert_eq!(addresses(&backup.delivered), vec!["ops@example.com"]);
    }

    #[tokio::test]
    async fn test_disabled_fallback_stays_quiet() {
        let transport = Arc::new(Recorder::new("mail"));
        let config = config(json!({
            "deliveries": [
                {"name": "email", "transport": "mail", "priority": ["critical"]},
                {"name": "backup", "transport": "mail", "selection": ["fallback"], "target_usage": "fixed", "target": "ops@example.com"},
                {"name": "spare", "transport": "mail", "selection": ["fallback"], "target_usage": "fixed", "target": "spare@example.com"}
            ]
        }));
        let ctx = context(&config, vec![transport.clone()]);
        assert!(ctx.deliveries.disable("backup"));

        let (notification, delivered) = send(&ctx, NotificationRequest::new("hi")).await;

        assert!(delivered);
        assert!(notification.outcome("backup").is_none());
        assert_eq!(addresses(&transport.sent()), vec!["spare@example.com"]);
    }

    #[tokio::test]
    async fn test_fallback_on_error() {
        let mail = Arc::new(Recorder::new("mail").failing_for("alice@example.com"));
        let pager = Arc::new(Recorder::new("pager"));
        let config = config(json!({
            "deliveries": [
                {"name": "email", "transport": "mail"},
                {"name": "backup", "transport": "pager", "selection": ["fallback"], "target_usage": "fixed", "target": "backup@example.com"},
                {"name": "oncall", "transport": "pager", "selection": ["fallback_on_error"], "target_usage": "fixed", "target": "oncall@example.com"}
            ]
        }));
        let ctx = context(&config, vec![mail, pager.clone()]);

        let request = NotificationRequest::new("hi").target(Target::from("alice@example.com"));
        let (notification, delivered) = send(&ctx, request).await;

        assert!(delivered);
        assert_eq!(notification.failed_count(), 1);
        assert!(notification.outcome("backup").is_none());
        assert_eq!(addresses(&pager.sent()), vec!["oncall@example.com"]);
    }

    #[tokio::test]
    async fn test_disabled_transport_is_skipped() {
        let transport = Arc::new(Recorder::new("mail").disabled());
        let config = config(json!({
            "deliveries": [{"name": "email", "transport": "mail"}]
        }));
        let ctx = context(&config, vec![transport]);

        let (notification, delivered) = send(&ctx, NotificationRequest::new("hi")).await;

        assert!(!delivered);
        assert_eq!(
            notification.outcome("email").unwrap().suppressed,
            Some(SuppressionReason::TransportDisabled)
        );
    }

    #[tokio::test]
    async fn test_summary_reflects_outcomes() {
        let transport = Arc::new(Recorder::new("mail"));
        let config = config(json!({
            "deliveries": [
                {"name": "email", "transport": "mail"},
                {"name": "pager", "transport": "mail", "priority": ["critical"]}
            ]
        }));
        let ctx = context(&config, vec![transport]);

        let (notification, _) = send(&ctx, NotificationRequest::new("hi").title("T")).await;
        let summary = notification.summary();

        assert_eq!(summary.id, notification.id());
        assert_eq!(summary.delivered, 3);
        assert_eq!(summary.suppressed, 1);
        assert_eq!(summary.deliveries["email"].delivered, 3);
        assert_eq!(
            summary.deliveries["pager"].suppressed,
            Some(SuppressionReason::Priority)
        );

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["deliveries"]["pager"]["suppressed"], "PRIORITY");
    }
}
