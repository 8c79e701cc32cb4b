//! Scenario and delivery selection.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{DeliverySelection, Notification, SuppressionReason};
use crate::conditions::{ConditionVariables, OccupancySummary};
use crate::delivery::Delivery;
use crate::directory::Recipient;

impl Notification {
    /// Work out what this notification will do, without sending anything.
    ///
    /// Runs once; [`Notification::deliver`] calls it when needed.
    pub async fn initialize(&mut self) {
        if self.initialized {
            return;
        }
        self.initialized = true;
        let ctx = self.ctx.clone();

        self.recipients = match ctx.directory.recipients().await {
            Ok(recipients) => recipients,
            Err(e) => {
                warn!(notification_id = %self.id, "Occupancy lookup failed: {}", e);
                Vec::new()
            }
        };
        self.vars = self.variables();

        self.selected_scenarios = ctx.scenarios.select(ctx.evaluator.as_ref(), &self.vars).await;
        self.vars.selected_scenarios = self
            .selected_scenarios
            .iter()
            .map(|s| s.name().to_string())
            .collect();

        let required = &self.request.required_scenarios;
        if !required.is_empty() && !self.vars.selected_scenarios.iter().any(|s| required.contains(s)) {
            info!(
                notification_id = %self.id,
                required = ?required,
                "No required scenario selected, notification suppressed"
            );
            self.suppression = Some(SuppressionReason::NoScenario);
            return;
        }

        self.enabled_snapshot = ctx.deliveries.snapshot();
        self.selection = self.select_deliveries().await;

        if ctx.snoozer.is_global_snooze(self.request.priority) {
            info!(
                notification_id = %self.id,
                priority = %self.request.priority,
                "Global snooze active, notification suppressed"
            );
            self.suppression = Some(SuppressionReason::Snoozed);
        }

        self.apply_scenario_extras();

        debug!(
            notification_id = %self.id,
            scenarios = ?self.vars.selected_scenarios,
            selection = ?self.selection(),
            "Notification initialized"
        );
    }

    /// Variables conditions see for this notification.
    pub(super) fn variables(&self) -> ConditionVariables {
        let (home, away): (Vec<&Recipient>, Vec<&Recipient>) =
            self.recipients.iter().partition(|r| r.is_home());
        ConditionVariables {
            applied_scenarios: self.request.applied_scenarios.clone(),
            required_scenarios: self.request.required_scenarios.clone(),
            constrain_scenarios: self.request.constrain_scenarios.clone(),
            selected_scenarios: Vec::new(),
            priority: self.request.priority,
            message: self.request.message.clone(),
            title: self.request.title.clone(),
            occupancy: OccupancySummary {
                home: home.iter().map(|r| r.person_id.clone()).collect(),
                away: away.iter().map(|r| r.person_id.clone()).collect(),
            },
        }
    }

    /// Recipients in scope: everyone, or the caller's recipient override.
    pub(super) fn in_scope(&self, people: &[Recipient]) -> Vec<String> {
        people
            .iter()
            .filter(|r| match &self.request.recipients {
                Some(allowed) => allowed.contains(&r.person_id),
                None => true,
            })
            .map(|r| r.person_id.clone())
            .collect()
    }

    async fn select_deliveries(&mut self) -> Vec<Arc<Delivery>> {
        let ctx = self.ctx.clone();
        let registry = &ctx.deliveries;

        if let DeliverySelection::Fixed(names) = &self.request.delivery {
            return names
                .iter()
                .filter_map(|name| {
                    let delivery = registry.get(name);
                    if delivery.is_none() {
                        warn!(notification_id = %self.id, delivery = %name, "Fixed delivery is not configured");
                    }
                    delivery
                })
                .collect();
        }

        let mut enable: HashSet<String> = HashSet::new();
        let mut disable: HashSet<String> = HashSet::new();
        let mut forced: HashSet<String> = HashSet::new();

        for scenario in &self.selected_scenarios {
            enable.extend(scenario.enabling_deliveries().iter().cloned());
            disable.extend(scenario.disabling_deliveries().iter().cloned());
        }

        if self.request.delivery.includes_defaults() {
            enable.extend(
                registry
                    .default_deliveries(&self.enabled_snapshot)
                    .into_iter()
                    .map(|d| d.name.clone()),
            );
        }

        match &self.request.delivery {
            DeliverySelection::Explicit(names) => {
                for name in names {
                    if self.enabled_snapshot.contains(name) {
                        enable.insert(name.clone());
                    }
                }
            }
            DeliverySelection::Tuned(overrides) => {
                for (name, adjustment) in overrides {
                    match adjustment.enabled {
                        Some(false) => {
                            disable.insert(name.clone());
                        }
                        Some(true) => {
                            forced.insert(name.clone());
                            enable.insert(name.clone());
                        }
                        None if self.enabled_snapshot.contains(name) => {
                            enable.insert(name.clone());
                        }
                        None => {}
                    }
                }
            }
            DeliverySelection::Implicit | DeliverySelection::Fixed(_) => {}
        }

        let mut personal: HashMap<String, Vec<String>> = HashMap::new();
        for person in self.in_scope(&self.recipients) {
            match ctx.directory.enabling_delivery_names(&person).await {
                Ok(names) => {
                    for name in names {
                        personal.entry(name).or_default().push(person.clone());
                    }
                }
                Err(e) => {
                    warn!(notification_id = %self.id, person = %person, "Recipient preference lookup failed: {}", e);
                }
            }
        }

        let mut selected = Vec::new();
        for delivery in registry.deliveries() {
            let name = &delivery.name;
            let shared = enable.contains(name);
            let requested_by = personal.get(name);
            if !shared && requested_by.is_none() {
                continue;
            }
            if disable.contains(name) {
                continue;
            }
            if !self.enabled_snapshot.contains(name) && !forced.contains(name) {
                continue;
            }
            if !shared {
                if let Some(people) = requested_by {
                    self.personal.insert(name.clone(), people.clone());
                }
            }
            selected.push(delivery.clone());
        }

        selected.sort_by_key(|d| d.rank);
        selected
    }

    /// Layer scenario media (first setter wins) and action groups
    /// (accumulated, de-duplicated) over the request's own.
    fn apply_scenario_extras(&mut self) {
        self.media = self.request.media.clone();
        let mut groups: Vec<String> = Vec::new();
        for group in &self.request.action_groups {
            if !self.ctx.action_groups.contains_key(group) {
                warn!(notification_id = %self.id, action_group = %group, "Unknown action group ignored");
                continue;
            }
            if !groups.contains(group) {
                groups.push(group.clone());
            }
        }

        for scenario in &self.selected_scenarios {
            for (key, value) in scenario.media() {
                self.media.entry(key.clone()).or_insert_with(|| value.clone());
            }
            for group in scenario.action_groups() {
                if !groups.contains(group) {
                    groups.push(group.clone());
                }
            }
        }
        self.action_groups = groups;
    }
}
