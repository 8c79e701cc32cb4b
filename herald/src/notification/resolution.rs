//! Per-delivery target resolution.
//!
//! Resolution is at most two passes: the delivery's own target policy may
//! add addresses after the first pass, and anything it adds is resolved
//! once more. Policies only ever add, so a second pass is enough.

use tracing::{debug, warn};

use super::Notification;
use crate::delivery::{Delivery, TargetUsage};
use crate::target::{CategoryKey, Target, TargetCategory};
use crate::transport::Transport;

impl Notification {
    /// Resolve the addresses one delivery sends to.
    ///
    /// Returns direct-only targets, one per distinct target-specific
    /// payload. Never fails; lookup errors are logged and skipped.
    pub(super) async fn resolve_targets(
        &self,
        delivery: &Delivery,
        transport: &dyn Transport,
    ) -> Vec<Target> {
        let seed = self.seed_target(delivery).await;
        let mut resolved = self.resolution_pass(seed, delivery, transport).await;

        let before = resolved.len();
        let static_target = &delivery.target;
        match delivery.target_usage {
            TargetUsage::Fixed => {}
            TargetUsage::MergeAlways => resolved.extend(static_target),
            TargetUsage::MergeOnDeliveryTargets if !resolved.is_empty() => {
                resolved.extend(static_target)
            }
            TargetUsage::OnNoDeliveryTargets if resolved.is_empty() => {
                resolved.extend(static_target)
            }
            TargetUsage::OnNoActionTargets if self.request.target.is_none() => {
                resolved.extend(static_target)
            }
            TargetUsage::MergeOnDeliveryTargets
            | TargetUsage::OnNoDeliveryTargets
            | TargetUsage::OnNoActionTargets => {}
        }

        if resolved.len() > before {
            debug!(
                notification_id = %self.id,
                delivery = %delivery.name,
                "Delivery target added addresses, resolving again"
            );
            resolved = self.resolution_pass(resolved, delivery, transport).await;
        }

        resolved
            .split_by_target_data()
            .into_iter()
            .map(|part| part.direct())
            .filter(|part| !part.is_empty())
            .collect()
    }

    async fn seed_target(&self, delivery: &Delivery) -> Target {
        if delivery.target_usage == TargetUsage::Fixed {
            return delivery.target.clone();
        }
        if let Some(people) = self.personal.get(&delivery.name) {
            return Target::with_category(TargetCategory::Person, people);
        }
        if let Some(target) = &self.request.target {
            return target.clone();
        }

        match self.ctx.directory.occupancy_eligible(delivery.occupancy).await {
            Ok(eligible) => Target::with_category(TargetCategory::Person, self.in_scope(&eligible)),
            Err(e) => {
                warn!(
                    notification_id = %self.id,
                    delivery = %delivery.name,
                    "Default recipient lookup failed: {}", e
                );
                Target::new()
            }
        }
    }

    /// Snooze filter, indirect resolution, scenario and call target
    /// overrides, then transport narrowing.
    async fn resolution_pass(
        &self,
        target: Target,
        delivery: &Delivery,
        transport: &dyn Transport,
    ) -> Target {
        let snoozer = &self.ctx.snoozer;
        let priority = self.request.priority;
        let mut current = snoozer.filter_target(&target, &delivery.name, transport.name(), priority);

        if !current.person_ids().is_empty() {
            let people = current.person_ids().to_vec();
            let person_key = CategoryKey::Known(TargetCategory::Person);
            current.retain(|key, _| key != &person_key);

            for person in &people {
                match self.ctx.directory.resolve_addresses(person, &delivery.name).await {
                    Ok((addresses, _)) => current.extend(&addresses),
                    Err(e) => warn!(
                        notification_id = %self.id,
                        delivery = %delivery.name,
                        person = %person,
                        "Address lookup failed: {}", e
                    ),
                }
            }
            current = snoozer.filter_target(&current, &delivery.name, transport.name(), priority);
        }

        for scenario in &self.selected_scenarios {
            let extra = scenario
                .customization_for(&delivery.name)
                .and_then(|c| c.target.as_ref());
            if let Some(extra) = extra {
                current.extend(extra);
            }
        }
        if let Some(extra) = self
            .request
            .delivery
            .override_for(&delivery.name)
            .and_then(|o| o.target)
        {
            current.extend(&extra);
        }

        transport.select_targets(&current)
    }

    /// Apply cross-delivery uniqueness and record the claimed addresses.
    pub(super) fn claim(&mut self, delivery: &Delivery, parts: Vec<Target>) -> Vec<Target> {
        let parts: Vec<Target> = if delivery.unique_targets {
            parts
                .into_iter()
                .map(|part| &part - &self.claimed)
                .filter(|part| !part.is_empty())
                .collect()
        } else {
            parts
        };

        for part in &parts {
            for (key, address) in part.addresses() {
                self.claimed.push(key.clone(), address);
            }
        }
        parts
    }
}
