//! Envelope generation, transport calls and fallback.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};

use super::{DeliveryOutcome, Envelope, Notification, SuppressionReason};
use crate::conditions::evaluate_or_false;
use crate::delivery::{Delivery, TargetRequired};
use crate::dupe::DupeCandidate;
use crate::target::{Target, TargetData};

fn merge_into(data: &mut TargetData, layer: &TargetData) {
    for (key, value) in layer {
        data.insert(key.clone(), value.clone());
    }
}

impl Notification {
    /// Send the notification.
    ///
    /// Every selected delivery runs to completion; a failure in one never
    /// stops the others. Returns whether anything was delivered. Dispatch
    /// happens once; later calls return the recorded result.
    pub async fn deliver(&mut self) -> bool {
        if let Some(delivered) = self.delivered {
            debug!(notification_id = %self.id, "Notification already dispatched");
            return delivered;
        }
        let delivered = self.dispatch_all().await;
        self.delivered = Some(delivered);
        delivered
    }

    async fn dispatch_all(&mut self) -> bool {
        self.initialize().await;

        if self.suppression == Some(SuppressionReason::NoScenario) {
            return false;
        }

        let selection = self.selection.clone();
        for delivery in &selection {
            self.dispatch(delivery, false).await;
        }

        if self.suppression.is_none() {
            self.dispatch_fallbacks().await;
        }

        let delivered = self.delivered_count();
        info!(
            notification_id = %self.id,
            delivered,
            failed = self.failed_count(),
            suppressed = self.suppressed_count(),
            dupe = self.dupe,
            "Notification dispatched"
        );
        delivered > 0
    }

    async fn dispatch_fallbacks(&mut self) {
        let nothing_happened = self.delivered_count() == 0 && self.failed_count() == 0 && !self.dupe;
        let failures = self.failed_count() > 0;

        let registry = &self.ctx.deliveries;
        let mut fallbacks: Vec<Arc<Delivery>> = Vec::new();
        if nothing_happened {
            fallbacks.extend(registry.fallback_by_default(&self.enabled_snapshot));
        }
        if failures {
            for delivery in registry.fallback_on_error(&self.enabled_snapshot) {
                if !fallbacks.iter().any(|d| d.name == delivery.name) {
                    fallbacks.push(delivery);
                }
            }
        }
        fallbacks.retain(|d| !self.outcomes.contains_key(&d.name));

        for delivery in &fallbacks {
            debug!(notification_id = %self.id, delivery = %delivery.name, "Dispatching fallback");
            self.dispatch(delivery, true).await;
        }
    }

    async fn dispatch(&mut self, delivery: &Arc<Delivery>, fallback: bool) {
        let outcome = self.dispatch_delivery(delivery, fallback).await;
        if let Some(reason) = outcome.suppressed {
            debug!(
                notification_id = %self.id,
                delivery = %delivery.name,
                reason = %reason,
                "Delivery suppressed"
            );
        }
        self.outcomes.insert(delivery.name.clone(), outcome);
    }

    async fn dispatch_delivery(&mut self, delivery: &Delivery, fallback: bool) -> DeliveryOutcome {
        let suppressed = |reason| DeliveryOutcome::suppressed(reason, fallback);

        if self.suppression == Some(SuppressionReason::Snoozed) {
            return suppressed(SuppressionReason::Snoozed);
        }

        let ctx = self.ctx.clone();
        let priority = self.request.priority;

        let Some(transport) = ctx.deliveries.transport_for(delivery) else {
            let mut outcome = suppressed(SuppressionReason::TransportDisabled);
            outcome.error = Some(format!("No transport named '{}'", delivery.transport));
            return outcome;
        };
        if !transport.is_enabled() {
            return suppressed(SuppressionReason::TransportDisabled);
        }
        if ctx
            .snoozer
            .is_delivery_snoozed(&delivery.name, transport.name(), priority)
        {
            return suppressed(SuppressionReason::Snoozed);
        }
        if !delivery.accepts_priority(priority) {
            return suppressed(SuppressionReason::Priority);
        }
        if let Some(condition) = &delivery.condition {
            let context = format!("delivery {}", delivery.name);
            if !evaluate_or_false(ctx.evaluator.as_ref(), condition, &self.vars, &context).await {
                return suppressed(SuppressionReason::DeliveryCondition);
            }
        }

        let envelopes = if delivery.target_required == TargetRequired::Never {
            vec![self.envelope(delivery, Target::new(), None)]
        } else {
            let parts = self.resolve_targets(delivery, transport.as_ref()).await;
            let parts = self.claim(delivery, parts);
            if parts.is_empty() {
                return suppressed(match delivery.target_required {
                    TargetRequired::Always => SuppressionReason::NoTarget,
                    _ => SuppressionReason::Unknown,
                });
            }

            let mut envelopes = Vec::new();
            for part in &parts {
                let target_data = part.target_data().cloned();
                let targets = if transport.batch_targets() {
                    vec![part.clone()]
                } else {
                    part.split_by_address()
                };
                for target in targets {
                    envelopes.push(self.envelope(delivery, target, target_data.as_ref()));
                }
            }
            envelopes
        };

        let mut outcome = DeliveryOutcome::new(fallback);
        let mut pending: Vec<Envelope> = Vec::with_capacity(envelopes.len());
        for envelope in envelopes {
            if ctx.dupes.check(&envelope) {
                debug!(
                    notification_id = %self.id,
                    delivery = %delivery.name,
                    hash = %envelope.content_hash(),
                    "Duplicate envelope held back"
                );
                self.dupe = true;
                outcome.duplicates.push(envelope);
            } else {
                pending.push(envelope);
            }
        }

        let results = join_all(pending.iter().map(|envelope| transport.deliver(envelope))).await;
        for (mut envelope, result) in pending.into_iter().zip(results) {
            match result {
                Ok(true) => outcome.delivered.push(envelope),
                Ok(false) => {
                    warn!(
                        notification_id = %self.id,
                        delivery = %delivery.name,
                        target = %envelope.target,
                        "Transport reported delivery failure"
                    );
                    outcome.undelivered.push(envelope);
                }
                Err(e) => {
                    warn!(
                        notification_id = %self.id,
                        delivery = %delivery.name,
                        target = %envelope.target,
                        "Transport error: {}", e
                    );
                    envelope.record_error(e.to_string());
                    outcome.errors += 1;
                    outcome.error = Some(e.to_string());
                    outcome.undelivered.push(envelope);
                }
            }
        }

        if outcome.delivered.is_empty()
            && outcome.undelivered.is_empty()
            && !outcome.duplicates.is_empty()
        {
            outcome.suppressed = Some(SuppressionReason::Duplicate);
        }
        outcome
    }

    /// Build an envelope. Data layers, lowest first: delivery, call, call
    /// override, target-specific, scenario customization.
    fn envelope(
        &self,
        delivery: &Delivery,
        target: Target,
        target_data: Option<&TargetData>,
    ) -> Envelope {
        let mut data = delivery.data.clone();
        merge_into(&mut data, &self.request.data);
        if let Some(layer) = self
            .request
            .delivery
            .override_for(&delivery.name)
            .and_then(|o| o.data)
        {
            merge_into(&mut data, &layer);
        }
        if let Some(layer) = target_data {
            merge_into(&mut data, layer);
        }
        for scenario in &self.selected_scenarios {
            let layer = scenario
                .customization_for(&delivery.name)
                .and_then(|c| c.data.as_ref());
            if let Some(layer) = layer {
                merge_into(&mut data, layer);
            }
        }

        Envelope::builder(&self.id, &delivery.name)
            .priority(self.request.priority)
            .maybe_title(self.request.title.clone())
            .maybe_message(self.request.message.clone())
            .target(target)
            .data(data)
            .media(self.media.clone())
            .action_groups(self.action_groups.clone())
            .build()
    }
}
