//! Directory backed by the `recipients` configuration section.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{Recipient, RecipientDirectory};
use crate::Result;
use crate::target::{MOBILE_APP_PREFIX, Target, TargetCategory, TargetData};

/// Per-delivery preferences of one recipient.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RecipientDeliveryConfig {
    /// `true` opts the recipient into the delivery, `false` opts out.
    pub enabled: Option<bool>,
    /// Replaces the recipient's default addresses for this delivery.
    pub target: Option<Value>,
    pub data: Option<TargetData>,
}

/// One configured recipient.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RecipientConfig {
    pub person_id: String,
    pub home: Option<bool>,
    pub email: Option<String>,
    pub phone: Option<String>,
    /// Mobile app device ids, with or without the `mobile_app_` prefix.
    pub mobile: Vec<String>,
    /// Extra default addresses.
    pub target: Option<Value>,
    pub data: Option<TargetData>,
    pub deliveries: BTreeMap<String, RecipientDeliveryConfig>,
}

impl RecipientConfig {
    fn default_target(&self) -> Target {
        let mut target = Target::new();
        if let Some(email) = &self.email {
            target.push(TargetCategory::Email.into(), email);
        }
        if let Some(phone) = &self.phone {
            target.push(TargetCategory::Phone.into(), phone);
        }
        for device in &self.mobile {
            let id = if device.starts_with(MOBILE_APP_PREFIX) {
                device.clone()
            } else {
                format!("{MOBILE_APP_PREFIX}{device}")
            };
            target.push(TargetCategory::MobileApp.into(), &id);
        }
        if let Some(extra) = &self.target {
            target.extend(&Target::from_value(extra));
        }
        target
    }
}

/// In-memory recipient directory.
pub struct StaticDirectory {
    recipients: Vec<RecipientConfig>,
    presence: RwLock<HashMap<String, Option<bool>>>,
}

impl StaticDirectory {
    pub fn new(recipients: Vec<RecipientConfig>) -> Self {
        let presence = recipients
            .iter()
            .map(|r| (r.person_id.clone(), r.home))
            .collect();
        Self {
            recipients,
            presence: RwLock::new(presence),
        }
    }

    /// Update a recipient's presence; returns false for unknown people.
    pub fn set_home(&self, person_id: &str, home: Option<bool>) -> bool {
        let mut presence = self.presence.write();
        match presence.get_mut(person_id) {
            Some(state) => {
                *state = home;
                true
            }
            None => false,
        }
    }

    fn find(&self, person_id: &str) -> Option<&RecipientConfig> {
        self.recipients.iter().find(|r| r.person_id == person_id)
    }
}

#[async_trait]
impl RecipientDirectory for StaticDirectory {
    async fn recipients(&self) -> Result<Vec<Recipient>> {
        let presence = self.presence.read();
        Ok(self
            .recipients
            .iter()
            .map(|r| {
                let home = presence.get(&r.person_id).copied().flatten();
                Recipient::new(r.person_id.clone(), home)
            })
            .collect())
    }

    async fn resolve_addresses(&self, person_id: &str, delivery: &str) -> Result<(Target, bool)> {
        let Some(recipient) = self.find(person_id) else {
            debug!(person = %person_id, "Unknown recipient, nothing to resolve");
            return Ok((Target::new(), false));
        };

        let preferences = recipient.deliveries.get(delivery);
        if preferences.is_some_and(|p| p.enabled == Some(false)) {
            return Ok((Target::new(), false));
        }

        let target = match preferences.and_then(|p| p.target.as_ref()) {
            Some(value) => Target::from_value(value),
            None => recipient.default_target(),
        };

        let mut data = recipient.data.clone().unwrap_or_default();
        if let Some(delivery_data) = preferences.and_then(|p| p.data.as_ref()) {
            for (k, v) in delivery_data {
                data.insert(k.clone(), v.clone());
            }
        }

        if data.is_empty() {
            Ok((target, false))
        } else {
            Ok((target.with_data(data).into_target_specific(), true))
        }
    }

    async fn enabling_delivery_names(&self, person_id: &str) -> Result<Vec<String>> {
        Ok(self
            .find(person_id)
            .map(|r| {
                r.deliveries
                    .iter()
                    .filter(|(_, p)| p.enabled == Some(true))
                    .map(|(name, _)| name.clone())
                    .collect()
            })
            .unwrap_or_default())
    }
}
