//! One unit of dispatch: a delivery, a resolved target and merged data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use super::Priority;
use crate::dupe::DupeCandidate;
use crate::target::{Target, TargetData};

/// What a transport is asked to send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: String,
    pub notification_id: String,
    pub delivery: String,
    pub priority: Priority,
    pub title: Option<String>,
    pub message: Option<String>,
    /// Direct addresses only.
    pub target: Target,
    pub data: TargetData,
    pub media: Map<String, Value>,
    pub action_groups: Vec<String>,
    pub created_at: DateTime<Utc>,
    /// Failed transport calls for this envelope.
    pub errors: usize,
    pub last_error: Option<String>,
}

impl Envelope {
    pub fn builder(
        notification_id: impl Into<String>,
        delivery: impl Into<String>,
    ) -> EnvelopeBuilder {
        EnvelopeBuilder::new(notification_id.into(), delivery.into())
    }

    /// Record a failed transport call.
    pub fn record_error(&mut self, error: impl Into<String>) {
        self.errors += 1;
        self.last_error = Some(error.into());
    }
}

impl DupeCandidate for Envelope {
    fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.delivery.as_bytes());
        hasher.update([0]);
        for (key, address) in self.target.addresses() {
            hasher.update(key.label().as_bytes());
            hasher.update(b":");
            hasher.update(address.as_bytes());
            hasher.update([0]);
        }
        hasher.update(self.title.as_deref().unwrap_or_default().as_bytes());
        hasher.update([0]);
        hasher.update(self.message.as_deref().unwrap_or_default().as_bytes());
        hex::encode(hasher.finalize())
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn priority(&self) -> Priority {
        self.priority
    }
}

/// Builder for [`Envelope`].
#[derive(Debug)]
pub struct EnvelopeBuilder {
    envelope: Envelope,
}

impl EnvelopeBuilder {
    fn new(notification_id: String, delivery: String) -> Self {
        Self {
            envelope: Envelope {
                id: uuid::Uuid::new_v4().to_string(),
                notification_id,
                delivery,
                priority: Priority::default(),
                title: None,
                message: None,
                target: Target::new(),
                data: Map::new(),
                media: Map::new(),
                action_groups: Vec::new(),
                created_at: Utc::now(),
                errors: 0,
                last_error: None,
            },
        }
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.envelope.priority = priority;
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.envelope.title = Some(title.into());
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.envelope.message = Some(message.into());
        self
    }

    pub fn maybe_title(mut self, title: Option<String>) -> Self {
        self.envelope.title = title;
        self
    }

    pub fn maybe_message(mut self, message: Option<String>) -> Self {
        self.envelope.message = message;
        self
    }

    pub fn target(mut self, target: Target) -> Self {
        self.envelope.target = target;
        self
    }

    pub fn data(mut self, data: TargetData) -> Self {
        self.envelope.data = data;
        self
    }

    pub fn media(mut self, media: Map<String, Value>) -> Self {
        self.envelope.media = media;
        self
    }

    pub fn action_groups(mut self, action_groups: Vec<String>) -> Self {
        self.envelope.action_groups = action_groups;
        self
    }

    pub fn build(self) -> Envelope {
        self.envelope
    }
}
