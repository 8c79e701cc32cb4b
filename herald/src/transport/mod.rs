//! Transports.
//!
//! A transport sends [`Envelope`]s for one kind of channel. Deliveries bind
//! to a transport by name; the routing engine never looks inside one beyond
//! this trait.

mod log;
mod webhook;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use log::{LogTransport, LogTransportConfig};
pub use webhook::{WebhookAuth, WebhookConfig, WebhookTransport};

use crate::Result;
use crate::notification::Envelope;
use crate::target::Target;

/// Sends envelopes for one kind of channel.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Name deliveries bind to.
    fn name(&self) -> &str;

    /// A disabled transport is skipped with `TRANSPORT_DISABLED`.
    fn is_enabled(&self) -> bool {
        true
    }

    /// Whether a delivery's `action` is something this transport can do.
    fn supports_action(&self, action: &str) -> bool {
        let _ = action;
        true
    }

    /// Narrow a target to the address shapes this transport understands.
    fn select_targets(&self, target: &Target) -> Target {
        target.direct()
    }

    /// Send one envelope for all addresses instead of one per address.
    fn batch_targets(&self) -> bool {
        false
    }

    /// Send an envelope. `Ok(false)` is a soft failure.
    async fn deliver(&self, envelope: &Envelope) -> Result<bool>;
}

/// Transport configuration wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportConfig {
    /// HTTP webhook.
    Webhook(WebhookConfig),
    /// Writes envelopes to the log only.
    Log(LogTransportConfig),
}

impl TransportConfig {
    pub fn name(&self) -> &str {
        match self {
            Self::Webhook(c) => &c.name,
            Self::Log(c) => &c.name,
        }
    }

    /// Build the configured transport.
    pub fn build(&self) -> Arc<dyn Transport> {
        match self {
            Self::Webhook(c) => Arc::new(WebhookTransport::new(c.clone())),
            Self::Log(c) => Arc::new(LogTransport::new(c.clone())),
        }
    }
}
