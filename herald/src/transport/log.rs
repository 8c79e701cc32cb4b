//! Transport that only logs what it would send.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::Transport;
use crate::Result;
use crate::notification::Envelope;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogTransportConfig {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

pub struct LogTransport {
    config: LogTransportConfig,
}

impl LogTransport {
    pub fn new(config: LogTransportConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Transport for LogTransport {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    fn batch_targets(&self) -> bool {
        true
    }

    async fn deliver(&self, envelope: &Envelope) -> Result<bool> {
        info!(
            transport = %self.config.name,
            delivery = %envelope.delivery,
            priority = %envelope.priority,
            target = %envelope.target,
            title = envelope.title.as_deref().unwrap_or_default(),
            "{}",
            envelope.message.as_deref().unwrap_or_default()
        );
        Ok(true)
    }
}
