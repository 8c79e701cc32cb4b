//! Generic webhook transport.

use async_trait::async_trait;
use reqwest::{Client, header::HeaderMap};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use super::Transport;
use crate::notification::Envelope;
use crate::target::{CategoryKey, Target};
use crate::{Error, Result};

/// Webhook transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Name deliveries bind to.
    pub name: String,
    /// Whether the transport is enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Webhook URL.
    pub url: String,
    /// HTTP method (default: POST).
    #[serde(default = "default_method")]
    pub method: String,
    /// Custom headers.
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    /// Authentication type.
    pub auth: Option<WebhookAuth>,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Address categories the endpoint accepts; empty means every direct one.
    #[serde(default)]
    pub categories: Vec<String>,
    /// Delivery actions the endpoint accepts; empty means any.
    #[serde(default)]
    pub actions: Vec<String>,
    /// Post all addresses in one request.
    #[serde(default)]
    pub batch: bool,
}

fn default_enabled() -> bool {
    true
}

fn default_method() -> String {
    "POST".to_string()
}

fn default_timeout() -> u64 {
    30
}

/// Webhook authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WebhookAuth {
    /// Bearer token authentication.
    Bearer { token: String },
    /// Basic authentication.
    Basic { username: String, password: String },
    /// Custom header authentication.
    Header { name: String, value: String },
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            name: "webhook".to_string(),
            enabled: true,
            url: String::new(),
            method: "POST".to_string(),
            headers: Vec::new(),
            auth: None,
            timeout_secs: 30,
            categories: Vec::new(),
            actions: Vec::new(),
            batch: false,
        }
    }
}

/// Posts envelopes as JSON to an HTTP endpoint.
pub struct WebhookTransport {
    config: WebhookConfig,
    client: Client,
}

impl WebhookTransport {
    pub fn new(config: WebhookConfig) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();

        Self { config, client }
    }

    fn build_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        for (name, value) in &self.config.headers {
            if let (Ok(name), Ok(value)) = (
                name.parse::<reqwest::header::HeaderName>(),
                value.parse::<reqwest::header::HeaderValue>(),
            ) {
                headers.insert(name, value);
            }
        }

        match &self.config.auth {
            Some(WebhookAuth::Bearer { token }) => {
                if let Ok(value) = format!("Bearer {}", token).parse() {
                    headers.insert(reqwest::header::AUTHORIZATION, value);
                }
            }
            Some(WebhookAuth::Header { name, value }) => {
                if let (Ok(name), Ok(value)) = (
                    name.parse::<reqwest::header::HeaderName>(),
                    value.parse::<reqwest::header::HeaderValue>(),
                ) {
                    headers.insert(name, value);
                }
            }
            // Basic auth goes through the request builder
            Some(WebhookAuth::Basic { .. }) | None => {}
        }

        headers
    }

    fn build_payload(&self, envelope: &Envelope) -> serde_json::Value {
        json!({
            "notification_id": envelope.notification_id,
            "delivery": envelope.delivery,
            "priority": envelope.priority.as_str(),
            "title": envelope.title,
            "message": envelope.message,
            "target": envelope.target,
            "data": envelope.data,
            "media": envelope.media,
            "action_groups": envelope.action_groups,
            "timestamp": envelope.created_at.to_rfc3339(),
        })
    }
}

#[async_trait]
impl Transport for WebhookTransport {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled && !self.config.url.is_empty()
    }

    fn supports_action(&self, action: &str) -> bool {
        self.config.actions.is_empty() || self.config.actions.iter().any(|a| a == action)
    }

    fn select_targets(&self, target: &Target) -> Target {
        let mut selected = target.direct();
        if !self.config.categories.is_empty() {
            let accepted: Vec<CategoryKey> = self
                .config
                .categories
                .iter()
                .map(|label| CategoryKey::from_label(label))
                .collect();
            selected.retain(|key, _| accepted.contains(key));
        }
        selected
    }

    fn batch_targets(&self) -> bool {
        self.config.batch
    }

    async fn deliver(&self, envelope: &Envelope) -> Result<bool> {
        let payload = self.build_payload(envelope);
        let headers = self.build_headers();

        let mut request = match self.config.method.to_uppercase().as_str() {
            "PUT" => self.client.put(&self.config.url),
            _ => self.client.post(&self.config.url),
        };

        request = request.headers(headers).json(&payload);

        if let Some(WebhookAuth::Basic { username, password }) = &self.config.auth {
            request = request.basic_auth(username, Some(password));
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::transport(format!("Webhook request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(transport = %self.config.name, "Webhook failed: {} - {}", status, body);
            return Err(Error::transport(format!(
                "Webhook failed: {} - {}",
                status, body
            )));
        }

        debug!(
            transport = %self.config.name,
            delivery = %envelope.delivery,
            "Webhook notification sent"
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::Priority;
    use crate::target::TargetCategory;

    #[test]
    fn test_webhook_config_default() {
        let config = WebhookConfig::default();
        assert!(config.enabled);
        assert!(config.url.is_empty());
        assert_eq!(config.method, "POST");
        assert_eq!(config.timeout_secs, 30);
    }

    #[test]
    fn test_webhook_without_url_is_disabled() {
        let transport = WebhookTransport::new(WebhookConfig::default());
        assert!(!transport.is_enabled());
    }

    #[test]
    fn test_build_headers_with_bearer() {
        let config = WebhookConfig {
            auth: Some(WebhookAuth::Bearer {
                token: "secret".to_string(),
            }),
            headers: vec![("X-Source".to_string(), "herald".to_string())],
            ..Default::default()
        };
        let transport = WebhookTransport::new(config);
        let headers = transport.build_headers();

        assert_eq!(headers.get("authorization").unwrap(), "Bearer secret");
        assert_eq!(headers.get("x-source").unwrap(), "herald");
    }

    #[test]
    fn test_select_targets_by_category() {
        let config = WebhookConfig {
            categories: vec!["email".to_string()],
            ..Default::default()
        };
        let transport = WebhookTransport::new(config);
        let target = Target::from_addresses(["a@example.com", "light.kitchen", "person.alice"]);

        let selected = transport.select_targets(&target);
        assert_eq!(selected.category(TargetCategory::Email), ["a@example.com"]);
        assert_eq!(selected.len(), 1);
    }

    #[test]
    fn test_build_payload() {
        let transport = WebhookTransport::new(WebhookConfig::default());
        let envelope = Envelope::builder("n-1", "hook_delivery")
            .priority(Priority::High)
            .title("Door")
            .message("Front door opened")
            .target(Target::from("a@example.com"))
            .build();

        let payload = transport.build_payload(&envelope);
        assert_eq!(payload["delivery"], "hook_delivery");
        assert_eq!(payload["priority"], "high");
        assert_eq!(payload["target"]["email"][0], "a@example.com");
    }
}
