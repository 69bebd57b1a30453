//! Channel senders and the channel -> sender routing table.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use super::{Notification, SendError};
use crate::config::{ChannelConfig, SenderKind};
use crate::detect::{Concern, Severity};
use crate::escalation::ActionKind;
use crate::responders::{Channel, ContactPoint, Responder};

/// Delivers a notification over one transport.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    /// Send and return the provider's receipt id.
    async fn send(
        &self,
        responder: &Responder,
        contact: &ContactPoint,
        notification: &Notification,
    ) -> Result<String, SendError>;

    /// Short name for logs, e.g. "log" or "webhook".
    fn name(&self) -> &str;
}

/// Maps each channel to the sender that handles it.
#[derive(Clone, Default)]
pub struct ChannelRouter {
    senders: HashMap<Channel, Arc<dyn ChannelSender>>,
}

impl ChannelRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration.
    pub fn with(mut self, channel: Channel, sender: Arc<dyn ChannelSender>) -> Self {
        self.register(channel, sender);
        self
    }

    pub fn register(&mut self, channel: Channel, sender: Arc<dyn ChannelSender>) {
        self.senders.insert(channel, sender);
    }

    pub fn get(&self, channel: Channel) -> Option<&Arc<dyn ChannelSender>> {
        self.senders.get(&channel)
    }

    pub fn supports(&self, channel: Channel) -> bool {
        self.senders.contains_key(&channel)
    }

    pub fn channels(&self) -> Vec<Channel> {
        let mut channels: Vec<_> = self.senders.keys().copied().collect();
        channels.sort();
        channels
    }

    /// Build from `[[channels]]`. Webhook senders share one HTTP client.
    pub fn from_config(configs: &[ChannelConfig], send_timeout: Duration) -> Result<Self> {
        let mut router = Self::new();
        let mut client = None;
        for cfg in configs {
            let sender: Arc<dyn ChannelSender> = match cfg.sender {
                SenderKind::Log => Arc::new(LogSender),
                SenderKind::Webhook => {
                    let url = cfg
                        .url
                        .clone()
                        .with_context(|| format!("webhook sender for {} has no url", cfg.channel))?;
                    if client.is_none() {
                        client = Some(
                            reqwest::Client::builder()
                                .timeout(send_timeout)
                                .build()
                                .context("failed to build HTTP client")?,
                        );
                    }
                    let client = client.clone().context("HTTP client missing")?;
                    Arc::new(WebhookSender::new(client, url))
                }
            };
            router.register(cfg.channel, sender);
        }
        Ok(router)
    }
}

/// Writes notifications to the tracing log. Useful for development and for
/// channels handled by a log-shipping pipeline.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSender;

#[async_trait]
impl ChannelSender for LogSender {
    async fn send(
        &self,
        responder: &Responder,
        contact: &ContactPoint,
        notification: &Notification,
    ) -> Result<String, SendError> {
        info!(
            delivery_id = %notification.delivery_id,
            incident_id = %notification.incident_id,
            responder_id = %responder.id,
            channel = %contact.channel,
            action = %notification.action,
            severity = %notification.severity,
            requires_response = notification.requires_response,
            "notification dispatched"
        );
        Ok(format!("log-{}", notification.delivery_id))
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// POSTs notifications as JSON to an operator-run gateway (SMS, voice, push).
pub struct WebhookSender {
    client: reqwest::Client,
    url: String,
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    delivery_id: Uuid,
    incident_id: Uuid,
    responder_id: &'a str,
    channel: Channel,
    address: &'a str,
    action: ActionKind,
    severity: Severity,
    concerns: Vec<Concern>,
    language: &'a str,
    summary: &'a str,
    requires_response: bool,
    attempt: u32,
}

#[derive(serde::Deserialize)]
struct WebhookReceipt {
    #[serde(default)]
    receipt_id: Option<String>,
}

impl WebhookSender {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl ChannelSender for WebhookSender {
    async fn send(
        &self,
        responder: &Responder,
        contact: &ContactPoint,
        notification: &Notification,
    ) -> Result<String, SendError> {
        let payload = WebhookPayload {
            delivery_id: notification.delivery_id,
            incident_id: notification.incident_id,
            responder_id: &responder.id,
            channel: contact.channel,
            address: &contact.address,
            action: notification.action,
            severity: notification.severity,
            concerns: notification.concerns.iter().copied().collect(),
            language: &notification.language,
            summary: &notification.summary,
            requires_response: notification.requires_response,
            attempt: notification.attempt,
        };

        let resp = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| SendError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SendError::Rejected(status.as_u16()));
        }

        // Gateways may answer with an empty body; fall back to our own id.
        let receipt = resp
            .json::<WebhookReceipt>()
            .await
            .ok()
            .and_then(|r| r.receipt_id)
            .unwrap_or_else(|| notification.delivery_id.to_string());
        Ok(receipt)
    }

    fn name(&self) -> &str {
        "webhook"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_router_from_config() {
        let configs = vec![
            ChannelConfig {
                channel: Channel::Sms,
                sender: SenderKind::Log,
                url: None,
            },
            ChannelConfig {
                channel: Channel::Voice,
                sender: SenderKind::Webhook,
                url: Some("http://127.0.0.1:9/voice".to_string()),
            },
        ];
        let router = ChannelRouter::from_config(&configs, Duration::from_secs(5)).unwrap();
        assert_eq!(router.channels(), vec![Channel::Voice, Channel::Sms]);
        assert_eq!(router.get(Channel::Sms).unwrap().name(), "log");
        assert_eq!(router.get(Channel::Voice).unwrap().name(), "webhook");
        assert!(!router.supports(Channel::Push));
    }

    #[test]
    fn test_webhook_without_url_is_rejected() {
        let configs = vec![ChannelConfig {
            channel: Channel::Push,
            sender: SenderKind::Webhook,
            url: None,
        }];
        assert!(ChannelRouter::from_config(&configs, Duration::from_secs(5)).is_err());
    }

    #[tokio::test]
    async fn test_webhook_transport_error() {
        // Nothing listens on the discard port.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .unwrap();
        let sender = WebhookSender::new(client, "http://127.0.0.1:9/notify");
        let responder = crate::config::LifelineConfig::default().responders.remove(0);
        let contact = responder.contacts[0].clone();
        let notification = Notification {
            delivery_id: Uuid::new_v4(),
            incident_id: Uuid::new_v4(),
            action: ActionKind::AlertCounselor,
            severity: Severity::High,
            concerns: Default::default(),
            language: "en".into(),
            summary: "test".into(),
            requires_response: true,
            attempt: 1,
        };
        let err = sender.send(&responder, &contact, &notification).await.unwrap_err();
        assert!(matches!(err, SendError::Transport(_)));
    }
}
