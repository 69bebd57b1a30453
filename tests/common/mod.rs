//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;

use lifeline::clock::TokioClock;
use lifeline::config::LifelineConfig;
use lifeline::detect::UserRiskContext;
use lifeline::dispatch::{ChannelSender, Notification, SendError};
use lifeline::engine::{Engine, RiskAssessmentRequest};
use lifeline::responders::{Availability, Channel, ContactPoint, Responder, ResponderKind};

/// One recorded send.
#[derive(Debug, Clone)]
pub struct Sent {
    pub responder_id: String,
    pub channel: Channel,
    pub delivery_id: Uuid,
    pub incident_id: Uuid,
}

/// Sender that records every call and fails for selected responders.
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<Sent>>,
    failing: Mutex<Vec<String>>,
}

impl RecordingSender {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_for(&self, responder_id: &str) {
        self.failing.lock().unwrap().push(responder_id.to_string());
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sends_to(&self, responder_id: &str) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.responder_id == responder_id)
            .count()
    }

    pub fn last_to(&self, responder_id: &str) -> Option<Sent> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|s| s.responder_id == responder_id)
            .cloned()
    }
}

#[async_trait]
impl ChannelSender for RecordingSender {
    async fn send(
        &self,
        responder: &Responder,
        contact: &ContactPoint,
        notification: &Notification,
    ) -> Result<String, SendError> {
        self.sent.lock().unwrap().push(Sent {
            responder_id: responder.id.clone(),
            channel: contact.channel,
            delivery_id: notification.delivery_id,
            incident_id: notification.incident_id,
        });
        if self.failing.lock().unwrap().contains(&responder.id) {
            return Err(SendError::Transport("connection refused".into()));
        }
        Ok(format!("receipt-{}", notification.delivery_id))
    }

    fn name(&self) -> &str {
        "recording"
    }
}

pub fn responder(id: &str, kind: ResponderKind, priority: u32, languages: &[&str]) -> Responder {
    Responder {
        id: id.to_string(),
        display_name: id.to_string(),
        kind,
        contacts: vec![
            ContactPoint {
                channel: Channel::Sms,
                address: format!("sms:{id}"),
            },
            ContactPoint {
                channel: Channel::Voice,
                address: format!("tel:{id}"),
            },
        ],
        languages: languages.iter().map(|l| l.to_string()).collect::<BTreeSet<_>>(),
        availability: Availability::Always,
        priority,
        avg_response_secs: None,
        specialties: Vec::new(),
    }
}

/// Two English counselors, `a` before `b`, plus emergency services and a
/// trusted-contact relay.
pub fn roster() -> Vec<Responder> {
    vec![
        responder("a", ResponderKind::Counselor, 1, &["en"]),
        responder("b", ResponderKind::Counselor, 2, &["en"]),
        responder("ems", ResponderKind::EmergencyServices, 1, &["en"]),
        responder("relay", ResponderKind::TrustedContact, 1, &["en"]),
    ]
}

/// Engine on tokio's clock with every channel routed to `sender`.
pub fn engine_with(responders: Vec<Responder>, sender: Arc<RecordingSender>) -> Engine {
    let config = LifelineConfig {
        responders,
        ..LifelineConfig::default()
    };
    let mut builder = Engine::builder(config).with_clock(Arc::new(TokioClock::new()));
    for channel in Channel::ALL {
        builder = builder.with_sender(channel, sender.clone());
    }
    builder.build().expect("engine builds")
}

pub fn request(text: &str) -> RiskAssessmentRequest {
    RiskAssessmentRequest {
        user_id: "user-1".to_string(),
        text: text.to_string(),
        language: Some("en".to_string()),
        context: UserRiskContext::default(),
    }
}
