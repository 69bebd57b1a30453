//! Notification dispatch to human responders.
//!
//! A human-contact action is turned into a [`Notification`] (built from a fixed
//! per-action template, never from user text), routed to a [`ChannelSender`]
//! by channel, and, when the template asks for it, followed by an
//! acknowledgment wait with a hard deadline and fallback to the next responder.

pub mod ack;
pub mod channels;
pub mod dispatcher;

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::detect::{Concern, Severity};
use crate::escalation::ActionKind;
use crate::intervention::LogError;
use crate::responders::Channel;

pub use self::ack::{AckRegistry, AckStatus};
pub use self::channels::{ChannelRouter, ChannelSender, LogSender, WebhookSender};
pub use self::dispatcher::NotificationDispatcher;

/// A single send failed. Absorbed by the dispatcher, which moves on to the
/// next responder.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("provider rejected notification with status {0}")]
    Rejected(u16),
    #[error("sender does not handle channel {0}")]
    UnsupportedChannel(Channel),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    /// No responder matches the action's kinds and the incident's language.
    /// This is a configuration fault, not a delivery failure.
    #[error("no available responder for {action} in language '{language}'")]
    NoResponders { action: ActionKind, language: String },
    #[error("action {0} is not delivered to responders")]
    NotDispatchable(ActionKind),
    #[error(transparent)]
    Log(#[from] LogError),
}

/// Fixed wording and acknowledgment requirement per action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationTemplate {
    pub summary: &'static str,
    pub requires_response: bool,
}

impl NotificationTemplate {
    pub fn for_action(action: ActionKind) -> Option<Self> {
        match action {
            ActionKind::AlertCounselor => Some(Self {
                summary: "A journaling user may be in crisis and needs counselor outreach.",
                requires_response: true,
            }),
            ActionKind::ContactEmergencyServices => Some(Self {
                summary: "Emergency assistance requested for a user assessed at imminent risk.",
                requires_response: true,
            }),
            ActionKind::ConsiderFamilyNotification => Some(Self {
                summary: "Someone who listed you as a trusted contact may need your support.",
                requires_response: false,
            }),
            _ => None,
        }
    }
}

/// What a responder receives. Has no field that could carry journal text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub delivery_id: Uuid,
    pub incident_id: Uuid,
    pub action: ActionKind,
    pub severity: Severity,
    pub concerns: BTreeSet<Concern>,
    pub language: String,
    pub summary: String,
    pub requires_response: bool,
    /// 1-based attempt number within this dispatch.
    pub attempt: u32,
}

/// Per-incident facts the dispatcher needs.
#[derive(Debug, Clone)]
pub struct DispatchContext {
    pub incident_id: Uuid,
    pub severity: Severity,
    pub language: String,
    pub concerns: BTreeSet<Concern>,
    pub phase: Option<usize>,
    pub detected_at: DateTime<Utc>,
    /// Cancelled when the incident is resolved; ends acknowledgment waits.
    pub cancel: CancellationToken,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_templates_only_for_human_contact() {
        for action in [
            ActionKind::LocalSupportMessage,
            ActionKind::CrisisMode,
            ActionKind::ProvideResources,
            ActionKind::ActivateOfflineResources,
            ActionKind::ScheduleFollowUp { after_mins: 5 },
            ActionKind::EmergencyFallback,
        ] {
            assert!(NotificationTemplate::for_action(action).is_none(), "{action}");
        }
        assert!(
            NotificationTemplate::for_action(ActionKind::AlertCounselor)
                .unwrap()
                .requires_response
        );
        assert!(
            !NotificationTemplate::for_action(ActionKind::ConsiderFamilyNotification)
                .unwrap()
                .requires_response
        );
    }
}
