//! Append-only record of what the engine did for each incident.
//!
//! Nothing in this module can hold user-submitted text: every field is an
//! identifier, an enum, a number or a timestamp. Outcomes are built from typed
//! parts only (see [`ActionOutcome::with_responder`]).

pub mod log;

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::detect::{Concern, Severity};
use crate::escalation::{ActionKind, Resolution};
use crate::responders::{Channel, Responder};

pub use self::log::InterventionLog;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LogError {
    #[error("no intervention record for incident {0}")]
    UnknownIncident(Uuid),
    #[error("intervention record for incident {0} already exists")]
    AlreadyOpen(Uuid),
    #[error("intervention record for incident {0} is finalized")]
    Finalized(Uuid),
}

/// How an action attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeResult {
    /// A local action ran.
    Completed,
    /// Sent; no acknowledgment was required.
    Delivered,
    /// Sent and acknowledged by the responder.
    Acknowledged,
    /// Sent but the acknowledgment deadline elapsed.
    Unacknowledged,
    Failed,
    /// Not run because the incident was resolved first.
    Skipped,
    /// Interrupted by incident resolution.
    Cancelled,
    /// Not sent: the same action was already acknowledged for this incident.
    AlreadyAcknowledged,
}

impl OutcomeResult {
    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeResult::Completed => "completed",
            OutcomeResult::Delivered => "delivered",
            OutcomeResult::Acknowledged => "acknowledged",
            OutcomeResult::Unacknowledged => "unacknowledged",
            OutcomeResult::Failed => "failed",
            OutcomeResult::Skipped => "skipped",
            OutcomeResult::Cancelled => "cancelled",
            OutcomeResult::AlreadyAcknowledged => "already_acknowledged",
        }
    }

    /// True when a responder has been reached.
    pub fn is_contact_success(self) -> bool {
        matches!(
            self,
            OutcomeResult::Delivered
                | OutcomeResult::Acknowledged
                | OutcomeResult::AlreadyAcknowledged
        )
    }
}

/// Closed set of failure causes; deliberately carries no free text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    SendError,
    SendTimeout,
    NoSenderForChannel,
    DeadlineExceeded,
    NoResponders,
    AttemptsExhausted,
    HandlerFault,
    ResourcesUnavailable,
}

/// One attempted action, as written to the intervention record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub action: ActionKind,
    /// Index of the plan phase this ran in; `None` for out-of-plan actions.
    pub phase: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub responder_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<Channel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_id: Option<Uuid>,
    pub attempted_at: DateTime<Utc>,
    pub result: OutcomeResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_seconds: Option<f64>,
}

impl ActionOutcome {
    pub fn new(
        action: ActionKind,
        phase: Option<usize>,
        attempted_at: DateTime<Utc>,
        result: OutcomeResult,
    ) -> Self {
        Self {
            action,
            phase,
            responder_id: None,
            channel: None,
            delivery_id: None,
            attempted_at,
            result,
            failure: None,
            response_time_seconds: None,
        }
    }

    /// Attach the responder contacted. Only the directory id is kept.
    pub fn with_responder(mut self, responder: &Responder, channel: Channel) -> Self {
        self.responder_id = Some(responder.id.clone());
        self.channel = Some(channel);
        self
    }

    pub fn with_delivery(mut self, delivery_id: Uuid) -> Self {
        self.delivery_id = Some(delivery_id);
        self
    }

    pub fn with_failure(mut self, reason: FailureReason) -> Self {
        self.failure = Some(reason);
        self
    }

    pub fn with_response_time(mut self, seconds: f64) -> Self {
        self.response_time_seconds = Some(seconds);
        self
    }
}

/// Persisted audit trail for one incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterventionRecord {
    pub incident_id: Uuid,
    pub severity: Severity,
    pub concerns: BTreeSet<Concern>,
    pub detected_at: DateTime<Utc>,
    pub outcomes: Vec<ActionOutcome>,
    /// Seconds from detection to the first acknowledged human contact.
    pub total_response_time_seconds: Option<f64>,
    pub resolved: bool,
    pub resolution: Option<Resolution>,
    pub finalized_at: Option<DateTime<Utc>>,
}

impl InterventionRecord {
    pub fn new(
        incident_id: Uuid,
        severity: Severity,
        concerns: BTreeSet<Concern>,
        detected_at: DateTime<Utc>,
    ) -> Self {
        Self {
            incident_id,
            severity,
            concerns,
            detected_at,
            outcomes: Vec::new(),
            total_response_time_seconds: None,
            resolved: false,
            resolution: None,
            finalized_at: None,
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized_at.is_some()
    }

    fn push(&mut self, outcome: ActionOutcome) {
        if self.total_response_time_seconds.is_none()
            && outcome.result == OutcomeResult::Acknowledged
        {
            let sent_after =
                (outcome.attempted_at - self.detected_at).num_milliseconds() as f64 / 1000.0;
            let total = sent_after + outcome.response_time_seconds.unwrap_or(0.0);
            self.total_response_time_seconds = Some(total.max(0.0));
        }
        self.outcomes.push(outcome);
    }

    /// Outcomes for one action kind, in append order.
    pub fn outcomes_for(&self, action: ActionKind) -> impl Iterator<Item = &ActionOutcome> {
        self.outcomes.iter().filter(move |o| o.action == action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_fields_omitted_in_json() {
        let outcome = ActionOutcome::new(
            ActionKind::CrisisMode,
            Some(0),
            Utc::now(),
            OutcomeResult::Completed,
        );
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(!json.contains("\"responder_id\""));
        assert!(!json.contains("\"failure\""));
        assert!(json.contains("\"attempted_at\""));
        assert!(json.contains("\"crisis_mode\""));
    }

    #[test]
    fn test_total_response_time_from_first_ack() {
        let detected = Utc::now();
        let mut record =
            InterventionRecord::new(Uuid::new_v4(), Severity::High, BTreeSet::new(), detected);
        record.push(ActionOutcome::new(
            ActionKind::AlertCounselor,
            Some(1),
            detected + chrono::Duration::seconds(30),
            OutcomeResult::Unacknowledged,
        ));
        assert!(record.total_response_time_seconds.is_none());

        record.push(
            ActionOutcome::new(
                ActionKind::AlertCounselor,
                Some(1),
                detected + chrono::Duration::seconds(60),
                OutcomeResult::Acknowledged,
            )
            .with_response_time(45.0),
        );
        assert_eq!(record.total_response_time_seconds, Some(105.0));

        record.push(
            ActionOutcome::new(
                ActionKind::ContactEmergencyServices,
                Some(0),
                detected + chrono::Duration::seconds(500),
                OutcomeResult::Acknowledged,
            )
            .with_response_time(1.0),
        );
        assert_eq!(record.total_response_time_seconds, Some(105.0));
        assert_eq!(record.outcomes_for(ActionKind::AlertCounselor).count(), 2);
    }
}
