//! Escalation: the severity -> plan policy, incident lifecycle, and the
//! coordinator that runs plan phases over time.

pub mod coordinator;
pub mod incident;
pub mod local;
pub mod planner;
pub mod policy;

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::detect::Severity;
use crate::responders::ResponderKind;

pub use self::coordinator::EscalationCoordinator;
pub use self::incident::{Incident, IncidentState, PhaseStatus, Resolution};
pub use self::planner::EscalationPlanner;
pub use self::policy::{EscalationPolicy, PolicyConfig, PolicyError};

/// A single step of an escalation plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    LocalSupportMessage,
    CrisisMode,
    ProvideResources,
    AlertCounselor,
    ContactEmergencyServices,
    ConsiderFamilyNotification,
    ActivateOfflineResources,
    ScheduleFollowUp { after_mins: u64 },
    /// Static hotline + emergency number shown when automation faults.
    /// Never part of a policy table.
    EmergencyFallback,
}

impl ActionKind {
    /// Actions delivered to a person through the notification dispatcher.
    pub fn is_human_contact(&self) -> bool {
        matches!(
            self,
            ActionKind::AlertCounselor
                | ActionKind::ContactEmergencyServices
                | ActionKind::ConsiderFamilyNotification
        )
    }

    /// Responder kinds eligible for a human-contact action.
    pub fn target_kinds(&self) -> &'static [ResponderKind] {
        match self {
            ActionKind::AlertCounselor => &[ResponderKind::Counselor, ResponderKind::Hotline],
            ActionKind::ContactEmergencyServices => &[ResponderKind::EmergencyServices],
            ActionKind::ConsiderFamilyNotification => &[ResponderKind::TrustedContact],
            _ => &[],
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::LocalSupportMessage => write!(f, "local_support_message"),
            ActionKind::CrisisMode => write!(f, "crisis_mode"),
            ActionKind::ProvideResources => write!(f, "provide_resources"),
            ActionKind::AlertCounselor => write!(f, "alert_counselor"),
            ActionKind::ContactEmergencyServices => write!(f, "contact_emergency_services"),
            ActionKind::ConsiderFamilyNotification => write!(f, "consider_family_notification"),
            ActionKind::ActivateOfflineResources => write!(f, "activate_offline_resources"),
            ActionKind::ScheduleFollowUp { after_mins } => {
                write!(f, "schedule_follow_up({}m)", after_mins)
            }
            ActionKind::EmergencyFallback => write!(f, "emergency_fallback"),
        }
    }
}

/// A time-delayed bundle of actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase {
    pub name: String,
    /// Delay from detection, not from the previous phase.
    pub delay_secs: u64,
    pub actions: Vec<ActionKind>,
}

impl Phase {
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }
}

/// Ordered phases derived from a severity. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationPlan {
    pub severity: Severity,
    pub phases: Vec<Phase>,
}

impl EscalationPlan {
    pub fn empty(severity: Severity) -> Self {
        Self {
            severity,
            phases: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    pub fn contains(&self, action: ActionKind) -> bool {
        self.phases.iter().any(|p| p.actions.contains(&action))
    }

    pub fn has_human_contact_in(&self, phase: usize) -> bool {
        self.phases
            .get(phase)
            .is_some_and(|p| p.actions.iter().any(ActionKind::is_human_contact))
    }
}
