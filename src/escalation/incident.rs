//! Incident lifecycle: one detected crisis from detection to resolution.
//!
//! All transitions happen through methods on [`Incident`] while the
//! coordinator holds the incident's lock, so a phase is claimed for execution
//! or skipped exactly once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::local::{LocalEffect, UserNotice};
use super::EscalationPlan;
use crate::detect::RiskAssessment;

pub type IncidentId = Uuid;

/// Execution status of one plan phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Pending,
    Running,
    Done,
    Skipped,
    Failed,
}

impl PhaseStatus {
    pub fn is_settled(self) -> bool {
        matches!(self, PhaseStatus::Done | PhaseStatus::Skipped | PhaseStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// A human confirmed the user is safe.
    ConfirmedSafe,
    /// The final phase completed with nothing further to do.
    PlanExhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum IncidentState {
    Detected,
    Executing { phase: usize },
    AwaitingNextPhase { next_phase: usize },
    FaultedPhase { phase: usize },
    Resolved { resolution: Resolution },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: IncidentId,
    pub user_id: String,
    pub detected_at: DateTime<Utc>,
    pub assessment: RiskAssessment,
    pub plan: EscalationPlan,
    pub phase_status: Vec<PhaseStatus>,
    pub state: IncidentState,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    /// The app should switch to its crisis UI.
    pub crisis_mode: bool,
    /// Support content to show the user, in the order it was produced.
    pub notices: Vec<UserNotice>,
    /// Scheduled check-ins.
    pub follow_ups: Vec<DateTime<Utc>>,
}

impl Incident {
    pub fn new(
        user_id: impl Into<String>,
        detected_at: DateTime<Utc>,
        assessment: RiskAssessment,
        plan: EscalationPlan,
    ) -> Self {
        let phase_status = vec![PhaseStatus::Pending; plan.phases.len()];
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            detected_at,
            assessment,
            plan,
            phase_status,
            state: IncidentState::Detected,
            resolved: false,
            resolved_at: None,
            crisis_mode: false,
            notices: Vec::new(),
            follow_ups: Vec::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, IncidentState::Resolved { .. })
    }

    /// Move phase `index` from `Pending` to `Running`.
    ///
    /// Returns false if the incident is resolved or the phase was already
    /// claimed or skipped; the caller must then not run it.
    pub fn claim_phase(&mut self, index: usize) -> bool {
        if self.resolved {
            return false;
        }
        match self.phase_status.get_mut(index) {
            Some(status @ PhaseStatus::Pending) => {
                *status = PhaseStatus::Running;
                self.state = IncidentState::Executing { phase: index };
                true
            }
            _ => false,
        }
    }

    /// Settle a running phase. A faulted phase is recorded as `Failed` but the
    /// incident keeps going.
    ///
    /// Phases run independently, so afterwards the state points at the next
    /// phase still waiting for its timer, or at one still running.
    pub fn finish_phase(&mut self, index: usize, faulted: bool) {
        if let Some(status) = self.phase_status.get_mut(index) {
            if *status == PhaseStatus::Running {
                *status = if faulted {
                    PhaseStatus::Failed
                } else {
                    PhaseStatus::Done
                };
            }
        }
        if self.is_terminal() {
            return;
        }
        let first = |wanted: PhaseStatus| self.phase_status.iter().position(|s| *s == wanted);
        self.state = if faulted {
            IncidentState::FaultedPhase { phase: index }
        } else if let Some(next_phase) = first(PhaseStatus::Pending) {
            IncidentState::AwaitingNextPhase { next_phase }
        } else if let Some(phase) = first(PhaseStatus::Running) {
            IncidentState::Executing { phase }
        } else {
            IncidentState::Executing { phase: index }
        };
    }

    /// Mark every still-pending phase as skipped; returns their indexes.
    pub fn skip_pending(&mut self) -> Vec<usize> {
        let mut skipped = Vec::new();
        for (i, status) in self.phase_status.iter_mut().enumerate() {
            if *status == PhaseStatus::Pending {
                *status = PhaseStatus::Skipped;
                skipped.push(i);
            }
        }
        skipped
    }

    /// External "user is safe" signal. Returns true on the first call only.
    pub fn resolve(&mut self, at: DateTime<Utc>) -> bool {
        if self.resolved {
            return false;
        }
        self.resolved = true;
        self.resolved_at = Some(at);
        self.state = IncidentState::Resolved {
            resolution: Resolution::ConfirmedSafe,
        };
        true
    }

    /// Terminate after the plan ran out. No-op if already resolved.
    pub fn exhaust(&mut self, at: DateTime<Utc>) {
        if self.resolved {
            return;
        }
        self.resolved = true;
        self.resolved_at = Some(at);
        self.state = IncidentState::Resolved {
            resolution: Resolution::PlanExhausted,
        };
    }

    pub fn resolution(&self) -> Option<Resolution> {
        match self.state {
            IncidentState::Resolved { resolution } => Some(resolution),
            _ => None,
        }
    }

    pub fn apply(&mut self, effect: LocalEffect) {
        match effect {
            LocalEffect::None => {}
            LocalEffect::Notice(notice) => self.notices.push(notice),
            LocalEffect::CrisisMode(notice) => {
                self.crisis_mode = true;
                self.notices.push(notice);
            }
            LocalEffect::FollowUp(at) => self.follow_ups.push(at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::Severity;
    use crate::escalation::EscalationPlanner;

    fn incident(severity: Severity) -> Incident {
        let mut assessment = RiskAssessment::none("en");
        assessment.severity = severity;
        let plan = EscalationPlanner::default().plan_for(severity);
        Incident::new("user-1", Utc::now(), assessment, plan)
    }

    #[test]
    fn test_new_incident_all_pending() {
        let i = incident(Severity::Medium);
        assert_eq!(i.phase_status, vec![PhaseStatus::Pending; 4]);
        assert_eq!(i.state, IncidentState::Detected);
    }

    #[test]
    fn test_claim_is_exclusive() {
        let mut i = incident(Severity::Low);
        assert!(i.claim_phase(0));
        assert!(!i.claim_phase(0));
        i.finish_phase(0, false);
        assert_eq!(i.phase_status[0], PhaseStatus::Done);
        assert_eq!(i.state, IncidentState::AwaitingNextPhase { next_phase: 1 });
        assert!(!i.claim_phase(9));
    }

    #[test]
    fn test_resolve_skips_pending_exactly_once() {
        let mut i = incident(Severity::High);
        assert!(i.claim_phase(0));
        i.finish_phase(0, false);
        assert!(i.claim_phase(1));

        assert!(i.resolve(Utc::now()));
        assert!(!i.resolve(Utc::now()));
        assert_eq!(i.skip_pending(), vec![2, 3]);
        assert!(i.skip_pending().is_empty());

        // phase 1 was already running; it completes as executed
        i.finish_phase(1, false);
        assert_eq!(
            i.phase_status,
            vec![
                PhaseStatus::Done,
                PhaseStatus::Done,
                PhaseStatus::Skipped,
                PhaseStatus::Skipped
            ]
        );
        assert_eq!(i.resolution(), Some(Resolution::ConfirmedSafe));
        assert!(!i.claim_phase(2));
    }

    #[test]
    fn test_faulted_phase_is_recorded() {
        let mut i = incident(Severity::Low);
        i.claim_phase(0);
        i.finish_phase(0, true);
        assert_eq!(i.phase_status[0], PhaseStatus::Failed);
        assert_eq!(i.state, IncidentState::FaultedPhase { phase: 0 });
        assert!(i.claim_phase(1));
        i.finish_phase(1, false);
        assert_eq!(i.state, IncidentState::AwaitingNextPhase { next_phase: 2 });
    }

    #[test]
    fn test_overlapping_phases_track_running_one() {
        let mut i = incident(Severity::Low);
        assert!(i.claim_phase(0));
        assert!(i.claim_phase(1));
        assert!(i.claim_phase(2));
        i.finish_phase(2, false);
        assert_eq!(i.state, IncidentState::Executing { phase: 0 });
        i.finish_phase(0, false);
        i.finish_phase(1, false);
        assert!(i.phase_status.iter().all(|s| s.is_settled()));
    }

    #[test]
    fn test_exhaust_does_not_override_confirmation() {
        let mut i = incident(Severity::Low);
        i.resolve(Utc::now());
        i.exhaust(Utc::now());
        assert_eq!(i.resolution(), Some(Resolution::ConfirmedSafe));

        let mut j = incident(Severity::Low);
        j.exhaust(Utc::now());
        assert_eq!(j.resolution(), Some(Resolution::PlanExhausted));
        assert!(j.resolved);
    }
}
