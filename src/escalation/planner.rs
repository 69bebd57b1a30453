use crate::detect::{RiskAssessment, Severity};

use super::{ActionKind, EscalationPlan, EscalationPolicy, Phase};

/// Pure severity -> plan lookup against a validated policy table.
#[derive(Debug, Clone)]
pub struct EscalationPlanner {
    policy: EscalationPolicy,
}

impl EscalationPlanner {
    pub fn new(policy: EscalationPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &EscalationPolicy {
        &self.policy
    }

    /// Plan for a severity. Phases with no actions are omitted; `None` and any
    /// tier missing from the table yield an empty plan.
    pub fn plan_for(&self, severity: Severity) -> EscalationPlan {
        let Some(per_window) = self.policy.actions_for(severity) else {
            return EscalationPlan::empty(severity);
        };

        let phases = self
            .policy
            .windows()
            .iter()
            .zip(per_window)
            .filter(|(_, actions)| !actions.is_empty())
            .map(|(window, actions)| Phase {
                name: window.name.clone(),
                delay_secs: window.delay_secs,
                actions: actions.clone(),
            })
            .collect();

        EscalationPlan { severity, phases }
    }

    /// Plan for a full assessment.
    ///
    /// Same as [`plan_for`](Self::plan_for), but when the assessment requires
    /// emergency services and the table does not already contact them in the
    /// first phase, `ContactEmergencyServices` is added there.
    pub fn plan_for_assessment(&self, assessment: &RiskAssessment) -> EscalationPlan {
        let mut plan = self.plan_for(assessment.severity);
        if !assessment.emergency_services_required {
            return plan;
        }

        match plan.phases.first_mut() {
            Some(first) if first.delay_secs == 0 => {
                if !first.actions.contains(&ActionKind::ContactEmergencyServices) {
                    first.actions.push(ActionKind::ContactEmergencyServices);
                }
            }
            _ => {
                let name = self
                    .policy
                    .windows()
                    .first()
                    .map(|w| w.name.clone())
                    .unwrap_or_else(|| "immediate".to_string());
                plan.phases.insert(
                    0,
                    Phase {
                        name,
                        delay_secs: 0,
                        actions: vec![ActionKind::ContactEmergencyServices],
                    },
                );
            }
        }
        plan
    }
}

impl Default for EscalationPlanner {
    fn default() -> Self {
        Self::new(EscalationPolicy::builtin())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::Concern;

    fn planner() -> EscalationPlanner {
        EscalationPlanner::default()
    }

    #[test]
    fn test_none_is_empty() {
        assert!(planner().plan_for(Severity::None).is_empty());
    }

    #[test]
    fn test_plan_is_deterministic() {
        let p = planner();
        for severity in Severity::ALL {
            let a = serde_json::to_vec(&p.plan_for(severity)).unwrap();
            let b = serde_json::to_vec(&p.plan_for(severity)).unwrap();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_low_plan() {
        let plan = planner().plan_for(Severity::Low);
        assert_eq!(plan.phases.len(), 3);
        assert_eq!(plan.phases[0].actions, vec![ActionKind::LocalSupportMessage]);
        assert_eq!(plan.phases[1].delay_secs, 30);
        assert_eq!(
            plan.phases[2].actions,
            vec![ActionKind::ScheduleFollowUp { after_mins: 1440 }]
        );
        assert!(!plan.has_human_contact_in(0));
    }

    #[test]
    fn test_critical_plan() {
        let plan = planner().plan_for(Severity::Critical);
        assert_eq!(plan.phases.len(), 4);
        assert!(plan.phases[0]
            .actions
            .contains(&ActionKind::ContactEmergencyServices));
        assert_eq!(
            plan.phases[2].actions,
            vec![
                ActionKind::ConsiderFamilyNotification,
                ActionKind::ActivateOfflineResources
            ]
        );
        assert_eq!(plan.phases[3].delay_secs, 3600);
        assert_eq!(
            plan.phases[3].actions,
            vec![ActionKind::ScheduleFollowUp { after_mins: 30 }]
        );
    }

    #[test]
    fn test_medium_and_high_follow_up_intervals() {
        let medium = planner().plan_for(Severity::Medium);
        assert_eq!(
            medium.phases[3].actions,
            vec![ActionKind::ScheduleFollowUp { after_mins: 240 }]
        );
        let high = planner().plan_for(Severity::High);
        assert!(high.phases[1].actions.contains(&ActionKind::AlertCounselor));
        assert_eq!(
            high.phases[2].actions,
            vec![ActionKind::ScheduleFollowUp { after_mins: 60 }]
        );
    }

    #[test]
    fn test_emergency_override_adds_contact_to_first_phase() {
        let mut assessment = RiskAssessment::none("en");
        assessment.severity = Severity::Low;
        assessment.confidence = 0.4;
        assessment.matched_concerns.insert(Concern::SelfHarm);
        assessment.matched_concerns.insert(Concern::ImminentDanger);
        assessment.emergency_services_required = true;

        let plan = planner().plan_for_assessment(&assessment);
        assert_eq!(plan.phases[0].delay_secs, 0);
        assert!(plan.phases[0]
            .actions
            .contains(&ActionKind::ContactEmergencyServices));
        assert!(plan.phases[0].actions.contains(&ActionKind::LocalSupportMessage));
    }

    #[test]
    fn test_emergency_override_does_not_duplicate() {
        let mut assessment = RiskAssessment::none("en");
        assessment.severity = Severity::Critical;
        assessment.emergency_services_required = true;
        let plan = planner().plan_for_assessment(&assessment);
        let count = plan.phases[0]
            .actions
            .iter()
            .filter(|a| **a == ActionKind::ContactEmergencyServices)
            .count();
        assert_eq!(count, 1);
    }
}
