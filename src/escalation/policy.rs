//! Static severity -> phase/action table.
//!
//! The table is configuration: operators can tune phase timings and actions in
//! `[policy]` without a redeploy. When no policy is configured the embedded
//! `default_policy.toml` is used.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ActionKind;
use crate::detect::Severity;

const DEFAULT_POLICY_TOML: &str = include_str!("default_policy.toml");

/// Latest a phase may start after detection (30 days).
pub const MAX_PHASE_DELAY_SECS: u64 = 30 * 24 * 60 * 60;
/// Furthest out a follow-up may be scheduled (90 days).
pub const MAX_FOLLOW_UP_MINS: u64 = 90 * 24 * 60;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("policy defines no phases")]
    NoPhases,
    #[error("phase '{0}' is defined more than once")]
    DuplicatePhase(String),
    #[error("phase '{phase}' starts before the phase preceding it")]
    NonMonotonicDelay { phase: String },
    #[error("unknown severity tier '{0}'")]
    UnknownSeverity(String),
    #[error("tier '{severity}' references unknown phase '{phase}'")]
    UnknownPhase { severity: String, phase: String },
    #[error("severity 'none' must not have actions")]
    NoneTierHasActions,
    #[error("action '{0}' cannot appear in a policy table")]
    ReservedAction(ActionKind),
    #[error("phase '{phase}' delay exceeds {max} seconds")]
    DelayTooLong { phase: String, max: u64 },
    #[error("follow-up after {after_mins} minutes exceeds {max} minutes")]
    FollowUpTooLong { after_mins: u64, max: u64 },
}

/// A named phase window as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseWindow {
    pub name: String,
    pub delay_secs: u64,
}

/// Raw `[policy]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub phases: Vec<PhaseWindow>,
    /// severity name -> phase name -> actions
    #[serde(default)]
    pub tiers: BTreeMap<String, BTreeMap<String, Vec<ActionKind>>>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        toml::from_str(DEFAULT_POLICY_TOML).expect("embedded default policy is valid TOML")
    }
}

/// A validated policy table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationPolicy {
    windows: Vec<PhaseWindow>,
    /// Actions per window, indexed like `windows`.
    table: BTreeMap<Severity, Vec<Vec<ActionKind>>>,
}

impl EscalationPolicy {
    pub fn builtin() -> Self {
        // The embedded table is covered by tests; failing here is a build defect.
        Self::try_from(&PolicyConfig::default()).expect("embedded default policy is valid")
    }

    pub fn windows(&self) -> &[PhaseWindow] {
        &self.windows
    }

    /// Actions per phase window for `severity`; empty when the tier is absent.
    pub fn actions_for(&self, severity: Severity) -> Option<&[Vec<ActionKind>]> {
        self.table.get(&severity).map(Vec::as_slice)
    }
}

impl TryFrom<&PolicyConfig> for EscalationPolicy {
    type Error = PolicyError;

    fn try_from(config: &PolicyConfig) -> Result<Self, Self::Error> {
        if config.phases.is_empty() {
            return Err(PolicyError::NoPhases);
        }

        let mut seen = HashSet::new();
        let mut last_delay = 0;
        for window in &config.phases {
            if !seen.insert(window.name.as_str()) {
                return Err(PolicyError::DuplicatePhase(window.name.clone()));
            }
            if window.delay_secs > MAX_PHASE_DELAY_SECS {
                return Err(PolicyError::DelayTooLong {
                    phase: window.name.clone(),
                    max: MAX_PHASE_DELAY_SECS,
                });
            }
            if window.delay_secs < last_delay {
                return Err(PolicyError::NonMonotonicDelay {
                    phase: window.name.clone(),
                });
            }
            last_delay = window.delay_secs;
        }

        let mut table = BTreeMap::new();
        for (severity_name, phases) in &config.tiers {
            let severity: Severity = severity_name
                .parse()
                .map_err(|_| PolicyError::UnknownSeverity(severity_name.clone()))?;

            let mut per_window = vec![Vec::new(); config.phases.len()];
            for (phase_name, actions) in phases {
                let index = config
                    .phases
                    .iter()
                    .position(|w| &w.name == phase_name)
                    .ok_or_else(|| PolicyError::UnknownPhase {
                        severity: severity_name.clone(),
                        phase: phase_name.clone(),
                    })?;
                for action in actions {
                    match *action {
                        ActionKind::EmergencyFallback => {
                            return Err(PolicyError::ReservedAction(*action));
                        }
                        ActionKind::ScheduleFollowUp { after_mins }
                            if after_mins > MAX_FOLLOW_UP_MINS =>
                        {
                            return Err(PolicyError::FollowUpTooLong {
                                after_mins,
                                max: MAX_FOLLOW_UP_MINS,
                            });
                        }
                        _ => {}
                    }
                }
                per_window[index] = actions.clone();
            }

            if severity == Severity::None && per_window.iter().any(|a| !a.is_empty()) {
                return Err(PolicyError::NoneTierHasActions);
            }
            table.insert(severity, per_window);
        }

        Ok(Self {
            windows: config.phases.clone(),
            table,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_policy_parses() {
        let policy = EscalationPolicy::builtin();
        let names: Vec<_> = policy.windows().iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["immediate", "urgent", "priority", "follow_up"]);
        let delays: Vec<_> = policy.windows().iter().map(|w| w.delay_secs).collect();
        assert_eq!(delays, vec![0, 30, 300, 3600]);
        assert!(policy.actions_for(Severity::None).is_none());
        assert_eq!(policy.actions_for(Severity::Critical).unwrap().len(), 4);
    }

    fn parse(toml_src: &str) -> Result<EscalationPolicy, PolicyError> {
        let config: PolicyConfig = toml::from_str(toml_src).unwrap();
        EscalationPolicy::try_from(&config)
    }

    #[test]
    fn test_rejects_unknown_phase() {
        let err = parse(
            r#"
            phases = [{ name = "now", delay_secs = 0 }]
            [tiers.low]
            later = ["provide_resources"]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, PolicyError::UnknownPhase { .. }));
    }

    #[test]
    fn test_rejects_decreasing_delays() {
        let err = parse(
            r#"
            phases = [{ name = "a", delay_secs = 60 }, { name = "b", delay_secs = 30 }]
            "#,
        )
        .unwrap_err();
        assert_eq!(err, PolicyError::NonMonotonicDelay { phase: "b".into() });
    }

    #[test]
    fn test_rejects_out_of_range_timings() {
        let err = parse(r#"phases = [{ name = "a", delay_secs = 99999999999 }]"#).unwrap_err();
        assert_eq!(
            err,
            PolicyError::DelayTooLong {
                phase: "a".into(),
                max: MAX_PHASE_DELAY_SECS
            }
        );

        let err = parse(
            r#"
            phases = [{ name = "a", delay_secs = 0 }]
            [tiers.low]
            a = [{ schedule_follow_up = { after_mins = 9999999999 } }]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, PolicyError::FollowUpTooLong { after_mins: 9999999999, .. }));

        // the limits themselves are accepted
        parse(&format!(
            "phases = [{{ name = \"a\", delay_secs = {MAX_PHASE_DELAY_SECS} }}]\n\
             [tiers.low]\n\
             a = [{{ schedule_follow_up = {{ after_mins = {MAX_FOLLOW_UP_MINS} }} }}]\n"
        ))
        .unwrap();
    }

    #[test]
    fn test_rejects_duplicate_phase_and_bad_severity() {
        let err = parse(
            r#"phases = [{ name = "a", delay_secs = 0 }, { name = "a", delay_secs = 5 }]"#,
        )
        .unwrap_err();
        assert_eq!(err, PolicyError::DuplicatePhase("a".into()));

        let err = parse(
            r#"
            phases = [{ name = "a", delay_secs = 0 }]
            [tiers.severe]
            a = ["crisis_mode"]
            "#,
        )
        .unwrap_err();
        assert_eq!(err, PolicyError::UnknownSeverity("severe".into()));
    }

    #[test]
    fn test_rejects_actions_for_none_and_reserved_actions() {
        let err = parse(
            r#"
            phases = [{ name = "a", delay_secs = 0 }]
            [tiers.none]
            a = ["crisis_mode"]
            "#,
        )
        .unwrap_err();
        assert_eq!(err, PolicyError::NoneTierHasActions);

        let err = parse(
            r#"
            phases = [{ name = "a", delay_secs = 0 }]
            [tiers.low]
            a = ["emergency_fallback"]
            "#,
        )
        .unwrap_err();
        assert_eq!(err, PolicyError::ReservedAction(ActionKind::EmergencyFallback));
    }
}
