//! Risk detection: severity levels, concern tags, and the text scorer.

pub mod lexicon;
pub mod scorer;

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use self::scorer::RiskScorer;

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("input too large: {len} characters exceeds limit of {limit}")]
    InputTooLarge { len: usize, limit: usize },
}

/// Ordinal risk level assigned to a piece of text.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::None,
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    /// One level up, saturating at `Critical`.
    pub fn step_up(self) -> Self {
        match self {
            Severity::None => Severity::Low,
            Severity::Low => Severity::Medium,
            Severity::Medium => Severity::High,
            Severity::High | Severity::Critical => Severity::Critical,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::None => "none",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Map a confidence score onto the fixed severity thresholds.
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.9 {
            Severity::Critical
        } else if confidence >= 0.7 {
            Severity::High
        } else if confidence >= 0.5 {
            Severity::Medium
        } else if confidence >= 0.3 {
            Severity::Low
        } else {
            Severity::None
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Severity::None),
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("unknown severity '{}'", other)),
        }
    }
}

/// Categorical label of a detected risk pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Concern {
    SuicidalIdeation,
    SelfHarm,
    SubstanceAbuse,
    Hopelessness,
    Isolation,
    /// A stated plan, means, or time frame.
    ImminentDanger,
}

impl Concern {
    pub const ALL: [Concern; 6] = [
        Concern::SuicidalIdeation,
        Concern::SelfHarm,
        Concern::SubstanceAbuse,
        Concern::Hopelessness,
        Concern::Isolation,
        Concern::ImminentDanger,
    ];
}

/// Crisis history supplied by the calling application. Read-only input.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UserRiskContext {
    pub previous_crises: u32,
    /// `None` when the user has never had a recorded crisis.
    pub days_since_last_crisis: Option<u32>,
    pub current_streak_days: u32,
    pub entries_last_7_days: u32,
}

/// Result of scoring one journal entry.
///
/// `matched_terms` is kept for in-process audit only and is never serialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub severity: Severity,
    pub confidence: f64,
    pub matched_concerns: BTreeSet<Concern>,
    #[serde(skip)]
    pub matched_terms: Vec<String>,
    pub requires_immediate_intervention: bool,
    pub requires_human_contact: bool,
    pub emergency_services_required: bool,
    /// Lexicon language actually used.
    pub language: String,
    /// True when the requested language had no lexicon and English was used.
    pub language_fallback: bool,
    /// True when scoring failed and the result was degraded to `None`.
    pub degraded: bool,
}

impl RiskAssessment {
    /// An assessment with no risk detected.
    pub fn none(language: impl Into<String>) -> Self {
        Self {
            severity: Severity::None,
            confidence: 0.0,
            matched_concerns: BTreeSet::new(),
            matched_terms: Vec::new(),
            requires_immediate_intervention: false,
            requires_human_contact: false,
            emergency_services_required: false,
            language: language.into(),
            language_fallback: false,
            degraded: false,
        }
    }

    pub fn has_concern(&self, concern: Concern) -> bool {
        self.matched_concerns.contains(&concern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::None < Severity::Low);
        assert!(Severity::High < Severity::Critical);
        assert_eq!(Severity::Critical.step_up(), Severity::Critical);
        assert_eq!(Severity::Low.step_up(), Severity::Medium);
    }

    #[test]
    fn test_confidence_thresholds() {
        assert_eq!(Severity::from_confidence(0.0), Severity::None);
        assert_eq!(Severity::from_confidence(0.29), Severity::None);
        assert_eq!(Severity::from_confidence(0.3), Severity::Low);
        assert_eq!(Severity::from_confidence(0.5), Severity::Medium);
        assert_eq!(Severity::from_confidence(0.7), Severity::High);
        assert_eq!(Severity::from_confidence(0.9), Severity::Critical);
        assert_eq!(Severity::from_confidence(1.0), Severity::Critical);
    }

    #[test]
    fn test_severity_parse() {
        assert_eq!("HIGH".parse::<Severity>().unwrap(), Severity::High);
        assert!("urgent".parse::<Severity>().is_err());
    }

    #[test]
    fn test_matched_terms_not_serialized() {
        let mut a = RiskAssessment::none("en");
        a.matched_terms.push("secret phrase".to_string());
        let json = serde_json::to_string(&a).unwrap();
        assert!(!json.contains("secret phrase"));
        assert!(!json.contains("matched_terms"));
    }
}
