use std::collections::{BTreeSet, HashMap};

use tracing::{debug, warn};

use crate::config::ScorerConfig;
use crate::detect::lexicon::{self, Lexicon};
use crate::detect::{Concern, DetectError, RiskAssessment, Severity, UserRiskContext};

/// Heuristic keyword/phrase classifier for journal text.
///
/// Pure CPU work: no I/O, no shared mutable state. Safe to share behind an
/// `Arc` and call from any task.
pub struct RiskScorer {
    lexicons: HashMap<&'static str, Lexicon>,
    default_language: &'static str,
    recent_crisis_window_days: u32,
    max_input_chars: usize,
}

impl RiskScorer {
    pub fn new(config: &ScorerConfig) -> Self {
        let lexicons: HashMap<&'static str, Lexicon> = lexicon::SUPPORTED_LANGUAGES
            .iter()
            .filter_map(|lang| Lexicon::builtin(lang).map(|lex| (lex.language, lex)))
            .collect();

        let default_language = lexicons
            .get_key_value(primary_subtag(&config.default_language).as_str())
            .map(|(k, _)| *k)
            .unwrap_or("en");

        Self {
            lexicons,
            default_language,
            recent_crisis_window_days: config.recent_crisis_window_days,
            max_input_chars: config.max_input_chars,
        }
    }

    /// Score `text`, degrading any detection fault to a `None` assessment.
    ///
    /// A failed detection must not block the user's journal submission.
    pub fn score(&self, text: &str, language: &str, context: &UserRiskContext) -> RiskAssessment {
        match self.try_score(text, language, context) {
            Ok(assessment) => assessment,
            Err(e) => {
                warn!(error = %e, "risk detection fault, degrading to severity none");
                let mut assessment = RiskAssessment::none(self.default_language);
                assessment.degraded = true;
                assessment
            }
        }
    }

    pub fn try_score(
        &self,
        text: &str,
        language: &str,
        context: &UserRiskContext,
    ) -> Result<RiskAssessment, DetectError> {
        let len = text.chars().count();
        if len > self.max_input_chars {
            return Err(DetectError::InputTooLarge {
                len,
                limit: self.max_input_chars,
            });
        }

        let (lexicon, language_fallback) = self.lexicon_for(language);

        let normalized = lexicon::normalize(text);
        if normalized.is_empty() {
            let mut assessment = RiskAssessment::none(lexicon.language);
            assessment.language_fallback = language_fallback;
            return Ok(assessment);
        }
        let padded = format!(" {} ", normalized);

        let (total_weight, matched_terms) = lexicon.tier_matches(&padded);
        let mut confidence = (total_weight / 2.0).min(1.0);
        let base = Severity::from_confidence(confidence);
        let mut severity = escalate_for_history(base, context, self.recent_crisis_window_days);

        let mut concerns: BTreeSet<Concern> =
            lexicon.concern_matches(&padded).into_iter().collect();

        // Suicidal ideation always requires immediate intervention, which in
        // turn requires at least High.
        if concerns.contains(&Concern::SuicidalIdeation) {
            severity = severity.max(Severity::High);
        }

        let mut matched_terms = matched_terms;
        if severity == Severity::None {
            concerns.clear();
            matched_terms.clear();
            confidence = 0.0;
        }

        let suicidal = concerns.contains(&Concern::SuicidalIdeation);
        let self_harm = concerns.contains(&Concern::SelfHarm);
        let imminent = concerns.contains(&Concern::ImminentDanger);

        let assessment = RiskAssessment {
            severity,
            confidence,
            requires_immediate_intervention: severity == Severity::Critical || suicidal,
            requires_human_contact: severity >= Severity::High || suicidal || self_harm,
            emergency_services_required: severity == Severity::Critical || (self_harm && imminent),
            matched_concerns: concerns,
            matched_terms,
            language: lexicon.language.to_string(),
            language_fallback,
            degraded: false,
        };

        debug!(
            severity = %assessment.severity,
            base_severity = %base,
            confidence = assessment.confidence,
            concerns = assessment.matched_concerns.len(),
            language = %assessment.language,
            fallback = language_fallback,
            text_len = len,
            "text scored"
        );

        Ok(assessment)
    }

    fn lexicon_for(&self, language: &str) -> (&Lexicon, bool) {
        let tag = primary_subtag(language);
        match self.lexicons.get(tag.as_str()) {
            Some(lex) => (lex, false),
            None => (&self.lexicons[self.default_language], true),
        }
    }
}

/// Apply crisis-history escalation to a base severity.
///
/// A prior crisis lifts Low and Medium by one step (never past High). A crisis
/// within the recent window adds one more step, capped at Critical. Both rules
/// compose additively and only ever raise the level; `None` is never lifted.
pub fn escalate_for_history(
    base: Severity,
    context: &UserRiskContext,
    recent_window_days: u32,
) -> Severity {
    if base == Severity::None {
        return base;
    }

    let mut severity = base;
    if context.previous_crises > 0 && matches!(severity, Severity::Low | Severity::Medium) {
        severity = severity.step_up();
    }
    if context
        .days_since_last_crisis
        .is_some_and(|days| days < recent_window_days)
    {
        severity = severity.step_up();
    }
    severity
}

/// `en-US` / `en_gb` / `EN` -> `en`.
pub fn primary_subtag(language: &str) -> String {
    language
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}
