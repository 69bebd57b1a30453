//! Support content shown to users: hotline numbers, emergency numbers,
//! grounding exercises and offline coping tips.
//!
//! Operators override or extend the catalog under `[resources.<lang>]`; any
//! language not configured falls back to the built-in copy.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Hotline used when no resource bundle can be produced at all.
pub const FALLBACK_HOTLINE_NUMBER: &str = "988";
/// Emergency number used when no resource bundle can be produced at all.
pub const FALLBACK_EMERGENCY_NUMBER: &str = "911";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResourceError {
    #[error("no resource bundle for language '{0}' and no default")]
    Missing(String),
}

/// Localized support content for one language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceBundle {
    pub hotline_name: String,
    pub hotline_number: String,
    #[serde(default)]
    pub text_line: Option<String>,
    pub emergency_number: String,
    pub support_message: String,
    pub grounding_exercise: String,
    #[serde(default)]
    pub offline_tips: Vec<String>,
}

impl ResourceBundle {
    /// Minimal bundle built from compiled-in constants only.
    pub fn emergency_fallback() -> Self {
        Self {
            hotline_name: "Crisis Lifeline".to_string(),
            hotline_number: FALLBACK_HOTLINE_NUMBER.to_string(),
            text_line: None,
            emergency_number: FALLBACK_EMERGENCY_NUMBER.to_string(),
            support_message: "You are not alone. Help is available right now.".to_string(),
            grounding_exercise: String::new(),
            offline_tips: Vec::new(),
        }
    }
}

/// Source of localized support content.
pub trait ResourceProvider: Send + Sync {
    fn bundle(&self, language: &str) -> Result<ResourceBundle, ResourceError>;
}

/// In-memory catalog keyed by primary language subtag.
#[derive(Debug, Clone)]
pub struct StaticResources {
    bundles: BTreeMap<String, ResourceBundle>,
    default_language: String,
}

impl StaticResources {
    pub fn new(
        bundles: BTreeMap<String, ResourceBundle>,
        default_language: impl Into<String>,
    ) -> Self {
        Self {
            bundles,
            default_language: default_language.into(),
        }
    }

    /// Built-in catalog with `overrides` layered on top.
    pub fn with_overrides(
        overrides: &BTreeMap<String, ResourceBundle>,
        default_language: impl Into<String>,
    ) -> Self {
        let mut bundles = builtin_bundles();
        for (lang, bundle) in overrides {
            bundles.insert(lang.to_ascii_lowercase(), bundle.clone());
        }
        Self::new(bundles, default_language)
    }

    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.bundles.keys().map(String::as_str)
    }
}

impl Default for StaticResources {
    fn default() -> Self {
        Self::new(builtin_bundles(), "en")
    }
}

impl ResourceProvider for StaticResources {
    fn bundle(&self, language: &str) -> Result<ResourceBundle, ResourceError> {
        let lang = language.to_ascii_lowercase();
        self.bundles
            .get(&lang)
            .or_else(|| self.bundles.get(&self.default_language))
            .cloned()
            .ok_or(ResourceError::Missing(lang))
    }
}

fn builtin_bundles() -> BTreeMap<String, ResourceBundle> {
    let mut bundles = BTreeMap::new();
    bundles.insert(
        "en".to_string(),
        ResourceBundle {
            hotline_name: "988 Suicide & Crisis Lifeline".to_string(),
            hotline_number: "988".to_string(),
            text_line: Some("Text HOME to 741741".to_string()),
            emergency_number: "911".to_string(),
            support_message: "It sounds like things are really hard right now. You don't have to go through this alone.".to_string(),
            grounding_exercise: "Name 5 things you can see, 4 you can touch, 3 you can hear, 2 you can smell and 1 you can taste.".to_string(),
            offline_tips: vec![
                "Breathe in for 4 seconds, hold for 4, out for 6.".to_string(),
                "Move somewhere you feel safe and reach out to someone you trust.".to_string(),
            ],
        },
    );
    bundles.insert(
        "es".to_string(),
        ResourceBundle {
            hotline_name: "Línea 988 de Prevención del Suicidio y Crisis".to_string(),
            hotline_number: "988".to_string(),
            text_line: Some("Envía AYUDA al 741741".to_string()),
            emergency_number: "911".to_string(),
            support_message: "Parece que las cosas están muy difíciles ahora. No tienes que pasar por esto solo.".to_string(),
            grounding_exercise: "Nombra 5 cosas que ves, 4 que puedes tocar, 3 que oyes, 2 que hueles y 1 que saboreas.".to_string(),
            offline_tips: vec![
                "Inhala durante 4 segundos, mantén 4, exhala durante 6.".to_string(),
                "Ve a un lugar seguro y contacta a alguien de confianza.".to_string(),
            ],
        },
    );
    bundles.insert(
        "fr".to_string(),
        ResourceBundle {
            hotline_name: "Numéro national de prévention du suicide".to_string(),
            hotline_number: "3114".to_string(),
            text_line: None,
            emergency_number: "112".to_string(),
            support_message: "On dirait que les choses sont très difficiles en ce moment. Tu n'as pas à traverser cela seul.".to_string(),
            grounding_exercise: "Nomme 5 choses que tu vois, 4 que tu peux toucher, 3 que tu entends, 2 que tu sens et 1 que tu goûtes.".to_string(),
            offline_tips: vec![
                "Inspire pendant 4 secondes, retiens 4, expire pendant 6.".to_string(),
                "Va dans un endroit sûr et contacte une personne de confiance.".to_string(),
            ],
        },
    );
    bundles
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_languages() {
        let res = StaticResources::default();
        let langs: Vec<_> = res.languages().collect();
        assert_eq!(langs, vec!["en", "es", "fr"]);
        assert_eq!(res.bundle("fr").unwrap().emergency_number, "112");
        assert_eq!(res.bundle("ES").unwrap().hotline_number, "988");
    }

    #[test]
    fn test_unknown_language_uses_default() {
        let res = StaticResources::default();
        assert_eq!(res.bundle("de").unwrap(), res.bundle("en").unwrap());
    }

    #[test]
    fn test_overrides_replace_builtin() {
        let mut overrides = BTreeMap::new();
        let mut custom = ResourceBundle::emergency_fallback();
        custom.hotline_number = "13 11 14".to_string();
        overrides.insert("EN".to_string(), custom);
        let res = StaticResources::with_overrides(&overrides, "en");
        assert_eq!(res.bundle("en").unwrap().hotline_number, "13 11 14");
        assert_eq!(res.bundle("es").unwrap().hotline_number, "988");
    }

    #[test]
    fn test_missing_default_is_an_error() {
        let res = StaticResources::new(BTreeMap::new(), "en");
        assert_eq!(res.bundle("en"), Err(ResourceError::Missing("en".into())));
    }
}
