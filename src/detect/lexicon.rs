//! Built-in phrase lists, one lexicon per supported language.
//!
//! Each lexicon has four severity tiers (weights 1.0 / 0.8 / 0.6 / 0.4) and an
//! independent set of phrases per concern tag. Phrases are stored already
//! normalized and padded with single spaces so matching is a plain substring
//! search on word boundaries.

use super::Concern;

/// Weights of the Critical, High, Medium and Low tiers.
pub const TIER_WEIGHTS: [f64; 4] = [1.0, 0.8, 0.6, 0.4];

pub const SUPPORTED_LANGUAGES: [&str; 3] = ["en", "es", "fr"];

struct RawLexicon {
    tiers: [&'static [&'static str]; 4],
    concerns: &'static [(Concern, &'static [&'static str])],
}

// ---------------------------------------------------------------------------
// English
// ---------------------------------------------------------------------------

static EN: RawLexicon = RawLexicon {
    tiers: [
        &[
            "kill myself",
            "end my life",
            "take my own life",
            "i have a plan",
            "suicide plan",
            "want to die tonight",
            "going to end it",
            "hang myself",
            "overdose tonight",
            "goodbye forever",
            "wrote a suicide note",
        ],
        &[
            "want to die",
            "suicidal",
            "suicide",
            "better off dead",
            "wish i was dead",
            "no reason to live",
            "end it all",
            "cut myself",
            "hurt myself",
            "harm myself",
            "self harm",
            "burn myself",
        ],
        &[
            "feeling down",
            "hopeless",
            "worthless",
            "cant go on",
            "cant cope",
            "nobody cares",
            "no one cares",
            "hate myself",
            "empty inside",
            "all alone",
            "give up",
            "drinking too much",
            "trapped",
        ],
        &[
            "feeling sad",
            "tired",
            "lonely",
            "stressed",
            "anxious",
            "exhausted",
            "overwhelmed",
            "cant sleep",
            "crying",
            "miserable",
        ],
    ],
    concerns: &[
        (
            Concern::SuicidalIdeation,
            &[
                "kill myself",
                "end my life",
                "take my own life",
                "suicide",
                "suicidal",
                "want to die",
                "better off dead",
                "wish i was dead",
                "no reason to live",
                "end it all",
                "going to end it",
                "hang myself",
            ],
        ),
        (
            Concern::SelfHarm,
            &[
                "cut myself",
                "cutting myself",
                "hurt myself",
                "harm myself",
                "self harm",
                "burn myself",
            ],
        ),
        (
            Concern::SubstanceAbuse,
            &[
                "drinking too much",
                "drunk again",
                "overdose",
                "relapsed",
                "high again",
                "pills",
            ],
        ),
        (
            Concern::Hopelessness,
            &[
                "hopeless",
                "no hope",
                "no point",
                "give up",
                "worthless",
                "cant go on",
            ],
        ),
        (
            Concern::Isolation,
            &["all alone", "nobody cares", "no one cares", "lonely", "no friends"],
        ),
        (
            Concern::ImminentDanger,
            &[
                "tonight",
                "i have a plan",
                "right now",
                "goodbye forever",
                "pills ready",
                "wrote a suicide note",
            ],
        ),
    ],
};

// ---------------------------------------------------------------------------
// Spanish
// ---------------------------------------------------------------------------

static ES: RawLexicon = RawLexicon {
    tiers: [
        &[
            "matarme",
            "quitarme la vida",
            "suicidarme",
            "acabar con mi vida",
            "tengo un plan",
            "esta noche me mato",
        ],
        &[
            "quiero morir",
            "suicidio",
            "mejor muerto",
            "mejor muerta",
            "no quiero vivir",
            "hacerme daño",
            "cortarme",
        ],
        &[
            "sin esperanza",
            "no valgo nada",
            "nadie me quiere",
            "no puedo más",
            "me siento vacío",
            "me siento vacía",
            "bebiendo demasiado",
        ],
        &[
            "triste",
            "cansado",
            "cansada",
            "agotado",
            "agotada",
            "estresado",
            "estresada",
            "ansioso",
            "ansiosa",
        ],
    ],
    concerns: &[
        (
            Concern::SuicidalIdeation,
            &[
                "matarme",
                "quitarme la vida",
                "suicidarme",
                "acabar con mi vida",
                "quiero morir",
                "suicidio",
                "no quiero vivir",
            ],
        ),
        (Concern::SelfHarm, &["hacerme daño", "cortarme", "lastimarme"]),
        (
            Concern::SubstanceAbuse,
            &["bebiendo demasiado", "sobredosis", "recaí", "pastillas"],
        ),
        (
            Concern::Hopelessness,
            &["sin esperanza", "no valgo nada", "no puedo más"],
        ),
        (Concern::Isolation, &["nadie me quiere", "estoy solo", "estoy sola"]),
        (Concern::ImminentDanger, &["esta noche", "tengo un plan", "ahora mismo"]),
    ],
};

// ---------------------------------------------------------------------------
// French
// ---------------------------------------------------------------------------

static FR: RawLexicon = RawLexicon {
    tiers: [
        &[
            "me tuer",
            "me suicider",
            "mettre fin à mes jours",
            "jai un plan",
            "en finir ce soir",
        ],
        &[
            "je veux mourir",
            "envie de mourir",
            "suicide",
            "plus envie de vivre",
            "me faire du mal",
            "me couper",
        ],
        &[
            "sans espoir",
            "désespéré",
            "désespérée",
            "je ne vaux rien",
            "plus la force",
            "je bois trop",
        ],
        &[
            "triste",
            "fatigué",
            "fatiguée",
            "épuisé",
            "épuisée",
            "stressé",
            "stressée",
            "angoissé",
            "angoissée",
        ],
    ],
    concerns: &[
        (
            Concern::SuicidalIdeation,
            &[
                "me tuer",
                "me suicider",
                "mettre fin à mes jours",
                "je veux mourir",
                "envie de mourir",
                "suicide",
                "plus envie de vivre",
            ],
        ),
        (Concern::SelfHarm, &["me faire du mal", "me couper", "me blesser"]),
        (Concern::SubstanceAbuse, &["je bois trop", "surdose", "rechute"]),
        (
            Concern::Hopelessness,
            &["sans espoir", "désespéré", "désespérée", "je ne vaux rien"],
        ),
        (Concern::Isolation, &["tout seul", "toute seule", "personne ne comprend"]),
        (Concern::ImminentDanger, &["ce soir", "jai un plan", "maintenant"]),
    ],
};

// ---------------------------------------------------------------------------
// Compiled lexicon
// ---------------------------------------------------------------------------

/// A lexicon with every phrase normalized and space-padded.
#[derive(Debug, Clone)]
pub struct Lexicon {
    pub language: &'static str,
    tiers: [Vec<String>; 4],
    concerns: Vec<(Concern, Vec<String>)>,
}

impl Lexicon {
    /// Return the built-in lexicon for a primary language subtag.
    pub fn builtin(language: &str) -> Option<Self> {
        let (language, raw) = match language {
            "en" => ("en", &EN),
            "es" => ("es", &ES),
            "fr" => ("fr", &FR),
            _ => return None,
        };
        Some(Self::compile(language, raw))
    }

    fn compile(language: &'static str, raw: &RawLexicon) -> Self {
        let tiers: [Vec<String>; 4] =
            raw.tiers.map(|phrases| phrases.iter().map(|p| pad(p)).collect());
        let concerns = raw
            .concerns
            .iter()
            .map(|(concern, phrases)| (*concern, phrases.iter().map(|p| pad(p)).collect()))
            .collect();
        Self {
            language,
            tiers,
            concerns,
        }
    }

    /// Sum tier weights of every phrase present in `padded_text`.
    ///
    /// Each phrase counts at most once. Returns the total weight and the
    /// phrases that matched.
    pub fn tier_matches(&self, padded_text: &str) -> (f64, Vec<String>) {
        let mut total = 0.0;
        let mut terms = Vec::new();
        for (phrases, weight) in self.tiers.iter().zip(TIER_WEIGHTS) {
            for phrase in phrases {
                if padded_text.contains(phrase.as_str()) {
                    total += weight;
                    terms.push(phrase.trim().to_string());
                }
            }
        }
        (total, terms)
    }

    /// Concern tags whose phrase set has at least one hit.
    pub fn concern_matches(&self, padded_text: &str) -> Vec<Concern> {
        self.concerns
            .iter()
            .filter(|(_, phrases)| phrases.iter().any(|p| padded_text.contains(p.as_str())))
            .map(|(concern, _)| *concern)
            .collect()
    }
}

/// Lowercase, drop apostrophes, turn other punctuation into spaces and collapse
/// runs of whitespace.
pub fn normalize(text: &str) -> String {
    let mut cleaned = String::with_capacity(text.len());
    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            cleaned.push(c);
        } else if c == '\'' || c == '\u{2019}' {
            continue;
        } else {
            cleaned.push(' ');
        }
    }
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Wrap normalized text in single spaces for boundary-safe matching.
pub fn pad(text: &str) -> String {
    format!(" {} ", normalize(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  I'm SO   tired!!  "), "im so tired");
        assert_eq!(normalize("self-harm, again."), "self harm again");
        assert_eq!(normalize("¿Estoy CANSADA?"), "estoy cansada");
        assert_eq!(normalize("J’ai un plan"), "jai un plan");
        assert_eq!(normalize("...!!!"), "");
    }

    #[test]
    fn test_word_boundaries() {
        let lex = Lexicon::builtin("en").unwrap();
        let (weight, _) = lex.tier_matches(&pad("I retired last year"));
        assert_eq!(weight, 0.0);
        let (weight, terms) = lex.tier_matches(&pad("so tired"));
        assert!((weight - 0.4).abs() < 1e-9);
        assert_eq!(terms, vec!["tired".to_string()]);
    }

    #[test]
    fn test_all_builtin_languages_compile() {
        for lang in SUPPORTED_LANGUAGES {
            let lex = Lexicon::builtin(lang).unwrap();
            assert_eq!(lex.language, lang);
            assert!(lex.tiers.iter().all(|t| !t.is_empty()));
        }
        assert!(Lexicon::builtin("de").is_none());
    }

    #[test]
    fn test_concern_matcher_is_independent_of_tiers() {
        let lex = Lexicon::builtin("en").unwrap();
        let concerns = lex.concern_matches(&pad("I relapsed and I'm all alone"));
        assert!(concerns.contains(&Concern::SubstanceAbuse));
        assert!(concerns.contains(&Concern::Isolation));
        assert!(!concerns.contains(&Concern::SuicidalIdeation));
    }
}
