//! Keyword classifier.
//!
//! One trigger table maps each capability to its trigger patterns, a score
//! divisor and optional veto patterns. [`QueryClassifier::classify`] scores
//! every capability and walks [`PRIORITY_ORDER`] to pick a winner.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use wayfinder_core::Capability;

/// Selection order. The first capability with a non-zero score wins.
pub const PRIORITY_ORDER: [Capability; 7] = [
    Capability::Search,
    Capability::Directions,
    Capability::Geocode,
    Capability::ReverseGeocode,
    Capability::Matrix,
    Capability::StaticMap,
    Capability::General,
];

// =============================================================================
// Trigger table
// =============================================================================

struct Trigger {
    name: &'static str,
    pattern: Regex,
}

struct CapabilityRule {
    capability: Capability,
    triggers: Vec<Trigger>,
    /// Any match zeroes the capability's score.
    vetoes: Vec<Regex>,
    /// Matched-trigger count at which confidence reaches 1.0.
    divisor: f32,
}

static RULES: LazyLock<Vec<CapabilityRule>> = LazyLock::new(|| {
    let triggers = |pats: &[(&'static str, &str)]| -> Vec<Trigger> {
        pats.iter()
            .map(|(name, p)| Trigger {
                name,
                pattern: Regex::new(&format!("(?i){p}")).expect("Invalid trigger regex"),
            })
            .collect()
    };
    let vetoes = |pats: &[&str]| -> Vec<Regex> {
        pats.iter()
            .map(|p| Regex::new(&format!("(?i){p}")).expect("Invalid veto regex"))
            .collect()
    };

    vec![
        CapabilityRule {
            capability: Capability::Search,
            triggers: triggers(&[
                ("find", r"\bfind\b"),
                ("search", r"\bsearch\b"),
                ("look for", r"\blook(?:ing)?\s+for\b"),
                ("where is", r"\bwhere\s+is\s+(?:a|an|the\s+nearest|the\s+closest)\b"),
                ("near me", r"\bnear\s+me\b"),
                ("nearby", r"\bnearby\b"),
                ("nearest", r"\b(?:nearest|closest)\b"),
                ("restaurant", r"\brestaurants?\b"),
                ("hotel", r"\bhotels?\b"),
                ("coffee", r"\b(?:coffee|cafes?)\b"),
                ("gas station", r"\bgas\s+stations?\b"),
                ("shopping", r"\bshopping\b"),
                ("hospital", r"\bhospitals?\b"),
                ("pharmacy", r"\bpharmac(?:y|ies)\b"),
                ("bank", r"\b(?:banks?|atms?)\b"),
                ("parking", r"\bparking\b"),
            ]),
            vetoes: vetoes(&[
                r"\bcoordinates\b",
                r"\bdirections?\b",
                r"\broute\b",
                r"\baddress\s+(?:for|of|at)\b",
                r"\bmap\s+(?:of|for|around|image)\b",
                r"\btravel\s+times?\b",
                r"\bmatrix\b",
            ]),
            divisor: 2.0,
        },
        CapabilityRule {
            capability: Capability::Directions,
            triggers: triggers(&[
                ("directions", r"\bdirections?\b"),
                ("route", r"\broute\b"),
                ("how to get", r"\bhow\s+(?:do\s+i\s+|can\s+i\s+|to\s+)get\s+(?:to|from)\b"),
                ("navigate", r"\bnavigate\b"),
                ("drive to", r"\bdrive\s+to\b"),
                ("walk to", r"\bwalk\s+to\b"),
                ("take me to", r"\btake\s+me\s+to\b"),
                ("from/to", r"\bfrom\s+\S.*\s+to\s+\S"),
            ]),
            vetoes: vetoes(&[
                r"\bmatrix\b",
                r"\btravel\s+times\b",
                r"\b(?:distances|times)\s+between\b",
                r"\bmap\s+(?:of|for|image)\b",
            ]),
            divisor: 2.0,
        },
        CapabilityRule {
            capability: Capability::Geocode,
            triggers: triggers(&[
                ("coordinates", r"\bcoordinates\b"),
                ("geocode", r"\bgeocode\b"),
                ("latitude", r"\b(?:latitude|longitude)\b"),
                ("lat long", r"\blat(?:/|\s+and\s+|\s*,\s*|\s+)(?:long|lng|lon)\b"),
                ("located", r"\bwhere\s+is\s+.+\blocated\b"),
            ]),
            vetoes: vetoes(&[r"\breverse\b"]),
            divisor: 1.0,
        },
        CapabilityRule {
            capability: Capability::ReverseGeocode,
            triggers: triggers(&[
                ("address", r"\baddress\b"),
                ("reverse", r"\breverse\b"),
                ("what is at", r"\bwhat(?:'s|\s+is)\s+at\b"),
                ("what is here", r"\bwhat(?:'s|\s+is)\s+(?:here|there)\b"),
            ]),
            vetoes: vec![],
            divisor: 1.0,
        },
        CapabilityRule {
            capability: Capability::Matrix,
            triggers: triggers(&[
                ("matrix", r"\bmatrix\b"),
                ("travel times", r"\btravel\s+times\b"),
                ("distances between", r"\b(?:distances?|times?)\s+between\b"),
                ("how far", r"\bhow\s+far\b"),
            ]),
            vetoes: vec![],
            divisor: 1.0,
        },
        CapabilityRule {
            capability: Capability::StaticMap,
            triggers: triggers(&[
                ("map of", r"\bmap\s+(?:of|for|around|near)\b"),
                ("map image", r"\bmap\s+images?\b"),
                ("static map", r"\bstatic\s+map\b"),
                ("show map", r"\b(?:show|generate|draw|give)\s+(?:me\s+)?(?:a\s+|the\s+)?map\b"),
                ("map", r"\bmap\b"),
            ]),
            vetoes: vec![],
            divisor: 2.0,
        },
        CapabilityRule {
            capability: Capability::General,
            triggers: triggers(&[
                ("greeting", r"\b(?:hello|hi|hey|greetings)\b"),
                ("help", r"\b(?:help|what\s+can\s+you\s+do|capabilities)\b"),
                ("weather", r"\b(?:weather|temperature|rain|sunny|cloudy)\b"),
                ("time", r"\b(?:time|clock)\b"),
            ]),
            vetoes: vec![],
            divisor: 1.0,
        },
    ]
});

// =============================================================================
// Classification
// =============================================================================

/// Outcome of classifying one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub capability: Capability,
    /// In [0, 1]; matched triggers divided by the capability's divisor.
    pub confidence: f32,
    /// Names of the triggers that matched for the chosen capability.
    pub matched_triggers: Vec<String>,
}

impl Classification {
    fn general() -> Self {
        Self {
            capability: Capability::General,
            confidence: 0.0,
            matched_triggers: vec![],
        }
    }

    /// One-line explanation for logs.
    pub fn rationale(&self) -> String {
        if self.matched_triggers.is_empty() {
            "no triggers matched".to_string()
        } else {
            format!(
                "{} trigger(s): {}",
                self.matched_triggers.len(),
                self.matched_triggers.join(", ")
            )
        }
    }
}

/// Per-capability score for one query.
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityScore {
    pub capability: Capability,
    pub score: f32,
    pub matched: Vec<&'static str>,
    pub vetoed: bool,
}

/// Stateless keyword classifier.
#[derive(Debug, Default, Clone, Copy)]
pub struct QueryClassifier;

impl QueryClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Score every capability of the trigger table, in table order.
    pub fn scores(&self, text: &str) -> Vec<CapabilityScore> {
        RULES
            .iter()
            .map(|rule| {
                let matched: Vec<&'static str> = rule
                    .triggers
                    .iter()
                    .filter(|t| t.pattern.is_match(text))
                    .map(|t| t.name)
                    .collect();
                let vetoed = rule.vetoes.iter().any(|v| v.is_match(text));
                let score = if vetoed {
                    0.0
                } else {
                    (matched.len() as f32 / rule.divisor).clamp(0.0, 1.0)
                };
                CapabilityScore {
                    capability: rule.capability,
                    score,
                    matched,
                    vetoed,
                }
            })
            .collect()
    }

    /// Pick the capability for `text`. Never fails; ambiguity and empty
    /// input resolve to `general`.
    pub fn classify(&self, text: &str) -> Classification {
        if text.trim().is_empty() {
            return Classification::general();
        }
        let scores = self.scores(text);
        for capability in PRIORITY_ORDER {
            if let Some(s) = scores
                .iter()
                .find(|s| s.capability == capability && s.score > 0.0)
            {
                return Classification {
                    capability,
                    confidence: s.score,
                    matched_triggers: s.matched.iter().map(|m| m.to_string()).collect(),
                };
            }
        }
        Classification::general()
    }
}

// =============================================================================
// Tests
// =============================================================================
