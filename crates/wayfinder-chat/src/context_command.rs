//! Explicit context commands ("my location is ...", "forget everything").
//!
//! These are recognised before classification and never reach a maps
//! capability except to geocode a named location.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use wayfinder_core::{Capability, LocationPoint};
use wayfinder_provider::PlaceRef;

use crate::classifier::QueryClassifier;
use crate::extractor::{extract_coordinates, parse_coordinate_pair};
use crate::types::UserContext;

/// Longest text value accepted as a place name in "I'm at ...".
const MAX_PLACE_WORDS: usize = 6;

static SET_LOCATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:please\s+)?(?:remember\s+(?:that\s+)?)?(?:my\s+(?:current\s+)?location\s+is|i'?m\s+(?:at|in)|i\s+am\s+(?:at|in)|set\s+my\s+location\s+to)\s+([^?]+?)\s*[.!]?\s*$",
    )
    .unwrap()
});

// A second clause after the place: "I'm in Seattle and need ...".
static CLAUSE_BREAK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:;|\b(?:and|then|but|so)\b)\s*\S").unwrap());

// What may follow a comma in a place name: "Seattle, WA", "Paris, France".
static PLACE_QUALIFIER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Z0-9][\w.'-]*(?:\s+[A-Z0-9][\w.'-]*){0,2}$").unwrap()
});

// "I am in need of ...", "I'm in a hurry".
static NOT_A_PLACE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:need|a\s+hurry|trouble|the\s+mood|charge|favou?r|love|search|looking)\b")
        .unwrap()
});

static SET_PREFERENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:please\s+)?remember\s+(?:that\s+)?my\s+([a-z][a-z _-]{0,40}?)\s+(?:is|are)\s+([^?]+?)\s*[.!]?\s*$",
    )
    .unwrap()
});

static FORGET_LOCATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:please\s+)?forget\s+my\s+(?:current\s+)?location\b").unwrap()
});

static FORGET_ALL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:please\s+)?forget\s+(?:everything|all|about\s+me)\b").unwrap()
});

static SHOW_LOCATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:where\s+am\s+i|what(?:'s|\s+is)\s+my\s+(?:current\s+)?location)\s*[?.!]*\s*$")
        .unwrap()
});

static SHOW_MEMORY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*what\s+do\s+you\s+(?:remember|know)\s+about\s+me\s*[?.!]*\s*$").unwrap()
});

/// A recognised context command.
#[derive(Debug, Clone, PartialEq)]
pub enum ContextCommand {
    /// Store a location. Text places are geocoded first.
    SetLocation(PlaceRef),
    SetPreference { key: String, value: String },
    ForgetLocation,
    ForgetAll,
    ShowLocation,
    ShowMemory,
}

impl ContextCommand {
    /// Recognise a context command. The whole message must be the command.
    pub fn parse(text: &str) -> Option<Self> {
        if FORGET_ALL_RE.is_match(text) {
            return Some(ContextCommand::ForgetAll);
        }
        if FORGET_LOCATION_RE.is_match(text) {
            return Some(ContextCommand::ForgetLocation);
        }
        if SHOW_LOCATION_RE.is_match(text) {
            return Some(ContextCommand::ShowLocation);
        }
        if SHOW_MEMORY_RE.is_match(text) {
            return Some(ContextCommand::ShowMemory);
        }
        if let Some(place) = SET_LOCATION_RE
            .captures(text)
            .and_then(|caps| location_value(caps[1].trim()))
        {
            return Some(ContextCommand::SetLocation(place));
        }
        if let Some(caps) = SET_PREFERENCE_RE.captures(text) {
            let key = normalize_key(&caps[1]);
            if key == "location" || key == "current_location" {
                return None;
            }
            return Some(ContextCommand::SetPreference {
                key,
                value: caps[2].trim().to_string(),
            });
        }
        None
    }
}

/// The place named by "my location is <value>", or `None` when the value is
/// really the start of a question ("I'm in Seattle, how do I get to ...").
fn location_value(value: &str) -> Option<PlaceRef> {
    if let Some(point) = parse_coordinate_pair(value) {
        return Some(PlaceRef::Point(point));
    }
    if extract_coordinates(value).is_some()
        || CLAUSE_BREAK_RE.is_match(value)
        || NOT_A_PLACE_RE.is_match(value)
        || value.split_whitespace().count() > MAX_PLACE_WORDS
    {
        return None;
    }
    let mut parts = value.split(',');
    let name = parts.next().unwrap_or_default().trim();
    if name.is_empty() || !parts.all(|part| PLACE_QUALIFIER_RE.is_match(part.trim())) {
        return None;
    }
    // Vetoed triggers still count: the value asks for a maps operation.
    let asks_for_maps = QueryClassifier::new()
        .scores(value)
        .iter()
        .any(|s| s.capability != Capability::General && !s.matched.is_empty());
    (!asks_for_maps).then(|| PlaceRef::Text(value.to_string()))
}

fn normalize_key(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// What executing a context command did, for the composer.
#[derive(Debug, Clone, PartialEq)]
pub enum ContextOutcome {
    LocationSaved {
        location: LocationPoint,
        /// Resolved address when the location was given as text.
        label: Option<String>,
    },
    /// A text location could not be geocoded.
    LocationNotFound(String),
    /// Geocoding a text location failed upstream.
    LocationLookupFailed(String),
    PreferenceSaved { key: String, value: String },
    LocationForgotten { had_location: bool },
    ContextCleared,
    LocationReport(Option<LocationPoint>),
    MemoryReport(UserContext),
}

/// Render a preference value stored as JSON for display.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
