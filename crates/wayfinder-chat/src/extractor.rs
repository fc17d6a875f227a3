//! Parameter extraction.
//!
//! Pulls coordinates, addresses, place terms, waypoints and map options out
//! of free text, falling back to the stored user context for the location.
//! Incomplete input is reported as a [`MissingParameter`] value.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use wayfinder_core::config::{MapsConfig, StaticMapConfig};
use wayfinder_core::{Capability, LocationPoint};
use wayfinder_provider::{PlaceRef, TravelMode};

use crate::types::UserContext;

const MAX_ZOOM: u8 = 22;

// =============================================================================
// Compiled patterns
// =============================================================================

static COORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^\d.])([-+]?\d{1,3}(?:\.\d+)?)\s*,\s*([-+]?\d{1,3}(?:\.\d+)?)\b")
        .unwrap()
});

static COORD_ONLY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([-+]?\d{1,3}(?:\.\d+)?)\s*,\s*([-+]?\d{1,3}(?:\.\d+)?)\s*$").unwrap()
});

// Address patterns, tried in order.
static STREET_ADDRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(\d+[a-z]?\s+(?:[a-z0-9.'-]+\s+){0,5}?(?:street|st|avenue|ave|road|rd|boulevard|blvd|drive|dr|lane|ln|way|place|pl|court|ct|parkway|pkwy|highway|hwy|terrace|square|sq)\b\.?(?:\s*,\s*[a-z][a-z .'-]*)*)",
    )
    .unwrap()
});

static PROPER_NOUN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?i:at|near|in|for|of|to)\s+([A-Z][\w.'-]*(?:(?:\s+|\s*,\s*)[A-Z][\w.'-]*)*)")
        .unwrap()
});

static ADDRESS_STOP_WORDS: &[&str] = &[
    "what", "whats", "is", "are", "the", "a", "an", "address", "for", "of", "where", "located",
    "coordinates", "coordinate", "geocode", "latitude", "longitude", "lat", "long", "lon", "lng",
    "find", "get", "me", "give", "please", "show", "tell", "and", "i", "need", "can", "you",
];

// Search vocabulary, checked in order ("parking" before "park").
static PLACE_VOCABULARY: &[&str] = &[
    "gas station",
    "coffee",
    "restaurant",
    "hotel",
    "shopping",
    "hospital",
    "pharmacy",
    "bank",
    "atm",
    "parking",
    "park",
    "cafe",
    "bar",
    "museum",
    "supermarket",
    "grocery",
    "bakery",
    "gym",
    "library",
    "airport",
];

static VOCABULARY_RES: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    PLACE_VOCABULARY
        .iter()
        .map(|term| {
            let body = match term.strip_suffix('y') {
                Some(stem) => format!("{}(?:y|ies)", regex::escape(stem)),
                None => format!("{}(?:s|es)?", regex::escape(term).replace(' ', r"\s+")),
            };
            let re = Regex::new(&format!(r"(?i)\b{body}\b")).expect("Invalid vocabulary regex");
            (*term, re)
        })
        .collect()
});

static SEARCH_STOP_WORDS: &[&str] = &[
    "find", "search", "show", "where", "near", "nearby", "look", "looking", "please", "some",
    "there", "around", "closest", "nearest", "best", "good", "places", "place", "with", "that",
    "what", "want", "need", "would", "like", "could", "about", "from", "into", "give", "list",
    "open", "any", "anything",
];

static SEARCH_AREA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?i:in|around|near)\s+([A-Z][\w.'-]*(?:\s+[A-Z][\w.'-]*)*)").unwrap()
});

static FROM_TO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bfrom\s+(.+?)\s+to\s+(.+)$").unwrap());

static TO_ONLY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^.*\b(?:to|towards)\s+(.+)$").unwrap());

static BETWEEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bbetween\s+(.+?)\s+and\s+(.+)$").unwrap());

static HOW_FAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bhow\s+far\s+is\s+(.+?)\s+from\s+(.+)$").unwrap());

static LIST_SEPARATOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s*(?:,|;|\band\b)\s*").unwrap());

static TRAVEL_MODE_SUFFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\s+(?:by\s+(?:car|bike|bicycle|truck|bus|taxi|foot)|on\s+foot|walking|driving|cycling|biking)\s*$",
    )
    .unwrap()
});

static FILLER_SUFFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\s*,?\s+(?:please|from\s+(?:here|my\s+(?:current\s+)?location|where\s+i\s+am))\s*$",
    )
    .unwrap()
});

static TRAVEL_MODES: LazyLock<Vec<(TravelMode, Regex)>> = LazyLock::new(|| {
    let mk = |p: &str| Regex::new(&format!("(?i){p}")).expect("Invalid travel mode regex");
    vec![
        (TravelMode::Pedestrian, mk(r"\b(?:walk|walking|on\s+foot|by\s+foot|pedestrian)\b")),
        (TravelMode::Bicycle, mk(r"\b(?:bike|biking|bicycle|cycle|cycling)\b")),
        (TravelMode::Truck, mk(r"\btrucks?\b")),
        (TravelMode::Bus, mk(r"\bbus\b")),
        (TravelMode::Taxi, mk(r"\b(?:taxi|cab)\b")),
        (TravelMode::Motorcycle, mk(r"\bmotorcycle\b")),
        (TravelMode::Car, mk(r"\b(?:drive|driving|car)\b")),
    ]
});

static MAP_PLACE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bmap\s+(?:image\s+)?(?:of|for|around|near|showing)\s+(.+)$").unwrap()
});

static ZOOM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bzoom(?:\s+level)?\s*(?:=|:|to)?\s*(\d{1,2})\b").unwrap()
});

static ZOOM_CLAUSE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*,?\s*(?:(?:at|with)\s+)?zoom(?:\s+level)?\s*(?:=|:|to)?\s*\d{1,2}\b")
        .unwrap()
});

static SIZE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{2,4})\s*[xX×]\s*(\d{2,4})\b").unwrap());

static SELF_REFERENCES: &[&str] = &[
    "my location",
    "my current location",
    "current location",
    "my position",
    "where i am",
    "here",
    "me",
];

// Self references inside a longer sentence. A bare "me" only counts after a
// proximity word, so "show me hotels" does not match.
static SELF_REFERENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    let phrases: Vec<String> = SELF_REFERENCES
        .iter()
        .filter(|p| **p != "me")
        .map(|p| p.split(' ').map(regex::escape).collect::<Vec<_>>().join(r"\s+"))
        .collect();
    Regex::new(&format!(
        r"(?i)\b(?:{}|(?:near|around|by|close\s+to)\s+me|nearby)\b",
        phrases.join("|")
    ))
    .expect("Invalid self reference regex")
});

// =============================================================================
// Types
// =============================================================================

/// Capability-specific parameters pulled from a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "capability", rename_all = "snake_case")]
pub enum ExtractedParameters {
    Search {
        term: String,
        location: Option<LocationPoint>,
        /// Named area ("in Seattle") used when no location is known.
        area: Option<String>,
    },
    Directions {
        origin: PlaceRef,
        destination: PlaceRef,
        travel_mode: TravelMode,
    },
    Geocode {
        address: String,
    },
    ReverseGeocode {
        location: LocationPoint,
    },
    Matrix {
        origins: Vec<PlaceRef>,
        destinations: Vec<PlaceRef>,
        travel_mode: TravelMode,
    },
    StaticMap {
        center: PlaceRef,
        zoom: u8,
        width: u32,
        height: u32,
    },
    General {
        prompt: String,
    },
}

impl ExtractedParameters {
    pub fn capability(&self) -> Capability {
        match self {
            ExtractedParameters::Search { .. } => Capability::Search,
            ExtractedParameters::Directions { .. } => Capability::Directions,
            ExtractedParameters::Geocode { .. } => Capability::Geocode,
            ExtractedParameters::ReverseGeocode { .. } => Capability::ReverseGeocode,
            ExtractedParameters::Matrix { .. } => Capability::Matrix,
            ExtractedParameters::StaticMap { .. } => Capability::StaticMap,
            ExtractedParameters::General { .. } => Capability::General,
        }
    }
}

/// Which required value could not be found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingField {
    SearchTerm,
    /// Destination known, start point unknown.
    Origin,
    /// Neither end of a route.
    Endpoints,
    Address,
    Coordinates,
    Waypoints,
    MapCenter,
    /// The text said "my location" but none is stored.
    CurrentLocation,
}

impl fmt::Display for MissingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingField::SearchTerm => write!(f, "search_term"),
            MissingField::Origin => write!(f, "origin"),
            MissingField::Endpoints => write!(f, "endpoints"),
            MissingField::Address => write!(f, "address"),
            MissingField::Coordinates => write!(f, "coordinates"),
            MissingField::Waypoints => write!(f, "waypoints"),
            MissingField::MapCenter => write!(f, "map_center"),
            MissingField::CurrentLocation => write!(f, "current_location"),
        }
    }
}

/// A capability could not be invoked because a required value is absent.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("missing {field} for {capability}")]
pub struct MissingParameter {
    pub capability: Capability,
    pub field: MissingField,
    /// Whatever was extracted, for a more helpful clarification.
    pub known: Option<String>,
}

impl MissingParameter {
    fn new(capability: Capability, field: MissingField) -> Self {
        Self {
            capability,
            field,
            known: None,
        }
    }

    fn with_known(mut self, known: impl Into<String>) -> Self {
        self.known = Some(known.into());
        self
    }
}

// =============================================================================
// ParameterExtractor
// =============================================================================

/// Rule-based parameter extractor.
#[derive(Debug, Clone)]
pub struct ParameterExtractor {
    default_travel_mode: TravelMode,
    map_defaults: StaticMapConfig,
}

impl Default for ParameterExtractor {
    fn default() -> Self {
        Self::new(TravelMode::default(), StaticMapConfig::default())
    }
}

impl ParameterExtractor {
    pub fn new(default_travel_mode: TravelMode, map_defaults: StaticMapConfig) -> Self {
        Self {
            default_travel_mode,
            map_defaults,
        }
    }

    pub fn from_config(config: &MapsConfig) -> Self {
        let mode = config
            .default_travel_mode
            .parse::<TravelMode>()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Falling back to car as default travel mode");
                TravelMode::Car
            });
        Self::new(mode, config.static_map.clone())
    }

    /// Extract the parameters `capability` needs from `text`.
    pub fn extract(
        &self,
        capability: Capability,
        text: &str,
        context: &UserContext,
    ) -> Result<ExtractedParameters, MissingParameter> {
        match capability {
            Capability::Search => self.extract_search(text, context),
            Capability::Directions => self.extract_directions(text, context),
            Capability::Geocode => extract_address(text)
                .map(|address| ExtractedParameters::Geocode { address })
                .ok_or_else(|| MissingParameter::new(capability, MissingField::Address)),
            Capability::ReverseGeocode => extract_coordinates(text)
                .or_else(|| context.current_location())
                .map(|location| ExtractedParameters::ReverseGeocode { location })
                .ok_or_else(|| MissingParameter::new(capability, MissingField::Coordinates)),
            Capability::Matrix => self.extract_matrix(text, context),
            Capability::StaticMap => self.extract_static_map(text, context),
            Capability::General | Capability::Context => Ok(ExtractedParameters::General {
                prompt: text.trim().to_string(),
            }),
        }
    }

    fn travel_mode(&self, text: &str) -> TravelMode {
        detect_travel_mode(text).unwrap_or(self.default_travel_mode)
    }

    fn extract_search(
        &self,
        text: &str,
        context: &UserContext,
    ) -> Result<ExtractedParameters, MissingParameter> {
        let term = extract_search_term(text)
            .ok_or_else(|| MissingParameter::new(Capability::Search, MissingField::SearchTerm))?;
        let location = extract_coordinates(text).or_else(|| context.current_location());
        let area = if location.is_none() {
            SEARCH_AREA_RE
                .captures(text)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
        } else {
            None
        };
        if location.is_none() && area.is_none() && SELF_REFERENCE_RE.is_match(text) {
            return Err(
                MissingParameter::new(Capability::Search, MissingField::CurrentLocation)
                    .with_known(term),
            );
        }
        Ok(ExtractedParameters::Search {
            term,
            location,
            area,
        })
    }

    fn extract_directions(
        &self,
        text: &str,
        context: &UserContext,
    ) -> Result<ExtractedParameters, MissingParameter> {
        let missing = |field| MissingParameter::new(Capability::Directions, field);
        let travel_mode = self.travel_mode(text);

        if let Some((origin, destination)) = extract_from_to(text) {
            let origin = place_ref(&origin, context).ok_or_else(|| {
                missing(MissingField::CurrentLocation).with_known(destination.clone())
            })?;
            let destination = place_ref(&destination, context)
                .ok_or_else(|| missing(MissingField::CurrentLocation))?;
            return Ok(ExtractedParameters::Directions {
                origin,
                destination,
                travel_mode,
            });
        }

        let target = TO_ONLY_RE
            .captures(text)
            .and_then(|c| c.get(1))
            .ok_or_else(|| missing(MissingField::Endpoints))?;
        let destination =
            clean_place(target.as_str()).ok_or_else(|| missing(MissingField::Endpoints))?;
        let destination_ref = place_ref(&destination, context)
            .ok_or_else(|| missing(MissingField::CurrentLocation))?;
        // "I'm at <lat>, <lon> and need directions to X" names its own origin.
        let origin = extract_coordinates(&text[..target.start()])
            .or_else(|| context.current_location())
            .map(PlaceRef::Point)
            .ok_or_else(|| missing(MissingField::Origin).with_known(destination))?;

        Ok(ExtractedParameters::Directions {
            origin,
            destination: destination_ref,
            travel_mode,
        })
    }

    fn extract_matrix(
        &self,
        text: &str,
        context: &UserContext,
    ) -> Result<ExtractedParameters, MissingParameter> {
        let missing = |field| MissingParameter::new(Capability::Matrix, field);

        let (origins, destinations) = if let Some(c) = FROM_TO_RE.captures(text) {
            (c[1].to_string(), c[2].to_string())
        } else if let Some(c) = BETWEEN_RE.captures(text) {
            (c[1].to_string(), c[2].to_string())
        } else if let Some(c) = HOW_FAR_RE.captures(text) {
            (c[2].to_string(), c[1].to_string())
        } else {
            return Err(missing(MissingField::Waypoints));
        };

        let resolve = |list: &str| -> Result<Vec<PlaceRef>, MissingParameter> {
            split_waypoints(list)
                .iter()
                .map(|w| place_ref(w, context).ok_or_else(|| missing(MissingField::CurrentLocation)))
                .collect()
        };
        let origins = resolve(&origins)?;
        let destinations = resolve(&destinations)?;
        if origins.is_empty() || destinations.is_empty() {
            return Err(missing(MissingField::Waypoints));
        }

        Ok(ExtractedParameters::Matrix {
            origins,
            destinations,
            travel_mode: self.travel_mode(text),
        })
    }

    fn extract_static_map(
        &self,
        text: &str,
        context: &UserContext,
    ) -> Result<ExtractedParameters, MissingParameter> {
        let zoom = ZOOM_RE
            .captures(text)
            .and_then(|c| c[1].parse::<u8>().ok())
            .map(|z| z.min(MAX_ZOOM))
            .unwrap_or(self.map_defaults.zoom);
        let (width, height) = SIZE_RE
            .captures(text)
            .and_then(|c| Some((c[1].parse::<u32>().ok()?, c[2].parse::<u32>().ok()?)))
            .unwrap_or((self.map_defaults.width, self.map_defaults.height));

        let named_place = MAP_PLACE_RE.captures(text).and_then(|c| {
            let without_zoom = ZOOM_CLAUSE_RE.replace_all(&c[1], "");
            let without_size = SIZE_RE.replace_all(&without_zoom, "");
            clean_place(&without_size)
        });

        let center = match (extract_coordinates(text), named_place) {
            (Some(point), _) => PlaceRef::Point(point),
            (None, Some(place)) => place_ref(&place, context).ok_or_else(|| {
                MissingParameter::new(Capability::StaticMap, MissingField::CurrentLocation)
            })?,
            (None, None) => context.current_location().map(PlaceRef::Point).ok_or_else(|| {
                MissingParameter::new(Capability::StaticMap, MissingField::MapCenter)
            })?,
        };

        Ok(ExtractedParameters::StaticMap {
            center,
            zoom,
            width,
            height,
        })
    }
}

// =============================================================================
// Extraction helpers
// =============================================================================

/// First in-bounds `lat, lon` pair in the text.
pub fn extract_coordinates(text: &str) -> Option<LocationPoint> {
    COORD_RE.captures_iter(text).find_map(|c| {
        let lat: f64 = c[1].parse().ok()?;
        let lon: f64 = c[2].parse().ok()?;
        LocationPoint::new(lat, lon).ok()
    })
}

/// The text as a whole, when it is nothing but an in-bounds `lat, lon` pair.
pub fn parse_coordinate_pair(text: &str) -> Option<LocationPoint> {
    let c = COORD_ONLY_RE.captures(text)?;
    LocationPoint::new(c[1].parse().ok()?, c[2].parse().ok()?).ok()
}

/// Every in-bounds `lat, lon` pair in the text, in order.
pub fn extract_all_coordinates(text: &str) -> Vec<LocationPoint> {
    COORD_RE
        .captures_iter(text)
        .filter_map(|c| LocationPoint::new(c[1].parse().ok()?, c[2].parse().ok()?).ok())
        .collect()
}

/// Address text: street-anchored, then proper-noun phrase after a
/// preposition, then the text with stop words removed.
pub fn extract_address(text: &str) -> Option<String> {
    if let Some(m) = STREET_ADDRESS_RE.captures(text).and_then(|c| c.get(1)) {
        if let Some(address) = clean_place(m.as_str()) {
            return Some(address);
        }
    }
    if let Some(m) = PROPER_NOUN_RE.captures(text).and_then(|c| c.get(1)) {
        if let Some(address) = clean_place(m.as_str()) {
            return Some(address);
        }
    }
    let remaining: Vec<&str> = text
        .split_whitespace()
        .filter(|word| {
            let bare: String = word
                .chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
                .to_lowercase();
            !bare.is_empty() && !ADDRESS_STOP_WORDS.contains(&bare.as_str())
        })
        .collect();
    clean_place(&remaining.join(" "))
}

/// Place category from the vocabulary, else the first meaningful word.
pub fn extract_search_term(text: &str) -> Option<String> {
    if let Some((term, _)) = VOCABULARY_RES.iter().find(|(_, re)| re.is_match(text)) {
        return Some(term.to_string());
    }
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .find(|w| {
            w.chars().count() > 3
                && w.chars().all(|c| c.is_alphabetic() || c == '-' || c == '\'')
                && !SEARCH_STOP_WORDS.contains(&w.to_lowercase().as_str())
        })
        .map(|w| w.to_lowercase())
}

/// `from <X> to <Y>`, both sides cleaned.
pub fn extract_from_to(text: &str) -> Option<(String, String)> {
    let caps = FROM_TO_RE.captures(text)?;
    Some((clean_place(&caps[1])?, clean_place(&caps[2])?))
}

/// Travel mode named in the text, if any.
pub fn detect_travel_mode(text: &str) -> Option<TravelMode> {
    TRAVEL_MODES
        .iter()
        .find(|(_, re)| re.is_match(text))
        .map(|(mode, _)| *mode)
}

/// Split a waypoint list. When the list contains coordinate pairs only
/// those are used; otherwise it is split on commas, semicolons and "and".
pub fn split_waypoints(list: &str) -> Vec<String> {
    let points = extract_all_coordinates(list);
    if !points.is_empty() {
        return points
            .iter()
            .map(|p| format!("{},{}", p.lat, p.lon))
            .collect();
    }
    LIST_SEPARATOR_RE
        .split(list)
        .filter_map(clean_place)
        .collect()
}

/// Trim punctuation, trailing travel-mode and filler phrases ("please",
/// "from here") and a leading lowercase article. `None` when nothing is left.
fn clean_place(raw: &str) -> Option<String> {
    let mut place = raw.to_string();
    loop {
        let next = strip_place_suffixes(&place);
        if next == place {
            break;
        }
        place = next;
    }
    let place = place.strip_prefix("the ").unwrap_or(&place).trim();
    (!place.is_empty()).then(|| place.to_string())
}

/// One pass of punctuation, travel-mode and filler suffix removal.
fn strip_place_suffixes(place: &str) -> String {
    let trimmed = place.trim().trim_end_matches(['?', '.', '!', ',', ';', ':']).trim();
    let without_mode = TRAVEL_MODE_SUFFIX_RE.replace(trimmed, "");
    let without_filler = FILLER_SUFFIX_RE.replace(&without_mode, "");
    without_filler.trim().to_string()
}

fn is_self_reference(place: &str) -> bool {
    let lower = place.trim().to_lowercase();
    SELF_REFERENCES.contains(&lower.as_str())
}

/// Coordinates, the stored location for self references, or place text.
/// `None` only for a self reference with no stored location.
fn place_ref(place: &str, context: &UserContext) -> Option<PlaceRef> {
    if let Some(point) = parse_coordinate_pair(place) {
        return Some(PlaceRef::Point(point));
    }
    if is_self_reference(place) {
        return context.current_location().map(PlaceRef::Point);
    }
    Some(PlaceRef::Text(place.to_string()))
}

// =============================================================================
// Tests
// =============================================================================
