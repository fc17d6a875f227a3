//! Shared value types used across the Wayfinder crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, WayfinderError};

// =============================================================================
// Timestamp
// =============================================================================

/// Seconds since the Unix epoch (UTC).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now().timestamp())
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.0, 0).unwrap_or_default()
    }

    /// RFC 3339 rendering, used in conversation history output.
    pub fn to_rfc3339(&self) -> String {
        self.to_datetime().to_rfc3339()
    }
}

// =============================================================================
// LocationPoint
// =============================================================================

/// A WGS84 coordinate pair.
///
/// Invariant: latitude in [-90, 90], longitude in [-180, 180]. Use
/// [`LocationPoint::new`] to construct from untrusted input.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocationPoint {
    pub lat: f64,
    #[serde(alias = "lng")]
    pub lon: f64,
}

impl LocationPoint {
    /// Validate and construct a point.
    pub fn new(lat: f64, lon: f64) -> Result<Self> {
        if Self::in_bounds(lat, lon) {
            Ok(Self { lat, lon })
        } else {
            Err(WayfinderError::InvalidLocation { lat, lon })
        }
    }

    /// Whether the pair satisfies the latitude/longitude bounds.
    pub fn in_bounds(lat: f64, lon: f64) -> bool {
        lat.is_finite()
            && lon.is_finite()
            && (-90.0..=90.0).contains(&lat)
            && (-180.0..=180.0).contains(&lon)
    }

    /// Read a point out of a stored JSON value such as `{"lat": .., "lon": ..}`.
    ///
    /// Returns `None` for anything that is not a valid, in-bounds point.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        let point: LocationPoint = serde_json::from_value(value.clone()).ok()?;
        Self::new(point.lat, point.lon).ok()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({ "lat": self.lat, "lon": self.lon })
    }
}

impl fmt::Display for LocationPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.lat, self.lon)
    }
}

// =============================================================================
// Capability
// =============================================================================

/// A discrete kind of operation a query can be routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Search,
    Directions,
    Geocode,
    ReverseGeocode,
    Matrix,
    StaticMap,
    General,
    /// Explicit context commands ("remember my location is ...").
    Context,
}

impl Capability {
    /// Every capability, in display order.
    pub fn all() -> &'static [Capability] {
        &[
            Capability::Search,
            Capability::Directions,
            Capability::Geocode,
            Capability::ReverseGeocode,
            Capability::Matrix,
            Capability::StaticMap,
            Capability::General,
            Capability::Context,
        ]
    }

    /// One-line description shown in capability listings.
    pub fn description(&self) -> &'static str {
        match self {
            Capability::Search => "Search for places (restaurants, hotels, etc.)",
            Capability::Directions => "Get directions between locations",
            Capability::Geocode => "Find coordinates for addresses",
            Capability::ReverseGeocode => "Find addresses for coordinates",
            Capability::Matrix => "Calculate distance/time matrices",
            Capability::StaticMap => "Generate map images",
            Capability::General => "Answer general questions",
            Capability::Context => "Remember your location and preferences",
        }
    }

    /// Example query for capability listings.
    pub fn example(&self) -> &'static str {
        match self {
            Capability::Search => "Find restaurants near 47.6062, -122.3321",
            Capability::Directions => "How do I get from Seattle to Portland?",
            Capability::Geocode => "What are the coordinates for 123 Main Street, Seattle?",
            Capability::ReverseGeocode => "What's at 47.6062, -122.3321?",
            Capability::Matrix => "Travel times between Seattle and Tacoma, Bellevue",
            Capability::StaticMap => "Show me a map of 47.6062, -122.3321",
            Capability::General => "What can you do?",
            Capability::Context => "Remember my location is 47.6062, -122.3321",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Search => write!(f, "search"),
            Capability::Directions => write!(f, "directions"),
            Capability::Geocode => write!(f, "geocode"),
            Capability::ReverseGeocode => write!(f, "reverse_geocode"),
            Capability::Matrix => write!(f, "matrix"),
            Capability::StaticMap => write!(f, "static_map"),
            Capability::General => write!(f, "general"),
            Capability::Context => write!(f, "context"),
        }
    }
}

impl std::str::FromStr for Capability {
    type Err = WayfinderError;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "search" => Ok(Capability::Search),
            "directions" => Ok(Capability::Directions),
            "geocode" => Ok(Capability::Geocode),
            "reverse_geocode" => Ok(Capability::ReverseGeocode),
            "matrix" => Ok(Capability::Matrix),
            "static_map" => Ok(Capability::StaticMap),
            "general" => Ok(Capability::General),
            "context" => Ok(Capability::Context),
            _ => Err(WayfinderError::UnknownCapability(s.to_string())),
        }
    }
}
