//! Request and result types for capability providers.

use std::fmt;

use serde::{Deserialize, Serialize};
use wayfinder_core::LocationPoint;

use crate::error::UpstreamError;

// =============================================================================
// Requests
// =============================================================================

/// How a route should be travelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TravelMode {
    #[default]
    Car,
    Truck,
    Taxi,
    Bus,
    Van,
    Motorcycle,
    Bicycle,
    Pedestrian,
}

impl fmt::Display for TravelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TravelMode::Car => write!(f, "car"),
            TravelMode::Truck => write!(f, "truck"),
            TravelMode::Taxi => write!(f, "taxi"),
            TravelMode::Bus => write!(f, "bus"),
            TravelMode::Van => write!(f, "van"),
            TravelMode::Motorcycle => write!(f, "motorcycle"),
            TravelMode::Bicycle => write!(f, "bicycle"),
            TravelMode::Pedestrian => write!(f, "pedestrian"),
        }
    }
}

impl std::str::FromStr for TravelMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "car" | "drive" | "driving" => Ok(TravelMode::Car),
            "truck" => Ok(TravelMode::Truck),
            "taxi" => Ok(TravelMode::Taxi),
            "bus" => Ok(TravelMode::Bus),
            "van" => Ok(TravelMode::Van),
            "motorcycle" => Ok(TravelMode::Motorcycle),
            "bicycle" | "bike" | "cycling" => Ok(TravelMode::Bicycle),
            "pedestrian" | "walk" | "walking" => Ok(TravelMode::Pedestrian),
            other => Err(format!("Unknown travel mode: {other}")),
        }
    }
}

/// A waypoint as the user gave it: either coordinates or a place name that
/// still has to be geocoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PlaceRef {
    Point(LocationPoint),
    Text(String),
}

impl fmt::Display for PlaceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaceRef::Point(p) => write!(f, "{p}"),
            PlaceRef::Text(t) => write!(f, "{t}"),
        }
    }
}

/// Parameters for a place search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub near: Option<LocationPoint>,
    pub limit: usize,
}

/// Parameters for a single route between two resolved points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouteRequest {
    pub origin: LocationPoint,
    pub destination: LocationPoint,
    pub travel_mode: TravelMode,
}

/// Parameters for a distance/time matrix between resolved points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixRequest {
    pub origins: Vec<LocationPoint>,
    pub destinations: Vec<LocationPoint>,
    pub travel_mode: TravelMode,
}

/// Parameters for a static map image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StaticMapRequest {
    pub center: LocationPoint,
    pub zoom: u8,
    pub width: u32,
    pub height: u32,
}

// =============================================================================
// Results
// =============================================================================

/// A point of interest returned by a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub name: String,
    pub address: Option<String>,
    pub location: Option<LocationPoint>,
    pub category: Option<String>,
    pub phone: Option<String>,
    /// Distance from the search bias point, in meters.
    pub distance_m: Option<f64>,
}

/// A forward geocoding candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodeMatch {
    pub formatted_address: String,
    pub location: LocationPoint,
    pub match_type: Option<String>,
}

/// A reverse geocoding candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressMatch {
    pub formatted_address: String,
    pub location: Option<LocationPoint>,
}

/// One guidance instruction along a route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteStep {
    pub instruction: String,
    /// Distance until the next instruction, in meters.
    pub distance_m: Option<f64>,
}

/// Summary of a calculated route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSummary {
    pub distance_m: f64,
    pub duration_s: f64,
    pub traffic_delay_s: f64,
    pub steps: Vec<RouteStep>,
}

/// One origin/destination pair of a matrix. `None` values mean no route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixCell {
    pub origin_index: usize,
    pub destination_index: usize,
    pub distance_m: Option<f64>,
    pub duration_s: Option<f64>,
}

/// A ready-to-fetch static map image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticMapImage {
    pub url: String,
    pub center: LocationPoint,
    pub zoom: u8,
    pub width: u32,
    pub height: u32,
}

/// Normalized success payload of any capability.
///
/// Labels carried next to results are the waypoints as the user wrote them,
/// so replies can echo the user's wording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CapabilityPayload {
    Places {
        query: String,
        places: Vec<Place>,
    },
    Geocoded {
        address: String,
        matches: Vec<GeocodeMatch>,
    },
    Addresses {
        location: LocationPoint,
        matches: Vec<AddressMatch>,
    },
    Route {
        origin: String,
        destination: String,
        travel_mode: TravelMode,
        route: Option<RouteSummary>,
    },
    Matrix {
        origins: Vec<String>,
        destinations: Vec<String>,
        travel_mode: TravelMode,
        cells: Vec<MatrixCell>,
    },
    StaticMap {
        label: String,
        image: StaticMapImage,
    },
    /// A waypoint given as text could not be geocoded.
    Unresolved {
        place: String,
    },
    /// Conversational text from a responder.
    Text {
        text: String,
    },
}

impl CapabilityPayload {
    /// Whether the call succeeded but produced nothing to show.
    pub fn is_empty(&self) -> bool {
        match self {
            CapabilityPayload::Places { places, .. } => places.is_empty(),
            CapabilityPayload::Geocoded { matches, .. } => matches.is_empty(),
            CapabilityPayload::Addresses { matches, .. } => matches.is_empty(),
            CapabilityPayload::Route { route, .. } => route.is_none(),
            CapabilityPayload::Matrix { cells, .. } => {
                cells.iter().all(|c| c.distance_m.is_none() && c.duration_s.is_none())
            }
            CapabilityPayload::StaticMap { .. } => false,
            CapabilityPayload::Unresolved { .. } => true,
            CapabilityPayload::Text { text } => text.trim().is_empty(),
        }
    }
}

/// Outcome of invoking a capability.
pub type CapabilityResult = Result<CapabilityPayload, UpstreamError>;
