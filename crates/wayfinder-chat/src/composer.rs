//! Reply composition.
//!
//! Turns capability results, missing parameters and context outcomes into
//! conversational text. Success with no data and upstream failure use
//! different templates so the user can tell "nothing there" from "try later".

use wayfinder_core::{Capability, LocationPoint};
use wayfinder_provider::{
    AddressMatch, CapabilityPayload, CapabilityResult, GeocodeMatch, MatrixCell, Place,
    RouteSummary, StaticMapImage, TravelMode, UpstreamError,
};

use crate::context_command::{display_value, ContextOutcome};
use crate::extractor::{MissingField, MissingParameter};
use crate::types::{CURRENT_LOCATION_KEY, PREFERENCES_KEY};

// =============================================================================
// Formatting helpers
// =============================================================================

/// `850 m` below one kilometre, `12.3 km` above.
pub fn format_distance(meters: f64) -> String {
    if meters < 1000.0 {
        format!("{} m", meters.round() as i64)
    } else {
        format!("{:.1} km", meters / 1000.0)
    }
}

/// `45 s`, `12 min`, `1 h 25 min`.
pub fn format_duration(seconds: f64) -> String {
    let total = seconds.round().max(0.0) as u64;
    if total < 60 {
        return format!("{total} s");
    }
    let minutes = (total + 30) / 60;
    if minutes < 60 {
        format!("{minutes} min")
    } else if minutes % 60 == 0 {
        format!("{} h", minutes / 60)
    } else {
        format!("{} h {} min", minutes / 60, minutes % 60)
    }
}

fn format_point(point: &LocationPoint) -> String {
    format!("{:.6}, {:.6}", point.lat, point.lon)
}

fn travel_mode_phrase(mode: TravelMode) -> &'static str {
    match mode {
        TravelMode::Car => "driving",
        TravelMode::Pedestrian => "walking",
        TravelMode::Bicycle => "cycling",
        TravelMode::Truck => "by truck",
        TravelMode::Taxi => "by taxi",
        TravelMode::Bus => "by bus",
        TravelMode::Van => "by van",
        TravelMode::Motorcycle => "by motorcycle",
    }
}

// =============================================================================
// ResponseComposer
// =============================================================================

/// Builds reply text. Pure: no I/O, no state.
#[derive(Debug, Clone)]
pub struct ResponseComposer {
    /// Maximum list items (places, steps, matrix cells) shown per reply.
    pub max_items: usize,
}

impl Default for ResponseComposer {
    fn default() -> Self {
        Self::new(5)
    }
}

impl ResponseComposer {
    pub fn new(max_items: usize) -> Self {
        Self {
            max_items: max_items.max(1),
        }
    }

    /// Reply for a capability result.
    pub fn compose(&self, capability: Capability, result: &CapabilityResult) -> String {
        match result {
            Ok(payload) if payload.is_empty() => self.empty(payload),
            Ok(payload) => self.success(payload),
            Err(err) => self.error(capability, err),
        }
    }

    fn more_suffix(&self, total: usize, noun: &str) -> Option<String> {
        (total > self.max_items).then(|| format!("...and {} more {noun}", total - self.max_items))
    }

    // ---- Success ----

    fn success(&self, payload: &CapabilityPayload) -> String {
        match payload {
            CapabilityPayload::Places { query, places } => self.places(query, places),
            CapabilityPayload::Geocoded { address, matches } => self.geocoded(address, matches),
            CapabilityPayload::Addresses { location, matches } => self.addresses(location, matches),
            CapabilityPayload::Route {
                origin,
                destination,
                travel_mode,
                route: Some(route),
            } => self.route(origin, destination, *travel_mode, route),
            CapabilityPayload::Matrix {
                origins,
                destinations,
                travel_mode,
                cells,
            } => self.matrix(origins, destinations, *travel_mode, cells),
            CapabilityPayload::StaticMap { label, image } => self.static_map(label, image),
            CapabilityPayload::Text { text } => text.trim().to_string(),
            // Empty variants are routed to `empty`.
            CapabilityPayload::Route { route: None, .. } | CapabilityPayload::Unresolved { .. } => {
                self.empty(payload)
            }
        }
    }

    fn places(&self, query: &str, places: &[Place]) -> String {
        let noun = if places.len() == 1 { "place" } else { "places" };
        let mut reply = format!("I found {} {noun} for '{query}':\n", places.len());
        for (i, place) in places.iter().take(self.max_items).enumerate() {
            reply.push_str(&format!("\n{}. {}", i + 1, place.name));
            if let Some(address) = place.address.as_ref().filter(|a| **a != place.name) {
                reply.push_str(&format!("\n   {address}"));
            }
            let mut details = Vec::new();
            if let Some(category) = &place.category {
                details.push(category.clone());
            }
            if let Some(distance) = place.distance_m {
                details.push(format!("{} away", format_distance(distance)));
            }
            if let Some(phone) = &place.phone {
                details.push(phone.clone());
            }
            if !details.is_empty() {
                reply.push_str(&format!("\n   {}", details.join(" | ")));
            }
        }
        if let Some(more) = self.more_suffix(places.len(), noun) {
            reply.push_str(&format!("\n\n{more}"));
        }
        reply
    }

    fn geocoded(&self, address: &str, matches: &[GeocodeMatch]) -> String {
        let best = &matches[0];
        let mut reply = format!(
            "Address: {}\nCoordinates: {}",
            best.formatted_address,
            format_point(&best.location)
        );
        if matches.len() > 1 {
            reply.push_str(&format!("\n\nOther matches for '{address}':"));
            let others = &matches[1..];
            for m in others.iter().take(self.max_items.saturating_sub(1)) {
                reply.push_str(&format!(
                    "\n- {} ({})",
                    m.formatted_address,
                    format_point(&m.location)
                ));
            }
            if let Some(more) = self.more_suffix(matches.len(), "matches") {
                reply.push_str(&format!("\n{more}"));
            }
        }
        reply
    }

    fn addresses(&self, location: &LocationPoint, matches: &[AddressMatch]) -> String {
        let mut reply = format!(
            "Coordinates: {}\nAddress: {}",
            format_point(location),
            matches[0].formatted_address
        );
        for m in matches.iter().skip(1).take(self.max_items.saturating_sub(1)) {
            reply.push_str(&format!("\nAlso: {}", m.formatted_address));
        }
        reply
    }

    fn route(
        &self,
        origin: &str,
        destination: &str,
        mode: TravelMode,
        route: &RouteSummary,
    ) -> String {
        let mut reply = format!(
            "Route from {origin} to {destination} ({}):\nDistance: {}\nDuration: {}",
            travel_mode_phrase(mode),
            format_distance(route.distance_m),
            format_duration(route.duration_s)
        );
        if route.traffic_delay_s >= 60.0 {
            reply.push_str(&format!(
                " (includes {} of traffic delay)",
                format_duration(route.traffic_delay_s)
            ));
        }
        if !route.steps.is_empty() {
            reply.push_str("\n\nSteps:");
            for (i, step) in route.steps.iter().take(self.max_items).enumerate() {
                reply.push_str(&format!("\n{}. {}", i + 1, step.instruction));
                if let Some(d) = step.distance_m.filter(|d| *d > 0.0) {
                    reply.push_str(&format!(" ({})", format_distance(d)));
                }
            }
            if let Some(more) = self.more_suffix(route.steps.len(), "steps") {
                reply.push_str(&format!("\n{more}"));
            }
        }
        reply
    }

    fn matrix(
        &self,
        origins: &[String],
        destinations: &[String],
        mode: TravelMode,
        cells: &[MatrixCell],
    ) -> String {
        let label = |labels: &[String], idx: usize| {
            labels
                .get(idx)
                .cloned()
                .unwrap_or_else(|| format!("#{}", idx + 1))
        };
        let mut reply = format!("Travel times ({}):", travel_mode_phrase(mode));
        for cell in cells.iter().take(self.max_items) {
            let from = label(origins, cell.origin_index);
            let to = label(destinations, cell.destination_index);
            let value = match (cell.distance_m, cell.duration_s) {
                (Some(d), Some(t)) => format!("{}, {}", format_distance(d), format_duration(t)),
                (Some(d), None) => format_distance(d),
                (None, Some(t)) => format_duration(t),
                (None, None) => "no route found".to_string(),
            };
            reply.push_str(&format!("\n- {from} to {to}: {value}"));
        }
        if let Some(more) = self.more_suffix(cells.len(), "pairs") {
            reply.push_str(&format!("\n{more}"));
        }
        reply
    }

    fn static_map(&self, label: &str, image: &StaticMapImage) -> String {
        format!(
            "Here's a map of {label} (zoom {}, {}x{}):\n{}",
            image.zoom, image.width, image.height, image.url
        )
    }

    // ---- Empty ----

    fn empty(&self, payload: &CapabilityPayload) -> String {
        match payload {
            CapabilityPayload::Places { query, .. } => format!(
                "I couldn't find any places matching '{query}' there. Try a different search term or location."
            ),
            CapabilityPayload::Geocoded { address, .. } => format!(
                "I couldn't find coordinates for '{address}'. Please check the address and try again."
            ),
            CapabilityPayload::Addresses { location, .. } => format!(
                "I couldn't find an address for coordinates {}. Try a point closer to a road or building.",
                format_point(location)
            ),
            CapabilityPayload::Route {
                origin,
                destination,
                travel_mode,
                ..
            } => format!(
                "I couldn't find a {} route from {origin} to {destination}. Try different locations or another travel mode.",
                travel_mode_phrase(*travel_mode)
            ),
            CapabilityPayload::Matrix { .. } => {
                "I couldn't find routes between any of those places. Try different locations."
                    .to_string()
            }
            CapabilityPayload::Unresolved { place } => format!(
                "I couldn't find a location matching '{place}'. Try a more specific place name or coordinates."
            ),
            CapabilityPayload::Text { .. } => {
                "I'm not sure how to answer that. Try asking about places, directions or maps."
                    .to_string()
            }
            CapabilityPayload::StaticMap { label, image } => self.static_map(label, image),
        }
    }

    // ---- Errors ----

    fn error(&self, capability: Capability, err: &UpstreamError) -> String {
        let apology = match capability {
            Capability::Search => "Sorry, I couldn't search for places right now.",
            Capability::Directions => "Sorry, I couldn't get directions right now.",
            Capability::Geocode => "Sorry, I couldn't look up that address right now.",
            Capability::ReverseGeocode => "Sorry, I couldn't look up those coordinates right now.",
            Capability::Matrix => "Sorry, I couldn't calculate travel times right now.",
            Capability::StaticMap => "Sorry, I couldn't create a map image right now.",
            Capability::General | Capability::Context => "Sorry, I couldn't answer that right now.",
        };
        format!("{apology} {}", err.message)
    }

    // ---- Clarifications ----

    /// Reply asking for the value that was missing.
    pub fn clarification(&self, missing: &MissingParameter) -> String {
        match (missing.field, missing.known.as_deref()) {
            (MissingField::SearchTerm, _) => "I'd be happy to help you search for places! What are you looking for? For example: 'Find restaurants near me' or 'Search for coffee shops near 47.6062, -122.3321'.".to_string(),
            (MissingField::Origin, Some(destination)) => format!(
                "I can get you directions to {destination}, but I need a starting point. Tell me where you're starting from, or set your location with 'my location is <lat>, <lon>'."
            ),
            (MissingField::Origin, None) | (MissingField::Endpoints, _) => "I can help with directions! Tell me where you're starting from and where you're going, for example: 'How do I get from Seattle to Portland?'".to_string(),
            (MissingField::Address, _) => "I can find coordinates for an address! Please include the address, for example: 'What are the coordinates for 123 Main Street, Seattle?'".to_string(),
            (MissingField::Coordinates, _) => "I can help you find an address for coordinates! Please provide latitude and longitude, for example: 'What's at 47.6062, -122.3321?'".to_string(),
            (MissingField::Waypoints, _) => "I can compare travel times! Please list the places, for example: 'Travel times from Seattle, Tacoma to Portland'.".to_string(),
            (MissingField::MapCenter, _) => "I can generate a map image! Tell me where, for example: 'Show me a map of 47.6062, -122.3321'.".to_string(),
            (MissingField::CurrentLocation, Some(term)) if missing.capability == Capability::Search => format!(
                "I can help you find {term}, but I need a location. Tell me where to look, or set your location with 'my location is <lat>, <lon>'."
            ),
            (MissingField::CurrentLocation, _) => "I don't know your location yet. Tell me with 'my location is <lat>, <lon>' and ask again.".to_string(),
        }
    }

    // ---- Context commands ----

    /// Reply for an executed context command.
    pub fn context(&self, outcome: &ContextOutcome) -> String {
        match outcome {
            ContextOutcome::LocationSaved { location, label } => match label {
                Some(label) => format!(
                    "Got it. I'll remember your location as {label} ({}).",
                    format_point(location)
                ),
                None => format!(
                    "Got it. I'll remember your location as {}.",
                    format_point(location)
                ),
            },
            ContextOutcome::LocationNotFound(place) => format!(
                "I couldn't find a location matching '{place}', so I didn't save it. Try coordinates like 'my location is 47.6062, -122.3321'."
            ),
            ContextOutcome::LocationLookupFailed(message) => {
                format!("Sorry, I couldn't look up that location right now. {message}")
            }
            ContextOutcome::PreferenceSaved { key, value } => {
                format!("Got it. I'll remember that your {} is {value}.", key.replace('_', " "))
            }
            ContextOutcome::LocationForgotten { had_location: true } => {
                "Done. I've forgotten your location.".to_string()
            }
            ContextOutcome::LocationForgotten { had_location: false } => {
                "I didn't have a location saved for you.".to_string()
            }
            ContextOutcome::ContextCleared => {
                "Done. I've forgotten everything you told me.".to_string()
            }
            ContextOutcome::LocationReport(Some(location)) => {
                format!("Your saved location is {}.", format_point(location))
            }
            ContextOutcome::LocationReport(None) => "I don't know your location yet. Tell me with 'my location is <lat>, <lon>'.".to_string(),
            ContextOutcome::MemoryReport(context) => {
                if context.is_empty() {
                    return "I don't remember anything about you yet.".to_string();
                }
                let mut reply = String::from("Here's what I remember:");
                if let Some(location) = context.current_location() {
                    reply.push_str(&format!("\n- location: {}", format_point(&location)));
                }
                for (key, value) in &context.preferences() {
                    reply.push_str(&format!("\n- {}: {}", key.replace('_', " "), display_value(value)));
                }
                for (key, value) in context.as_map() {
                    if key != CURRENT_LOCATION_KEY && key != PREFERENCES_KEY {
                        reply.push_str(&format!("\n- {key}: {}", display_value(value)));
                    }
                }
                reply
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
