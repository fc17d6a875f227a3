//! Capability invocation.
//!
//! Resolves text waypoints through the geocoder, calls the maps provider or
//! responder, and packs the outcome into a [`CapabilityPayload`].

use std::sync::Arc;

use wayfinder_core::LocationPoint;
use wayfinder_provider::{
    CapabilityPayload, CapabilityResult, MapsProvider, MatrixRequest, PlaceRef, Responder,
    RouteRequest, SearchRequest, StaticMapRequest, UpstreamError,
};

use crate::extractor::ExtractedParameters;
use crate::types::UserContext;

/// A waypoint after geocoding.
#[derive(Debug, Clone, PartialEq)]
pub enum Waypoint {
    Found {
        point: LocationPoint,
        /// The waypoint as the user wrote it.
        label: String,
    },
    NotFound(String),
}

/// Runs one capability against the configured providers.
#[derive(Clone)]
pub struct CapabilityInvoker {
    maps: Arc<dyn MapsProvider>,
    responder: Arc<dyn Responder>,
    search_limit: usize,
}

impl std::fmt::Debug for CapabilityInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityInvoker")
            .field("maps", &self.maps.name())
            .field("responder", &self.responder.name())
            .field("search_limit", &self.search_limit)
            .finish()
    }
}

impl CapabilityInvoker {
    pub fn new(
        maps: Arc<dyn MapsProvider>,
        responder: Arc<dyn Responder>,
        search_limit: usize,
    ) -> Self {
        Self {
            maps,
            responder,
            search_limit: search_limit.max(1),
        }
    }

    /// Geocode a text waypoint; points pass through untouched.
    pub async fn resolve(&self, place: &PlaceRef) -> Result<Waypoint, UpstreamError> {
        match place {
            PlaceRef::Point(point) => Ok(Waypoint::Found {
                point: *point,
                label: point.to_string(),
            }),
            PlaceRef::Text(text) => {
                let matches = self.maps.geocode(text).await?;
                Ok(match matches.into_iter().next() {
                    Some(best) => {
                        tracing::debug!(place = %text, location = %best.location, "Resolved waypoint");
                        Waypoint::Found {
                            point: best.location,
                            label: text.clone(),
                        }
                    }
                    None => Waypoint::NotFound(text.clone()),
                })
            }
        }
    }

    /// Resolve every waypoint, stopping at the first that cannot be found.
    async fn resolve_all(
        &self,
        places: &[PlaceRef],
    ) -> Result<Result<Vec<(LocationPoint, String)>, String>, UpstreamError> {
        let mut resolved = Vec::with_capacity(places.len());
        for place in places {
            match self.resolve(place).await? {
                Waypoint::Found { point, label } => resolved.push((point, label)),
                Waypoint::NotFound(place) => return Ok(Err(place)),
            }
        }
        Ok(Ok(resolved))
    }

    /// Invoke the capability `params` describes.
    pub async fn invoke(
        &self,
        params: &ExtractedParameters,
        context: &UserContext,
    ) -> CapabilityResult {
        match params {
            ExtractedParameters::Search {
                term,
                location,
                area,
            } => {
                let query = match (location, area) {
                    (None, Some(area)) => format!("{term} in {area}"),
                    _ => term.clone(),
                };
                let request = SearchRequest {
                    query: query.clone(),
                    near: *location,
                    limit: self.search_limit,
                };
                let places = self.maps.search(&request).await?;
                Ok(CapabilityPayload::Places { query, places })
            }
            ExtractedParameters::Directions {
                origin,
                destination,
                travel_mode,
            } => {
                let waypoints = [origin.clone(), destination.clone()];
                let mut resolved = match self.resolve_all(&waypoints).await? {
                    Ok(resolved) => resolved.into_iter(),
                    Err(place) => return Ok(CapabilityPayload::Unresolved { place }),
                };
                let (Some((from, origin)), Some((to, destination))) =
                    (resolved.next(), resolved.next())
                else {
                    return Err(UpstreamError::malformed());
                };
                let request = RouteRequest {
                    origin: from,
                    destination: to,
                    travel_mode: *travel_mode,
                };
                let route = self.maps.route(&request).await?;
                Ok(CapabilityPayload::Route {
                    origin,
                    destination,
                    travel_mode: *travel_mode,
                    route,
                })
            }
            ExtractedParameters::Geocode { address } => {
                let matches = self.maps.geocode(address).await?;
                Ok(CapabilityPayload::Geocoded {
                    address: address.clone(),
                    matches,
                })
            }
            ExtractedParameters::ReverseGeocode { location } => {
                let matches = self.maps.reverse_geocode(*location).await?;
                Ok(CapabilityPayload::Addresses {
                    location: *location,
                    matches,
                })
            }
            ExtractedParameters::Matrix {
                origins,
                destinations,
                travel_mode,
            } => {
                let origins = match self.resolve_all(origins).await? {
                    Ok(resolved) => resolved,
                    Err(place) => return Ok(CapabilityPayload::Unresolved { place }),
                };
                let destinations = match self.resolve_all(destinations).await? {
                    Ok(resolved) => resolved,
                    Err(place) => return Ok(CapabilityPayload::Unresolved { place }),
                };
                let (origin_points, origin_labels): (Vec<_>, Vec<_>) = origins.into_iter().unzip();
                let (destination_points, destination_labels): (Vec<_>, Vec<_>) =
                    destinations.into_iter().unzip();
                let request = MatrixRequest {
                    origins: origin_points,
                    destinations: destination_points,
                    travel_mode: *travel_mode,
                };
                let cells = self.maps.matrix(&request).await?;
                Ok(CapabilityPayload::Matrix {
                    origins: origin_labels,
                    destinations: destination_labels,
                    travel_mode: *travel_mode,
                    cells,
                })
            }
            ExtractedParameters::StaticMap {
                center,
                zoom,
                width,
                height,
            } => {
                let (center, label) = match self.resolve(center).await? {
                    Waypoint::Found { point, label } => (point, label),
                    Waypoint::NotFound(place) => {
                        return Ok(CapabilityPayload::Unresolved { place })
                    }
                };
                let image = self.maps.static_map(&StaticMapRequest {
                    center,
                    zoom: *zoom,
                    width: *width,
                    height: *height,
                })?;
                Ok(CapabilityPayload::StaticMap { label, image })
            }
            ExtractedParameters::General { prompt } => {
                let text = self.responder.respond(prompt, context.as_map()).await?;
                Ok(CapabilityPayload::Text { text })
            }
        }
    }
}
