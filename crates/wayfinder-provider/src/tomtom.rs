//! TomTom Maps API backend.
//!
//! Endpoints used:
//! - `GET  /search/2/search/{query}.json`
//! - `GET  /search/2/geocode/{address}.json`
//! - `GET  /search/2/reverseGeocode/{lat},{lon}.json`
//! - `GET  /routing/1/calculateRoute/{lat},{lon}:{lat},{lon}/json`
//! - `POST /routing/matrix/2`
//! - `/map/1/staticimage` (URL only, fetched by the client that displays it)

use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use wayfinder_core::config::MapsConfig;
use wayfinder_core::LocationPoint;

use crate::error::UpstreamError;
use crate::maps::MapsProvider;
use crate::types::{
    AddressMatch, GeocodeMatch, MatrixCell, MatrixRequest, Place, RouteRequest, RouteStep,
    RouteSummary, SearchRequest, StaticMapImage, StaticMapRequest,
};

const MAX_ZOOM: u8 = 22;
const MAX_IMAGE_SIDE: u32 = 8192;
const LOGGED_BODY_CHARS: usize = 200;

/// HTTP client for the TomTom Maps APIs.
#[derive(Clone)]
pub struct TomTomClient {
    http: Client,
    base_url: Url,
    api_key: String,
}

// The API key must never end up in logs.
impl fmt::Debug for TomTomClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TomTomClient")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &if self.api_key.is_empty() { "<unset>" } else { "<redacted>" })
            .finish()
    }
}

impl TomTomClient {
    /// Build a client from configuration.
    ///
    /// An empty API key is accepted here; every call then fails with a
    /// `NotConfigured` error instead of reaching the network.
    pub fn new(config: &MapsConfig) -> Result<Self, UpstreamError> {
        let base_url = Url::parse(config.base_url.trim()).map_err(|e| {
            tracing::error!(error = %e, "Invalid maps base URL");
            UpstreamError::not_configured("maps")
        })?;
        if base_url.cannot_be_a_base() {
            return Err(UpstreamError::not_configured("maps"));
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;

        Ok(Self {
            http,
            base_url,
            api_key: config.api_key.trim().to_string(),
        })
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// Base URL plus path segments (each percent-encoded) plus the API key.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, UpstreamError> {
        if !self.is_configured() {
            return Err(UpstreamError::not_configured("maps"));
        }
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| UpstreamError::not_configured("maps"))?
            .pop_if_empty()
            .extend(segments);
        url.query_pairs_mut().append_pair("key", &self.api_key);
        Ok(url)
    }

    pub(crate) fn search_url(&self, request: &SearchRequest) -> Result<Url, UpstreamError> {
        let mut url = self.endpoint(&["search", "2", "search", &format!("{}.json", request.query)])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("limit", &request.limit.max(1).to_string());
            if let Some(near) = request.near {
                query.append_pair("lat", &near.lat.to_string());
                query.append_pair("lon", &near.lon.to_string());
            }
        }
        Ok(url)
    }

    pub(crate) fn geocode_url(&self, address: &str) -> Result<Url, UpstreamError> {
        let mut url = self.endpoint(&["search", "2", "geocode", &format!("{address}.json")])?;
        url.query_pairs_mut().append_pair("limit", "5");
        Ok(url)
    }

    pub(crate) fn reverse_geocode_url(&self, location: LocationPoint) -> Result<Url, UpstreamError> {
        self.endpoint(&[
            "search",
            "2",
            "reverseGeocode",
            &format!("{},{}.json", location.lat, location.lon),
        ])
    }

    pub(crate) fn route_url(&self, request: &RouteRequest) -> Result<Url, UpstreamError> {
        let (o, d) = (request.origin, request.destination);
        let mut url = self.endpoint(&[
            "routing",
            "1",
            "calculateRoute",
            &format!("{},{}:{},{}", o.lat, o.lon, d.lat, d.lon),
            "json",
        ])?;
        url.query_pairs_mut()
            .append_pair("travelMode", &request.travel_mode.to_string())
            .append_pair("instructionsType", "text");
        Ok(url)
    }

    pub(crate) fn static_map_url(&self, request: &StaticMapRequest) -> Result<Url, UpstreamError> {
        let mut url = self.endpoint(&["map", "1", "staticimage"])?;
        url.query_pairs_mut()
            .append_pair("zoom", &request.zoom.min(MAX_ZOOM).to_string())
            // TomTom expects lon,lat order here.
            .append_pair("center", &format!("{},{}", request.center.lon, request.center.lat))
            .append_pair("format", "png")
            .append_pair("layer", "basic")
            .append_pair("style", "main")
            .append_pair("width", &request.width.clamp(1, MAX_IMAGE_SIDE).to_string())
            .append_pair("height", &request.height.clamp(1, MAX_IMAGE_SIDE).to_string());
        Ok(url)
    }

    /// Send a request and return the status and body text.
    async fn send(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<(u16, String), UpstreamError> {
        let started = Instant::now();
        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        tracing::debug!(
            operation,
            status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Maps call completed"
        );
        Ok((status, body))
    }

    fn decode<T: DeserializeOwned>(
        operation: &'static str,
        status: u16,
        body: &str,
    ) -> Result<T, UpstreamError> {
        if !(200..300).contains(&status) {
            tracing::warn!(
                operation,
                status,
                body = %snippet(body),
                "Maps upstream returned error status"
            );
            return Err(UpstreamError::status(status));
        }
        serde_json::from_str(body).map_err(|e| {
            tracing::warn!(operation, error = %e, "Malformed maps response");
            UpstreamError::malformed()
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        url: Url,
    ) -> Result<T, UpstreamError> {
        let (status, body) = self.send(operation, self.http.get(url)).await?;
        Self::decode(operation, status, &body)
    }
}

fn snippet(body: &str) -> String {
    body.chars().take(LOGGED_BODY_CHARS).collect()
}

#[async_trait]
impl MapsProvider for TomTomClient {
    fn name(&self) -> &str {
        "tomtom"
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<Place>, UpstreamError> {
        let url = self.search_url(request)?;
        let response: SearchResponse = self.get_json("search", url).await?;
        Ok(normalize_places(response))
    }

    async fn geocode(&self, address: &str) -> Result<Vec<GeocodeMatch>, UpstreamError> {
        let url = self.geocode_url(address)?;
        let response: SearchResponse = self.get_json("geocode", url).await?;
        Ok(normalize_geocode(response))
    }

    async fn reverse_geocode(
        &self,
        location: LocationPoint,
    ) -> Result<Vec<AddressMatch>, UpstreamError> {
        let url = self.reverse_geocode_url(location)?;
        let response: ReverseGeocodeResponse = self.get_json("reverse_geocode", url).await?;
        Ok(normalize_addresses(response))
    }

    async fn route(&self, request: &RouteRequest) -> Result<Option<RouteSummary>, UpstreamError> {
        let url = self.route_url(request)?;
        let (status, body) = self.send("route", self.http.get(url)).await?;
        if status == 400 && body.contains("NO_ROUTE_FOUND") {
            tracing::info!(travel_mode = %request.travel_mode, "No route between waypoints");
            return Ok(None);
        }
        let response: RouteResponse = Self::decode("route", status, &body)?;
        Ok(normalize_route(response))
    }

    async fn matrix(&self, request: &MatrixRequest) -> Result<Vec<MatrixCell>, UpstreamError> {
        let url = self.endpoint(&["routing", "matrix", "2"])?;
        let body = matrix_body(request);
        let (status, text) = self
            .send("matrix", self.http.post(url).json(&body))
            .await?;
        let response: MatrixResponse = Self::decode("matrix", status, &text)?;
        Ok(normalize_matrix(response))
    }

    fn static_map(&self, request: &StaticMapRequest) -> Result<StaticMapImage, UpstreamError> {
        let url = self.static_map_url(request)?;
        Ok(StaticMapImage {
            url: url.to_string(),
            center: request.center,
            zoom: request.zoom.min(MAX_ZOOM),
            width: request.width.clamp(1, MAX_IMAGE_SIDE),
            height: request.height.clamp(1, MAX_IMAGE_SIDE),
        })
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(rename = "type", default)]
    result_type: Option<String>,
    #[serde(default)]
    poi: Option<Poi>,
    #[serde(default)]
    address: Option<WireAddress>,
    #[serde(default)]
    position: Option<WirePosition>,
    #[serde(default)]
    dist: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Poi {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    categories: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireAddress {
    #[serde(default)]
    freeform_address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WirePosition {
    lat: f64,
    lon: f64,
}

impl WirePosition {
    fn to_point(&self) -> Option<LocationPoint> {
        LocationPoint::new(self.lat, self.lon).ok()
    }
}

#[derive(Debug, Deserialize)]
struct ReverseGeocodeResponse {
    #[serde(default)]
    addresses: Vec<ReverseGeocodeResult>,
}

#[derive(Debug, Deserialize)]
struct ReverseGeocodeResult {
    #[serde(default)]
    address: Option<WireAddress>,
    /// `"lat,lon"` string.
    #[serde(default)]
    position: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RouteResponse {
    #[serde(default)]
    routes: Vec<WireRoute>,
}

#[derive(Debug, Deserialize)]
struct WireRoute {
    summary: WireRouteSummary,
    #[serde(default)]
    guidance: Option<Guidance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRouteSummary {
    length_in_meters: f64,
    travel_time_in_seconds: f64,
    #[serde(default)]
    traffic_delay_in_seconds: f64,
}

#[derive(Debug, Deserialize)]
struct Guidance {
    #[serde(default)]
    instructions: Vec<Instruction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Instruction {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    route_offset_in_meters: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct MatrixResponse {
    #[serde(default)]
    data: Vec<MatrixEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MatrixEntry {
    origin_index: usize,
    destination_index: usize,
    #[serde(default)]
    route_summary: Option<MatrixSummary>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MatrixSummary {
    length_in_meters: f64,
    travel_time_in_seconds: f64,
}

// =============================================================================
// Normalization
// =============================================================================

fn freeform(address: &Option<WireAddress>) -> Option<String> {
    address
        .as_ref()
        .and_then(|a| a.freeform_address.clone())
        .filter(|s| !s.trim().is_empty())
}

fn normalize_places(response: SearchResponse) -> Vec<Place> {
    response
        .results
        .into_iter()
        .map(|r| {
            let address = freeform(&r.address);
            let (name, phone, category) = match r.poi {
                Some(poi) => (poi.name, poi.phone, poi.categories.into_iter().next()),
                None => (None, None, None),
            };
            Place {
                name: name
                    .or_else(|| address.clone())
                    .unwrap_or_else(|| "Unnamed place".to_string()),
                address,
                location: r.position.as_ref().and_then(WirePosition::to_point),
                category,
                phone,
                distance_m: r.dist,
            }
        })
        .collect()
}

fn normalize_geocode(response: SearchResponse) -> Vec<GeocodeMatch> {
    response
        .results
        .into_iter()
        .filter_map(|r| {
            let location = r.position.as_ref().and_then(WirePosition::to_point)?;
            Some(GeocodeMatch {
                formatted_address: freeform(&r.address).unwrap_or_else(|| location.to_string()),
                location,
                match_type: r.result_type,
            })
        })
        .collect()
}

fn parse_position_string(s: &str) -> Option<LocationPoint> {
    let (lat, lon) = s.split_once(',')?;
    LocationPoint::new(lat.trim().parse().ok()?, lon.trim().parse().ok()?).ok()
}

fn normalize_addresses(response: ReverseGeocodeResponse) -> Vec<AddressMatch> {
    response
        .addresses
        .into_iter()
        .filter_map(|r| {
            Some(AddressMatch {
                formatted_address: freeform(&r.address)?,
                location: r.position.as_deref().and_then(parse_position_string),
            })
        })
        .collect()
}

fn normalize_route(response: RouteResponse) -> Option<RouteSummary> {
    let route = response.routes.into_iter().next()?;
    let instructions = route.guidance.map(|g| g.instructions).unwrap_or_default();

    let offsets: Vec<Option<f64>> = instructions.iter().map(|i| i.route_offset_in_meters).collect();
    let steps = instructions
        .into_iter()
        .enumerate()
        .filter_map(|(idx, instruction)| {
            let text = instruction.message.filter(|m| !m.trim().is_empty())?;
            let distance_m = match (offsets[idx], offsets.get(idx + 1).copied().flatten()) {
                (Some(here), Some(next)) if next >= here => Some(next - here),
                _ => None,
            };
            Some(RouteStep {
                instruction: text,
                distance_m,
            })
        })
        .collect();

    Some(RouteSummary {
        distance_m: route.summary.length_in_meters,
        duration_s: route.summary.travel_time_in_seconds,
        traffic_delay_s: route.summary.traffic_delay_in_seconds,
        steps,
    })
}

fn matrix_body(request: &MatrixRequest) -> serde_json::Value {
    let points = |list: &[LocationPoint]| -> Vec<serde_json::Value> {
        list.iter()
            .map(|p| serde_json::json!({ "point": { "latitude": p.lat, "longitude": p.lon } }))
            .collect()
    };
    serde_json::json!({
        "origins": points(&request.origins),
        "destinations": points(&request.destinations),
        "options": {
            "travelMode": request.travel_mode.to_string(),
            "departAt": "now",
        },
    })
}

fn normalize_matrix(response: MatrixResponse) -> Vec<MatrixCell> {
    let mut cells: Vec<MatrixCell> = response
        .data
        .into_iter()
        .map(|entry| MatrixCell {
            origin_index: entry.origin_index,
            destination_index: entry.destination_index,
            distance_m: entry.route_summary.as_ref().map(|s| s.length_in_meters),
            duration_s: entry.route_summary.as_ref().map(|s| s.travel_time_in_seconds),
        })
        .collect();
    cells.sort_by_key(|c| (c.origin_index, c.destination_index));
    cells
}

// =============================================================================
// Tests
// =============================================================================
