//! Maps capability provider trait.
//!
//! Each operation maps to exactly one upstream call. Waypoints given as text
//! are resolved by the caller through [`MapsProvider::geocode`] before a
//! route or matrix is requested.

use async_trait::async_trait;
use wayfinder_core::LocationPoint;

use crate::error::UpstreamError;
use crate::types::{
    AddressMatch, GeocodeMatch, MatrixCell, MatrixRequest, Place, RouteRequest, RouteSummary,
    SearchRequest, StaticMapImage, StaticMapRequest,
};

/// Trait implemented by every maps backend.
#[async_trait]
pub trait MapsProvider: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Free-text place search, optionally biased towards a point.
    async fn search(&self, request: &SearchRequest) -> Result<Vec<Place>, UpstreamError>;

    /// Address to coordinates.
    async fn geocode(&self, address: &str) -> Result<Vec<GeocodeMatch>, UpstreamError>;

    /// Coordinates to address.
    async fn reverse_geocode(
        &self,
        location: LocationPoint,
    ) -> Result<Vec<AddressMatch>, UpstreamError>;

    /// Route between two points. `Ok(None)` when the backend finds no route.
    async fn route(&self, request: &RouteRequest) -> Result<Option<RouteSummary>, UpstreamError>;

    /// Distance/time for every origin/destination pair.
    async fn matrix(&self, request: &MatrixRequest) -> Result<Vec<MatrixCell>, UpstreamError>;

    /// Build a static map image URL. No network call is made.
    fn static_map(&self, request: &StaticMapRequest) -> Result<StaticMapImage, UpstreamError>;
}
