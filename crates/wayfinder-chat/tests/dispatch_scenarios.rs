//! End-to-end dispatch scenarios.
//!
//! Every test drives `Dispatcher::handle` against a fake maps provider that
//! counts calls and records requests, plus the rule-based responder.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use wayfinder_chat::{Dispatcher, ReplyOutcome, Role, SessionStore, GENERIC_FAILURE_REPLY};
use wayfinder_core::{Capability, LocationPoint, WayfinderConfig};
use wayfinder_provider::{
    AddressMatch, GeocodeMatch, MapsProvider, MatrixCell, MatrixRequest, Place, RouteRequest,
    RouteStep, RouteSummary, RuleResponder, SearchRequest, StaticMapImage, StaticMapRequest,
    UpstreamError,
};

// =============================================================================
// Fake provider
// =============================================================================

#[derive(Default)]
struct FakeMaps {
    calls: AtomicUsize,
    geocodes: AtomicUsize,
    searches: Mutex<Vec<SearchRequest>>,
    routes: Mutex<Vec<RouteRequest>>,
    search_places: usize,
    fail_search: Option<UpstreamError>,
}

impl FakeMaps {
    fn with_places(n: usize) -> Self {
        Self {
            search_places: n,
            ..Self::default()
        }
    }

    fn failing(err: UpstreamError) -> Self {
        Self {
            fail_search: Some(err),
            ..Self::default()
        }
    }

    fn total_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

fn point(lat: f64, lon: f64) -> LocationPoint {
    LocationPoint::new(lat, lon).unwrap()
}

/// Known places resolve to fixed points; "Atlantis" never resolves.
fn known_place(name: &str) -> Option<LocationPoint> {
    match name.to_lowercase().as_str() {
        "seattle" => Some(point(47.6062, -122.3321)),
        "portland" => Some(point(45.5152, -122.6784)),
        "tacoma" => Some(point(47.2529, -122.4443)),
        "atlantis" => None,
        _ => Some(point(47.6097, -122.3422)),
    }
}

#[async_trait]
impl MapsProvider for FakeMaps {
    fn name(&self) -> &str {
        "fake"
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<Place>, UpstreamError> {
        self.hit();
        self.searches.lock().unwrap().push(request.clone());
        if let Some(err) = &self.fail_search {
            return Err(err.clone());
        }
        Ok((0..self.search_places)
            .map(|i| Place {
                name: format!("Cafe {i}"),
                address: Some(format!("{i} Pike St, Seattle")),
                location: request.near,
                category: Some("coffee shop".to_string()),
                phone: None,
                distance_m: Some(100.0 * (i + 1) as f64),
            })
            .collect())
    }

    async fn geocode(&self, address: &str) -> Result<Vec<GeocodeMatch>, UpstreamError> {
        self.hit();
        self.geocodes.fetch_add(1, Ordering::SeqCst);
        Ok(known_place(address)
            .map(|location| GeocodeMatch {
                formatted_address: format!("{address}, WA"),
                location,
                match_type: Some("Geography".to_string()),
            })
            .into_iter()
            .collect())
    }

    async fn reverse_geocode(
        &self,
        location: LocationPoint,
    ) -> Result<Vec<AddressMatch>, UpstreamError> {
        self.hit();
        Ok(vec![AddressMatch {
            formatted_address: "400 Broad St, Seattle, WA 98109".to_string(),
            location: Some(location),
        }])
    }

    async fn route(&self, request: &RouteRequest) -> Result<Option<RouteSummary>, UpstreamError> {
        self.hit();
        self.routes.lock().unwrap().push(*request);
        Ok(Some(RouteSummary {
            distance_m: 279_500.0,
            duration_s: 10_260.0,
            traffic_delay_s: 0.0,
            steps: vec![
                RouteStep {
                    instruction: "Head south on 4th Ave".to_string(),
                    distance_m: Some(800.0),
                },
                RouteStep {
                    instruction: "Take I-5 S".to_string(),
                    distance_m: Some(278_000.0),
                },
            ],
        }))
    }

    async fn matrix(&self, request: &MatrixRequest) -> Result<Vec<MatrixCell>, UpstreamError> {
        self.hit();
        let mut cells = Vec::new();
        for origin_index in 0..request.origins.len() {
            for destination_index in 0..request.destinations.len() {
                cells.push(MatrixCell {
                    origin_index,
                    destination_index,
                    distance_m: Some(1000.0 * (origin_index + destination_index + 1) as f64),
                    duration_s: Some(600.0),
                });
            }
        }
        Ok(cells)
    }

    fn static_map(&self, request: &StaticMapRequest) -> Result<StaticMapImage, UpstreamError> {
        self.hit();
        Ok(StaticMapImage {
            url: format!(
                "https://maps.example/static?center={},{}&zoom={}",
                request.center.lon, request.center.lat, request.zoom
            ),
            center: request.center,
            zoom: request.zoom,
            width: request.width,
            height: request.height,
        })
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn dispatcher_with(maps: Arc<FakeMaps>) -> Dispatcher {
    Dispatcher::new(
        &WayfinderConfig::default(),
        maps,
        Arc::new(RuleResponder),
        Arc::new(SessionStore::new()),
    )
}

// =============================================================================
// Routing scenarios
// =============================================================================

#[tokio::test]
async fn test_coffee_search_near_coordinates() {
    let maps = Arc::new(FakeMaps::with_places(2));
    let dispatcher = dispatcher_with(maps.clone());

    let bundle = dispatcher
        .handle("alice", "Find coffee shops near 47.6062, -122.3321")
        .await;

    assert_eq!(bundle.classification_label, Capability::Search);
    assert_eq!(bundle.capability_used, Some(Capability::Search));
    assert_eq!(bundle.outcome, ReplyOutcome::Answered);
    assert!(bundle.reply.starts_with("I found 2 places for 'coffee'"));

    let searches = maps.searches.lock().unwrap();
    assert_eq!(searches.len(), 1);
    assert_eq!(searches[0].query, "coffee");
    assert_eq!(searches[0].near, Some(point(47.6062, -122.3321)));
}

#[tokio::test]
async fn test_directions_seattle_to_portland() {
    let maps = Arc::new(FakeMaps::default());
    let dispatcher = dispatcher_with(maps.clone());

    let bundle = dispatcher
        .handle("alice", "How do I get from Seattle to Portland?")
        .await;

    assert_eq!(bundle.classification_label, Capability::Directions);
    assert_eq!(bundle.capability_used, Some(Capability::Directions));
    assert!(bundle
        .reply
        .starts_with("Route from Seattle to Portland (driving):"));
    assert!(bundle.reply.contains("Distance: 279.5 km"));
    assert!(bundle.reply.contains("1. Head south on 4th Ave (800 m)"));

    assert_eq!(maps.geocodes.load(Ordering::SeqCst), 2);
    let routes = maps.routes.lock().unwrap();
    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0].origin, point(47.6062, -122.3321));
    assert_eq!(routes[0].destination, point(45.5152, -122.6784));
    assert!(maps.searches.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_unresolved_waypoint_skips_routing() {
    let maps = Arc::new(FakeMaps::default());
    let dispatcher = dispatcher_with(maps.clone());

    let bundle = dispatcher
        .handle("alice", "Directions from Seattle to Atlantis")
        .await;

    assert_eq!(bundle.outcome, ReplyOutcome::Empty);
    assert!(bundle.reply.contains("'Atlantis'"));
    assert!(maps.routes.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_greeting_makes_no_maps_call() {
    let maps = Arc::new(FakeMaps::default());
    let dispatcher = dispatcher_with(maps.clone());

    let bundle = dispatcher.handle("alice", "Hello!").await;

    assert_eq!(bundle.classification_label, Capability::General);
    assert_eq!(bundle.capability_used, Some(Capability::General));
    assert!(bundle.reply.starts_with("Hello! I'm your maps assistant."));
    assert_eq!(maps.total_calls(), 0);
}

#[tokio::test]
async fn test_matrix_uses_user_labels() {
    let maps = Arc::new(FakeMaps::default());
    let dispatcher = dispatcher_with(maps.clone());

    let bundle = dispatcher
        .handle("alice", "Travel times from Seattle, Tacoma to Portland")
        .await;

    assert_eq!(bundle.capability_used, Some(Capability::Matrix));
    assert!(bundle.reply.contains("- Seattle to Portland: 1.0 km, 10 min"));
    assert!(bundle.reply.contains("- Tacoma to Portland: 2.0 km, 10 min"));
}

#[tokio::test]
async fn test_reverse_geocode_and_static_map() {
    let maps = Arc::new(FakeMaps::default());
    let dispatcher = dispatcher_with(maps.clone());

    let bundle = dispatcher.handle("alice", "What's at 47.6205, -122.3493?").await;
    assert_eq!(bundle.capability_used, Some(Capability::ReverseGeocode));
    assert!(bundle.reply.contains("400 Broad St"));

    let bundle = dispatcher
        .handle("alice", "Show me a map of 47.6062, -122.3321")
        .await;
    assert_eq!(bundle.capability_used, Some(Capability::StaticMap));
    assert!(bundle.reply.contains("https://maps.example/static?center=-122.3321,47.6062&zoom=15"));
}

// =============================================================================
// Failure handling
// =============================================================================

#[tokio::test]
async fn test_upstream_error_reply_has_only_apology() {
    let err = UpstreamError::status(503);
    let maps = Arc::new(FakeMaps::failing(err.clone()));
    let dispatcher = dispatcher_with(maps.clone());

    let bundle = dispatcher
        .handle("alice", "Find restaurants near 47.6062, -122.3321")
        .await;

    assert_eq!(bundle.outcome, ReplyOutcome::UpstreamError);
    assert_eq!(
        bundle.reply,
        format!("Sorry, I couldn't search for places right now. {}", err.message)
    );
    assert!(!bundle.reply.contains("503"));
}

#[tokio::test]
async fn test_empty_result_differs_from_error() {
    let empty = dispatcher_with(Arc::new(FakeMaps::with_places(0)))
        .handle("alice", "Find coffee near 47.6062, -122.3321")
        .await;
    let failed = dispatcher_with(Arc::new(FakeMaps::failing(UpstreamError::timeout())))
        .handle("alice", "Find coffee near 47.6062, -122.3321")
        .await;

    assert_eq!(empty.outcome, ReplyOutcome::Empty);
    assert_eq!(failed.outcome, ReplyOutcome::UpstreamError);
    assert_ne!(empty.reply, failed.reply);
    assert!(failed.reply.contains("temporarily unavailable"));
}

#[tokio::test]
async fn test_missing_origin_asks_without_calling_provider() {
    let maps = Arc::new(FakeMaps::default());
    let dispatcher = dispatcher_with(maps.clone());

    let bundle = dispatcher.handle("alice", "How do I get to Portland?").await;

    assert_eq!(bundle.outcome, ReplyOutcome::Clarification);
    assert_eq!(bundle.capability_used, None);
    assert_eq!(bundle.classification_label, Capability::Directions);
    assert!(bundle.reply.contains("Portland"));
    assert_eq!(maps.total_calls(), 0);
}

#[tokio::test]
async fn test_search_near_me_without_location_asks() {
    let maps = Arc::new(FakeMaps::with_places(3));
    let dispatcher = dispatcher_with(maps.clone());

    let bundle = dispatcher.handle("erin", "Find coffee near me").await;

    assert_eq!(bundle.classification_label, Capability::Search);
    assert_eq!(bundle.outcome, ReplyOutcome::Clarification);
    assert_eq!(bundle.capability_used, None);
    assert!(bundle
        .reply
        .starts_with("I can help you find coffee, but I need a location"));
    assert_eq!(maps.searches.lock().unwrap().len(), 0);
    assert_eq!(maps.total_calls(), 0);
}

#[tokio::test]
async fn test_overlong_message_rejected() {
    let maps = Arc::new(FakeMaps::default());
    let dispatcher = dispatcher_with(maps.clone());

    let text = "find coffee ".repeat(200);
    let bundle = dispatcher.handle("alice", &text).await;

    assert_eq!(bundle.outcome, ReplyOutcome::Clarification);
    assert!(bundle.reply.contains("under 2000 characters"));
    assert_ne!(bundle.reply, GENERIC_FAILURE_REPLY);
    assert_eq!(maps.total_calls(), 0);
}

// =============================================================================
// Context and history
// =============================================================================

#[tokio::test]
async fn test_context_merge_and_fallback_location() {
    let maps = Arc::new(FakeMaps::with_places(1));
    let dispatcher = dispatcher_with(maps.clone());

    dispatcher
        .set_context("bob", json!({"a": 1}).as_object().unwrap().clone())
        .unwrap();
    let merged = dispatcher
        .set_context(
            "bob",
            json!({"b": 2, "current_location": {"lat": 47.6062, "lon": -122.3321}})
                .as_object()
                .unwrap()
                .clone(),
        )
        .unwrap();
    assert_eq!(merged.get("a"), Some(&json!(1)));
    assert_eq!(merged.get("b"), Some(&json!(2)));

    let bundle = dispatcher.handle("bob", "Find coffee near me").await;
    assert_eq!(bundle.capability_used, Some(Capability::Search));
    let searches = maps.searches.lock().unwrap();
    assert_eq!(searches[0].near, Some(point(47.6062, -122.3321)));
}

#[tokio::test]
async fn test_context_commands() {
    let maps = Arc::new(FakeMaps::default());
    let dispatcher = dispatcher_with(maps.clone());

    let bundle = dispatcher
        .handle("carol", "Remember my location is 47.6062, -122.3321")
        .await;
    assert_eq!(bundle.classification_label, Capability::Context);
    assert_eq!(bundle.capability_used, Some(Capability::Context));
    assert_eq!(bundle.confidence, 1.0);
    assert_eq!(maps.total_calls(), 0);

    let context = dispatcher.store().get_context("carol").unwrap();
    assert_eq!(context.current_location(), Some(point(47.6062, -122.3321)));

    let bundle = dispatcher.handle("carol", "I'm in Pike Place Market").await;
    assert!(bundle.reply.contains("Pike Place Market"));
    assert_eq!(maps.geocodes.load(Ordering::SeqCst), 1);
    let context = dispatcher.store().get_context("carol").unwrap();
    assert_eq!(context.current_location(), Some(point(47.6097, -122.3422)));

    dispatcher
        .handle("carol", "Remember that my favorite cuisine is Thai")
        .await;
    let context = dispatcher.store().get_context("carol").unwrap();
    assert_eq!(context.preferences().get("favorite_cuisine"), Some(&json!("Thai")));

    let bundle = dispatcher.handle("carol", "forget my location").await;
    assert_eq!(bundle.reply, "Done. I've forgotten your location.");
    let context = dispatcher.store().get_context("carol").unwrap();
    assert!(context.current_location().is_none());
    assert!(!context.preferences().is_empty());

    let bundle = dispatcher.handle("carol", "I'm at Atlantis").await;
    assert_eq!(bundle.outcome, ReplyOutcome::Empty);
    assert!(dispatcher
        .store()
        .get_context("carol")
        .unwrap()
        .current_location()
        .is_none());
}

#[tokio::test]
async fn test_location_statement_with_request_runs_the_request() {
    let maps = Arc::new(FakeMaps::with_places(1));
    let dispatcher = dispatcher_with(maps.clone());

    let bundle = dispatcher
        .handle("frank", "I'm at 47.6062, -122.3321 and need directions to Portland")
        .await;
    assert_eq!(bundle.classification_label, Capability::Directions);
    assert_eq!(bundle.capability_used, Some(Capability::Directions));
    {
        let routes = maps.routes.lock().unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].origin, point(47.6062, -122.3321));
        assert_eq!(routes[0].destination, point(45.5152, -122.6784));
    }

    let bundle = dispatcher
        .handle("frank", "I am in need of a hotel near 47.6062, -122.3321")
        .await;
    assert_eq!(bundle.classification_label, Capability::Search);
    assert_eq!(bundle.capability_used, Some(Capability::Search));
    {
        let searches = maps.searches.lock().unwrap();
        assert_eq!(searches.len(), 1);
        assert_eq!(searches[0].near, Some(point(47.6062, -122.3321)));
    }

    let bundle = dispatcher
        .handle("frank", "I'm in Seattle, how do I get to Portland")
        .await;
    assert_eq!(bundle.classification_label, Capability::Directions);
    assert_ne!(bundle.capability_used, Some(Capability::Context));

    // None of the three messages stored a location.
    let context = dispatcher.store().get_context("frank").unwrap();
    assert!(context.current_location().is_none());
}

#[tokio::test]
async fn test_log_records_turns_in_order() {
    let dispatcher = dispatcher_with(Arc::new(FakeMaps::default()));

    for text in ["Hello!", "help", "Tell me a joke"] {
        dispatcher.handle("dave", text).await;
    }

    let all = dispatcher.store().get_log("dave", None).unwrap();
    assert_eq!(all.len(), 6);
    assert_eq!(all[0].role, Role::User);
    assert_eq!(all[0].text, "Hello!");
    assert_eq!(all[1].role, Role::Assistant);
    assert_eq!(all[1].classification_label, Some(Capability::General));

    let last_two = dispatcher.store().get_log("dave", Some(2)).unwrap();
    assert_eq!(last_two.len(), 2);
    assert_eq!(last_two[0].text, "Tell me a joke");
    assert_eq!(last_two[1].role, Role::Assistant);

    let beyond = dispatcher.store().get_log("dave", Some(50)).unwrap();
    assert_eq!(beyond, all);

    let default = dispatcher.history("dave", None).unwrap();
    assert_eq!(default.len(), 6);
    assert!(dispatcher.store().get_log("nobody", None).unwrap().is_empty());
}

#[tokio::test]
async fn test_concurrent_users_are_independent() {
    let dispatcher = Arc::new(dispatcher_with(Arc::new(FakeMaps::with_places(1))));

    let mut handles = Vec::new();
    for i in 0..8 {
        let dispatcher = Arc::clone(&dispatcher);
        handles.push(tokio::spawn(async move {
            let user = format!("user-{i}");
            dispatcher
                .handle(&user, "Find coffee near 47.6062, -122.3321")
                .await;
            dispatcher.handle(&user, "Hello!").await;
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(dispatcher.store().user_count(), 8);
    for i in 0..8 {
        let log = dispatcher.store().get_log(&format!("user-{i}"), None).unwrap();
        assert_eq!(log.len(), 4);
        assert_eq!(log[0].text, "Find coffee near 47.6062, -122.3321");
        assert_eq!(log[2].text, "Hello!");
    }
}
