//! Integration tests for the stream decoder and the viewport synchronizer
//!
//! These tests use fixture files in `tests/fixtures/` to drive the public
//! API end to end: a recorded workflow event stream and a geo-query
//! response.

use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use firelens_core::chart::ChartReport;
use firelens_core::chat::{
    ChatRequest, ChatStream, ChatTransport, ConversationManager, ConversationStatus,
    ConversationStore, SessionUpdate, StreamSession, TurnOutcome,
};
use firelens_core::config::{ChatConfig, MapConfig};
use firelens_core::geo::{FeatureSource, FilterParams, Viewport, ViewportQuery};
use firelens_core::map::{
    ClickHook, InMemoryMap, MapCommand, MapController, MapHandle, RefreshOutcome, Selection,
    ViewportSynchronizer,
};
use firelens_core::Result;

/// Get the path to a fixture file
fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn read_fixture(name: &str) -> String {
    std::fs::read_to_string(fixture_path(name)).unwrap()
}

const EXPECTED_ANSWER: &str = "Four active fire points were detected west of Sydney; risk is high.";
const EXPECTED_REASONING: &str = "Four hotspots near the Blue Mountains. Check FRP spread.";

// ============================================
// Stream decoding
// ============================================

#[test]
fn test_decode_recorded_stream() {
    let stream = read_fixture("chat/workflow-stream.txt");
    let mut session = StreamSession::new(&ChatConfig::default());

    let mut updates = session.feed_str(&stream);
    updates.extend(session.finish());

    assert_eq!(session.answer_text(), EXPECTED_ANSWER);
    assert_eq!(session.reasoning_text(), EXPECTED_REASONING);
    assert!(session.is_completed());

    let payload = updates.iter().find_map(|u| match u {
        SessionUpdate::Payload { data, answer_text } => Some((data, answer_text)),
        _ => None,
    });
    let (data, answer_text) = payload.expect("payload update");
    assert_eq!(answer_text, EXPECTED_ANSWER);
    assert_eq!(data["analysis_valid"], true);
}

#[test]
fn test_chunking_does_not_change_result() {
    let stream = read_fixture("chat/workflow-stream.txt");
    let bytes = stream.as_bytes();

    for size in [1, 3, 7, 64, 1024] {
        let mut session = StreamSession::new(&ChatConfig::default());
        for chunk in bytes.chunks(size) {
            session.feed(chunk);
        }
        session.finish();

        assert_eq!(session.answer_text(), EXPECTED_ANSWER, "chunk size {}", size);
        assert_eq!(session.reasoning_text(), EXPECTED_REASONING, "chunk size {}", size);
        assert!(session.chart_data().is_some());
    }
}

#[test]
fn test_recorded_report_drives_charts() {
    let stream = read_fixture("chat/workflow-stream.txt");
    let mut session = StreamSession::new(&ChatConfig::default());
    session.feed_str(&stream);

    let report = ChartReport::from_payload(session.chart_data().unwrap()).unwrap();
    assert_eq!(report.text_report.risk_level, "high");
    assert_eq!(report.viz_data.scatter_chart.len(), 4);

    let quadrants = report.quadrants();
    assert_eq!(
        quadrants.top_right + quadrants.top_left + quadrants.bottom_right + quadrants.bottom_left,
        4
    );

    let flights: Vec<_> = report
        .viz_data
        .scatter_chart
        .iter()
        .filter_map(|p| p.fly_to())
        .collect();
    assert_eq!(flights.len(), 3);
    assert_eq!(flights[0].zoom(), 12.0);
}

/// Replays a byte buffer in fixed-size chunks.
#[derive(Clone)]
struct ReplayTransport {
    body: Bytes,
    chunk: usize,
}

impl ChatTransport for ReplayTransport {
    fn open(&self, _request: &ChatRequest) -> impl Future<Output = Result<ChatStream>> + Send {
        let chunks: Vec<Result<Bytes>> = self
            .body
            .chunks(self.chunk)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        async move { Ok(Box::pin(futures_util::stream::iter(chunks)) as ChatStream) }
    }
}

#[tokio::test]
async fn test_conversation_turn_from_recording() {
    firelens_core::logging::init_test();
    let transport = ReplayTransport {
        body: Bytes::from(read_fixture("chat/workflow-stream.txt")),
        chunk: 17,
    };
    let store = ConversationStore::new();
    let manager = ConversationManager::new(transport, store.clone(), ChatConfig::default(), "test-user");
    let id = store.create("New chat");

    let outcome = manager
        .send_message(&id, "Any fires near Sydney?")
        .await
        .unwrap();

    assert_eq!(outcome, TurnOutcome::Completed);
    let conversation = store.get(&id).unwrap();
    assert_eq!(conversation.status, ConversationStatus::Idle);
    assert_eq!(conversation.title, "Any fires near Sydne");
    let agent = conversation.last_message().unwrap();
    assert_eq!(agent.content, EXPECTED_ANSWER);
    assert_eq!(agent.reasoning, EXPECTED_REASONING);
    assert!(!agent.is_thinking);
    assert!(agent.chart_data.is_some());
}

// ============================================
// Viewport synchronization
// ============================================

/// Serves the fixture response and records queries.
#[derive(Clone)]
struct FixtureSource {
    body: serde_json::Value,
    queries: Arc<Mutex<Vec<String>>>,
}

impl FixtureSource {
    fn new(body: serde_json::Value) -> Self {
        Self {
            body,
            queries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

impl FeatureSource for FixtureSource {
    fn fetch(
        &self,
        query: &ViewportQuery,
    ) -> impl Future<Output = Result<serde_json::Value>> + Send {
        self.queries.lock().unwrap().push(query.to_query_string());
        let body = self.body.clone();
        async move { Ok(body) }
    }
}

fn fire_points() -> serde_json::Value {
    serde_json::from_str(&read_fixture("map/fire-points.json")).unwrap()
}

fn sydney() -> Viewport {
    Viewport::new(-35.0, -33.0, 149.5, 151.5).unwrap()
}

#[tokio::test]
async fn test_refresh_then_click_fixture_point() {
    let map = InMemoryMap::new(sydney(), "mapbox://styles/mapbox/standard");
    let source = FixtureSource::new(fire_points());
    let selection = Selection::new();
    let on_click = {
        let selection = selection.clone();
        let map = map.clone();
        Arc::new(move |f: &firelens_core::geo::Feature| {
            selection.handle_click(&map, f);
        })
    };
    let sync = ViewportSynchronizer::new(map.clone(), source.clone(), &MapConfig::default(), on_click);

    let filters = FilterParams::new()
        .with("confidence", None)
        .with("daynight", Some("D".into()));
    let outcome = sync.refresh(map.viewport(), filters).await;

    assert_eq!(
        outcome,
        RefreshOutcome::Applied {
            created: true,
            features: 3
        }
    );
    let query = &source.queries()[0];
    assert!(query.starts_with("minLat=-35&maxLat=-33&minLon=149.5&maxLon=151.5"));
    assert!(query.contains("daynight=D"));
    assert!(!query.contains("confidence"));

    let data = map.source_data("fire_points").unwrap();
    let first = data.features[0].clone();
    assert!(map.click("fire_points_layer", &first));

    let selected = selection.current().unwrap();
    assert_eq!(selected.id, 101);
    assert_eq!(selected.date_time, "2024-03-01 09:30:00");
    assert!((selected.ndvi - 0.712).abs() < 1e-9);
}

#[tokio::test]
async fn test_malformed_after_success_keeps_points() {
    firelens_core::logging::init_test();
    let map = InMemoryMap::new(sydney(), "style");
    let good = FixtureSource::new(fire_points());
    let sync = ViewportSynchronizer::new(map.clone(), good, &MapConfig::default(), noop_click());
    sync.refresh_current().await;
    let before = map.source_data("fire_points");

    for body in [serde_json::json!({}), serde_json::json!({ "features": "not-an-array" })] {
        let bad = FixtureSource::new(body);
        let sync_bad =
            ViewportSynchronizer::new(map.clone(), bad, &MapConfig::default(), noop_click());
        assert_eq!(sync_bad.refresh_current().await, RefreshOutcome::Malformed);
    }

    assert_eq!(map.source_data("fire_points"), before);
    assert_eq!(map.layer_adds(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_controller_rebinds_after_wind_toggle() {
    firelens_core::logging::init_test();
    let config = MapConfig::default();
    let map = InMemoryMap::new(sydney(), &config.base_style);
    let source = FixtureSource::new(fire_points());
    let controller = MapController::create(map.clone(), source.clone(), &config);
    let settle = || async {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    };
    settle().await;
    assert_eq!(map.layer_adds(), 1);

    assert!(controller.commands().send(MapCommand::SetWindLayer(true)));
    settle().await;
    assert_eq!(map.style_url(), config.wind_style);
    assert!(!map.has_source("fire_points"));

    map.finish_style_load();
    settle().await;

    assert!(map.has_layer("wind-layer"));
    assert!(map.has_layer("fire_points_layer"));
    assert_eq!(map.layer_adds(), 3);
    assert_eq!(map.click_handler_count("fire_points_layer"), 1);
    assert_eq!(source.queries().len(), 2);

    controller.teardown().await;
}

fn noop_click() -> ClickHook {
    Arc::new(|_: &firelens_core::geo::Feature| {})
}
