//! Map lifecycle owner
//!
//! [`MapController`] wires a map handle to a [`ViewportSynchronizer`]: it
//! turns map events and UI commands into [`MapCommand`]s, debounces viewport
//! settles, and runs each refresh as its own task so a newer one can
//! supersede it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;

use crate::config::MapConfig;
use crate::geo::{Feature, FeatureSource, FilterParams};

use super::binding::ClickHook;
use super::camera::FlyToRequest;
use super::handle::{MapHandle, Subscription};
use super::pulse::PulseAnimator;
use super::selection::Selection;
use super::sync::ViewportSynchronizer;
use super::wind::WindLayer;

/// Host frame cadence offered to the pulse animation (60Hz)
const DISPLAY_FRAME: Duration = Duration::from_millis(16);

/// Inputs to the map driver
#[derive(Debug, Clone, PartialEq)]
pub enum MapCommand {
    /// Map finished its initial load
    Loaded,
    /// A move or zoom interaction settled
    ViewportSettled,
    SetFilters(FilterParams),
    /// Base style finished (re)loading; sources and layers are gone
    StyleReloaded,
    FlyTo(FlyToRequest),
    SetWindLayer(bool),
}

/// Cloneable command sender
#[derive(Debug, Clone)]
pub struct MapCommands {
    tx: mpsc::UnboundedSender<MapCommand>,
}

impl MapCommands {
    /// Returns false once the controller has been torn down.
    pub fn send(&self, command: MapCommand) -> bool {
        self.tx.send(command).is_ok()
    }

    pub fn set_filters(&self, filters: FilterParams) -> bool {
        self.send(MapCommand::SetFilters(filters))
    }

    pub fn fly_to(&self, request: FlyToRequest) -> bool {
        self.send(MapCommand::FlyTo(request))
    }

    pub fn set_wind_layer(&self, enabled: bool) -> bool {
        self.send(MapCommand::SetWindLayer(enabled))
    }
}

/// Owns the synchronizer, its event subscriptions and the driver task.
pub struct MapController<M: MapHandle, S: FeatureSource> {
    commands: MapCommands,
    synchronizer: Arc<ViewportSynchronizer<M, S>>,
    selection: Selection,
    wind: WindLayer,
    subscriptions: Vec<Subscription>,
    driver: JoinHandle<()>,
    pulse: JoinHandle<()>,
}

impl<M: MapHandle, S: FeatureSource> MapController<M, S> {
    /// Attach to `map` and start driving it. Must be called inside a tokio
    /// runtime.
    pub fn create(map: M, source: S, config: &MapConfig) -> Self {
        let selection = Selection::new();
        let on_click: ClickHook = {
            let selection = selection.clone();
            let map = map.clone();
            Arc::new(move |feature: &Feature| {
                selection.handle_click(&map, feature);
            })
        };

        let synchronizer = Arc::new(ViewportSynchronizer::new(
            map.clone(),
            source,
            config,
            on_click,
        ));
        let wind = WindLayer::new(config);

        let (tx, rx) = mpsc::unbounded_channel();
        let subscriptions = vec![
            {
                let tx = tx.clone();
                map.on_viewport_settle(Box::new(move || {
                    let _ = tx.send(MapCommand::ViewportSettled);
                }))
            },
            {
                let tx = tx.clone();
                map.on_style_loaded(Box::new(move || {
                    let _ = tx.send(MapCommand::StyleReloaded);
                }))
            },
        ];

        if map.is_style_loaded() && map.viewport().is_some() {
            let _ = tx.send(MapCommand::Loaded);
        }

        let driver = tokio::spawn(drive(
            synchronizer.clone(),
            wind.clone(),
            config.settle_debounce(),
            config.lateral_offset_ratio,
            rx,
        ));

        let pulse = tokio::spawn(
            PulseAnimator::new(&config.layer_id, config.frame_interval(), Instant::now())
                .run(map, DISPLAY_FRAME),
        );

        tracing::debug!(
            source = %config.source_name,
            debounce_ms = config.settle_debounce_ms,
            "Map controller created"
        );

        Self {
            commands: MapCommands { tx },
            synchronizer,
            selection,
            wind,
            subscriptions,
            driver,
            pulse,
        }
    }

    pub fn commands(&self) -> MapCommands {
        self.commands.clone()
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn synchronizer(&self) -> &ViewportSynchronizer<M, S> {
        &self.synchronizer
    }

    pub fn wind(&self) -> &WindLayer {
        &self.wind
    }

    /// Stop the driver, cancel the in-flight refresh and drop all handlers.
    pub async fn teardown(self) {
        drop(self.subscriptions);
        self.driver.abort();
        self.pulse.abort();
        let _ = self.driver.await;
        let _ = self.pulse.await;
        self.synchronizer.detach();
        tracing::debug!("Map controller torn down");
    }
}

async fn drive<M: MapHandle, S: FeatureSource>(
    synchronizer: Arc<ViewportSynchronizer<M, S>>,
    wind: WindLayer,
    debounce: Duration,
    lateral_offset_ratio: f64,
    mut rx: mpsc::UnboundedReceiver<MapCommand>,
) {
    let settle = tokio::time::sleep(debounce);
    tokio::pin!(settle);
    let mut settle_pending = false;
    // Dropped with the driver, which aborts any refresh still running.
    let mut refreshes = JoinSet::new();

    loop {
        tokio::select! {
            command = rx.recv() => {
                let Some(command) = command else { break };
                match command {
                    MapCommand::ViewportSettled => {
                        settle.as_mut().reset(Instant::now() + debounce);
                        settle_pending = true;
                    }
                    MapCommand::Loaded => {
                        settle_pending = false;
                        spawn_refresh(&mut refreshes, &synchronizer, "loaded");
                    }
                    MapCommand::SetFilters(filters) => {
                        synchronizer.set_filters(filters);
                        settle_pending = false;
                        spawn_refresh(&mut refreshes, &synchronizer, "filters");
                    }
                    MapCommand::StyleReloaded => {
                        synchronizer.handle_style_reloaded();
                        settle_pending = false;
                        spawn_refresh(&mut refreshes, &synchronizer, "style");
                    }
                    MapCommand::FlyTo(request) => {
                        request.apply(synchronizer.map(), lateral_offset_ratio);
                    }
                    MapCommand::SetWindLayer(enabled) => {
                        wind.set_enabled(synchronizer.map(), enabled);
                    }
                }
            }
            () = &mut settle, if settle_pending => {
                settle_pending = false;
                spawn_refresh(&mut refreshes, &synchronizer, "settle");
            }
            Some(_) = refreshes.join_next(), if !refreshes.is_empty() => {}
        }
    }

    synchronizer.cancel();
    refreshes.abort_all();
}

fn spawn_refresh<M: MapHandle, S: FeatureSource>(
    refreshes: &mut JoinSet<()>,
    synchronizer: &Arc<ViewportSynchronizer<M, S>>,
    trigger: &'static str,
) {
    let synchronizer = synchronizer.clone();
    refreshes.spawn(async move {
        let outcome = synchronizer.refresh_current().await;
        tracing::debug!(trigger, ?outcome, "Refresh finished");
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::geo::{Feature, FeatureCollection, FireProperties, Viewport, ViewportQuery};
    use crate::lock;
    use crate::map::{CameraMove, InMemoryMap};
    use std::future::Future;
    use std::sync::Mutex;

    /// Answers every query immediately with one point and records it.
    #[derive(Clone, Default)]
    struct RecordingSource {
        queries: Arc<Mutex<Vec<ViewportQuery>>>,
    }

    impl RecordingSource {
        fn queries(&self) -> Vec<ViewportQuery> {
            lock(&self.queries).clone()
        }
    }

    impl FeatureSource for RecordingSource {
        fn fetch(
            &self,
            query: &ViewportQuery,
        ) -> impl Future<Output = Result<serde_json::Value>> + Send {
            lock(&self.queries).push(query.clone());
            async move {
                let collection = FeatureCollection::new(vec![Feature::new(
                    1,
                    0.5,
                    0.5,
                    FireProperties::default(),
                )]);
                Ok(serde_json::to_value(collection)?)
            }
        }
    }

    fn viewport(min_lat: f64) -> Viewport {
        Viewport::new(min_lat, min_lat + 10.0, 0.0, 10.0).unwrap()
    }

    async fn run_pending() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pans_within_window_coalesce() {
        let map = InMemoryMap::new(viewport(0.0), "style");
        let source = RecordingSource::default();
        let controller = MapController::create(map.clone(), source.clone(), &MapConfig::default());

        run_pending().await;
        assert_eq!(source.queries().len(), 1, "initial load refresh");

        map.pan_to(viewport(20.0));
        run_pending().await;
        tokio::time::advance(Duration::from_millis(200)).await;
        map.pan_to(viewport(40.0));
        run_pending().await;

        tokio::time::advance(Duration::from_millis(499)).await;
        run_pending().await;
        assert_eq!(source.queries().len(), 1);

        tokio::time::advance(Duration::from_millis(2)).await;
        run_pending().await;

        let queries = source.queries();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[1].viewport, viewport(40.0));

        controller.teardown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_pan_refreshes_after_quiet_window() {
        let map = InMemoryMap::new(viewport(0.0), "style");
        let source = RecordingSource::default();
        let controller = MapController::create(map.clone(), source.clone(), &MapConfig::default());
        run_pending().await;

        map.pan_to(viewport(30.0));
        run_pending().await;
        tokio::time::advance(Duration::from_millis(501)).await;
        run_pending().await;

        let queries = source.queries();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[1].viewport, viewport(30.0));
        assert_eq!(map.layer_adds(), 1);

        controller.teardown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_filter_change_refreshes_immediately() {
        let map = InMemoryMap::new(viewport(0.0), "style");
        let source = RecordingSource::default();
        let controller = MapController::create(map.clone(), source.clone(), &MapConfig::default());
        run_pending().await;

        controller
            .commands()
            .set_filters(FilterParams::new().with("daynight", Some("N".into())));
        run_pending().await;

        let queries = source.queries();
        assert_eq!(queries.len(), 2);
        assert!(queries[1].to_query_string().ends_with("daynight=N"));

        controller.teardown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_uninitialized_map_waits_for_style_load() {
        let map = InMemoryMap::uninitialized("style");
        let source = RecordingSource::default();
        let controller = MapController::create(map.clone(), source.clone(), &MapConfig::default());
        run_pending().await;
        assert!(source.queries().is_empty());

        map.set_viewport(viewport(0.0));
        map.finish_style_load();
        run_pending().await;

        assert_eq!(source.queries().len(), 1);
        assert!(map.has_layer("fire_points_layer"));

        controller.teardown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_click_selects_and_flies() {
        let map = InMemoryMap::new(viewport(0.0), "style");
        let source = RecordingSource::default();
        let controller = MapController::create(map.clone(), source.clone(), &MapConfig::default());
        run_pending().await;

        let feature = Feature::new(
            9,
            3.0,
            4.0,
            FireProperties {
                acq_date: "2024-03-01".to_string(),
                acq_time: 930,
                ..Default::default()
            },
        );
        assert!(map.click("fire_points_layer", &feature));

        let selected = controller.selection().current().unwrap();
        assert_eq!(selected.id, 9);
        assert_eq!(selected.date_time, "2024-03-01 09:30:00");
        assert!(matches!(map.camera_moves().last(), Some(CameraMove::FlyTo(_))));

        controller.teardown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_fly_to_command_pads_right() {
        let map = InMemoryMap::new(viewport(0.0), "style");
        map.set_container_width(1000.0);
        let controller =
            MapController::create(map.clone(), RecordingSource::default(), &MapConfig::default());

        controller.commands().fly_to(FlyToRequest::new(5.0, 6.0, 20.0));
        run_pending().await;

        match map.camera_moves().last() {
            Some(CameraMove::FlyTo(target)) => {
                assert_eq!(target.zoom, 10.0);
                assert_eq!(target.padding.map(|p| p.right), Some(300.0));
            }
            other => panic!("unexpected camera move {:?}", other),
        }

        controller.teardown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_unsubscribes() {
        let map = InMemoryMap::new(viewport(0.0), "style");
        let source = RecordingSource::default();
        let controller = MapController::create(map.clone(), source.clone(), &MapConfig::default());
        let commands = controller.commands();
        run_pending().await;
        assert_eq!(map.settle_handler_count(), 1);
        assert_eq!(map.click_handler_count("fire_points_layer"), 1);

        controller.teardown().await;

        assert_eq!(map.settle_handler_count(), 0);
        assert_eq!(map.style_handler_count(), 0);
        assert_eq!(map.click_handler_count("fire_points_layer"), 0);
        assert!(!commands.set_wind_layer(true));
    }

    /// Holds every fetch until the test releases it.
    #[derive(Clone)]
    struct GatedSource {
        gate: Arc<tokio::sync::Semaphore>,
        inner: RecordingSource,
    }

    impl GatedSource {
        fn new() -> Self {
            Self {
                gate: Arc::new(tokio::sync::Semaphore::new(0)),
                inner: RecordingSource::default(),
            }
        }

        fn open(&self) {
            self.gate.add_permits(16);
        }
    }

    impl FeatureSource for GatedSource {
        fn fetch(
            &self,
            query: &ViewportQuery,
        ) -> impl Future<Output = Result<serde_json::Value>> + Send {
            let gate = self.gate.clone();
            let reply = self.inner.fetch(query);
            async move {
                let _permit = gate.acquire_owned().await;
                reply.await
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_stops_pending_refreshes() {
        let map = InMemoryMap::new(viewport(0.0), "style");
        let source = GatedSource::new();
        let controller = MapController::create(map.clone(), source.clone(), &MapConfig::default());
        let commands = controller.commands();
        run_pending().await;
        assert!(controller.synchronizer().is_loading());

        // Queue another refresh and tear down before it can run.
        assert!(commands.set_filters(FilterParams::new().with("daynight", Some("N".into()))));
        tokio::task::yield_now().await;
        controller.teardown().await;

        source.open();
        run_pending().await;

        assert!(!map.has_source("fire_points"));
        assert_eq!(map.layer_adds(), 0);
        assert_eq!(map.click_handler_count("fire_points_layer"), 0);
    }
}
