//! Headless [`MapHandle`] implementation
//!
//! Keeps sources, layers, camera requests and registered callbacks in memory
//! and lets the caller fire map events by hand. The CLI uses it to run the
//! synchronizer without a renderer; tests use its counters to observe what
//! the synchronizer did.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::geo::{Feature, FeatureCollection, Viewport};

use super::handle::{
    CameraTarget, EventHandler, FeatureHandler, Fog, LayerSpec, MapHandle, OnceHandler,
    PointerEvent, SourceSpec, Subscription,
};

/// Camera request recorded by [`InMemoryMap`]
#[derive(Debug, Clone, PartialEq)]
pub enum CameraMove {
    FlyTo(CameraTarget),
    EaseTo(CameraTarget),
}

type SharedFeatureHandler = Arc<dyn Fn(&Feature) + Send + Sync>;
type SharedEventHandler = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Handlers {
    click: HashMap<u64, (String, SharedFeatureHandler)>,
    pointer: HashMap<u64, (String, PointerEvent, SharedEventHandler)>,
    settle: HashMap<u64, SharedEventHandler>,
    style_loaded: HashMap<u64, SharedEventHandler>,
    style_loaded_once: Vec<OnceHandler>,
}

struct State {
    viewport: Option<Viewport>,
    sources: HashMap<String, SourceSpec>,
    layers: Vec<LayerSpec>,
    paint: HashMap<(String, String), serde_json::Value>,
    camera: Vec<CameraMove>,
    fog: Option<Fog>,
    style_url: String,
    style_loaded: bool,
    container_width: f64,
    cursor: String,
    source_adds: usize,
    layer_adds: usize,
    data_writes: usize,
    next_handler_id: u64,
    handlers: Handlers,
}

/// In-memory map with SDK-like handle semantics (clones share state).
#[derive(Clone)]
pub struct InMemoryMap {
    state: Arc<Mutex<State>>,
}

impl InMemoryMap {
    /// A loaded map showing `viewport` with the given style
    pub fn new(viewport: Viewport, style_url: &str) -> Self {
        let map = Self::uninitialized(style_url);
        {
            let mut state = map.state();
            state.viewport = Some(viewport);
            state.style_loaded = true;
        }
        map
    }

    /// A map whose camera and style have not been initialized yet
    pub fn uninitialized(style_url: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                viewport: None,
                sources: HashMap::new(),
                layers: Vec::new(),
                paint: HashMap::new(),
                camera: Vec::new(),
                fog: None,
                style_url: style_url.to_string(),
                style_loaded: false,
                container_width: 1280.0,
                cursor: String::new(),
                source_adds: 0,
                layer_adds: 0,
                data_writes: 0,
                next_handler_id: 0,
                handlers: Handlers::default(),
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_id(state: &mut State) -> u64 {
        state.next_handler_id += 1;
        state.next_handler_id
    }

    pub fn set_container_width(&self, width: f64) {
        self.state().container_width = width;
    }

    /// Move the camera without firing any event
    pub fn set_viewport(&self, viewport: Viewport) {
        self.state().viewport = Some(viewport);
    }

    /// Move the camera and fire the settle event
    pub fn pan_to(&self, viewport: Viewport) {
        let handlers: Vec<SharedEventHandler> = {
            let mut state = self.state();
            state.viewport = Some(viewport);
            state.handlers.settle.values().cloned().collect()
        };
        for handler in handlers {
            handler();
        }
    }

    /// Fire a click on `layer` with `feature` under the cursor.
    ///
    /// Returns false if the layer does not exist (nothing was hit).
    pub fn click(&self, layer: &str, feature: &Feature) -> bool {
        let handlers: Vec<SharedFeatureHandler> = {
            let state = self.state();
            if !state.layers.iter().any(|l| l.id == layer) {
                return false;
            }
            state
                .handlers
                .click
                .values()
                .filter(|(l, _)| l == layer)
                .map(|(_, h)| h.clone())
                .collect()
        };
        for handler in handlers {
            handler(feature);
        }
        true
    }

    /// Fire pointer enter/leave on `layer`
    pub fn pointer(&self, layer: &str, event: PointerEvent) {
        let handlers: Vec<SharedEventHandler> = {
            let state = self.state();
            state
                .handlers
                .pointer
                .values()
                .filter(|(l, e, _)| l == layer && *e == event)
                .map(|(_, _, h)| h.clone())
                .collect()
        };
        for handler in handlers {
            handler();
        }
    }

    /// Complete a pending style load and fire style-loaded callbacks
    pub fn finish_style_load(&self) {
        let (once, handlers) = {
            let mut state = self.state();
            state.style_loaded = true;
            let once = std::mem::take(&mut state.handlers.style_loaded_once);
            let handlers: Vec<SharedEventHandler> =
                state.handlers.style_loaded.values().cloned().collect();
            (once, handlers)
        };
        for handler in once {
            handler();
        }
        for handler in handlers {
            handler();
        }
    }

    /// Current data of a GeoJSON source
    pub fn source_data(&self, id: &str) -> Option<FeatureCollection> {
        match self.state().sources.get(id) {
            Some(SourceSpec::GeoJson(data)) => Some(data.clone()),
            _ => None,
        }
    }

    pub fn layer_ids(&self) -> Vec<String> {
        self.state().layers.iter().map(|l| l.id.clone()).collect()
    }

    /// Number of `add_source` calls
    pub fn source_adds(&self) -> usize {
        self.state().source_adds
    }

    /// Number of `add_layer` calls
    pub fn layer_adds(&self) -> usize {
        self.state().layer_adds
    }

    /// Number of times feature data was written (initial add + in-place updates)
    pub fn data_writes(&self) -> usize {
        self.state().data_writes
    }

    pub fn camera_moves(&self) -> Vec<CameraMove> {
        self.state().camera.clone()
    }

    pub fn cursor(&self) -> String {
        self.state().cursor.clone()
    }

    pub fn fog(&self) -> Option<Fog> {
        self.state().fog.clone()
    }

    pub fn paint_property(&self, layer: &str, property: &str) -> Option<serde_json::Value> {
        self.state()
            .paint
            .get(&(layer.to_string(), property.to_string()))
            .cloned()
    }

    /// Number of click handlers registered on `layer`
    pub fn click_handler_count(&self, layer: &str) -> usize {
        self.state()
            .handlers
            .click
            .values()
            .filter(|(l, _)| l == layer)
            .count()
    }

    pub fn settle_handler_count(&self) -> usize {
        self.state().handlers.settle.len()
    }

    pub fn style_handler_count(&self) -> usize {
        self.state().handlers.style_loaded.len()
    }

    fn subscription(&self, remove: impl FnOnce(&mut Handlers) + Send + 'static) -> Subscription {
        let state = Arc::downgrade(&self.state);
        Subscription::new(move || {
            if let Some(state) = state.upgrade() {
                let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
                remove(&mut state.handlers);
            }
        })
    }
}

impl MapHandle for InMemoryMap {
    fn viewport(&self) -> Option<Viewport> {
        self.state().viewport
    }

    fn has_source(&self, id: &str) -> bool {
        self.state().sources.contains_key(id)
    }

    fn add_source(&self, id: &str, spec: SourceSpec) {
        let mut state = self.state();
        if matches!(spec, SourceSpec::GeoJson(_)) {
            state.data_writes += 1;
        }
        state.source_adds += 1;
        state.sources.insert(id.to_string(), spec);
    }

    fn set_source_data(&self, id: &str, data: &FeatureCollection) {
        let mut state = self.state();
        if let Some(SourceSpec::GeoJson(existing)) = state.sources.get_mut(id) {
            *existing = data.clone();
            state.data_writes += 1;
        } else {
            tracing::warn!(source = %id, "set_source_data on missing GeoJSON source");
        }
    }

    fn remove_source(&self, id: &str) {
        self.state().sources.remove(id);
    }

    fn has_layer(&self, id: &str) -> bool {
        self.state().layers.iter().any(|l| l.id == id)
    }

    fn add_layer(&self, spec: LayerSpec) {
        let mut state = self.state();
        state.layer_adds += 1;
        state.layers.retain(|l| l.id != spec.id);
        state.layers.push(spec);
    }

    fn remove_layer(&self, id: &str) {
        let mut state = self.state();
        state.layers.retain(|l| l.id != id);
        state.paint.retain(|(layer, _), _| layer != id);
    }

    fn set_paint_property(&self, layer: &str, property: &str, value: serde_json::Value) {
        self.state()
            .paint
            .insert((layer.to_string(), property.to_string()), value);
    }

    fn fly_to(&self, target: CameraTarget) {
        self.state().camera.push(CameraMove::FlyTo(target));
    }

    fn ease_to(&self, target: CameraTarget) {
        self.state().camera.push(CameraMove::EaseTo(target));
    }

    fn set_fog(&self, fog: Option<Fog>) {
        self.state().fog = fog;
    }

    fn style_url(&self) -> String {
        self.state().style_url.clone()
    }

    fn is_style_loaded(&self) -> bool {
        self.state().style_loaded
    }

    fn set_style(&self, url: &str) {
        let mut state = self.state();
        state.style_url = url.to_string();
        state.style_loaded = false;
        state.sources.clear();
        state.layers.clear();
        state.paint.clear();
    }

    fn container_width(&self) -> f64 {
        self.state().container_width
    }

    fn set_cursor(&self, cursor: &str) {
        self.state().cursor = cursor.to_string();
    }

    fn on_feature_click(&self, layer: &str, handler: FeatureHandler) -> Subscription {
        let id = {
            let mut state = self.state();
            let id = Self::next_id(&mut state);
            state
                .handlers
                .click
                .insert(id, (layer.to_string(), Arc::from(handler)));
            id
        };
        self.subscription(move |h| {
            h.click.remove(&id);
        })
    }

    fn on_layer_pointer(
        &self,
        layer: &str,
        event: PointerEvent,
        handler: EventHandler,
    ) -> Subscription {
        let id = {
            let mut state = self.state();
            let id = Self::next_id(&mut state);
            state
                .handlers
                .pointer
                .insert(id, (layer.to_string(), event, Arc::from(handler)));
            id
        };
        self.subscription(move |h| {
            h.pointer.remove(&id);
        })
    }

    fn on_viewport_settle(&self, handler: EventHandler) -> Subscription {
        let id = {
            let mut state = self.state();
            let id = Self::next_id(&mut state);
            state.handlers.settle.insert(id, Arc::from(handler));
            id
        };
        self.subscription(move |h| {
            h.settle.remove(&id);
        })
    }

    fn on_style_loaded(&self, handler: EventHandler) -> Subscription {
        let id = {
            let mut state = self.state();
            let id = Self::next_id(&mut state);
            state.handlers.style_loaded.insert(id, Arc::from(handler));
            id
        };
        self.subscription(move |h| {
            h.style_loaded.remove(&id);
        })
    }

    fn once_style_loaded(&self, handler: OnceHandler) {
        self.state().handlers.style_loaded_once.push(handler);
    }
}
