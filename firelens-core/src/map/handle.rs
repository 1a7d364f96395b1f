//! Capability interface over a rendering map
//!
//! [`MapHandle`] is what the synchronizer and the other map components talk
//! to. It mirrors the small slice of a map SDK they need (sources, layers,
//! camera, style, events) so they can run against [`InMemoryMap`] in tests
//! and headless tools.
//!
//! [`InMemoryMap`]: super::InMemoryMap

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::geo::{Feature, FeatureCollection, Viewport};

/// Callback invoked with the feature under the cursor.
pub type FeatureHandler = Box<dyn Fn(&Feature) + Send + Sync>;
/// Callback without a payload (settle, style loaded, hover).
pub type EventHandler = Box<dyn Fn() + Send + Sync>;
/// One-shot callback.
pub type OnceHandler = Box<dyn FnOnce() + Send>;

/// Pointer events a layer can be subscribed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerEvent {
    Enter,
    Leave,
}

/// Handle to a registered callback. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription with nothing to undo
    pub fn noop() -> Self {
        Self { cancel: None }
    }

    pub fn unsubscribe(mut self) {
        self.run();
    }

    fn run(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Data source definitions
#[derive(Debug, Clone, PartialEq)]
pub enum SourceSpec {
    /// Inline GeoJSON points
    GeoJson(FeatureCollection),
    /// Tiled raster-array data (wind fields)
    RasterArray { url: String, tile_size: u32 },
}

/// Layer definition. Paint properties are passed through to the renderer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerSpec {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: LayerKind,
    pub source: String,
    #[serde(rename = "source-layer", skip_serializing_if = "Option::is_none")]
    pub source_layer: Option<String>,
    pub paint: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayerKind {
    Circle,
    RasterParticle,
}

/// Padding in pixels applied around a camera target
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Padding {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

/// A camera transition request. Transitions are fire-and-forget.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraTarget {
    /// `[longitude, latitude]`; `None` keeps the current center
    pub center: Option<[f64; 2]>,
    pub zoom: f64,
    pub duration: Duration,
    pub pitch: Option<f64>,
    pub bearing: Option<f64>,
    pub padding: Option<Padding>,
}

impl CameraTarget {
    /// Zoom-only transition around the current center
    pub fn zoom_to(zoom: f64, duration: Duration) -> Self {
        Self {
            center: None,
            zoom,
            duration,
            pitch: None,
            bearing: None,
            padding: None,
        }
    }
}

/// Atmosphere settings
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Fog {
    pub color: String,
    pub high_color: String,
    pub space_color: String,
    pub horizon_blend: f64,
    pub star_intensity: f64,
}

impl Fog {
    /// Dark space backdrop used with the wind layer
    pub fn space() -> Self {
        Self {
            color: "rgb(11, 11, 25)".to_string(),
            high_color: "rgb(11, 11, 25)".to_string(),
            space_color: "rgb(11, 11, 25)".to_string(),
            horizon_blend: 0.01,
            star_intensity: 0.6,
        }
    }
}

/// Capability interface over a map instance.
///
/// Implementations are cheap handles with interior mutability, like the SDK
/// objects they wrap. Methods must not invoke registered callbacks
/// synchronously while the caller still holds the handle's internal state.
pub trait MapHandle: Clone + Send + Sync + 'static {
    /// Visible bounds, `None` until the map has been initialized
    fn viewport(&self) -> Option<Viewport>;

    fn has_source(&self, id: &str) -> bool;
    fn add_source(&self, id: &str, spec: SourceSpec);
    /// Replace the data of an existing GeoJSON source in place
    fn set_source_data(&self, id: &str, data: &FeatureCollection);
    fn remove_source(&self, id: &str);

    fn has_layer(&self, id: &str) -> bool;
    fn add_layer(&self, spec: LayerSpec);
    fn remove_layer(&self, id: &str);
    fn set_paint_property(&self, layer: &str, property: &str, value: serde_json::Value);

    fn fly_to(&self, target: CameraTarget);
    fn ease_to(&self, target: CameraTarget);
    fn set_fog(&self, fog: Option<Fog>);

    /// URL of the current (or currently loading) style
    fn style_url(&self) -> String;
    fn is_style_loaded(&self) -> bool;
    /// Swap the base style. All sources and layers are dropped by the map.
    fn set_style(&self, url: &str);

    /// Width of the map container in pixels
    fn container_width(&self) -> f64;
    /// Cursor shown over the canvas; empty string restores the default
    fn set_cursor(&self, cursor: &str);

    fn on_feature_click(&self, layer: &str, handler: FeatureHandler) -> Subscription;
    fn on_layer_pointer(&self, layer: &str, event: PointerEvent, handler: EventHandler)
        -> Subscription;
    /// Fired once a move or zoom interaction settles
    fn on_viewport_settle(&self, handler: EventHandler) -> Subscription;
    fn on_style_loaded(&self, handler: EventHandler) -> Subscription;
    /// Fired at the next style load only
    fn once_style_loaded(&self, handler: OnceHandler);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_subscription_runs_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let sub = Subscription::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        sub.unsubscribe();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscription_drop_unsubscribes() {
        let count = Arc::new(AtomicUsize::new(0));
        {
            let counter = count.clone();
            let _sub = Subscription::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
        drop(Subscription::noop());
    }

    #[test]
    fn test_layer_spec_serializes_like_style_json() {
        let spec = LayerSpec {
            id: "wind-layer".to_string(),
            kind: LayerKind::RasterParticle,
            source: "raster-array-source".to_string(),
            source_layer: Some("10winds".to_string()),
            paint: serde_json::json!({}),
        };
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["type"], "raster-particle");
        assert_eq!(json["source-layer"], "10winds");
    }
}
