//! Wind particle overlay toggle
//!
//! The raster-array wind source is only valid under the dark style, so
//! turning the overlay on swaps the base style first and adds the layer once
//! the new style has loaded. Turning it off swaps back and removes whatever
//! is left.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use crate::config::MapConfig;

use super::handle::{CameraTarget, Fog, LayerKind, LayerSpec, MapHandle, SourceSpec};

pub const WIND_SOURCE_ID: &str = "raster-array-source";
pub const WIND_LAYER_ID: &str = "wind-layer";
const WIND_TILES_URL: &str = "mapbox://rasterarrayexamples.gfs-winds";
const WIND_SOURCE_LAYER: &str = "10winds";

/// Particle colors by wind speed (m/s)
const SPEED_RAMP: &[(f64, &str)] = &[
    (1.5, "rgba(134,163,171,256)"),
    (2.5, "rgba(126,152,188,256)"),
    (4.12, "rgba(110,143,208,256)"),
    (4.63, "rgba(110,143,208,256)"),
    (6.17, "rgba(15,147,167,256)"),
    (7.72, "rgba(15,147,167,256)"),
    (9.26, "rgba(57,163,57,256)"),
    (10.29, "rgba(57,163,57,256)"),
    (11.83, "rgba(194,134,62,256)"),
    (13.37, "rgba(194,134,63,256)"),
    (14.92, "rgba(200,66,13,256)"),
    (16.46, "rgba(200,66,13,256)"),
    (18.0, "rgba(210,0,50,256)"),
    (20.06, "rgba(215,0,50,256)"),
    (21.6, "rgba(175,80,136,256)"),
    (23.66, "rgba(175,80,136,256)"),
    (25.21, "rgba(117,74,147,256)"),
    (27.78, "rgba(117,74,147,256)"),
    (29.32, "rgba(68,105,141,256)"),
    (31.89, "rgba(68,105,141,256)"),
    (33.44, "rgba(194,251,119,256)"),
    (42.18, "rgba(194,251,119,256)"),
    (43.72, "rgba(241,255,109,256)"),
    (48.87, "rgba(241,255,109,256)"),
    (50.41, "rgba(256,256,256,256)"),
    (57.61, "rgba(256,256,256,256)"),
    (59.16, "rgba(0,256,256,256)"),
    (68.93, "rgba(0,256,256,256)"),
    (69.44, "rgba(256,37,256,256)"),
];

fn particle_paint() -> Value {
    let mut color = vec![
        json!("interpolate"),
        json!(["linear"]),
        json!(["raster-particle-speed"]),
    ];
    for (speed, rgba) in SPEED_RAMP {
        color.push(json!(speed));
        color.push(json!(rgba));
    }

    json!({
        "raster-particle-speed-factor": 0.4,
        "raster-particle-fade-opacity-factor": 0.9,
        "raster-particle-reset-rate-factor": 0.4,
        "raster-particle-count": 4000,
        "raster-particle-max-speed": 40,
        "raster-particle-color": color,
    })
}

pub fn wind_layer() -> LayerSpec {
    LayerSpec {
        id: WIND_LAYER_ID.to_string(),
        kind: LayerKind::RasterParticle,
        source: WIND_SOURCE_ID.to_string(),
        source_layer: Some(WIND_SOURCE_LAYER.to_string()),
        paint: particle_paint(),
    }
}

struct WindState {
    enabled: AtomicBool,
    /// Bumped on every toggle so a deferred apply can tell it is stale
    generation: AtomicU64,
    base_style: String,
    wind_style: String,
}

/// Wind overlay toggle. Clones share state.
#[derive(Clone)]
pub struct WindLayer {
    state: Arc<WindState>,
}

impl WindLayer {
    pub fn new(config: &MapConfig) -> Self {
        Self {
            state: Arc::new(WindState {
                enabled: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                base_style: config.base_style.clone(),
                wind_style: config.wind_style.clone(),
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.state.enabled.load(Ordering::SeqCst)
    }

    fn style_for(&self, enabled: bool) -> &str {
        if enabled {
            &self.state.wind_style
        } else {
            &self.state.base_style
        }
    }

    /// Turn the overlay on or off.
    ///
    /// Applies immediately when the required style is already loaded,
    /// otherwise after the next style load. Only the latest toggle is
    /// applied.
    pub fn set_enabled<M: MapHandle>(&self, map: &M, enabled: bool) {
        self.state.enabled.store(enabled, Ordering::SeqCst);
        let generation = self.state.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let style = self.style_for(enabled);

        if map.style_url() == style && map.is_style_loaded() {
            apply(map, enabled);
            return;
        }

        tracing::debug!(enabled, style, "Deferring wind layer until style loads");

        let state = self.state.clone();
        let handle = map.clone();
        map.once_style_loaded(Box::new(move || {
            if state.generation.load(Ordering::SeqCst) != generation {
                return;
            }
            apply(&handle, state.enabled.load(Ordering::SeqCst));
        }));

        if map.style_url() != style {
            map.set_style(style);
        }
    }
}

fn apply<M: MapHandle>(map: &M, enabled: bool) {
    if enabled {
        if !map.has_source(WIND_SOURCE_ID) {
            map.add_source(
                WIND_SOURCE_ID,
                SourceSpec::RasterArray {
                    url: WIND_TILES_URL.to_string(),
                    tile_size: 512,
                },
            );
        }
        if !map.has_layer(WIND_LAYER_ID) {
            map.add_layer(wind_layer());
        }
        map.ease_to(CameraTarget::zoom_to(2.0, Duration::from_millis(2000)));
        map.set_fog(Some(Fog::space()));
        tracing::info!("Wind layer enabled");
    } else {
        if map.has_layer(WIND_LAYER_ID) {
            map.remove_layer(WIND_LAYER_ID);
        }
        if map.has_source(WIND_SOURCE_ID) {
            map.remove_source(WIND_SOURCE_ID);
        }
        map.set_fog(None);
        map.ease_to(CameraTarget::zoom_to(5.0, Duration::from_millis(1500)));
        tracing::info!("Wind layer disabled");
    }
}
