//! Association between a logical source name and the map's live state

use std::sync::Arc;

use crate::geo::{Feature, FeatureCollection};

use super::handle::{LayerKind, LayerSpec, MapHandle, PointerEvent, SourceSpec, Subscription};

/// Click callback shared by every binding generation.
pub type ClickHook = Arc<dyn Fn(&Feature) + Send + Sync>;

/// What [`DataSourceBinding::apply`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyResult {
    /// Source, layer and handlers were created
    Created,
    /// Existing source data was replaced in place
    Updated,
}

/// Unbound until the first successful apply, then bound until reset.
///
/// Owning the handler subscriptions here means a rebind after a style reload
/// replaces the old handlers instead of stacking new ones on top.
#[derive(Debug, Default)]
pub enum DataSourceBinding {
    #[default]
    Unbound,
    Bound { subscriptions: Vec<Subscription> },
}

impl DataSourceBinding {
    pub fn is_bound(&self) -> bool {
        matches!(self, DataSourceBinding::Bound { .. })
    }

    /// Push `data` into the map, creating the source on first use.
    pub fn apply<M: MapHandle>(
        &mut self,
        map: &M,
        source: &str,
        layer: &str,
        data: &FeatureCollection,
        on_click: &ClickHook,
    ) -> ApplyResult {
        if self.is_bound() && !map.has_source(source) {
            tracing::warn!(source = %source, "Bound source vanished from the map, rebinding");
            self.reset();
        }

        match *self {
            DataSourceBinding::Bound { .. } => {
                map.set_source_data(source, data);
                ApplyResult::Updated
            }
            DataSourceBinding::Unbound => {
                map.add_source(source, SourceSpec::GeoJson(data.clone()));
                map.add_layer(point_layer(source, layer));
                let subscriptions = register_handlers(map, layer, on_click);
                *self = DataSourceBinding::Bound { subscriptions };
                tracing::debug!(source = %source, layer = %layer, "Created hotspot source and layer");
                ApplyResult::Created
            }
        }
    }

    /// Forget the binding and drop its handlers.
    pub fn reset(&mut self) {
        *self = DataSourceBinding::Unbound;
    }
}

fn register_handlers<M: MapHandle>(map: &M, layer: &str, on_click: &ClickHook) -> Vec<Subscription> {
    let enter_map = map.clone();
    let leave_map = map.clone();
    let on_click = on_click.clone();

    vec![
        map.on_layer_pointer(
            layer,
            PointerEvent::Enter,
            Box::new(move || enter_map.set_cursor("pointer")),
        ),
        map.on_layer_pointer(
            layer,
            PointerEvent::Leave,
            Box::new(move || leave_map.set_cursor("")),
        ),
        map.on_feature_click(layer, Box::new(move |feature| on_click(feature))),
    ]
}

/// The circle layer drawing hotspot points.
///
/// The radius here is only a starting value: while a
/// [`PulseAnimator`](super::PulseAnimator) runs it rewrites `circle-radius`
/// (4 to 12) and `circle-opacity` (0.1 to 0.7) every frame.
pub fn point_layer(source: &str, layer: &str) -> LayerSpec {
    LayerSpec {
        id: layer.to_string(),
        kind: LayerKind::Circle,
        source: source.to_string(),
        source_layer: None,
        paint: serde_json::json!({
            "circle-radius": 5,
            "circle-color": "#ea580c",
            "circle-blur": 0.2,
            "circle-stroke-color": "#7c2d12",
            "circle-stroke-width": 1,
            "circle-stroke-opacity": 0.8,
            "circle-emissive-strength": 1
        }),
    }
}
