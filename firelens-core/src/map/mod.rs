//! Map-side orchestration
//!
//! Everything that touches the map goes through the [`MapHandle`]
//! capability trait:
//!
//! - [`ViewportSynchronizer`] keeps the hotspot source in step with the
//!   viewport and filters, one request in flight at a time
//! - [`DataSourceBinding`] decides between creating and updating the source
//! - [`Selection`] implements the click protocol and reverse geocoding
//! - [`WindLayer`] toggles the wind overlay across style swaps
//! - [`MapController`] owns all of the above and debounces map events

mod binding;
mod camera;
mod controller;
mod geocode;
mod handle;
mod memory;
mod pulse;
mod selection;
mod sync;
mod wind;

pub use binding::{point_layer, ApplyResult, ClickHook, DataSourceBinding};
pub use camera::FlyToRequest;
pub use controller::{MapCommand, MapCommands, MapController};
pub use geocode::{Geocoder, MapboxGeocoder};
pub use handle::{
    CameraTarget, EventHandler, FeatureHandler, Fog, LayerKind, LayerSpec, MapHandle,
    OnceHandler, Padding, PointerEvent, SourceSpec, Subscription,
};
pub use memory::{CameraMove, InMemoryMap};
pub use pulse::{pulse_paint, FrameThrottle, PulseAnimator};
pub use selection::{acquisition_time, SelectedPoint, Selection, DATE_TIME_FORMAT};
pub use sync::{RefreshOutcome, RequestToken, ViewportSynchronizer};
pub use wind::{wind_layer, WindLayer, WIND_LAYER_ID, WIND_SOURCE_ID};
