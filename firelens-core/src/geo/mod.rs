//! Geographic data model and the viewport-scoped geo-query client
//!
//! A [`ViewportQuery`] combines the visible bounding box with the active
//! [`FilterParams`] and is sent to `GET /api/map`. The response is a
//! GeoJSON-like [`FeatureCollection`] of hotspot points.

mod client;
mod features;
mod viewport;

pub use client::{FeatureSource, HttpFeatureSource};
pub use features::{Feature, FeatureCollection, FireProperties, PointGeometry};
pub use viewport::{FilterParams, FilterValue, Viewport, ViewportQuery};
