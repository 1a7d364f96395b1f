//! Viewport bounds, filter parameters and query-string encoding

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Axis-aligned lat/lon bounding box of the visible map area.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl Viewport {
    /// Build a viewport, rejecting non-finite, inverted or out-of-range bounds.
    pub fn new(min_lat: f64, max_lat: f64, min_lon: f64, max_lon: f64) -> Result<Self> {
        let viewport = Self {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
        };
        viewport.validate()?;
        Ok(viewport)
    }

    pub fn validate(&self) -> Result<()> {
        let all = [self.min_lat, self.max_lat, self.min_lon, self.max_lon];
        if all.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidViewport(format!(
                "non-finite bound in {}",
                self
            )));
        }
        if self.min_lat > self.max_lat || self.min_lon > self.max_lon {
            return Err(Error::InvalidViewport(format!("inverted bounds {}", self)));
        }
        if self.min_lat < -90.0 || self.max_lat > 90.0 {
            return Err(Error::InvalidViewport(format!(
                "latitude out of range {}",
                self
            )));
        }
        if self.min_lon < -180.0 || self.max_lon > 180.0 {
            return Err(Error::InvalidViewport(format!(
                "longitude out of range {}",
                self
            )));
        }
        Ok(())
    }

    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lon >= self.min_lon && lon <= self.max_lon
    }
}

impl fmt::Display for Viewport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[lat {}..{}, lon {}..{}]",
            self.min_lat, self.max_lat, self.min_lon, self.max_lon
        )
    }
}

/// A single filter constraint value supplied by the UI controls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Number(f64),
    Text(String),
}

impl FilterValue {
    /// Query-string rendering, `None` for values that must be omitted.
    fn to_query_value(&self) -> Option<String> {
        match self {
            FilterValue::Number(n) if n.is_finite() => Some(n.to_string()),
            FilterValue::Number(_) => None,
            FilterValue::Text(s) if s.is_empty() => None,
            FilterValue::Text(s) => Some(s.clone()),
        }
    }
}

impl From<f64> for FilterValue {
    fn from(value: f64) -> Self {
        FilterValue::Number(value)
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Text(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::Text(value)
    }
}

/// Keys reserved for the viewport bounds.
const BOUND_KEYS: [&str; 4] = ["minLat", "maxLat", "minLon", "maxLon"];

/// Opaque bag of named filter constraints (confidence, daynight, brightness
/// and FRP ranges, ...).
///
/// Entries set to `None` are kept so the UI can clear a control, but they are
/// never sent over the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterParams(BTreeMap<String, Option<FilterValue>>);

impl FilterParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set or clear a filter.
    pub fn set(&mut self, key: impl Into<String>, value: Option<FilterValue>) -> &mut Self {
        self.0.insert(key.into(), value);
        self
    }

    /// Builder-style variant of [`FilterParams::set`].
    pub fn with(mut self, key: impl Into<String>, value: Option<FilterValue>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&FilterValue> {
        self.0.get(key).and_then(|v| v.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse a `key=value` pair as given on the command line.
    ///
    /// Numeric values become [`FilterValue::Number`], anything else is text.
    pub fn parse_pair(pair: &str) -> Result<(String, FilterValue)> {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| Error::Config(format!("expected key=value, got {:?}", pair)))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(Error::Config(format!("empty filter key in {:?}", pair)));
        }
        let value = value.trim();
        let value = value
            .parse::<f64>()
            .map(FilterValue::Number)
            .unwrap_or_else(|_| FilterValue::Text(value.to_string()));
        Ok((key.to_string(), value))
    }

    /// Entries that will actually be sent: present, non-empty, not a bound key.
    fn wire_entries(&self) -> impl Iterator<Item = (&str, String)> {
        self.0.iter().filter_map(|(key, value)| {
            if BOUND_KEYS.contains(&key.as_str()) {
                tracing::debug!(key = %key, "Ignoring filter that shadows a viewport bound");
                return None;
            }
            value
                .as_ref()
                .and_then(FilterValue::to_query_value)
                .map(|v| (key.as_str(), v))
        })
    }
}

/// A geo query scoped to one viewport and filter set.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewportQuery {
    pub viewport: Viewport,
    pub filters: FilterParams,
}

impl ViewportQuery {
    pub fn new(viewport: Viewport, filters: FilterParams) -> Self {
        Self { viewport, filters }
    }

    /// Encode as a URL query string: bounds first, then filters in key order.
    pub fn to_query_string(&self) -> String {
        let v = &self.viewport;
        let bounds = [
            ("minLat", v.min_lat),
            ("maxLat", v.max_lat),
            ("minLon", v.min_lon),
            ("maxLon", v.max_lon),
        ];

        let mut parts: Vec<String> = bounds
            .iter()
            .map(|(k, value)| format!("{}={}", k, value))
            .collect();

        parts.extend(self.filters.wire_entries().map(|(key, value)| {
            format!(
                "{}={}",
                urlencoding::encode(key),
                urlencoding::encode(&value)
            )
        }));

        parts.join("&")
    }
}
