//! Hotspot feature collection as returned by the geo-query endpoint

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};

/// A set of hotspot points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(rename = "type", default = "feature_collection_type")]
    pub collection_type: String,
    pub features: Vec<Feature>,
}

fn feature_collection_type() -> String {
    "FeatureCollection".to_string()
}

impl FeatureCollection {
    pub fn new(features: Vec<Feature>) -> Self {
        Self {
            collection_type: feature_collection_type(),
            features,
        }
    }

    /// Validate and decode a raw response body.
    ///
    /// The whole response is rejected when `features` is missing, is not an
    /// array, or any element fails to decode. Nothing is partially rendered.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        match value.get("features") {
            Some(serde_json::Value::Array(_)) => {}
            Some(other) => {
                return Err(Error::MalformedResponse(format!(
                    "`features` is not an array (found {})",
                    json_kind(other)
                )))
            }
            None => {
                return Err(Error::MalformedResponse(
                    "response has no `features` field".to_string(),
                ))
            }
        }

        serde_json::from_value(value)
            .map_err(|e| Error::MalformedResponse(format!("invalid feature: {}", e)))
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// One detected hotspot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    /// Stable numeric identifier
    pub id: u64,
    #[serde(rename = "type", default = "feature_type")]
    pub feature_type: String,
    pub geometry: PointGeometry,
    #[serde(default)]
    pub properties: FireProperties,
}

fn feature_type() -> String {
    "Feature".to_string()
}

impl Feature {
    pub fn new(id: u64, longitude: f64, latitude: f64, properties: FireProperties) -> Self {
        Self {
            id,
            feature_type: feature_type(),
            geometry: PointGeometry::new(longitude, latitude),
            properties,
        }
    }

    pub fn longitude(&self) -> f64 {
        self.geometry.coordinates[0]
    }

    pub fn latitude(&self) -> f64 {
        self.geometry.coordinates[1]
    }
}

/// Point geometry in `[longitude, latitude]` order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointGeometry {
    #[serde(rename = "type", default = "point_type")]
    pub geometry_type: String,
    pub coordinates: [f64; 2],
}

fn point_type() -> String {
    "Point".to_string()
}

impl PointGeometry {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            geometry_type: point_type(),
            coordinates: [longitude, latitude],
        }
    }
}

/// Sensor readings attached to a hotspot.
///
/// Missing and `null` columns both decode to the field default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FireProperties {
    /// I-4 channel brightness temperature (K)
    #[serde(deserialize_with = "null_as_default")]
    pub bright_ti4: f64,
    /// I-5 channel brightness temperature (K)
    #[serde(deserialize_with = "null_as_default")]
    pub bright_ti5: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub scan: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub track: f64,
    /// Acquisition date, `YYYY-MM-DD`
    #[serde(deserialize_with = "null_as_default")]
    pub acq_date: String,
    /// Acquisition time of day encoded as `HHMM`
    #[serde(deserialize_with = "deserialize_hhmm")]
    pub acq_time: u16,
    #[serde(deserialize_with = "null_as_default")]
    pub satellite: String,
    /// Confidence class (low, nominal, high)
    #[serde(deserialize_with = "null_as_default")]
    pub confidence: String,
    #[serde(deserialize_with = "null_as_default")]
    pub version: String,
    /// Fire radiative power (MW)
    #[serde(deserialize_with = "null_as_default")]
    pub frp: f64,
    /// `D` for day, `N` for night
    #[serde(deserialize_with = "null_as_default")]
    pub daynight: String,
    /// Vegetation index scaled by 10000
    #[serde(deserialize_with = "null_as_default")]
    pub ndvi: f64,
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accept `930`, `"0930"` or `null` for the HHMM field.
fn deserialize_hhmm<'de, D>(deserializer: D) -> std::result::Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Hhmm {
        Number(u16),
        Text(String),
        Null,
    }

    match Option::<Hhmm>::deserialize(deserializer)? {
        Some(Hhmm::Number(n)) => Ok(n),
        Some(Hhmm::Text(s)) => s
            .trim()
            .parse::<u16>()
            .map_err(|_| serde::de::Error::custom(format!("invalid HHMM time {:?}", s))),
        Some(Hhmm::Null) | None => Ok(0),
    }
}
